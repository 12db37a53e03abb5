//! Tracked players
//!
//! The players file is YAML and names usernames per platform:
//!
//! ```yaml
//! players:
//!   chesscom: [alice]
//!   lichess: [alice_lc]
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Source platform of a payload, game or rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(alias = "chess.com")]
    Chesscom,
    Lichess,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Chesscom => "chesscom",
            Platform::Lichess => "lichess",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chesscom" | "chess.com" | "chess_com" => Ok(Platform::Chesscom),
            "lichess" | "lichess.org" => Ok(Platform::Lichess),
            other => Err(Error::InvalidInput(format!("Unknown platform: {}", other))),
        }
    }
}

/// Natural key of a player across the pipeline: `lowercase(username)_platform`
pub fn player_key(username: &str, platform: Platform) -> String {
    format!("{}_{}", username.trim().to_lowercase(), platform.as_str())
}

#[derive(Debug, Deserialize)]
struct PlayersFile {
    #[serde(default)]
    players: PlayersByPlatform,
}

#[derive(Debug, Default, Deserialize)]
struct PlayersByPlatform {
    #[serde(default)]
    chesscom: Vec<String>,
    #[serde(default)]
    lichess: Vec<String>,
}

/// A tracked account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedPlayer {
    pub platform: Platform,
    /// Username as written in the players file (trimmed)
    pub username: String,
}

impl TrackedPlayer {
    pub fn player_key(&self) -> String {
        player_key(&self.username, self.platform)
    }
}

/// All tracked accounts, deduplicated case-insensitively per platform
#[derive(Debug, Clone, Default)]
pub struct TrackedPlayers {
    players: Vec<TrackedPlayer>,
}

impl TrackedPlayers {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: PlayersFile = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse players YAML failed: {}", e)))?;

        let mut tracked = Self::default();
        for (platform, names) in [
            (Platform::Chesscom, file.players.chesscom),
            (Platform::Lichess, file.players.lichess),
        ] {
            for name in names {
                let name = name.trim();
                if name.is_empty() {
                    return Err(Error::Config(format!(
                        "Empty username listed under {}",
                        platform
                    )));
                }
                tracked.add(platform, name);
            }
        }
        Ok(tracked)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    /// Add an account unless it is already tracked
    pub fn add(&mut self, platform: Platform, username: &str) {
        if !self.contains(platform, username) {
            self.players.push(TrackedPlayer {
                platform,
                username: username.trim().to_string(),
            });
        }
    }

    pub fn contains(&self, platform: Platform, username: &str) -> bool {
        let wanted = username.trim();
        self.players
            .iter()
            .any(|p| p.platform == platform && p.username.eq_ignore_ascii_case(wanted))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedPlayer> {
        self.players.iter()
    }

    pub fn for_platform(&self, platform: Platform) -> impl Iterator<Item = &TrackedPlayer> {
        self.players.iter().filter(move |p| p.platform == platform)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_players_file() {
        let tracked = TrackedPlayers::from_yaml_str(
            r#"
players:
  chesscom: [Alice, bob]
  lichess:
    - alice_lc
"#,
        )
        .unwrap();

        assert_eq!(tracked.len(), 3);
        assert!(tracked.contains(Platform::Chesscom, "alice"));
        assert!(tracked.contains(Platform::Lichess, "ALICE_LC"));
        assert!(!tracked.contains(Platform::Lichess, "bob"));
        assert_eq!(tracked.for_platform(Platform::Chesscom).count(), 2);
    }

    #[test]
    fn test_duplicate_usernames_collapse() {
        let tracked = TrackedPlayers::from_yaml_str(
            "players:\n  chesscom: [alice, ' Alice ', ALICE]\n",
        )
        .unwrap();
        assert_eq!(tracked.len(), 1);
    }

    #[test]
    fn test_missing_platform_lists_are_empty() {
        let tracked = TrackedPlayers::from_yaml_str("players:\n  lichess: [x]\n").unwrap();
        assert_eq!(tracked.for_platform(Platform::Chesscom).count(), 0);
        assert_eq!(tracked.len(), 1);
    }

    #[test]
    fn test_empty_username_rejected() {
        let result = TrackedPlayers::from_yaml_str("players:\n  chesscom: ['  ']\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_player_key_is_lowercase_with_platform() {
        assert_eq!(player_key(" Hikaru ", Platform::Chesscom), "hikaru_chesscom");
        assert_eq!(player_key("DrNykterstein", Platform::Lichess), "drnykterstein_lichess");
    }

    #[test]
    fn test_platform_parsing() {
        assert_eq!("chess.com".parse::<Platform>().unwrap(), Platform::Chesscom);
        assert_eq!("Lichess".parse::<Platform>().unwrap(), Platform::Lichess);
        assert!("fics".parse::<Platform>().is_err());
    }
}
