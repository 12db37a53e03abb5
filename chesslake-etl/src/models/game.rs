//! Cleansed game rows
//!
//! A `GameRow` is the platform-neutral shape every source (Chess.com archive
//! JSON, Lichess NDJSON, PGN exports) is decoded into before quality checks.

use chesslake_common::hash::hash_fields;
use chesslake_common::{time, Platform};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Final result of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    WhiteWin,
    BlackWin,
    Draw,
    Unknown,
}

impl GameResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameResult::WhiteWin => "white_win",
            GameResult::BlackWin => "black_win",
            GameResult::Draw => "draw",
            GameResult::Unknown => "unknown",
        }
    }

    /// Map a PGN result token (`1-0`, `0-1`, `1/2-1/2`, `*`)
    pub fn from_pgn(token: &str) -> Self {
        match token.trim() {
            "1-0" => GameResult::WhiteWin,
            "0-1" => GameResult::BlackWin,
            "1/2-1/2" | "½-½" => GameResult::Draw,
            _ => GameResult::Unknown,
        }
    }

    pub fn pgn_token(&self) -> &'static str {
        match self {
            GameResult::WhiteWin => "1-0",
            GameResult::BlackWin => "0-1",
            GameResult::Draw => "1/2-1/2",
            GameResult::Unknown => "*",
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameResult {
    type Err = chesslake_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "white_win" => Ok(GameResult::WhiteWin),
            "black_win" => Ok(GameResult::BlackWin),
            "draw" => Ok(GameResult::Draw),
            "unknown" => Ok(GameResult::Unknown),
            other => Err(chesslake_common::Error::Parse(format!(
                "Unknown game result '{}'",
                other
            ))),
        }
    }
}

/// Speed category of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeClass {
    Bullet,
    Blitz,
    Rapid,
    Classical,
    Daily,
    Correspondence,
    Unknown,
}

impl TimeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeClass::Bullet => "bullet",
            TimeClass::Blitz => "blitz",
            TimeClass::Rapid => "rapid",
            TimeClass::Classical => "classical",
            TimeClass::Daily => "daily",
            TimeClass::Correspondence => "correspondence",
            TimeClass::Unknown => "unknown",
        }
    }

    /// Platform label (`time_class` on Chess.com, `speed` on Lichess)
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "bullet" | "ultrabullet" => Some(TimeClass::Bullet),
            "blitz" => Some(TimeClass::Blitz),
            "rapid" => Some(TimeClass::Rapid),
            "classical" | "standard" => Some(TimeClass::Classical),
            "daily" => Some(TimeClass::Daily),
            "correspondence" => Some(TimeClass::Correspondence),
            _ => None,
        }
    }

    /// Classify a PGN `TimeControl` value
    ///
    /// **Algorithm:**
    /// 1. `1/<secs>` (moves per period) is a daily game
    /// 2. `<base>[+<increment>]` is estimated as `base + 40 * increment` seconds
    /// 3. < 180 bullet, < 480 blitz, < 1500 rapid, otherwise classical
    ///
    /// `-` (no clock) and anything unparseable is `Unknown`; an estimate too
    /// large for `u64` is `Classical`.
    pub fn from_time_control(time_control: &str) -> Self {
        let tc = time_control.trim();
        if tc.contains('/') {
            return TimeClass::Daily;
        }

        let mut parts = tc.splitn(2, '+');
        let base = match parts.next().and_then(|b| b.trim().parse::<u64>().ok()) {
            Some(base) => base,
            None => return TimeClass::Unknown,
        };
        let increment = match parts.next() {
            Some(inc) => match inc.trim().parse::<u64>() {
                Ok(inc) => inc,
                Err(_) => return TimeClass::Unknown,
            },
            None => 0,
        };

        let estimate = match increment.checked_mul(40).and_then(|inc| inc.checked_add(base)) {
            Some(estimate) => estimate,
            None => return TimeClass::Classical,
        };

        match estimate {
            0..=179 => TimeClass::Bullet,
            180..=479 => TimeClass::Blitz,
            480..=1499 => TimeClass::Rapid,
            _ => TimeClass::Classical,
        }
    }
}

impl fmt::Display for TimeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeClass {
    type Err = chesslake_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "unknown" {
            return Ok(TimeClass::Unknown);
        }
        TimeClass::from_label(s)
            .ok_or_else(|| chesslake_common::Error::Parse(format!("Unknown time class '{}'", s)))
    }
}

/// One cleansed game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRow {
    /// Platform-qualified id, e.g. `lichess:q7ZvsdUF`
    pub game_id: String,
    pub platform: Platform,
    pub white: String,
    pub black: String,
    pub white_rating: Option<i64>,
    pub black_rating: Option<i64>,
    pub result: GameResult,
    pub termination: Option<String>,
    pub time_control: Option<String>,
    pub time_class: TimeClass,
    pub rated: Option<bool>,
    pub eco: Option<String>,
    pub opening_name: Option<String>,
    /// Mainline SAN
    pub moves: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub white_accuracy: Option<f64>,
    pub black_accuracy: Option<f64>,
    pub source_record_id: Uuid,
}

impl GameRow {
    /// Row with identity and players set; everything else unknown
    pub fn new(
        game_id: String,
        platform: Platform,
        white: impl Into<String>,
        black: impl Into<String>,
        source_record_id: Uuid,
    ) -> Self {
        Self {
            game_id,
            platform,
            white: white.into(),
            black: black.into(),
            white_rating: None,
            black_rating: None,
            result: GameResult::Unknown,
            termination: None,
            time_control: None,
            time_class: TimeClass::Unknown,
            rated: None,
            eco: None,
            opening_name: None,
            moves: Vec::new(),
            started_at: None,
            ended_at: None,
            white_accuracy: None,
            black_accuracy: None,
            source_record_id,
        }
    }

    /// `<platform>:<id>`
    pub fn qualified_id(platform: Platform, id: &str) -> String {
        format!("{}:{}", platform, id.trim())
    }

    pub fn ply_count(&self) -> usize {
        self.moves.len()
    }

    pub fn moves_text(&self) -> String {
        self.moves.join(" ")
    }

    /// SHA-256 over the attribute values, lineage excluded
    pub fn row_hash(&self) -> String {
        let white_rating = self.white_rating.map(|r| r.to_string());
        let black_rating = self.black_rating.map(|r| r.to_string());
        let rated = self.rated.map(|r| r.to_string());
        let started_at = self.started_at.as_ref().map(time::to_db);
        let ended_at = self.ended_at.as_ref().map(time::to_db);
        let white_accuracy = self.white_accuracy.map(|a| format!("{:.2}", a));
        let black_accuracy = self.black_accuracy.map(|a| format!("{:.2}", a));
        let moves = self.moves_text();

        hash_fields([
            Some(self.game_id.as_str()),
            Some(self.platform.as_str()),
            Some(self.white.as_str()),
            Some(self.black.as_str()),
            white_rating.as_deref(),
            black_rating.as_deref(),
            Some(self.result.as_str()),
            self.termination.as_deref(),
            self.time_control.as_deref(),
            Some(self.time_class.as_str()),
            rated.as_deref(),
            self.eco.as_deref(),
            self.opening_name.as_deref(),
            Some(moves.as_str()),
            started_at.as_deref(),
            ended_at.as_deref(),
            white_accuracy.as_deref(),
            black_accuracy.as_deref(),
        ])
    }

    /// Side a username played, case-insensitive
    pub fn color_of(&self, username: &str) -> Option<Color> {
        if self.white.eq_ignore_ascii_case(username) {
            Some(Color::White)
        } else if self.black.eq_ignore_ascii_case(username) {
            Some(Color::Black)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
pub(crate) fn sample_row() -> GameRow {
    GameRow {
        game_id: "lichess:abcd1234".to_string(),
        platform: Platform::Lichess,
        white: "alice".to_string(),
        black: "bob".to_string(),
        white_rating: Some(1500),
        black_rating: Some(1480),
        result: GameResult::WhiteWin,
        termination: Some("mate".to_string()),
        time_control: Some("300+3".to_string()),
        time_class: TimeClass::Blitz,
        rated: Some(true),
        eco: Some("C50".to_string()),
        opening_name: Some("Italian Game".to_string()),
        moves: ["e4", "e5", "Bc4", "Nc6", "Qh5", "Nf6", "Qxf7#"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        started_at: time::from_unix_seconds(1_714_550_400),
        ended_at: time::from_unix_seconds(1_714_550_700),
        white_accuracy: Some(91.5),
        black_accuracy: None,
        source_record_id: Uuid::nil(),
    }
}
