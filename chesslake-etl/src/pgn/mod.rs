//! Portable Game Notation
//!
//! Reads tag pairs and movetext from single- or multi-game documents and
//! replays SAN moves against a legal move generator.

mod reader;
mod replay;

pub use reader::{parse_games, parse_movetext, Movetext};
pub use replay::{replay, Replay};

use thiserror::Error;

/// PGN errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PgnError {
    #[error("line {line}: unterminated comment")]
    UnterminatedComment { line: usize },

    #[error("line {line}: malformed tag pair: {reason}")]
    MalformedTag { line: usize, reason: String },

    #[error("line {line}: unbalanced variation parentheses")]
    UnbalancedVariation { line: usize },

    #[error("line {line}: unexpected token '{token}'")]
    UnexpectedToken { line: usize, token: String },

    #[error("ply {ply}: illegal or unparseable move '{san}'")]
    IllegalMove { ply: usize, san: String },

    #[error("document contains no games")]
    Empty,
}

impl From<PgnError> for chesslake_common::Error {
    fn from(err: PgnError) -> Self {
        chesslake_common::Error::Parse(format!("PGN: {}", err))
    }
}

/// Game result token
pub const RESULT_TOKENS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

/// One game from a PGN document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgnGame {
    /// Tag pairs in document order
    pub tags: Vec<(String, String)>,
    /// Mainline SAN moves; annotation glyphs removed, check marks kept
    pub moves: Vec<String>,
    /// Result token terminating the movetext, if any
    pub result: Option<String>,
}

impl PgnGame {
    /// Value of a tag (case-sensitive, first occurrence)
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Tag value treating `?` placeholders and empty strings as missing
    pub fn known_tag(&self, name: &str) -> Option<&str> {
        self.tag(name)
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.chars().all(|c| c == '?' || c == '.'))
    }

    /// Mainline as a single space-separated string
    pub fn movetext(&self) -> String {
        self.moves.join(" ")
    }
}
