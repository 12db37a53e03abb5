//! Bronze layer: raw API payloads, landed unchanged
//!
//! Every payload is written once to a date-partitioned landing zone and
//! recorded in the `bronze_records` manifest together with its lineage
//! (platform, dataset, account, source URI, content hash, ingestion time).

pub mod drop_scanner;
pub mod landing;
pub mod manifest;

pub use drop_scanner::{scan_drop_dir, DropFile, DropScan, ScanError};
pub use landing::{land, land_at, read_payload, LandingZone};

use chesslake_common::{Error, Platform, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of API document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    /// Player profile (`/pub/player/{user}`, `/api/user/{user}`)
    Profile,
    /// Rating statistics (`/pub/player/{user}/stats`)
    Stats,
    /// Games archive or export
    Games,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Profile => "profile",
            Dataset::Stats => "stats",
            Dataset::Games => "games",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "profile" | "user" => Ok(Dataset::Profile),
            "stats" => Ok(Dataset::Stats),
            "games" | "archive" => Ok(Dataset::Games),
            other => Err(Error::InvalidInput(format!("Unknown dataset: {}", other))),
        }
    }
}

/// Serialization of the raw payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    Json,
    /// Newline-delimited JSON (Lichess game export)
    Ndjson,
    Pgn,
}

impl PayloadFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadFormat::Json => "json",
            PayloadFormat::Ndjson => "ndjson",
            PayloadFormat::Pgn => "pgn",
        }
    }

    /// Guess the format from the payload text
    ///
    /// PGN starts with a tag pair; NDJSON has more than one top-level object
    /// line; anything else starting with `{` or `[` is JSON.
    pub fn detect(payload: &str) -> Option<Self> {
        let trimmed = payload.trim_start_matches('\u{feff}').trim();
        if trimmed.starts_with('[') && trimmed.contains("[Event ") {
            return Some(PayloadFormat::Pgn);
        }
        if trimmed.starts_with('{') {
            let object_lines = trimmed
                .lines()
                .filter(|l| l.trim_start().starts_with('{'))
                .count();
            let all_lines = trimmed.lines().filter(|l| !l.trim().is_empty()).count();
            if object_lines > 1 && object_lines == all_lines {
                return Some(PayloadFormat::Ndjson);
            }
            return Some(PayloadFormat::Json);
        }
        if trimmed.starts_with('[') {
            return Some(PayloadFormat::Json);
        }
        None
    }

    /// Format implied by a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(PayloadFormat::Json),
            "ndjson" | "jsonl" => Some(PayloadFormat::Ndjson),
            "pgn" => Some(PayloadFormat::Pgn),
            _ => None,
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PayloadFormat::from_extension(s.trim())
            .ok_or_else(|| Error::InvalidInput(format!("Unknown payload format: {}", s)))
    }
}

/// A payload waiting to be landed
#[derive(Debug, Clone)]
pub struct LandingRequest {
    pub platform: Platform,
    pub dataset: Dataset,
    pub username: String,
    /// Detected from the payload when `None`
    pub format: Option<PayloadFormat>,
    /// Where the payload came from (API URL or local file)
    pub source_uri: Option<String>,
    pub payload: String,
}

/// Manifest entry for a landed payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BronzeRecord {
    pub record_id: Uuid,
    pub platform: Platform,
    pub dataset: Dataset,
    /// Lowercased account name
    pub username: String,
    pub format: PayloadFormat,
    pub source_uri: Option<String>,
    pub content_sha256: String,
    pub byte_len: i64,
    pub ingested_at: DateTime<Utc>,
    /// Path of the envelope relative to the landing zone root
    pub landing_path: String,
}

/// Result of a landing attempt
#[derive(Debug, Clone)]
pub enum LandingOutcome {
    /// Written to the landing zone and recorded
    Landed(BronzeRecord),
    /// Identical content for the same account and dataset was landed before
    AlreadyLanded(BronzeRecord),
}

impl LandingOutcome {
    pub fn record(&self) -> &BronzeRecord {
        match self {
            LandingOutcome::Landed(r) | LandingOutcome::AlreadyLanded(r) => r,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, LandingOutcome::Landed(_))
    }
}
