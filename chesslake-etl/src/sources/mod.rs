//! Platform payload decoding
//!
//! Typed models of the Chess.com Published Data API and Lichess API response
//! shapes, and their conversion into [`GameRow`]s and [`RatingSnapshot`]s.
//! Payloads are read from bronze; nothing here performs HTTP.

pub mod chesscom;
pub mod lichess;
pub mod pgn_game;

use crate::bronze::{BronzeRecord, Dataset, PayloadFormat};
use crate::models::{GameRow, RatingSnapshot};
use chesslake_common::{Error, Platform, Result};

/// Outcome of decoding one game inside a payload
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedGame {
    Row(Box<GameRow>),
    /// Valid but out of scope (e.g. a chess variant)
    Skipped { reference: String, reason: String },
    /// Could not be turned into a row; quarantined with the raw text
    Malformed {
        game_id: Option<String>,
        reason: String,
        raw: String,
    },
}

impl DecodedGame {
    pub fn row(row: GameRow) -> Self {
        DecodedGame::Row(Box::new(row))
    }
}

/// Decode every game in a `games` record
///
/// A payload that cannot be read as a whole (e.g. invalid JSON) is an error;
/// individual bad games are returned as [`DecodedGame::Malformed`].
pub fn decode_games(record: &BronzeRecord, payload: &str) -> Result<Vec<DecodedGame>> {
    if record.dataset != Dataset::Games {
        return Err(Error::InvalidInput(format!(
            "Record {} is a {} record, not games",
            record.record_id, record.dataset
        )));
    }

    match (record.platform, record.format) {
        (platform, PayloadFormat::Pgn) => pgn_game::decode_document(platform, payload, record.record_id),
        (Platform::Chesscom, PayloadFormat::Json) => chesscom::decode_archive(payload, record.record_id),
        (Platform::Chesscom, PayloadFormat::Ndjson) => {
            Ok(decode_lines(payload, |line| chesscom::decode_game_json(line, record.record_id)))
        }
        (Platform::Lichess, PayloadFormat::Ndjson) => Ok(lichess::decode_ndjson(payload, record.record_id)),
        (Platform::Lichess, PayloadFormat::Json) => lichess::decode_json(payload, record.record_id),
    }
}

/// Rating snapshot carried by a `stats`/`profile` record, if any
///
/// `observed_at` is the date the payload reports for its ratings where it has
/// one (Chess.com stats), otherwise the record's ingestion time.
pub fn decode_snapshot(record: &BronzeRecord, payload: &str) -> Result<Option<RatingSnapshot>> {
    if record.format != PayloadFormat::Json {
        return Err(Error::InvalidInput(format!(
            "{} {} record {} must be JSON, found {}",
            record.platform, record.dataset, record.record_id, record.format
        )));
    }

    let snapshot = match (record.platform, record.dataset) {
        (Platform::Chesscom, Dataset::Stats) => Some(chesscom::snapshot_from_stats(
            payload,
            &record.username,
            record.ingested_at,
        )?),
        (Platform::Chesscom, Dataset::Profile) => {
            // Profiles carry identity only; parse to validate the payload
            let profile = chesscom::parse_profile(payload)?;
            tracing::debug!(
                record_id = %record.record_id,
                username = profile.username.as_deref().unwrap_or(&record.username),
                "Chess.com profile carries no ratings"
            );
            None
        }
        (Platform::Lichess, Dataset::Stats | Dataset::Profile) => Some(lichess::snapshot_from_user(
            payload,
            &record.username,
            record.ingested_at,
        )?),
        (_, Dataset::Games) => {
            return Err(Error::InvalidInput(format!(
                "Record {} is a games record, not ratings",
                record.record_id
            )))
        }
    };

    Ok(snapshot.map(|s| s.with_source(record.record_id)))
}

/// Decode a newline-delimited document one line at a time
pub(crate) fn decode_lines<F>(payload: &str, mut decode: F) -> Vec<DecodedGame>
where
    F: FnMut(&str) -> DecodedGame,
{
    payload
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| decode(line))
        .collect()
}

/// Last path segment of a URL, without query or fragment
pub(crate) fn url_id(url: &str) -> Option<String> {
    let url = url.trim();
    if !url.contains("://") {
        return None;
    }
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let (_, after_scheme) = path.split_once("://")?;
    let mut segments = after_scheme.trim_end_matches('/').split('/');
    segments.next()?; // host
    segments.last().filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_id() {
        assert_eq!(url_id("https://www.chess.com/game/live/108866"), Some("108866".to_string()));
        assert_eq!(url_id("https://lichess.org/q7ZvsdUF/"), Some("q7ZvsdUF".to_string()));
        assert_eq!(url_id("https://lichess.org/q7ZvsdUF?ref=x#12"), Some("q7ZvsdUF".to_string()));
        assert_eq!(url_id("https://lichess.org"), None);
        assert_eq!(url_id("Chess.com"), None);
    }

    #[test]
    fn test_decode_lines_skips_blank_lines() {
        let decoded = decode_lines("a\n\n  \nb\n", |line| DecodedGame::Skipped {
            reference: line.to_string(),
            reason: "test".to_string(),
        });
        assert_eq!(decoded.len(), 2);
    }
}
