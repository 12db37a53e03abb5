//! Player rating snapshots and SCD2 versions

use chesslake_common::hash::hash_fields;
use chesslake_common::{player_key, Platform};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tracked attributes of a rating version
///
/// Two snapshots with equal attributes are the same version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingAttributes {
    pub rating_blitz: Option<i64>,
    pub rating_rapid: Option<i64>,
    pub rating_bullet: Option<i64>,
    pub rating_classical: Option<i64>,
    pub games_played: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
}

impl RatingAttributes {
    /// SHA-256 of the attributes joined by `|`; missing ratings hash as ""
    pub fn record_hash(&self) -> String {
        let fmt = |v: Option<i64>| v.map(|v| v.to_string());
        hash_fields([
            fmt(self.rating_blitz),
            fmt(self.rating_rapid),
            fmt(self.rating_bullet),
            fmt(self.rating_classical),
            Some(self.games_played.to_string()),
            Some(self.wins.to_string()),
            Some(self.losses.to_string()),
            Some(self.draws.to_string()),
        ])
    }

    /// Percentage of games won; 0 when no games were played
    pub fn win_rate(&self) -> f64 {
        if self.games_played > 0 {
            self.wins as f64 / self.games_played as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// One observation of a player's ratings, before SCD2 merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSnapshot {
    pub player_key: String,
    /// Username as the platform reported it
    pub player_username: String,
    pub platform: Platform,
    pub attributes: RatingAttributes,
    pub observed_at: DateTime<Utc>,
    /// Ingestion order; breaks ties between equal `observed_at`
    pub sequence: i64,
    pub source_record_id: Option<Uuid>,
}

impl RatingSnapshot {
    pub fn new(
        platform: Platform,
        username: &str,
        attributes: RatingAttributes,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            player_key: player_key(username, platform),
            player_username: username.trim().to_string(),
            platform,
            attributes,
            observed_at,
            sequence: 0,
            source_record_id: None,
        }
    }

    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_source(mut self, record_id: Uuid) -> Self {
        self.source_record_id = Some(record_id);
        self
    }

    pub fn record_hash(&self) -> String {
        self.attributes.record_hash()
    }
}

/// A row of `silver_player_rating`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingVersion {
    pub surrogate_key: i64,
    pub player_key: String,
    pub player_username: String,
    pub platform: Platform,
    pub attributes: RatingAttributes,
    pub win_rate: f64,
    pub record_hash: String,
    pub valid_from: DateTime<Utc>,
    /// `None` exactly when current
    pub valid_to: Option<DateTime<Utc>>,
    pub is_current: bool,
    pub ingested_at: DateTime<Utc>,
    pub source_record_id: Option<Uuid>,
}

impl RatingVersion {
    /// Whether `at` falls inside `[valid_from, valid_to)`
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && self.valid_to.map_or(true, |to| at < to)
    }
}
