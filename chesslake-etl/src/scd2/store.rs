//! `silver_player_rating` storage

use super::{plan_merge, MergeReport, PlannedVersion};
use crate::bronze::manifest::{self, Stage};
use crate::models::{RatingAttributes, RatingSnapshot, RatingVersion};
use crate::silver::Consumed;
use crate::utils::{begin_monitored, retry_on_lock};
use chesslake_common::{time, Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;

const VERSION_COLUMNS: &str = "surrogate_key, player_key, player_username, platform, \
     rating_blitz, rating_rapid, rating_bullet, rating_classical, games_played, wins, losses, draws, \
     win_rate, record_hash, valid_from, valid_to, is_current, ingested_at, source_record_id";

pub(super) fn row_to_version(row: &SqliteRow) -> Result<RatingVersion> {
    let platform: String = row.get("platform");
    let valid_from: String = row.get("valid_from");
    let valid_to: Option<String> = row.get("valid_to");
    let ingested_at: String = row.get("ingested_at");
    let source_record_id: Option<String> = row.get("source_record_id");

    Ok(RatingVersion {
        surrogate_key: row.get("surrogate_key"),
        player_key: row.get("player_key"),
        player_username: row.get("player_username"),
        platform: platform.parse()?,
        attributes: RatingAttributes {
            rating_blitz: row.get("rating_blitz"),
            rating_rapid: row.get("rating_rapid"),
            rating_bullet: row.get("rating_bullet"),
            rating_classical: row.get("rating_classical"),
            games_played: row.get("games_played"),
            wins: row.get("wins"),
            losses: row.get("losses"),
            draws: row.get("draws"),
        },
        win_rate: row.get("win_rate"),
        record_hash: row.get("record_hash"),
        valid_from: time::from_db(&valid_from)?,
        valid_to: valid_to.as_deref().map(time::from_db).transpose()?,
        is_current: row.get("is_current"),
        ingested_at: time::from_db(&ingested_at)?,
        source_record_id: source_record_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))?,
    })
}

async fn fetch_current(conn: &mut SqliteConnection, player_key: &str) -> Result<Option<RatingVersion>> {
    let sql = format!(
        "SELECT {} FROM silver_player_rating WHERE player_key = ? AND is_current = 1",
        VERSION_COLUMNS
    );
    let row = sqlx::query(&sql).bind(player_key).fetch_optional(conn).await?;
    row.as_ref().map(row_to_version).transpose()
}

/// Merge snapshots into the rating history
pub async fn merge(pool: &SqlitePool, snapshots: &[RatingSnapshot], max_lock_wait_ms: u64) -> Result<MergeReport> {
    merge_consuming(pool, snapshots, &[], max_lock_wait_ms).await
}

/// Merge snapshots and mark their bronze records consumed, atomically
pub async fn merge_consuming(
    pool: &SqlitePool,
    snapshots: &[RatingSnapshot],
    consumed: &[Consumed],
    max_lock_wait_ms: u64,
) -> Result<MergeReport> {
    retry_on_lock("scd2 merge", max_lock_wait_ms, || {
        apply_merge(pool, snapshots, consumed)
    })
    .await
}

/// **Algorithm:**
/// 1. Load the current version of every player in the batch
/// 2. Plan the merge
/// 3. Close replaced current versions (`valid_to`, `is_current` only)
/// 4. Insert planned versions; the one-current-per-player index rejects
///    anything that would leave two current rows
/// 5. Mark consumed bronze records, commit
async fn apply_merge(
    pool: &SqlitePool,
    snapshots: &[RatingSnapshot],
    consumed: &[Consumed],
) -> Result<MergeReport> {
    let mut tx = begin_monitored(pool, "scd2::merge").await?;

    let player_keys: BTreeSet<&str> = snapshots.iter().map(|s| s.player_key.as_str()).collect();
    let mut current = Vec::with_capacity(player_keys.len());
    for key in player_keys {
        if let Some(version) = fetch_current(tx.conn(), key).await? {
            current.push(version);
        }
    }

    let plan = plan_merge(&current, snapshots);
    let ingested_at = time::now();

    for close in &plan.closes {
        let result = sqlx::query(
            "UPDATE silver_player_rating SET valid_to = ?, is_current = 0
             WHERE surrogate_key = ? AND is_current = 1",
        )
        .bind(time::to_db(&close.valid_to))
        .bind(close.surrogate_key)
        .execute(tx.conn())
        .await?;

        if result.rows_affected() != 1 {
            return Err(Error::Integrity(format!(
                "Current version {} of {} changed during merge",
                close.surrogate_key, close.player_key
            )));
        }
        debug!(
            player_key = %close.player_key,
            surrogate_key = close.surrogate_key,
            valid_to = %close.valid_to,
            "Closed rating version"
        );
    }

    for version in &plan.inserts {
        insert_version(tx.conn(), version, ingested_at).await?;
    }

    for record in consumed {
        manifest::mark_processed(tx.conn(), record.record_id, Stage::Ratings, record.outcome).await?;
    }

    tx.commit().await?;

    let report = plan.report();
    if report.versions_inserted > 0 {
        info!(
            inserted = report.versions_inserted,
            closed = report.versions_closed,
            "Rating history updated"
        );
    }
    Ok(report)
}

async fn insert_version(
    conn: &mut SqliteConnection,
    version: &PlannedVersion,
    ingested_at: DateTime<Utc>,
) -> Result<()> {
    let snapshot = &version.snapshot;
    let attrs = &snapshot.attributes;

    sqlx::query(
        r#"
        INSERT INTO silver_player_rating (
            player_key, player_username, platform,
            rating_blitz, rating_rapid, rating_bullet, rating_classical,
            games_played, wins, losses, draws, win_rate, record_hash,
            valid_from, valid_to, is_current, ingested_at, source_record_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&snapshot.player_key)
    .bind(&snapshot.player_username)
    .bind(snapshot.platform.as_str())
    .bind(attrs.rating_blitz)
    .bind(attrs.rating_rapid)
    .bind(attrs.rating_bullet)
    .bind(attrs.rating_classical)
    .bind(attrs.games_played)
    .bind(attrs.wins)
    .bind(attrs.losses)
    .bind(attrs.draws)
    .bind(attrs.win_rate())
    .bind(&version.record_hash)
    .bind(time::to_db(&version.valid_from))
    .bind(version.valid_to.as_ref().map(time::to_db))
    .bind(version.is_current())
    .bind(time::to_db(&ingested_at))
    .bind(snapshot.source_record_id.map(|id| id.to_string()))
    .execute(conn)
    .await?;

    Ok(())
}

/// Current version of a player
pub async fn current(pool: &SqlitePool, player_key: &str) -> Result<Option<RatingVersion>> {
    let mut conn = pool.acquire().await?;
    fetch_current(&mut *conn, player_key).await
}

/// Current version of every player, by player key
pub async fn current_all(pool: &SqlitePool) -> Result<Vec<RatingVersion>> {
    let sql = format!(
        "SELECT {} FROM silver_player_rating WHERE is_current = 1 ORDER BY player_key",
        VERSION_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(row_to_version).collect()
}

/// Every version of a player, oldest first
pub async fn history(pool: &SqlitePool, player_key: &str) -> Result<Vec<RatingVersion>> {
    let sql = format!(
        "SELECT {} FROM silver_player_rating WHERE player_key = ?
         ORDER BY valid_from, surrogate_key",
        VERSION_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(player_key).fetch_all(pool).await?;
    rows.iter().map(row_to_version).collect()
}

/// The version valid at `at`: `valid_from <= at < valid_to`
///
/// Empty intervals never contain a point, so at most one version matches.
pub async fn as_of(pool: &SqlitePool, player_key: &str, at: DateTime<Utc>) -> Result<Option<RatingVersion>> {
    let at = time::to_db(&at);
    let sql = format!(
        "SELECT {} FROM silver_player_rating
         WHERE player_key = ? AND valid_from <= ? AND (valid_to IS NULL OR valid_to > ?)
         ORDER BY valid_from DESC, surrogate_key DESC
         LIMIT 1",
        VERSION_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(player_key)
        .bind(&at)
        .bind(&at)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_version).transpose()
}

/// Every row, grouped by player and ordered by validity
pub(super) async fn all_versions(pool: &SqlitePool) -> Result<Vec<RatingVersion>> {
    let sql = format!(
        "SELECT {} FROM silver_player_rating ORDER BY player_key, valid_from, surrogate_key",
        VERSION_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(row_to_version).collect()
}
