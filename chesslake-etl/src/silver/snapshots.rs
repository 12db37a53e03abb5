//! Rating snapshot extraction
//!
//! Unprocessed `stats`/`profile` records become [`RatingSnapshot`]s in
//! landing order. The records are marked consumed by the SCD2 merge, in the
//! same transaction that applies the snapshots.

use crate::bronze::manifest::{self, Stage};
use crate::bronze::{read_payload, LandingZone};
use crate::models::RatingSnapshot;
use crate::scd2::{self, MergeReport};
use chesslake_common::Result;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A bronze record the ratings stage has finished with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumed {
    pub record_id: Uuid,
    /// `snapshot`, `no_ratings` or `rejected`
    pub outcome: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotBatch {
    /// Ordered by landing; `sequence` is the position in this batch
    pub snapshots: Vec<RatingSnapshot>,
    pub consumed: Vec<Consumed>,
}

/// Decode every unprocessed ratings record
///
/// A payload that fails to decode is consumed as `rejected` so it is not
/// retried forever; a payload that fails its hash check stops the stage.
pub async fn extract_snapshots(pool: &SqlitePool, zone: &LandingZone) -> Result<SnapshotBatch> {
    let records = manifest::unprocessed(pool, Stage::Ratings).await?;
    let mut batch = SnapshotBatch::default();

    for record in &records {
        let payload = read_payload(zone, record)?;

        let outcome = match crate::sources::decode_snapshot(record, &payload) {
            Ok(Some(snapshot)) => {
                let sequence = batch.snapshots.len() as i64;
                debug!(
                    record_id = %record.record_id,
                    player_key = %snapshot.player_key,
                    sequence,
                    "Extracted rating snapshot"
                );
                batch.snapshots.push(snapshot.with_sequence(sequence));
                "snapshot"
            }
            Ok(None) => "no_ratings",
            Err(e) => {
                warn!(
                    record_id = %record.record_id,
                    platform = %record.platform,
                    dataset = %record.dataset,
                    error = %e,
                    "Rating payload rejected"
                );
                "rejected"
            }
        };

        batch.consumed.push(Consumed {
            record_id: record.record_id,
            outcome,
        });
    }

    Ok(batch)
}

/// Extract snapshots and merge them into `silver_player_rating`
pub async fn update_ratings(
    pool: &SqlitePool,
    zone: &LandingZone,
    max_lock_wait_ms: u64,
) -> Result<MergeReport> {
    let batch = extract_snapshots(pool, zone).await?;

    if batch.consumed.is_empty() {
        debug!("No unprocessed rating records");
        return Ok(MergeReport::default());
    }

    let report = scd2::merge_consuming(pool, &batch.snapshots, &batch.consumed, max_lock_wait_ms).await?;

    info!(
        records = batch.consumed.len(),
        snapshots = report.snapshots,
        new_players = report.new_players,
        changed = report.changed,
        unchanged = report.unchanged,
        stale = report.stale,
        "Silver ratings complete"
    );

    Ok(report)
}
