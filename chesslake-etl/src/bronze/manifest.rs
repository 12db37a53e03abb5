//! `bronze_records` manifest and silver consumption tracking

use super::{BronzeRecord, Dataset, PayloadFormat};
use chesslake_common::{time, Error, Platform, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

const RECORD_COLUMNS: &str = "record_id, platform, dataset, username, format, source_uri, \
     content_sha256, byte_len, ingested_at, landing_path";

/// Silver stages that consume bronze records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Games,
    Ratings,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Games => "silver_games",
            Stage::Ratings => "silver_ratings",
        }
    }

    /// Datasets this stage reads
    pub fn datasets(&self) -> &'static [Dataset] {
        match self {
            Stage::Games => &[Dataset::Games],
            Stage::Ratings => &[Dataset::Stats, Dataset::Profile],
        }
    }
}

fn row_to_record(row: &SqliteRow) -> Result<BronzeRecord> {
    let record_id: String = row.get("record_id");
    let platform: String = row.get("platform");
    let dataset: String = row.get("dataset");
    let format: String = row.get("format");
    let ingested_at: String = row.get("ingested_at");

    Ok(BronzeRecord {
        record_id: Uuid::parse_str(&record_id)
            .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))?,
        platform: platform.parse()?,
        dataset: dataset.parse()?,
        username: row.get("username"),
        format: format.parse::<PayloadFormat>()?,
        source_uri: row.get("source_uri"),
        content_sha256: row.get("content_sha256"),
        byte_len: row.get("byte_len"),
        ingested_at: time::from_db(&ingested_at)?,
        landing_path: row.get("landing_path"),
    })
}

/// Look up a previous landing of identical content
pub async fn find_by_content(
    pool: &SqlitePool,
    platform: Platform,
    dataset: Dataset,
    username: &str,
    content_sha256: &str,
) -> Result<Option<BronzeRecord>> {
    let sql = format!(
        "SELECT {} FROM bronze_records
         WHERE platform = ? AND dataset = ? AND username = ? AND content_sha256 = ?",
        RECORD_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(platform.as_str())
        .bind(dataset.as_str())
        .bind(username)
        .bind(content_sha256)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_record).transpose()
}

pub async fn insert(pool: &SqlitePool, record: &BronzeRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO bronze_records (
            record_id, platform, dataset, username, format, source_uri,
            content_sha256, byte_len, ingested_at, landing_path
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.record_id.to_string())
    .bind(record.platform.as_str())
    .bind(record.dataset.as_str())
    .bind(&record.username)
    .bind(record.format.as_str())
    .bind(&record.source_uri)
    .bind(&record.content_sha256)
    .bind(record.byte_len)
    .bind(time::to_db(&record.ingested_at))
    .bind(&record.landing_path)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get(pool: &SqlitePool, record_id: Uuid) -> Result<BronzeRecord> {
    let sql = format!("SELECT {} FROM bronze_records WHERE record_id = ?", RECORD_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(record_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("bronze record {}", record_id)))?;

    row_to_record(&row)
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bronze_records")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Records the stage has not consumed yet, oldest first
///
/// Ordering by `(ingested_at, rowid)` follows landing order.
pub async fn unprocessed(pool: &SqlitePool, stage: Stage) -> Result<Vec<BronzeRecord>> {
    let datasets = stage.datasets();
    let placeholders = vec!["?"; datasets.len()].join(", ");
    let sql = format!(
        "SELECT {} FROM bronze_records b
         WHERE b.dataset IN ({})
           AND NOT EXISTS (
               SELECT 1 FROM silver_progress p
               WHERE p.record_id = b.record_id AND p.stage = ?
           )
         ORDER BY b.ingested_at, b.rowid",
        RECORD_COLUMNS, placeholders
    );

    let mut query = sqlx::query(&sql);
    for dataset in datasets {
        query = query.bind(dataset.as_str());
    }
    let rows = query.bind(stage.as_str()).fetch_all(pool).await?;

    rows.iter().map(row_to_record).collect()
}

/// Mark a record consumed by a stage, inside the caller's transaction
pub async fn mark_processed(
    conn: &mut SqliteConnection,
    record_id: Uuid,
    stage: Stage,
    outcome: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO silver_progress (record_id, stage, outcome, processed_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(record_id, stage) DO UPDATE SET
            outcome = excluded.outcome,
            processed_at = excluded.processed_at
        "#,
    )
    .bind(record_id.to_string())
    .bind(stage.as_str())
    .bind(outcome)
    .bind(time::to_db(&time::now()))
    .execute(conn)
    .await?;

    Ok(())
}
