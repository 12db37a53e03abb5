//! Database schema migrations
//!
//! Versioned changes applied after the base tables exist. Every migration is
//! idempotent (`IF NOT EXISTS`), so re-running against a partially migrated
//! database is safe.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field already recorded them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Prefer ALTER TABLE / CREATE INDEX** over DROP/CREATE to preserve data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    Ok(())
}

/// Migration v1: lookup indexes
///
/// Includes the partial unique index that allows a single current rating
/// version per player.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: lookup indexes");

    let statements = [
        "CREATE INDEX IF NOT EXISTS idx_bronze_records_dataset
            ON bronze_records (platform, dataset, ingested_at)",
        "CREATE INDEX IF NOT EXISTS idx_silver_games_source
            ON silver_games (source_record_id)",
        "CREATE INDEX IF NOT EXISTS idx_silver_games_players
            ON silver_games (platform, white, black)",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_player_rating_one_current
            ON silver_player_rating (player_key) WHERE is_current = 1",
        "CREATE INDEX IF NOT EXISTS idx_player_rating_history
            ON silver_player_rating (player_key, valid_from)",
        "CREATE INDEX IF NOT EXISTS idx_fact_games_opening
            ON gold_fact_games (opening_name, result)",
    ];

    for sql in statements {
        sqlx::query(sql).execute(pool).await?;
    }

    Ok(())
}

/// Migration v2: immutability triggers
///
/// Bronze manifest rows are write-once. Closed rating versions are write-once,
/// and a current version may only change its `valid_to` / `is_current`.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: immutability triggers");

    let statements = [
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_bronze_records_no_update
        BEFORE UPDATE ON bronze_records
        BEGIN
            SELECT RAISE(ABORT, 'bronze records are immutable');
        END
        "#,
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_bronze_records_no_delete
        BEFORE DELETE ON bronze_records
        BEGIN
            SELECT RAISE(ABORT, 'bronze records are immutable');
        END
        "#,
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_player_rating_closed_immutable
        BEFORE UPDATE ON silver_player_rating
        WHEN OLD.is_current = 0
            OR NEW.record_hash IS NOT OLD.record_hash
            OR NEW.valid_from IS NOT OLD.valid_from
            OR NEW.player_key IS NOT OLD.player_key
        BEGIN
            SELECT RAISE(ABORT, 'closed rating versions are immutable');
        END
        "#,
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_player_rating_no_delete
        BEFORE DELETE ON silver_player_rating
        BEGIN
            SELECT RAISE(ABORT, 'rating history cannot be deleted');
        END
        "#,
    ];

    for sql in statements {
        sqlx::query(sql).execute(pool).await?;
    }

    Ok(())
}
