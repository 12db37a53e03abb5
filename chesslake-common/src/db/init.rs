//! Database initialization
//!
//! Opens (or creates) the SQLite file and brings every medallion table up to
//! date. Table creation is idempotent; secondary indexes and triggers are
//! applied through versioned migrations afterwards.

use crate::config::DatabaseConfig;
use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path, config: &DatabaseConfig) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL allows readers alongside the single writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    // Short busy timeout; longer waits are handled by retry_on_lock backoff
    let pragma_sql = format!("PRAGMA busy_timeout = {}", config.busy_timeout_ms);
    sqlx::query(&pragma_sql)
        .execute(&pool)
        .await?;

    create_schema_version_table(&pool).await?;

    // Bronze
    create_bronze_records_table(&pool).await?;

    // Silver
    create_silver_progress_table(&pool).await?;
    create_silver_games_table(&pool).await?;
    create_silver_quarantine_table(&pool).await?;
    create_silver_player_rating_table(&pool).await?;

    // Gold
    create_gold_fact_games_table(&pool).await?;

    create_pipeline_runs_table(&pool).await?;

    crate::db::migrations::run_migrations(&pool).await?;

    info!("Database busy timeout set to {} ms", config.busy_timeout_ms);

    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Manifest of landed raw payloads
///
/// One row per landing; the same bytes for the same account and dataset land once.
pub async fn create_bronze_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bronze_records (
            record_id TEXT PRIMARY KEY,
            platform TEXT NOT NULL CHECK (platform IN ('chesscom', 'lichess')),
            dataset TEXT NOT NULL CHECK (dataset IN ('profile', 'stats', 'games')),
            username TEXT NOT NULL,
            format TEXT NOT NULL CHECK (format IN ('json', 'ndjson', 'pgn')),
            source_uri TEXT,
            content_sha256 TEXT NOT NULL,
            byte_len INTEGER NOT NULL,
            ingested_at TEXT NOT NULL,
            landing_path TEXT NOT NULL,
            UNIQUE (platform, dataset, username, content_sha256)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Which bronze records each silver stage has consumed
pub async fn create_silver_progress_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS silver_progress (
            record_id TEXT NOT NULL REFERENCES bronze_records(record_id),
            stage TEXT NOT NULL,
            outcome TEXT NOT NULL,
            processed_at TEXT NOT NULL,
            PRIMARY KEY (record_id, stage)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Cleansed games, unique by platform-qualified game id
pub async fn create_silver_games_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS silver_games (
            game_id TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            white TEXT NOT NULL,
            black TEXT NOT NULL,
            white_rating INTEGER,
            black_rating INTEGER,
            result TEXT NOT NULL,
            termination TEXT,
            time_control TEXT,
            time_class TEXT NOT NULL,
            rated INTEGER,
            eco TEXT,
            opening_name TEXT,
            moves TEXT NOT NULL,
            ply_count INTEGER NOT NULL,
            started_at TEXT,
            ended_at TEXT,
            white_accuracy REAL,
            black_accuracy REAL,
            source_record_id TEXT NOT NULL REFERENCES bronze_records(record_id),
            row_hash TEXT NOT NULL,
            loaded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Game rows that failed an error-severity quality check
pub async fn create_silver_quarantine_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS silver_quarantine (
            quarantine_id INTEGER PRIMARY KEY AUTOINCREMENT,
            game_id TEXT,
            source_record_id TEXT NOT NULL REFERENCES bronze_records(record_id),
            issues TEXT NOT NULL,
            row_json TEXT NOT NULL,
            quarantined_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// SCD Type 2 rating dimension
///
/// `valid_to` is NULL exactly when the row is current; the partial unique
/// index added in migration v1 allows one current row per player.
pub async fn create_silver_player_rating_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS silver_player_rating (
            surrogate_key INTEGER PRIMARY KEY AUTOINCREMENT,
            player_key TEXT NOT NULL,
            player_username TEXT NOT NULL,
            platform TEXT NOT NULL,
            rating_blitz INTEGER,
            rating_rapid INTEGER,
            rating_bullet INTEGER,
            rating_classical INTEGER,
            games_played INTEGER NOT NULL,
            wins INTEGER NOT NULL,
            losses INTEGER NOT NULL,
            draws INTEGER NOT NULL,
            win_rate REAL NOT NULL,
            record_hash TEXT NOT NULL,
            valid_from TEXT NOT NULL,
            valid_to TEXT,
            is_current INTEGER NOT NULL,
            ingested_at TEXT NOT NULL,
            source_record_id TEXT,
            CHECK ((is_current = 1 AND valid_to IS NULL) OR (is_current = 0 AND valid_to IS NOT NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per (game, tracked player)
pub async fn create_gold_fact_games_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gold_fact_games (
            game_id TEXT NOT NULL,
            player_key TEXT NOT NULL,
            platform TEXT NOT NULL,
            color TEXT NOT NULL CHECK (color IN ('white', 'black')),
            opponent TEXT NOT NULL,
            result TEXT NOT NULL CHECK (result IN ('win', 'loss', 'draw', 'unknown')),
            my_rating INTEGER,
            opponent_rating INTEGER,
            accuracy REAL,
            time_class TEXT NOT NULL,
            opening_name TEXT,
            eco TEXT,
            game_end_time TEXT,
            PRIMARY KEY (game_id, player_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_pipeline_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_runs (
            run_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            status TEXT NOT NULL,
            summary TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
