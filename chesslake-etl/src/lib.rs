//! chesslake ETL library
//!
//! Medallion pipeline over chess platform data:
//! - [`bronze`]: immutable landing zone and manifest
//! - [`pgn`] and [`sources`]: payload decoding
//! - [`silver`]: cleansed games, quarantine, rating snapshots
//! - [`scd2`]: versioned rating history
//! - [`gold`]: per-player fact table and analytics queries
//! - [`pipeline`]: ordered, incremental runs

pub mod bronze;
pub mod gold;
pub mod models;
pub mod pgn;
pub mod pipeline;
pub mod scd2;
pub mod silver;
pub mod sources;
pub mod utils;

use bronze::LandingZone;
use chesslake_common::config::{DataRoot, DatabaseConfig};
use chesslake_common::db::init_database;
use chesslake_common::Result;
use sqlx::SqlitePool;
use tracing::info;

/// An opened data root: database pool plus landing zone
#[derive(Debug, Clone)]
pub struct Lake {
    pub pool: SqlitePool,
    pub zone: LandingZone,
}

/// Create the data root if needed, then open the database and landing zone
pub async fn open_lake(data_root: &DataRoot, db_config: &DatabaseConfig) -> Result<Lake> {
    data_root.ensure_directory_exists()?;

    let db_path = data_root.database_path();
    info!("Database: {}", db_path.display());
    let pool = init_database(&db_path, db_config).await?;

    let zone = LandingZone::new(data_root.bronze_dir());
    info!("Landing zone: {}", zone.root().display());

    Ok(Lake { pool, zone })
}
