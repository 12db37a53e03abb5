//! Test Helper Utilities
//!
//! Shared utilities for chesslake-etl integration tests
#![allow(dead_code)]

use chesslake_common::config::{DataRoot, DatabaseConfig};
use chesslake_common::{time, Platform, TrackedPlayers};
use chesslake_etl::bronze::{land_at, Dataset, LandingOutcome, LandingRequest};
use chesslake_etl::{open_lake, Lake};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tempfile::TempDir;

/// Throwaway data root with its database and landing zone
///
/// The TempDir must be kept alive for the duration of the test.
pub struct TestLake {
    pub dir: TempDir,
    pub lake: Lake,
}

impl TestLake {
    pub fn pool(&self) -> &SqlitePool {
        &self.lake.pool
    }
}

pub async fn create_test_lake() -> TestLake {
    let dir = TempDir::new().unwrap();
    let data_root = DataRoot::new(dir.path().join("lake"));
    let lake = open_lake(&data_root, &DatabaseConfig::default()).await.unwrap();
    TestLake { dir, lake }
}

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative)).unwrap()
}

pub fn tracked_players() -> TrackedPlayers {
    TrackedPlayers::load(&fixture_path("players.yaml")).unwrap()
}

/// Fixed instant offset from 2024-05-01T00:00:00Z
pub fn at(secs: i64) -> DateTime<Utc> {
    time::from_unix_seconds(1_714_521_600 + secs).unwrap()
}

pub fn request(platform: Platform, dataset: Dataset, username: &str, payload: &str) -> LandingRequest {
    LandingRequest {
        platform,
        dataset,
        username: username.to_string(),
        format: None,
        source_uri: None,
        payload: payload.to_string(),
    }
}

/// Land a payload at a fixed ingestion time
pub async fn land_fixture_at(
    lake: &Lake,
    platform: Platform,
    dataset: Dataset,
    username: &str,
    payload: &str,
    ingested_at: DateTime<Utc>,
) -> LandingOutcome {
    land_at(
        &lake.pool,
        &lake.zone,
        request(platform, dataset, username, payload),
        ingested_at,
    )
    .await
    .unwrap()
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
