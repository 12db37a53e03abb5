//! Database initialization tests

use chesslake_common::config::DatabaseConfig;
use chesslake_common::db::init::init_database;
use chesslake_common::db::migrations::{get_schema_version, CURRENT_SCHEMA_VERSION};

async fn table_exists(pool: &sqlx::SqlitePool, name: &str) -> bool {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("chesslake.db");

    let pool = init_database(&db_path, &DatabaseConfig::default()).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_all_layers_created() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("c.db"), &DatabaseConfig::default())
        .await
        .unwrap();

    for table in [
        "bronze_records",
        "silver_progress",
        "silver_games",
        "silver_quarantine",
        "silver_player_rating",
        "gold_fact_games",
        "pipeline_runs",
    ] {
        assert!(table_exists(&pool, table).await, "missing table {}", table);
    }

    assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_reopen_existing_database_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("c.db");

    let pool1 = init_database(&db_path, &DatabaseConfig::default()).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path, &DatabaseConfig::default()).await.unwrap();
    let versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(versions, CURRENT_SCHEMA_VERSION as i64);
}

#[tokio::test]
async fn test_one_current_rating_row_enforced_by_index() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("c.db"), &DatabaseConfig::default())
        .await
        .unwrap();

    let insert = r#"
        INSERT INTO silver_player_rating (
            player_key, player_username, platform, games_played, wins, losses, draws,
            win_rate, record_hash, valid_from, valid_to, is_current, ingested_at
        ) VALUES ('alice_lichess', 'alice', 'lichess', 0, 0, 0, 0, 0.0, ?, ?, NULL, 1, ?)
    "#;

    sqlx::query(insert)
        .bind("h1")
        .bind("2024-01-01T00:00:00.000000Z")
        .bind("2024-01-01T00:00:00.000000Z")
        .execute(&pool)
        .await
        .unwrap();

    let second = sqlx::query(insert)
        .bind("h2")
        .bind("2024-02-01T00:00:00.000000Z")
        .bind("2024-02-01T00:00:00.000000Z")
        .execute(&pool)
        .await;
    assert!(second.is_err(), "second current row must be rejected");
}

#[tokio::test]
async fn test_current_row_with_valid_to_rejected_by_check() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("c.db"), &DatabaseConfig::default())
        .await
        .unwrap();

    let result = sqlx::query(
        r#"
        INSERT INTO silver_player_rating (
            player_key, player_username, platform, games_played, wins, losses, draws,
            win_rate, record_hash, valid_from, valid_to, is_current, ingested_at
        ) VALUES ('bob_chesscom', 'bob', 'chesscom', 0, 0, 0, 0, 0.0, 'h',
                  '2024-01-01T00:00:00.000000Z', '2024-02-01T00:00:00.000000Z', 1,
                  '2024-01-01T00:00:00.000000Z')
        "#,
    )
    .execute(&pool)
    .await;

    assert!(result.is_err());
}
