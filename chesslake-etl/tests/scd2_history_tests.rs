//! Rating history storage tests
//!
//! Merges against a real database: one current row per player, closed rows
//! never modified, point-in-time lookups over half-open intervals.

mod helpers;

use chesslake_common::Platform;
use chesslake_etl::models::{RatingAttributes, RatingSnapshot};
use chesslake_etl::scd2;
use helpers::{at, create_test_lake};

const MAX_WAIT_MS: u64 = 1000;

fn attrs(blitz: i64, games: i64) -> RatingAttributes {
    RatingAttributes {
        rating_blitz: Some(blitz),
        rating_rapid: Some(1600),
        rating_bullet: None,
        rating_classical: None,
        games_played: games,
        wins: games / 2,
        losses: games - games / 2,
        draws: 0,
    }
}

fn snap(user: &str, blitz: i64, games: i64, secs: i64) -> RatingSnapshot {
    RatingSnapshot::new(Platform::Chesscom, user, attrs(blitz, games), at(secs))
}

#[tokio::test]
async fn test_new_then_changed_closes_previous_version() {
    let t = create_test_lake().await;

    let report = scd2::merge(t.pool(), &[snap("alice", 1450, 100, 0)], MAX_WAIT_MS)
        .await
        .unwrap();
    assert_eq!(report.new_players, 1);
    assert_eq!(report.versions_inserted, 1);

    let first = scd2::current(t.pool(), "alice_chesscom").await.unwrap().unwrap();
    assert_eq!(first.valid_from, at(0));
    assert_eq!(first.valid_to, None);
    assert!(first.is_current);
    assert_eq!(first.win_rate, 50.0);

    let report = scd2::merge(t.pool(), &[snap("alice", 1475, 110, 3600)], MAX_WAIT_MS)
        .await
        .unwrap();
    assert_eq!(report.changed, 1);
    assert_eq!(report.versions_closed, 1);

    let history = scd2::history(t.pool(), "alice_chesscom").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].surrogate_key, first.surrogate_key);
    assert_eq!(history[0].valid_to, Some(at(3600)));
    assert!(!history[0].is_current);
    assert_eq!(history[0].attributes, first.attributes);
    assert_eq!(history[0].record_hash, first.record_hash);
    assert_eq!(history[1].valid_from, at(3600));
    assert!(history[1].is_current);
    assert_eq!(history[1].attributes.rating_blitz, Some(1475));

    assert!(scd2::audit(t.pool()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unchanged_and_replayed_snapshots_add_nothing() {
    let t = create_test_lake().await;
    let batch = vec![snap("alice", 1450, 100, 0), snap("alice", 1475, 110, 3600)];
    scd2::merge(t.pool(), &batch, MAX_WAIT_MS).await.unwrap();

    // Same attributes observed later
    let report = scd2::merge(t.pool(), &[snap("alice", 1475, 110, 7200)], MAX_WAIT_MS)
        .await
        .unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.versions_inserted, 0);

    // The whole batch again
    let report = scd2::merge(t.pool(), &batch, MAX_WAIT_MS).await.unwrap();
    assert_eq!(report.versions_inserted, 0);
    assert_eq!(report.versions_closed, 0);
    assert_eq!(report.new_players + report.changed, 0);

    let history = scd2::history(t.pool(), "alice_chesscom").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].valid_from, at(3600));
}

#[tokio::test]
async fn test_out_of_order_batch_is_applied_in_observation_order() {
    let t = create_test_lake().await;
    let batch = vec![
        snap("alice", 1500, 130, 7200),
        snap("alice", 1450, 100, 0),
        snap("bob", 1300, 20, 60),
        snap("alice", 1450, 100, 3600),
    ];

    let report = scd2::merge(t.pool(), &batch, MAX_WAIT_MS).await.unwrap();
    assert_eq!(report.snapshots, 4);
    assert_eq!(report.new_players, 2);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.changed, 1);

    let history = scd2::history(t.pool(), "alice_chesscom").await.unwrap();
    let intervals: Vec<_> = history.iter().map(|v| (v.valid_from, v.valid_to)).collect();
    assert_eq!(intervals, vec![(at(0), Some(at(7200))), (at(7200), None)]);

    let current = scd2::current_all(t.pool()).await.unwrap();
    let keys: Vec<_> = current.iter().map(|v| v.player_key.as_str()).collect();
    assert_eq!(keys, vec!["alice_chesscom", "bob_chesscom"]);
}

#[tokio::test]
async fn test_same_instant_later_sequence_wins() {
    let t = create_test_lake().await;
    let batch = vec![
        snap("alice", 1450, 100, 0).with_sequence(0),
        snap("alice", 1460, 101, 0).with_sequence(1),
    ];
    scd2::merge(t.pool(), &batch, MAX_WAIT_MS).await.unwrap();

    let current = scd2::current(t.pool(), "alice_chesscom").await.unwrap().unwrap();
    assert_eq!(current.attributes.rating_blitz, Some(1460));

    let history = scd2::history(t.pool(), "alice_chesscom").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].valid_from, history[0].valid_to.unwrap());

    let seen = scd2::as_of(t.pool(), "alice_chesscom", at(0)).await.unwrap().unwrap();
    assert_eq!(seen.surrogate_key, current.surrogate_key);
    assert!(scd2::audit(t.pool()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_as_of_uses_half_open_intervals() {
    let t = create_test_lake().await;
    scd2::merge(
        t.pool(),
        &[snap("alice", 1450, 100, 0), snap("alice", 1475, 110, 3600)],
        MAX_WAIT_MS,
    )
    .await
    .unwrap();

    let blitz_at = |v: Option<chesslake_etl::models::RatingVersion>| v.and_then(|v| v.attributes.rating_blitz);

    assert_eq!(blitz_at(scd2::as_of(t.pool(), "alice_chesscom", at(-1)).await.unwrap()), None);
    assert_eq!(blitz_at(scd2::as_of(t.pool(), "alice_chesscom", at(0)).await.unwrap()), Some(1450));
    assert_eq!(blitz_at(scd2::as_of(t.pool(), "alice_chesscom", at(3599)).await.unwrap()), Some(1450));
    assert_eq!(blitz_at(scd2::as_of(t.pool(), "alice_chesscom", at(3600)).await.unwrap()), Some(1475));
    assert_eq!(
        blitz_at(scd2::as_of(t.pool(), "alice_chesscom", at(86_400 * 365)).await.unwrap()),
        Some(1475)
    );
    assert_eq!(blitz_at(scd2::as_of(t.pool(), "nobody_chesscom", at(0)).await.unwrap()), None);
}

#[tokio::test]
async fn test_closed_versions_cannot_be_modified_or_deleted() {
    let t = create_test_lake().await;
    scd2::merge(
        t.pool(),
        &[snap("alice", 1450, 100, 0), snap("alice", 1475, 110, 3600)],
        MAX_WAIT_MS,
    )
    .await
    .unwrap();

    let update = sqlx::query("UPDATE silver_player_rating SET rating_blitz = 9999 WHERE is_current = 0")
        .execute(t.pool())
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM silver_player_rating").execute(t.pool()).await;
    assert!(delete.is_err());

    // A second current row for the same player is refused
    let duplicate = sqlx::query(
        r#"
        INSERT INTO silver_player_rating (
            player_key, player_username, platform, games_played, wins, losses, draws,
            win_rate, record_hash, valid_from, valid_to, is_current, ingested_at
        ) VALUES ('alice_chesscom', 'alice', 'chesscom', 0, 0, 0, 0, 0, 'x',
                  '2024-06-01T00:00:00.000000Z', NULL, 1, '2024-06-01T00:00:00.000000Z')
        "#,
    )
    .execute(t.pool())
    .await;
    assert!(duplicate.is_err());

    let history = scd2::history(t.pool(), "alice_chesscom").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].attributes.rating_blitz, Some(1450));
}
