//! Gold layer: `gold_fact_games` and the analytics queries over it
//!
//! One fact row per (game, tracked player), seen from that player's side of
//! the board. The table is rebuilt from `silver_games` on every run.

pub mod queries;

pub use queries::{
    accuracy_by_result, opening_performance, performance_by_color, rating_progression, AccuracyByResult,
    ColorPerformance, OpeningPerformance, RatingPoint,
};

use crate::models::{Color, GameResult, GameRow, TimeClass};
use crate::silver::games::games_for_player;
use crate::utils::begin_monitored;
use chesslake_common::{time, Platform, Result, TrackedPlayer, TrackedPlayers};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;
use tracing::{info, warn};

/// Result from the tracked player's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Draw,
    Unknown,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
            Outcome::Draw => "draw",
            Outcome::Unknown => "unknown",
        }
    }

    pub fn for_color(result: GameResult, color: Color) -> Self {
        match (result, color) {
            (GameResult::WhiteWin, Color::White) | (GameResult::BlackWin, Color::Black) => Outcome::Win,
            (GameResult::WhiteWin, Color::Black) | (GameResult::BlackWin, Color::White) => Outcome::Loss,
            (GameResult::Draw, _) => Outcome::Draw,
            (GameResult::Unknown, _) => Outcome::Unknown,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of `gold_fact_games`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactGame {
    pub game_id: String,
    pub player_key: String,
    pub platform: Platform,
    pub color: Color,
    pub opponent: String,
    pub result: Outcome,
    pub my_rating: Option<i64>,
    pub opponent_rating: Option<i64>,
    pub accuracy: Option<f64>,
    pub time_class: TimeClass,
    pub opening_name: Option<String>,
    pub eco: Option<String>,
    pub game_end_time: Option<DateTime<Utc>>,
}

impl FactGame {
    /// Fact row for a tracked player, or `None` if they did not play the game
    pub fn from_game(game: &GameRow, player: &TrackedPlayer) -> Option<Self> {
        if game.platform != player.platform {
            return None;
        }
        let color = game.color_of(&player.username)?;
        let (opponent, my_rating, opponent_rating, accuracy) = match color {
            Color::White => (&game.black, game.white_rating, game.black_rating, game.white_accuracy),
            Color::Black => (&game.white, game.black_rating, game.white_rating, game.black_accuracy),
        };

        Some(FactGame {
            game_id: game.game_id.clone(),
            player_key: player.player_key(),
            platform: game.platform,
            color,
            opponent: opponent.clone(),
            result: Outcome::for_color(game.result, color),
            my_rating,
            opponent_rating,
            accuracy,
            time_class: game.time_class,
            opening_name: game.opening_name.clone(),
            eco: game.eco.clone(),
            game_end_time: game.ended_at.or(game.started_at),
        })
    }
}

/// Rebuild `gold_fact_games` for the tracked players
///
/// Replaces the table contents in one transaction; returns the row count.
pub async fn rebuild_fact_games(pool: &SqlitePool, players: &TrackedPlayers) -> Result<u64> {
    if players.is_empty() {
        warn!("No tracked players configured; gold_fact_games will be empty");
    }

    let mut facts = Vec::new();
    for player in players.iter() {
        let games = games_for_player(pool, player.platform, &player.username).await?;
        let before = facts.len();
        facts.extend(games.iter().filter_map(|g| FactGame::from_game(g, player)));
        info!(
            player_key = %player.player_key(),
            games = facts.len() - before,
            "Collected fact rows"
        );
    }

    let mut tx = begin_monitored(pool, "gold::rebuild").await?;
    sqlx::query("DELETE FROM gold_fact_games").execute(tx.conn()).await?;

    let mut inserted = 0u64;
    for fact in &facts {
        let result = sqlx::query(
            r#"
            INSERT INTO gold_fact_games (
                game_id, player_key, platform, color, opponent, result,
                my_rating, opponent_rating, accuracy, time_class,
                opening_name, eco, game_end_time
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(game_id, player_key) DO NOTHING
            "#,
        )
        .bind(&fact.game_id)
        .bind(&fact.player_key)
        .bind(fact.platform.as_str())
        .bind(fact.color.as_str())
        .bind(&fact.opponent)
        .bind(fact.result.as_str())
        .bind(fact.my_rating)
        .bind(fact.opponent_rating)
        .bind(fact.accuracy)
        .bind(fact.time_class.as_str())
        .bind(&fact.opening_name)
        .bind(&fact.eco)
        .bind(fact.game_end_time.as_ref().map(time::to_db))
        .execute(tx.conn())
        .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    info!(rows = inserted, players = players.len(), "gold_fact_games rebuilt");

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::game::sample_row;

    fn tracked(platform: Platform, name: &str) -> TrackedPlayer {
        TrackedPlayer {
            platform,
            username: name.to_string(),
        }
    }

    #[test]
    fn test_outcome_for_color() {
        assert_eq!(Outcome::for_color(GameResult::WhiteWin, Color::White), Outcome::Win);
        assert_eq!(Outcome::for_color(GameResult::WhiteWin, Color::Black), Outcome::Loss);
        assert_eq!(Outcome::for_color(GameResult::Draw, Color::Black), Outcome::Draw);
        assert_eq!(Outcome::for_color(GameResult::Unknown, Color::White), Outcome::Unknown);
    }

    #[test]
    fn test_fact_from_black_side() {
        let game = sample_row();
        let fact = FactGame::from_game(&game, &tracked(Platform::Lichess, "Bob")).unwrap();
        assert_eq!(fact.player_key, "bob_lichess");
        assert_eq!(fact.color, Color::Black);
        assert_eq!(fact.opponent, "alice");
        assert_eq!(fact.result, Outcome::Loss);
        assert_eq!(fact.my_rating, Some(1480));
        assert_eq!(fact.opponent_rating, Some(1500));
        assert_eq!(fact.accuracy, None);
        assert_eq!(fact.game_end_time, game.ended_at);
    }

    #[test]
    fn test_fact_requires_same_platform_and_participation() {
        let game = sample_row();
        assert!(FactGame::from_game(&game, &tracked(Platform::Chesscom, "alice")).is_none());
        assert!(FactGame::from_game(&game, &tracked(Platform::Lichess, "carol")).is_none());
    }
}
