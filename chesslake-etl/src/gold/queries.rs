//! Analytics queries over `gold_fact_games`

use crate::models::TimeClass;
use chesslake_common::{time, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningPerformance {
    pub opening_name: String,
    pub games: i64,
    pub wins: i64,
    pub draws: i64,
    pub losses: i64,
    /// Percentage of games won
    pub win_rate: f64,
    pub avg_accuracy: Option<f64>,
}

/// Results per opening, most played first
pub async fn opening_performance(pool: &SqlitePool, min_games: i64) -> Result<Vec<OpeningPerformance>> {
    let rows = sqlx::query(
        r#"
        SELECT opening_name,
               COUNT(*) AS games,
               SUM(result = 'win') AS wins,
               SUM(result = 'draw') AS draws,
               SUM(result = 'loss') AS losses,
               100.0 * SUM(result = 'win') / COUNT(*) AS win_rate,
               AVG(accuracy) AS avg_accuracy
        FROM gold_fact_games
        WHERE opening_name IS NOT NULL
        GROUP BY opening_name
        HAVING COUNT(*) >= ?
        ORDER BY games DESC, win_rate DESC, opening_name
        "#,
    )
    .bind(min_games)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| OpeningPerformance {
            opening_name: row.get("opening_name"),
            games: row.get("games"),
            wins: row.get("wins"),
            draws: row.get("draws"),
            losses: row.get("losses"),
            win_rate: row.get("win_rate"),
            avg_accuracy: row.get("avg_accuracy"),
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorPerformance {
    pub color: String,
    pub games: i64,
    pub wins: i64,
    pub draws: i64,
    pub losses: i64,
    pub win_rate: f64,
}

/// Results with white vs black, optionally for one time class
pub async fn performance_by_color(
    pool: &SqlitePool,
    time_class: Option<TimeClass>,
) -> Result<Vec<ColorPerformance>> {
    let rows = sqlx::query(
        r#"
        SELECT color,
               COUNT(*) AS games,
               SUM(result = 'win') AS wins,
               SUM(result = 'draw') AS draws,
               SUM(result = 'loss') AS losses,
               100.0 * SUM(result = 'win') / COUNT(*) AS win_rate
        FROM gold_fact_games
        WHERE ?1 IS NULL OR time_class = ?1
        GROUP BY color
        ORDER BY color DESC
        "#,
    )
    .bind(time_class.map(|tc| tc.as_str()))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ColorPerformance {
            color: row.get("color"),
            games: row.get("games"),
            wins: row.get("wins"),
            draws: row.get("draws"),
            losses: row.get("losses"),
            win_rate: row.get("win_rate"),
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyByResult {
    pub result: String,
    pub games: i64,
    pub avg_accuracy: f64,
    pub min_accuracy: f64,
    pub max_accuracy: f64,
}

/// Accuracy per outcome, for games that were analysed
pub async fn accuracy_by_result(pool: &SqlitePool) -> Result<Vec<AccuracyByResult>> {
    let rows = sqlx::query(
        r#"
        SELECT result,
               COUNT(*) AS games,
               AVG(accuracy) AS avg_accuracy,
               MIN(accuracy) AS min_accuracy,
               MAX(accuracy) AS max_accuracy
        FROM gold_fact_games
        WHERE accuracy IS NOT NULL
        GROUP BY result
        ORDER BY CASE result WHEN 'win' THEN 0 WHEN 'draw' THEN 1 WHEN 'loss' THEN 2 ELSE 3 END
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| AccuracyByResult {
            result: row.get("result"),
            games: row.get("games"),
            avg_accuracy: row.get("avg_accuracy"),
            min_accuracy: row.get("min_accuracy"),
            max_accuracy: row.get("max_accuracy"),
        })
        .collect())
}

/// Rating at the end of a day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingPoint {
    pub date: NaiveDate,
    /// Rating going into the day's last game
    pub rating: i64,
    pub games: i64,
}

/// Daily rating progression of a player in one time class
///
/// Uses the pre-game rating recorded with each game; games without a rating
/// or end time are left out.
pub async fn rating_progression(
    pool: &SqlitePool,
    player_key: &str,
    time_class: TimeClass,
) -> Result<Vec<RatingPoint>> {
    let rows = sqlx::query(
        r#"
        SELECT game_end_time, my_rating
        FROM gold_fact_games
        WHERE player_key = ? AND time_class = ?
          AND my_rating IS NOT NULL AND game_end_time IS NOT NULL
        ORDER BY game_end_time, game_id
        "#,
    )
    .bind(player_key)
    .bind(time_class.as_str())
    .fetch_all(pool)
    .await?;

    let mut points: Vec<RatingPoint> = Vec::new();
    for row in &rows {
        let ended: String = row.get("game_end_time");
        let rating: i64 = row.get("my_rating");
        let date = time::from_db(&ended)?.date_naive();

        match points.last_mut() {
            Some(point) if point.date == date => {
                point.rating = rating;
                point.games += 1;
            }
            _ => points.push(RatingPoint {
                date,
                rating,
                games: 1,
            }),
        }
    }

    Ok(points)
}
