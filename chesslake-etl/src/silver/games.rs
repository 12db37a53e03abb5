//! Silver game loading
//!
//! **Algorithm (per unprocessed bronze `games` record, oldest first):**
//! 1. Read the payload back from the landing zone (hash verified)
//! 2. Decode every game; a payload that cannot be decoded at all is
//!    quarantined as a whole
//! 3. Run quality checks; rows with error issues are quarantined
//! 4. In one transaction: insert new rows, skip ids already seen in this
//!    record or stored in `silver_games`, write quarantine rows, mark the
//!    record processed
//!
//! Step 4 is retried on lock contention; steps 1-3 run once per record.

use super::quality::{check_game, has_errors, QualityIssue, Severity};
use crate::bronze::manifest::{self, Stage};
use crate::bronze::{read_payload, BronzeRecord, LandingZone};
use crate::models::GameRow;
use crate::sources::{decode_games, DecodedGame};
use crate::utils::{begin_monitored, retry_on_lock};
use chesslake_common::config::QualityConfig;
use chesslake_common::{time, Error, Platform, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Raw text kept in quarantine for a payload that failed as a whole
const MAX_QUARANTINE_RAW: usize = 64 * 1024;

/// Counters for one silver games run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamesReport {
    pub records: usize,
    pub loaded: usize,
    pub duplicates: usize,
    pub quarantined: usize,
    pub skipped: usize,
    pub warnings: usize,
}

impl GamesReport {
    fn absorb(&mut self, other: &GamesReport) {
        self.records += other.records;
        self.loaded += other.loaded;
        self.duplicates += other.duplicates;
        self.quarantined += other.quarantined;
        self.skipped += other.skipped;
        self.warnings += other.warnings;
    }
}

/// A decoded game after quality checks
#[derive(Debug)]
enum Prepared {
    Load {
        row: GameRow,
        row_hash: String,
    },
    Quarantine {
        game_id: Option<String>,
        issues: Vec<QualityIssue>,
        row_json: String,
    },
    Skip,
}

/// Load every unprocessed bronze games record into `silver_games`
pub async fn transform_games(
    pool: &SqlitePool,
    zone: &LandingZone,
    quality: &QualityConfig,
    max_lock_wait_ms: u64,
) -> Result<GamesReport> {
    let records = manifest::unprocessed(pool, Stage::Games).await?;
    let mut report = GamesReport::default();

    if records.is_empty() {
        debug!("No unprocessed games records");
        return Ok(report);
    }

    for record in &records {
        let record_report = process_record(pool, zone, record, quality, max_lock_wait_ms).await?;
        info!(
            record_id = %record.record_id,
            platform = %record.platform,
            username = %record.username,
            loaded = record_report.loaded,
            duplicates = record_report.duplicates,
            quarantined = record_report.quarantined,
            skipped = record_report.skipped,
            "Silver games record processed"
        );
        report.absorb(&record_report);
    }

    info!(
        records = report.records,
        loaded = report.loaded,
        duplicates = report.duplicates,
        quarantined = report.quarantined,
        "Silver games complete"
    );

    Ok(report)
}

async fn process_record(
    pool: &SqlitePool,
    zone: &LandingZone,
    record: &BronzeRecord,
    quality: &QualityConfig,
    max_lock_wait_ms: u64,
) -> Result<GamesReport> {
    let payload = read_payload(zone, record)?;
    let mut warnings = 0;

    let prepared: Vec<Prepared> = match decode_games(record, &payload) {
        Ok(decoded) => decoded
            .into_iter()
            .map(|game| prepare(game, quality, &mut warnings))
            .collect(),
        Err(e) => {
            warn!(record_id = %record.record_id, error = %e, "Games payload rejected");
            vec![Prepared::Quarantine {
                game_id: None,
                issues: vec![QualityIssue {
                    check: "payload_decodes".to_string(),
                    severity: Severity::Error,
                    message: e.to_string(),
                }],
                row_json: truncate(&payload, MAX_QUARANTINE_RAW),
            }]
        }
    };

    let mut report = retry_on_lock("silver games load", max_lock_wait_ms, || {
        load_record(pool, record, &prepared)
    })
    .await?;
    report.warnings = warnings;
    Ok(report)
}

fn prepare(game: DecodedGame, quality: &QualityConfig, warnings: &mut usize) -> Prepared {
    match game {
        DecodedGame::Row(row) => {
            let issues = check_game(&row, quality);
            if has_errors(&issues) {
                debug!(game_id = %row.game_id, ?issues, "Quarantining game");
                let row_json = serde_json::to_string(&row).unwrap_or_default();
                return Prepared::Quarantine {
                    game_id: Some(row.game_id.clone()),
                    issues,
                    row_json,
                };
            }
            for issue in &issues {
                *warnings += 1;
                debug!(game_id = %row.game_id, check = %issue.check, "{}", issue.message);
            }
            let row_hash = row.row_hash();
            Prepared::Load { row: *row, row_hash }
        }
        DecodedGame::Skipped { reference, reason } => {
            debug!(%reference, %reason, "Skipping game");
            Prepared::Skip
        }
        DecodedGame::Malformed { game_id, reason, raw } => Prepared::Quarantine {
            game_id,
            issues: vec![QualityIssue {
                check: "game_decodes".to_string(),
                severity: Severity::Error,
                message: reason,
            }],
            row_json: raw,
        },
    }
}

/// One transaction: rows, quarantine, progress marker
async fn load_record(pool: &SqlitePool, record: &BronzeRecord, prepared: &[Prepared]) -> Result<GamesReport> {
    let mut tx = begin_monitored(pool, "silver::games").await?;
    let mut report = GamesReport {
        records: 1,
        ..Default::default()
    };
    let mut seen: HashSet<&str> = HashSet::new();

    for item in prepared {
        match item {
            Prepared::Load { row, row_hash } => {
                if !seen.insert(row.game_id.as_str()) {
                    report.duplicates += 1;
                    continue;
                }
                match stored_hash(tx.conn(), &row.game_id).await? {
                    Some(existing) => {
                        if &existing != row_hash {
                            info!(
                                game_id = %row.game_id,
                                stored = %existing,
                                incoming = %row_hash,
                                "Duplicate game differs from stored row; keeping stored row"
                            );
                        }
                        report.duplicates += 1;
                    }
                    None => {
                        insert_game(tx.conn(), row, row_hash).await?;
                        report.loaded += 1;
                    }
                }
            }
            Prepared::Quarantine {
                game_id,
                issues,
                row_json,
            } => {
                quarantine(tx.conn(), game_id.as_deref(), record.record_id, issues, row_json).await?;
                report.quarantined += 1;
            }
            Prepared::Skip => report.skipped += 1,
        }
    }

    let outcome = if report.loaded + report.duplicates + report.skipped == 0 && report.quarantined > 0 {
        "rejected"
    } else {
        "loaded"
    };
    manifest::mark_processed(tx.conn(), record.record_id, Stage::Games, outcome).await?;
    tx.commit().await?;

    Ok(report)
}

async fn stored_hash(conn: &mut SqliteConnection, game_id: &str) -> Result<Option<String>> {
    let hash: Option<String> = sqlx::query_scalar("SELECT row_hash FROM silver_games WHERE game_id = ?")
        .bind(game_id)
        .fetch_optional(conn)
        .await?;
    Ok(hash)
}

async fn insert_game(conn: &mut SqliteConnection, row: &GameRow, row_hash: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO silver_games (
            game_id, platform, white, black, white_rating, black_rating,
            result, termination, time_control, time_class, rated, eco,
            opening_name, moves, ply_count, started_at, ended_at,
            white_accuracy, black_accuracy, source_record_id, row_hash, loaded_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&row.game_id)
    .bind(row.platform.as_str())
    .bind(&row.white)
    .bind(&row.black)
    .bind(row.white_rating)
    .bind(row.black_rating)
    .bind(row.result.as_str())
    .bind(&row.termination)
    .bind(&row.time_control)
    .bind(row.time_class.as_str())
    .bind(row.rated)
    .bind(&row.eco)
    .bind(&row.opening_name)
    .bind(row.moves_text())
    .bind(row.ply_count() as i64)
    .bind(row.started_at.as_ref().map(time::to_db))
    .bind(row.ended_at.as_ref().map(time::to_db))
    .bind(row.white_accuracy)
    .bind(row.black_accuracy)
    .bind(row.source_record_id.to_string())
    .bind(row_hash)
    .bind(time::to_db(&time::now()))
    .execute(conn)
    .await?;

    Ok(())
}

async fn quarantine(
    conn: &mut SqliteConnection,
    game_id: Option<&str>,
    record_id: Uuid,
    issues: &[QualityIssue],
    row_json: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO silver_quarantine (game_id, source_record_id, issues, row_json, quarantined_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(game_id)
    .bind(record_id.to_string())
    .bind(serde_json::to_string(issues)?)
    .bind(row_json)
    .bind(time::to_db(&time::now()))
    .execute(conn)
    .await?;

    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

const GAME_COLUMNS: &str = "game_id, platform, white, black, white_rating, black_rating, result, \
     termination, time_control, time_class, rated, eco, opening_name, moves, started_at, ended_at, \
     white_accuracy, black_accuracy, source_record_id";

fn row_to_game(row: &SqliteRow) -> Result<GameRow> {
    let platform: String = row.get("platform");
    let result: String = row.get("result");
    let time_class: String = row.get("time_class");
    let moves: String = row.get("moves");
    let started_at: Option<String> = row.get("started_at");
    let ended_at: Option<String> = row.get("ended_at");
    let source_record_id: String = row.get("source_record_id");

    Ok(GameRow {
        game_id: row.get("game_id"),
        platform: platform.parse()?,
        white: row.get("white"),
        black: row.get("black"),
        white_rating: row.get("white_rating"),
        black_rating: row.get("black_rating"),
        result: result.parse()?,
        termination: row.get("termination"),
        time_control: row.get("time_control"),
        time_class: time_class.parse()?,
        rated: row.get("rated"),
        eco: row.get("eco"),
        opening_name: row.get("opening_name"),
        moves: moves.split_whitespace().map(str::to_string).collect(),
        started_at: started_at.as_deref().map(time::from_db).transpose()?,
        ended_at: ended_at.as_deref().map(time::from_db).transpose()?,
        white_accuracy: row.get("white_accuracy"),
        black_accuracy: row.get("black_accuracy"),
        source_record_id: Uuid::parse_str(&source_record_id)
            .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))?,
    })
}

pub async fn get_game(pool: &SqlitePool, game_id: &str) -> Result<Option<GameRow>> {
    let sql = format!("SELECT {} FROM silver_games WHERE game_id = ?", GAME_COLUMNS);
    let row = sqlx::query(&sql).bind(game_id).fetch_optional(pool).await?;
    row.as_ref().map(row_to_game).transpose()
}

/// Games a player took part in on a platform, oldest first
pub async fn games_for_player(pool: &SqlitePool, platform: Platform, username: &str) -> Result<Vec<GameRow>> {
    let sql = format!(
        "SELECT {} FROM silver_games
         WHERE platform = ? AND (white = ? COLLATE NOCASE OR black = ? COLLATE NOCASE)
         ORDER BY COALESCE(ended_at, started_at), game_id",
        GAME_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(platform.as_str())
        .bind(username)
        .bind(username)
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_game).collect()
}

pub async fn count_games(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM silver_games")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// A quarantined row as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub quarantine_id: i64,
    pub game_id: Option<String>,
    pub source_record_id: String,
    pub issues: Vec<QualityIssue>,
    pub quarantined_at: String,
}

pub async fn list_quarantine(pool: &SqlitePool) -> Result<Vec<QuarantineEntry>> {
    let rows = sqlx::query(
        "SELECT quarantine_id, game_id, source_record_id, issues, quarantined_at
         FROM silver_quarantine ORDER BY quarantine_id",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<QuarantineEntry> {
            let issues: String = row.get("issues");
            Ok(QuarantineEntry {
                quarantine_id: row.get("quarantine_id"),
                game_id: row.get("game_id"),
                source_record_id: row.get("source_record_id"),
                issues: serde_json::from_str(&issues)?,
                quarantined_at: row.get("quarantined_at"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("ab½", 3), "ab");
        assert_eq!(truncate("abcdef", 4), "abcd");
    }

    #[test]
    fn test_prepare_routes_rows() {
        let quality = QualityConfig::default();
        let mut warnings = 0;

        let good = crate::models::game::sample_row();
        assert!(matches!(
            prepare(DecodedGame::row(good.clone()), &quality, &mut warnings),
            Prepared::Load { .. }
        ));

        let mut bad = good;
        bad.white_rating = Some(9000);
        match prepare(DecodedGame::row(bad), &quality, &mut warnings) {
            Prepared::Quarantine { game_id, issues, .. } => {
                assert_eq!(game_id.as_deref(), Some("lichess:abcd1234"));
                assert_eq!(issues[0].check, "rating_range");
            }
            other => panic!("expected quarantine, got {:?}", other),
        }

        assert!(matches!(
            prepare(
                DecodedGame::Skipped {
                    reference: "x".into(),
                    reason: "variant".into()
                },
                &quality,
                &mut warnings
            ),
            Prepared::Skip
        ));
        assert_eq!(warnings, 0);
    }
}
