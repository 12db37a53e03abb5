//! Data-quality checks for cleansed game rows
//!
//! `Error` issues send the row to `silver_quarantine`; `Warning` issues are
//! logged and the row is loaded.

use crate::models::{GameResult, GameRow};
use crate::pgn::replay;
use chesslake_common::config::QualityConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityIssue {
    /// Check name, e.g. `rating_range`
    pub check: String,
    pub severity: Severity,
    pub message: String,
}

impl QualityIssue {
    fn error(check: &str, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            severity: Severity::Error,
            message: message.into(),
        }
    }

    fn warning(check: &str, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// Whether any issue quarantines the row
pub fn has_errors(issues: &[QualityIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

/// Run every check against a row
pub fn check_game(row: &GameRow, config: &QualityConfig) -> Vec<QualityIssue> {
    let mut issues = Vec::new();

    if row.game_id.trim().is_empty() {
        issues.push(QualityIssue::error("game_id_present", "game id is empty"));
    }

    if row.white.trim().is_empty() || row.black.trim().is_empty() {
        issues.push(QualityIssue::error("players_present", "a player name is empty"));
    } else if row.white.eq_ignore_ascii_case(&row.black) {
        issues.push(QualityIssue::error(
            "players_distinct",
            format!("'{}' plays both sides", row.white),
        ));
    }

    if row.result == GameResult::Unknown {
        if is_finished(row) {
            issues.push(QualityIssue::error(
                "result_known",
                format!(
                    "finished game has no result (termination: {})",
                    row.termination.as_deref().unwrap_or("none")
                ),
            ));
        } else {
            issues.push(QualityIssue::warning("result_known", "game is unfinished"));
        }
    }

    for (side, rating) in [("white", row.white_rating), ("black", row.black_rating)] {
        if let Some(rating) = rating {
            if rating < config.rating_min || rating > config.rating_max {
                issues.push(QualityIssue::error(
                    "rating_range",
                    format!(
                        "{} rating {} outside [{}, {}]",
                        side, rating, config.rating_min, config.rating_max
                    ),
                ));
            }
        }
    }

    if let (Some(start), Some(end)) = (row.started_at, row.ended_at) {
        if end < start {
            issues.push(QualityIssue::error(
                "time_order",
                format!("ended at {} before it started at {}", end, start),
            ));
        }
    }

    if row.moves.is_empty() {
        issues.push(QualityIssue::warning("moves_present", "game has no moves"));
    } else if config.replay_moves {
        check_replay(row, &mut issues);
    }

    issues
}

/// Replay the mainline and compare a terminal position with the result
fn check_replay(row: &GameRow, issues: &mut Vec<QualityIssue>) {
    let replayed = match replay(&row.moves) {
        Ok(replayed) => replayed,
        Err(e) => {
            issues.push(QualityIssue::error("moves_legal", e.to_string()));
            return;
        }
    };

    if replayed.checkmate {
        // The side that just moved delivered mate
        let expected = if replayed.plies % 2 == 1 {
            GameResult::WhiteWin
        } else {
            GameResult::BlackWin
        };
        if row.result != expected && row.result != GameResult::Unknown {
            issues.push(QualityIssue::error(
                "result_consistent",
                format!("board is checkmate ({}) but result is {}", expected, row.result),
            ));
        }
    } else if replayed.stalemate && row.result != GameResult::Draw && row.result != GameResult::Unknown {
        issues.push(QualityIssue::error(
            "result_consistent",
            format!("board is stalemate but result is {}", row.result),
        ));
    }
}

/// Finished unless the platform says the game is still in progress
fn is_finished(row: &GameRow) -> bool {
    match row.termination.as_deref() {
        Some("started") | Some("created") | Some("Unterminated") => false,
        Some(_) => true,
        None => row.ended_at.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::game::sample_row;

    fn config() -> QualityConfig {
        QualityConfig::default()
    }

    fn checks(issues: &[QualityIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.check.as_str()).collect()
    }

    #[test]
    fn test_clean_row_has_no_issues() {
        assert!(check_game(&sample_row(), &config()).is_empty());
    }

    #[test]
    fn test_same_player_both_sides() {
        let mut row = sample_row();
        row.black = "ALICE".to_string();
        let issues = check_game(&row, &config());
        assert_eq!(checks(&issues), vec!["players_distinct"]);
        assert!(has_errors(&issues));
    }

    #[test]
    fn test_rating_out_of_range() {
        let mut row = sample_row();
        row.white_rating = Some(4200);
        row.black_rating = Some(50);
        let issues = check_game(&row, &config());
        assert_eq!(checks(&issues), vec!["rating_range", "rating_range"]);
    }

    #[test]
    fn test_unknown_result() {
        let mut row = sample_row();
        row.result = GameResult::Unknown;
        let issues = check_game(&row, &config());
        assert_eq!(checks(&issues), vec!["result_known"]);
        assert!(has_errors(&issues));

        row.termination = Some("started".to_string());
        let issues = check_game(&row, &config());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
    }

    #[test]
    fn test_illegal_moves_quarantine() {
        let mut row = sample_row();
        row.moves[2] = "Bb7".to_string();
        let issues = check_game(&row, &config());
        assert_eq!(checks(&issues), vec!["moves_legal"]);

        let relaxed = QualityConfig {
            replay_moves: false,
            ..QualityConfig::default()
        };
        assert!(check_game(&row, &relaxed).is_empty());
    }

    #[test]
    fn test_checkmate_contradicts_result() {
        let mut row = sample_row();
        row.result = GameResult::BlackWin;
        let issues = check_game(&row, &config());
        assert_eq!(checks(&issues), vec!["result_consistent"]);
    }

    #[test]
    fn test_time_order_and_empty_moves() {
        let mut row = sample_row();
        std::mem::swap(&mut row.started_at, &mut row.ended_at);
        row.moves.clear();
        let issues = check_game(&row, &config());
        assert_eq!(checks(&issues), vec!["time_order", "moves_present"]);
        assert_eq!(issues[1].severity, Severity::Warning);
    }
}
