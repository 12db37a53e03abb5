//! Lichess API payloads
//!
//! - `GET /api/user/{username}` → [`LichessUser`]
//! - `GET /api/games/user/{username}` (`application/x-ndjson`) → one
//!   [`LichessGame`] per line
//!
//! Game exports are expected with `opening=true` and `accuracy=true` so the
//! opening and accuracy fields are populated; both are optional.

use super::{decode_lines, pgn_game, DecodedGame};
use crate::models::{GameResult, GameRow, RatingAttributes, RatingSnapshot, TimeClass};
use crate::pgn::{parse_games, parse_movetext};
use chesslake_common::{time, Error, Platform, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LichessGame {
    pub id: String,
    pub rated: Option<bool>,
    pub variant: Option<String>,
    pub speed: Option<String>,
    pub perf: Option<String>,
    pub created_at: Option<i64>,
    pub last_move_at: Option<i64>,
    pub status: Option<String>,
    pub players: LichessPlayers,
    pub winner: Option<String>,
    pub opening: Option<LichessOpening>,
    #[serde(default)]
    pub moves: String,
    pub clock: Option<LichessClock>,
    pub days_per_turn: Option<i64>,
    /// Present when exported with `pgnInJson=true`
    pub pgn: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LichessPlayers {
    pub white: LichessPlayer,
    pub black: LichessPlayer,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LichessPlayer {
    pub user: Option<LichessUserRef>,
    pub rating: Option<i64>,
    pub ai_level: Option<i64>,
    pub analysis: Option<LichessAnalysis>,
}

impl LichessPlayer {
    fn display_name(&self) -> String {
        match (&self.user, self.ai_level) {
            (Some(user), _) => user.name.clone(),
            (None, Some(level)) => format!("Stockfish level {}", level),
            (None, None) => "Anonymous".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LichessUserRef {
    pub name: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LichessAnalysis {
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LichessOpening {
    pub eco: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LichessClock {
    /// Seconds
    pub initial: i64,
    /// Seconds
    pub increment: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LichessUser {
    pub id: Option<String>,
    pub username: String,
    #[serde(default)]
    pub perfs: LichessPerfs,
    pub count: Option<LichessCount>,
    pub created_at: Option<i64>,
    pub seen_at: Option<i64>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LichessPerfs {
    pub bullet: Option<LichessPerf>,
    pub blitz: Option<LichessPerf>,
    pub rapid: Option<LichessPerf>,
    pub classical: Option<LichessPerf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LichessPerf {
    pub rating: i64,
    #[serde(default)]
    pub games: i64,
    #[serde(default)]
    pub prov: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LichessCount {
    #[serde(default)]
    pub all: i64,
    #[serde(default)]
    pub win: i64,
    #[serde(default)]
    pub loss: i64,
    #[serde(default)]
    pub draw: i64,
}

/// Decode an NDJSON game export, line by line
pub fn decode_ndjson(payload: &str, record_id: Uuid) -> Vec<DecodedGame> {
    decode_lines(payload, |line| match serde_json::from_str::<LichessGame>(line) {
        Ok(game) => convert_game(&game, record_id),
        Err(e) => DecodedGame::Malformed {
            game_id: serde_json::from_str::<serde_json::Value>(line)
                .ok()
                .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
                .map(|id| GameRow::qualified_id(Platform::Lichess, &id)),
            reason: format!("invalid game object: {}", e),
            raw: line.to_string(),
        },
    })
}

/// Decode a JSON game, or a JSON array of games
pub fn decode_json(payload: &str, record_id: Uuid) -> Result<Vec<DecodedGame>> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        obj @ serde_json::Value::Object(_) => vec![obj],
        other => {
            return Err(Error::Parse(format!(
                "Lichess games payload must be an object or array, found {}",
                other
            )))
        }
    };

    Ok(items
        .into_iter()
        .map(|item| match serde_json::from_value::<LichessGame>(item.clone()) {
            Ok(game) => convert_game(&game, record_id),
            Err(e) => DecodedGame::Malformed {
                game_id: None,
                reason: format!("invalid game object: {}", e),
                raw: item.to_string(),
            },
        })
        .collect())
}

/// Result from `winner` and `status`
///
/// Games without a winner are drawn when they ended by agreement, stalemate
/// or a flag against insufficient material; unfinished and aborted games are
/// unknown.
pub fn game_result(winner: Option<&str>, status: Option<&str>) -> GameResult {
    match winner {
        Some("white") => GameResult::WhiteWin,
        Some("black") => GameResult::BlackWin,
        _ => match status {
            Some("draw") | Some("stalemate") | Some("outoftime") | Some("timeout") => GameResult::Draw,
            _ => GameResult::Unknown,
        },
    }
}

fn convert_game(game: &LichessGame, record_id: Uuid) -> DecodedGame {
    let game_id = GameRow::qualified_id(Platform::Lichess, &game.id);

    if let Some(variant) = game.variant.as_deref() {
        if variant != "standard" {
            return DecodedGame::Skipped {
                reference: game_id,
                reason: format!("variant '{}'", variant),
            };
        }
    }

    let moves = if !game.moves.trim().is_empty() {
        parse_movetext(&game.moves).map(|m| m.moves)
    } else if let Some(pgn) = game.pgn.as_deref() {
        parse_games(pgn).map(|games| games.into_iter().next().map(|g| g.moves).unwrap_or_default())
    } else {
        Ok(Vec::new())
    };
    let moves = match moves {
        Ok(moves) => moves,
        Err(e) => {
            return DecodedGame::Malformed {
                game_id: Some(game_id),
                reason: format!("moves: {}", e),
                raw: serde_json::json!({ "id": game.id, "moves": game.moves }).to_string(),
            }
        }
    };

    let mut row = GameRow::new(
        game_id,
        Platform::Lichess,
        game.players.white.display_name(),
        game.players.black.display_name(),
        record_id,
    );
    row.white_rating = game.players.white.rating;
    row.black_rating = game.players.black.rating;
    row.result = game_result(game.winner.as_deref(), game.status.as_deref());
    row.termination = game.status.clone();
    row.time_control = match (&game.clock, game.days_per_turn) {
        (Some(clock), _) => Some(format!("{}+{}", clock.initial, clock.increment)),
        (None, Some(days)) => Some(format!("1/{}", days * SECONDS_PER_DAY)),
        (None, None) => None,
    };
    row.time_class = game
        .speed
        .as_deref()
        .and_then(TimeClass::from_label)
        .or_else(|| row.time_control.as_deref().map(TimeClass::from_time_control))
        .unwrap_or(TimeClass::Unknown);
    row.rated = game.rated;
    if let Some(opening) = &game.opening {
        row.eco = opening.eco.clone();
        row.opening_name = opening.name.clone();
    }
    row.moves = moves;
    row.started_at = game.created_at.and_then(time::from_unix_millis);
    row.ended_at = game.last_move_at.and_then(time::from_unix_millis);
    row.white_accuracy = game.players.white.analysis.as_ref().and_then(|a| a.accuracy);
    row.black_accuracy = game.players.black.analysis.as_ref().and_then(|a| a.accuracy);

    if row.opening_name.is_none() {
        if let Some(pgn) = game.pgn.as_deref() {
            if let Some(DecodedGame::Row(from_pgn)) = parse_games(pgn)
                .ok()
                .and_then(|games| games.first().map(|g| pgn_game::row_from_pgn(Platform::Lichess, g, record_id)))
            {
                row.opening_name = from_pgn.opening_name;
                row.eco = row.eco.or(from_pgn.eco);
            }
        }
    }

    DecodedGame::row(row)
}

/// Rating snapshot from a user payload
///
/// A perf only counts as rated once games were played in it; Lichess reports
/// a provisional default for untouched pools.
pub fn snapshot_from_user(
    payload: &str,
    username: &str,
    observed_at: DateTime<Utc>,
) -> Result<RatingSnapshot> {
    let user: LichessUser = serde_json::from_str(payload)?;

    if !user.username.eq_ignore_ascii_case(username.trim()) {
        tracing::warn!(
            expected = username,
            found = %user.username,
            "Lichess user payload names a different player"
        );
    }

    let rating = |perf: &Option<LichessPerf>| perf.as_ref().filter(|p| p.games > 0).map(|p| p.rating);
    let count = user.count.clone().unwrap_or_default();

    let attributes = RatingAttributes {
        rating_blitz: rating(&user.perfs.blitz),
        rating_rapid: rating(&user.perfs.rapid),
        rating_bullet: rating(&user.perfs.bullet),
        rating_classical: rating(&user.perfs.classical),
        games_played: count.all,
        wins: count.win,
        losses: count.loss,
        draws: count.draw,
    };

    Ok(RatingSnapshot::new(Platform::Lichess, &user.username, attributes, observed_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAME: &str = r#"{"id":"q7ZvsdUF","rated":true,"variant":"standard","speed":"blitz","perf":"blitz","createdAt":1714588205000,"lastMoveAt":1714588505000,"status":"mate","players":{"white":{"user":{"name":"alice_lc","id":"alice_lc"},"rating":1512,"ratingDiff":6,"analysis":{"inaccuracy":1,"mistake":0,"blunder":0,"acpl":20,"accuracy":93}},"black":{"user":{"name":"Bob","id":"bob"},"rating":1498,"ratingDiff":-6}},"winner":"white","opening":{"eco":"C50","name":"Italian Game","ply":3},"moves":"e4 e5 Bc4 Nc6 Qh5 Nf6 Qxf7#","clock":{"initial":180,"increment":2,"totalTime":260}}"#;

    #[test]
    fn test_decode_ndjson_game() {
        let payload = format!("{}\n\n", GAME);
        let decoded = decode_ndjson(&payload, Uuid::nil());
        assert_eq!(decoded.len(), 1);
        let DecodedGame::Row(row) = &decoded[0] else {
            panic!("expected a row, got {:?}", decoded[0]);
        };
        assert_eq!(row.game_id, "lichess:q7ZvsdUF");
        assert_eq!(row.black, "Bob");
        assert_eq!(row.result, GameResult::WhiteWin);
        assert_eq!(row.termination.as_deref(), Some("mate"));
        assert_eq!(row.time_control.as_deref(), Some("180+2"));
        assert_eq!(row.time_class, TimeClass::Blitz);
        assert_eq!(row.opening_name.as_deref(), Some("Italian Game"));
        assert_eq!(row.white_accuracy, Some(93.0));
        assert_eq!(row.black_accuracy, None);
        assert_eq!(row.ply_count(), 7);
        assert_eq!(row.started_at, time::from_unix_millis(1714588205000));
    }

    #[test]
    fn test_bad_line_is_malformed_not_fatal() {
        let payload = format!("{{\"id\":\"broken1\"}}\n{}\nnot json\n", GAME);
        let decoded = decode_ndjson(&payload, Uuid::nil());
        assert_eq!(decoded.len(), 3);
        assert!(matches!(
            &decoded[0],
            DecodedGame::Malformed { game_id: Some(id), .. } if id == "lichess:broken1"
        ));
        assert!(matches!(&decoded[1], DecodedGame::Row(_)));
        assert!(matches!(&decoded[2], DecodedGame::Malformed { game_id: None, .. }));
    }

    #[test]
    fn test_variants_skipped_and_ai_named() {
        let variant = GAME.replace("\"variant\":\"standard\"", "\"variant\":\"atomic\"");
        assert!(matches!(
            &decode_ndjson(&variant, Uuid::nil())[0],
            DecodedGame::Skipped { .. }
        ));

        let ai = GAME.replace(
            "\"user\":{\"name\":\"Bob\",\"id\":\"bob\"},\"rating\":1498,",
            "\"aiLevel\":3,",
        );
        let DecodedGame::Row(row) = &decode_ndjson(&ai, Uuid::nil())[0] else {
            panic!("expected a row");
        };
        assert_eq!(row.black, "Stockfish level 3");
        assert_eq!(row.black_rating, None);
    }

    #[test]
    fn test_correspondence_time_control() {
        let game = GAME
            .replace("\"speed\":\"blitz\"", "\"speed\":\"correspondence\"")
            .replace("\"clock\":{\"initial\":180,\"increment\":2,\"totalTime\":260}", "\"daysPerTurn\":2");
        let DecodedGame::Row(row) = &decode_ndjson(&game, Uuid::nil())[0] else {
            panic!("expected a row");
        };
        assert_eq!(row.time_control.as_deref(), Some("1/172800"));
        assert_eq!(row.time_class, TimeClass::Correspondence);
    }

    #[test]
    fn test_game_result() {
        assert_eq!(game_result(Some("black"), Some("resign")), GameResult::BlackWin);
        assert_eq!(game_result(None, Some("draw")), GameResult::Draw);
        assert_eq!(game_result(None, Some("stalemate")), GameResult::Draw);
        assert_eq!(game_result(None, Some("aborted")), GameResult::Unknown);
        assert_eq!(game_result(None, Some("started")), GameResult::Unknown);
    }

    #[test]
    fn test_decode_json_array() {
        let decoded = decode_json(&format!("[{}, {}]", GAME, GAME), Uuid::nil()).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!(decode_json("42", Uuid::nil()).is_err());
    }

    #[test]
    fn test_snapshot_from_user() {
        let payload = r#"{
            "id": "alice_lc", "username": "Alice_LC",
            "perfs": {
                "bullet": {"games": 0, "rating": 1500, "rd": 500, "prog": 0, "prov": true},
                "blitz": {"games": 120, "rating": 1512, "rd": 60, "prog": 12},
                "rapid": {"games": 30, "rating": 1650, "rd": 80, "prog": -5},
                "puzzle": {"games": 400, "rating": 1900, "rd": 70, "prog": 0}
            },
            "count": {"all": 160, "rated": 150, "win": 80, "loss": 70, "draw": 10, "ai": 2}
        }"#;
        let observed = time::from_unix_seconds(1_714_600_000).unwrap();
        let snap = snapshot_from_user(payload, "alice_lc", observed).unwrap();
        assert_eq!(snap.player_key, "alice_lc_lichess");
        assert_eq!(snap.player_username, "Alice_LC");
        assert_eq!(snap.attributes.rating_bullet, None);
        assert_eq!(snap.attributes.rating_blitz, Some(1512));
        assert_eq!(snap.attributes.rating_rapid, Some(1650));
        assert_eq!(snap.attributes.rating_classical, None);
        assert_eq!(snap.attributes.games_played, 160);
        assert_eq!(snap.attributes.win_rate(), 50.0);
    }
}
