//! Chess.com Published Data API payloads
//!
//! - `GET /pub/player/{username}` → [`ChessComProfile`]
//! - `GET /pub/player/{username}/stats` → [`ChessComStats`]
//! - `GET /pub/player/{username}/games/{YYYY}/{MM}` → [`ChessComArchive`]
//!
//! Archive games embed the full PGN; JSON fields take precedence over PGN tags
//! where both exist.

use super::{pgn_game, url_id, DecodedGame};
use crate::models::{GameResult, GameRow, RatingAttributes, RatingSnapshot, TimeClass};
use crate::pgn::parse_games;
use chesslake_common::{time, Error, Platform, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// Side results that end a game in a draw
const DRAW_CODES: &[&str] = &[
    "agreed",
    "repetition",
    "stalemate",
    "insufficient",
    "50move",
    "timevsinsufficient",
];

#[derive(Debug, Clone, Deserialize)]
pub struct ChessComProfile {
    pub username: Option<String>,
    pub player_id: Option<i64>,
    pub url: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub joined: Option<i64>,
    pub last_online: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChessComStats {
    pub chess_bullet: Option<ChessComStatBlock>,
    pub chess_blitz: Option<ChessComStatBlock>,
    pub chess_rapid: Option<ChessComStatBlock>,
    pub chess_daily: Option<ChessComStatBlock>,
}

impl ChessComStats {
    fn blocks(&self) -> impl Iterator<Item = &ChessComStatBlock> {
        [&self.chess_bullet, &self.chess_blitz, &self.chess_rapid, &self.chess_daily]
            .into_iter()
            .flatten()
    }

    /// Latest `last.date` across the time classes
    ///
    /// The instant the reported ratings were last updated, which is when
    /// they started to hold.
    pub fn data_date(&self) -> Option<DateTime<Utc>> {
        self.blocks()
            .filter_map(|b| b.last.as_ref().and_then(|p| p.date))
            .max()
            .and_then(time::from_unix_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChessComStatBlock {
    pub last: Option<ChessComRatingPoint>,
    pub best: Option<ChessComRatingPoint>,
    pub record: Option<ChessComRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChessComRatingPoint {
    pub rating: i64,
    pub date: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChessComRecord {
    #[serde(default)]
    pub win: i64,
    #[serde(default)]
    pub loss: i64,
    #[serde(default)]
    pub draw: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChessComArchive {
    #[serde(default)]
    pub games: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChessComGame {
    pub url: Option<String>,
    pub pgn: Option<String>,
    pub time_control: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub rated: Option<bool>,
    pub accuracies: Option<ChessComAccuracies>,
    pub uuid: Option<String>,
    pub time_class: Option<String>,
    pub rules: Option<String>,
    pub white: ChessComSide,
    pub black: ChessComSide,
    /// Opening URL, e.g. `https://www.chess.com/openings/Italian-Game`
    pub eco: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChessComSide {
    pub username: String,
    pub rating: Option<i64>,
    pub result: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChessComAccuracies {
    pub white: Option<f64>,
    pub black: Option<f64>,
}

pub fn parse_profile(payload: &str) -> Result<ChessComProfile> {
    Ok(serde_json::from_str(payload)?)
}

/// Decode a monthly archive
///
/// Each game is decoded on its own so one bad entry does not reject the month.
pub fn decode_archive(payload: &str, record_id: Uuid) -> Result<Vec<DecodedGame>> {
    let archive: ChessComArchive = serde_json::from_str(payload)?;
    Ok(archive
        .games
        .into_iter()
        .map(|value| match serde_json::from_value::<ChessComGame>(value.clone()) {
            Ok(game) => convert_game(&game, record_id),
            Err(e) => DecodedGame::Malformed {
                game_id: value.get("url").and_then(|u| u.as_str()).and_then(game_id_from_url),
                reason: format!("invalid game object: {}", e),
                raw: value.to_string(),
            },
        })
        .collect())
}

/// Decode a single game object (one NDJSON line)
pub fn decode_game_json(line: &str, record_id: Uuid) -> DecodedGame {
    match serde_json::from_str::<ChessComGame>(line) {
        Ok(game) => convert_game(&game, record_id),
        Err(e) => DecodedGame::Malformed {
            game_id: None,
            reason: format!("invalid game object: {}", e),
            raw: line.to_string(),
        },
    }
}

fn game_id_from_url(url: &str) -> Option<String> {
    url_id(url).map(|id| GameRow::qualified_id(Platform::Chesscom, &id))
}

/// Archive game into a row
///
/// **Algorithm:**
/// 1. Skip non-standard rules (chess960, bughouse, ...)
/// 2. Parse the embedded PGN for moves and tags
/// 3. Overlay JSON fields: id, players, ratings, result, clock, accuracies
fn convert_game(game: &ChessComGame, record_id: Uuid) -> DecodedGame {
    let json_id = game
        .url
        .as_deref()
        .and_then(game_id_from_url)
        .or_else(|| game.uuid.as_deref().map(|u| GameRow::qualified_id(Platform::Chesscom, u)));

    if let Some(rules) = game.rules.as_deref() {
        if rules != "chess" {
            return DecodedGame::Skipped {
                reference: json_id.unwrap_or_else(|| game.white.username.clone()),
                reason: format!("rules '{}'", rules),
            };
        }
    }

    let mut row = match game.pgn.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(pgn) => {
            let parsed = match parse_games(pgn) {
                Ok(parsed) => parsed,
                Err(e) => {
                    return DecodedGame::Malformed {
                        game_id: json_id,
                        reason: format!("embedded PGN: {}", e),
                        raw: pgn.to_string(),
                    }
                }
            };
            match parsed.first().map(|g| pgn_game::row_from_pgn(Platform::Chesscom, g, record_id)) {
                Some(DecodedGame::Row(row)) => *row,
                Some(other) => return other,
                None => {
                    return DecodedGame::Malformed {
                        game_id: json_id,
                        reason: "embedded PGN holds no game".to_string(),
                        raw: pgn.to_string(),
                    }
                }
            }
        }
        None => GameRow::new(
            String::new(),
            Platform::Chesscom,
            game.white.username.clone(),
            game.black.username.clone(),
            record_id,
        ),
    };

    if let Some(id) = json_id {
        row.game_id = id;
    } else if row.game_id.is_empty() {
        return DecodedGame::Malformed {
            game_id: None,
            reason: "game has neither url, uuid nor PGN".to_string(),
            raw: serde_json::to_string(&row).unwrap_or_default(),
        };
    }

    row.white = game.white.username.clone();
    row.black = game.black.username.clone();
    row.white_rating = game.white.rating.or(row.white_rating);
    row.black_rating = game.black.rating.or(row.black_rating);

    let (result, termination) = side_result(
        game.white.result.as_deref().unwrap_or_default(),
        game.black.result.as_deref().unwrap_or_default(),
    );
    if result != GameResult::Unknown {
        row.result = result;
    }
    if termination.is_some() {
        row.termination = termination;
    }

    if let Some(tc) = game.time_control.as_deref() {
        row.time_control = Some(tc.to_string());
    }
    row.time_class = game
        .time_class
        .as_deref()
        .and_then(TimeClass::from_label)
        .unwrap_or_else(|| {
            row.time_control
                .as_deref()
                .map(TimeClass::from_time_control)
                .unwrap_or(row.time_class)
        });
    row.rated = game.rated.or(row.rated);

    if row.opening_name.is_none() {
        row.opening_name = game.eco.as_deref().and_then(opening_from_eco_url);
    }

    row.started_at = game.start_time.and_then(time::from_unix_seconds).or(row.started_at);
    row.ended_at = game.end_time.and_then(time::from_unix_seconds).or(row.ended_at);

    if let Some(acc) = &game.accuracies {
        row.white_accuracy = acc.white;
        row.black_accuracy = acc.black;
    }

    DecodedGame::row(row)
}

/// Overall result and termination code from the two side results
///
/// The winner's side reads `win`; the loser's side carries the reason
/// (`checkmated`, `resigned`, `timeout`, ...). Draws carry the draw reason
/// on both sides.
pub fn side_result(white: &str, black: &str) -> (GameResult, Option<String>) {
    let code = |s: &str| (!s.is_empty()).then(|| s.to_string());
    if white == "win" {
        (GameResult::WhiteWin, code(black))
    } else if black == "win" {
        (GameResult::BlackWin, code(white))
    } else if DRAW_CODES.contains(&white) {
        (GameResult::Draw, code(white))
    } else if DRAW_CODES.contains(&black) {
        (GameResult::Draw, code(black))
    } else {
        (GameResult::Unknown, None)
    }
}

/// Opening name from an `ECOUrl` slug
///
/// `.../openings/Sicilian-Defense-Old-Sicilian-2...Nc6` → `Sicilian Defense Old Sicilian`.
/// The slug stops at the first word that starts with a move number.
pub fn opening_from_eco_url(url: &str) -> Option<String> {
    let slug = url_id(url)?;
    let words: Vec<&str> = slug
        .split('-')
        .take_while(|w| !w.starts_with(|c: char| c.is_ascii_digit()))
        .filter(|w| !w.is_empty())
        .collect();

    (!words.is_empty()).then(|| words.join(" "))
}

/// Rating snapshot from a stats payload
///
/// Ratings come from `chess_{bullet,blitz,rapid}.last.rating`; Chess.com has
/// no classical pool. Counts are summed over every `record` block, daily
/// included.
/// Stats payload as a rating snapshot
///
/// Observed at the payload's own [`ChessComStats::data_date`], capped at
/// `ingested_at`; `ingested_at` when no time class carries a date.
pub fn snapshot_from_stats(
    payload: &str,
    username: &str,
    ingested_at: DateTime<Utc>,
) -> Result<RatingSnapshot> {
    if !payload.trim_start().starts_with('{') {
        return Err(Error::Parse("Chess.com stats payload is not an object".to_string()));
    }
    let stats: ChessComStats = serde_json::from_str(payload)?;

    let rating = |block: &Option<ChessComStatBlock>| {
        block.as_ref().and_then(|b| b.last.as_ref()).map(|p| p.rating)
    };

    let mut attributes = RatingAttributes {
        rating_blitz: rating(&stats.chess_blitz),
        rating_rapid: rating(&stats.chess_rapid),
        rating_bullet: rating(&stats.chess_bullet),
        rating_classical: None,
        ..Default::default()
    };

    for block in stats.blocks() {
        if let Some(record) = &block.record {
            attributes.wins += record.win;
            attributes.losses += record.loss;
            attributes.draws += record.draw;
        }
    }
    attributes.games_played = attributes.wins + attributes.losses + attributes.draws;

    let observed_at = stats
        .data_date()
        .map_or(ingested_at, |date| date.min(ingested_at));

    Ok(RatingSnapshot::new(Platform::Chesscom, username, attributes, observed_at))
}
