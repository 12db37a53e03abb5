//! PGN exports into game rows
//!
//! Both platforms export PGN with slightly different tag sets:
//! - Chess.com: `Link` (game URL), `ECOUrl`, `EndDate`/`EndTime`
//! - Lichess: `Site` (game URL), `GameId`, `Opening`, `Variant`
//!
//! Everything else (`White`, `WhiteElo`, `Result`, `TimeControl`, `UTCDate`,
//! `UTCTime`, `ECO`, `Termination`) is shared.

use super::{chesscom, url_id, DecodedGame};
use crate::models::{GameResult, GameRow, TimeClass};
use crate::pgn::{parse_games, PgnGame};
use chesslake_common::hash::sha256_hex;
use chesslake_common::{Platform, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

/// Lichess game ids are 8 characters; player links append 4 more
const LICHESS_ID_LEN: usize = 8;

/// Decode a PGN document of one or more games
pub fn decode_document(platform: Platform, payload: &str, record_id: Uuid) -> Result<Vec<DecodedGame>> {
    let games = parse_games(payload)?;
    Ok(games
        .iter()
        .map(|game| row_from_pgn(platform, game, record_id))
        .collect())
}

/// Convert one parsed PGN game
pub fn row_from_pgn(platform: Platform, game: &PgnGame, record_id: Uuid) -> DecodedGame {
    let game_id = game_id(platform, game);

    if let Some(variant) = game.known_tag("Variant") {
        if !variant.eq_ignore_ascii_case("standard") {
            return DecodedGame::Skipped {
                reference: game_id,
                reason: format!("variant '{}'", variant),
            };
        }
    }
    if game.known_tag("FEN").is_some() || game.known_tag("SetUp") == Some("1") {
        return DecodedGame::Skipped {
            reference: game_id,
            reason: "custom starting position".to_string(),
        };
    }

    let white = game.known_tag("White").unwrap_or_default();
    let black = game.known_tag("Black").unwrap_or_default();
    let mut row = GameRow::new(game_id, platform, white, black, record_id);

    row.white_rating = game.known_tag("WhiteElo").and_then(|v| v.parse().ok());
    row.black_rating = game.known_tag("BlackElo").and_then(|v| v.parse().ok());
    row.result = game
        .known_tag("Result")
        .or(game.result.as_deref())
        .map(GameResult::from_pgn)
        .unwrap_or(GameResult::Unknown);
    row.termination = game.known_tag("Termination").map(str::to_string);
    row.time_control = game.known_tag("TimeControl").map(str::to_string);
    row.time_class = time_class(game);
    row.rated = game.known_tag("Event").and_then(rated_from_event);
    row.eco = game.known_tag("ECO").map(str::to_string);
    row.opening_name = game
        .known_tag("Opening")
        .map(str::to_string)
        .or_else(|| game.known_tag("ECOUrl").and_then(chesscom::opening_from_eco_url));
    row.moves = game.moves.clone();
    row.started_at = tag_timestamp(game, "UTCDate", "UTCTime")
        .or_else(|| tag_timestamp(game, "Date", "StartTime"));
    row.ended_at = tag_timestamp(game, "EndDate", "EndTime");

    DecodedGame::row(row)
}

/// Platform-qualified id from the game URL, or a content hash
fn game_id(platform: Platform, game: &PgnGame) -> String {
    let id = match platform {
        Platform::Chesscom => game.known_tag("Link").and_then(url_id),
        Platform::Lichess => game
            .known_tag("GameId")
            .map(str::to_string)
            .or_else(|| game.known_tag("Site").and_then(url_id))
            .map(|id| {
                if id.len() > LICHESS_ID_LEN && id.is_ascii() {
                    id[..LICHESS_ID_LEN].to_string()
                } else {
                    id
                }
            }),
    };

    match id {
        Some(id) => GameRow::qualified_id(platform, &id),
        None => fallback_id(platform, game),
    }
}

/// `<platform>:sha256:<16 hex>` over tags and movetext
pub(crate) fn fallback_id(platform: Platform, game: &PgnGame) -> String {
    let mut content = String::new();
    for (name, value) in &game.tags {
        content.push_str(name);
        content.push('=');
        content.push_str(value);
        content.push('\n');
    }
    content.push_str(&game.movetext());
    let digest = sha256_hex(content.as_bytes());
    format!("{}:sha256:{}", platform, &digest[..16])
}

/// Speed label from the event name (`Rated Blitz game`), else the clock
fn time_class(game: &PgnGame) -> TimeClass {
    let from_event = game
        .known_tag("Event")
        .and_then(|event| event.split_whitespace().find_map(TimeClass::from_label));

    from_event.unwrap_or_else(|| {
        game.known_tag("TimeControl")
            .map(TimeClass::from_time_control)
            .unwrap_or(TimeClass::Unknown)
    })
}

fn rated_from_event(event: &str) -> Option<bool> {
    let event = event.to_ascii_lowercase();
    if event.starts_with("rated") {
        Some(true)
    } else if event.starts_with("casual") {
        Some(false)
    } else {
        None
    }
}

/// `YYYY.MM.DD` + `HH:MM:SS` tag pair as UTC
fn tag_timestamp(game: &PgnGame, date_tag: &str, time_tag: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(game.known_tag(date_tag)?, "%Y.%m.%d").ok()?;
    let time = NaiveTime::parse_from_str(game.known_tag(time_tag)?, "%H:%M:%S").ok()?;
    Some(NaiveDateTime::new(date, time).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LICHESS_PGN: &str = r#"[Event "Rated Blitz game"]
[Site "https://lichess.org/q7ZvsdUF"]
[Date "2024.05.01"]
[White "alice_lc"]
[Black "bob"]
[Result "1-0"]
[UTCDate "2024.05.01"]
[UTCTime "18:30:05"]
[WhiteElo "1512"]
[BlackElo "1498"]
[Variant "Standard"]
[TimeControl "180+2"]
[ECO "C50"]
[Opening "Italian Game"]
[Termination "Normal"]

1. e4 e5 2. Bc4 Nc6 3. Qh5 Nf6?? 4. Qxf7# 1-0

[Event "Casual Chess960 game"]
[Site "https://lichess.org/abcdEFGH"]
[White "alice_lc"]
[Black "carol"]
[Result "0-1"]
[Variant "Chess960"]

1. e4 e5 0-1
"#;

    fn decode(platform: Platform, text: &str) -> Vec<DecodedGame> {
        decode_document(platform, text, Uuid::nil()).unwrap()
    }

    #[test]
    fn test_lichess_export() {
        let decoded = decode(Platform::Lichess, LICHESS_PGN);
        assert_eq!(decoded.len(), 2);

        let DecodedGame::Row(row) = &decoded[0] else {
            panic!("expected a row, got {:?}", decoded[0]);
        };
        assert_eq!(row.game_id, "lichess:q7ZvsdUF");
        assert_eq!(row.white, "alice_lc");
        assert_eq!(row.white_rating, Some(1512));
        assert_eq!(row.result, GameResult::WhiteWin);
        assert_eq!(row.time_class, TimeClass::Blitz);
        assert_eq!(row.rated, Some(true));
        assert_eq!(row.opening_name.as_deref(), Some("Italian Game"));
        assert_eq!(row.ply_count(), 7);
        assert_eq!(
            row.started_at.map(|t| t.to_rfc3339()),
            Some("2024-05-01T18:30:05+00:00".to_string())
        );

        assert!(matches!(&decoded[1], DecodedGame::Skipped { reason, .. } if reason.contains("Chess960")));
    }

    #[test]
    fn test_chesscom_export_uses_link_and_eco_url() {
        let pgn = r#"[Event "Live Chess"]
[Site "Chess.com"]
[White "Alice"]
[Black "Dave"]
[Result "1/2-1/2"]
[ECO "B30"]
[ECOUrl "https://www.chess.com/openings/Sicilian-Defense-Old-Sicilian-2...Nc6"]
[TimeControl "600"]
[EndDate "2024.05.02"]
[EndTime "10:15:00"]
[Link "https://www.chess.com/game/live/108866"]

1. e4 c5 2. Nf3 Nc6 1/2-1/2
"#;
        let decoded = decode(Platform::Chesscom, pgn);
        let DecodedGame::Row(row) = &decoded[0] else {
            panic!("expected a row");
        };
        assert_eq!(row.game_id, "chesscom:108866");
        assert_eq!(row.result, GameResult::Draw);
        assert_eq!(row.time_class, TimeClass::Rapid);
        assert_eq!(row.rated, None);
        assert_eq!(row.opening_name.as_deref(), Some("Sicilian Defense Old Sicilian"));
        assert!(row.ended_at.is_some());
    }

    #[test]
    fn test_oversized_time_control_decodes() {
        let pgn = "[White \"a\"]\n[Black \"b\"]\n[TimeControl \"1+461168601842738791\"]\n\n1. d4 d5 *\n";
        let decoded = decode(Platform::Lichess, pgn);
        let DecodedGame::Row(row) = &decoded[0] else {
            panic!("expected a row, got {:?}", decoded[0]);
        };
        assert_eq!(row.time_class, TimeClass::Classical);
    }

    #[test]
    fn test_fallback_id_is_stable_hash() {
        let pgn = "[White \"a\"]\n[Black \"b\"]\n\n1. d4 d5 *\n";
        let first = decode(Platform::Lichess, pgn);
        let second = decode(Platform::Lichess, pgn);
        let (DecodedGame::Row(a), DecodedGame::Row(b)) = (&first[0], &second[0]) else {
            panic!("expected rows");
        };
        assert!(a.game_id.starts_with("lichess:sha256:"));
        assert_eq!(a.game_id.len(), "lichess:sha256:".len() + 16);
        assert_eq!(a.game_id, b.game_id);
        assert_eq!(a.result, GameResult::Unknown);
    }

    #[test]
    fn test_lichess_player_link_is_truncated() {
        let pgn = "[Site \"https://lichess.org/q7ZvsdUFxY12\"]\n[White \"a\"]\n[Black \"b\"]\n\n1. e4 *\n";
        let DecodedGame::Row(row) = &decode(Platform::Lichess, pgn)[0] else {
            panic!("expected a row");
        };
        assert_eq!(row.game_id, "lichess:q7ZvsdUF");
    }

    #[test]
    fn test_empty_document_is_error() {
        assert!(decode_document(Platform::Lichess, "   \n", Uuid::nil()).is_err());
    }
}
