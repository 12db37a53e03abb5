//! SAN replay from the standard starting position

use super::PgnError;
use chess::{Board, BoardStatus, ChessMove};

/// Outcome of replaying a mainline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    pub plies: usize,
    /// Position after the last move, as FEN
    pub final_fen: String,
    pub checkmate: bool,
    pub stalemate: bool,
}

/// Replay SAN moves; fails on the first illegal or unparseable ply (1-based)
pub fn replay<S: AsRef<str>>(moves: &[S]) -> Result<Replay, PgnError> {
    let mut board = Board::default();

    for (idx, san) in moves.iter().enumerate() {
        let san = san.as_ref();
        let illegal = || PgnError::IllegalMove {
            ply: idx + 1,
            san: san.to_string(),
        };

        let bare = san.trim_end_matches(['+', '#']);
        let mv = ChessMove::from_san(&board, bare).map_err(|_| illegal())?;
        if !board.legal(mv) {
            return Err(illegal());
        }
        board = board.make_move_new(mv);
    }

    let status = board.status();
    Ok(Replay {
        plies: moves.len(),
        final_fen: board.to_string(),
        checkmate: status == BoardStatus::Checkmate,
        stalemate: status == BoardStatus::Stalemate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scholars_mate() {
        let moves = ["e4", "e5", "Bc4", "Nc6", "Qh5", "Nf6", "Qxf7#"];
        let result = replay(&moves).unwrap();
        assert_eq!(result.plies, 7);
        assert!(result.checkmate);
        assert!(!result.stalemate);
    }

    #[test]
    fn test_castling_replays() {
        let moves = ["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5", "O-O", "Nf6"];
        let result = replay(&moves).unwrap();
        assert_eq!(result.plies, 8);
        assert!(!result.checkmate);
        assert!(result.final_fen.starts_with("r1bqk2r/pppp1ppp/2n2n2/2b1p3/2B1P3/5N2/PPPP1PPP/RNBQ1RK1 w kq"));
    }

    #[test]
    fn test_illegal_move_reports_ply() {
        let moves = ["e4", "e5", "Ke3"];
        assert_eq!(
            replay(&moves).unwrap_err(),
            PgnError::IllegalMove {
                ply: 3,
                san: "Ke3".to_string()
            }
        );
    }

    #[test]
    fn test_empty_mainline_is_start_position() {
        let result = replay::<&str>(&[]).unwrap();
        assert_eq!(result.plies, 0);
        assert!(result.final_fen.starts_with("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq"));
    }
}
