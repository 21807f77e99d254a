use thiserror::Error;

use crate::board::{Color, Square};

/// Errors raised by the rules engine and its notation layers.
///
/// None of these are fatal to the host: every variant describes a single
/// rejected request that the caller can re-prompt, skip or end the game on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("malformed notation `{token}`: {reason}")]
    MalformedNotation { token: String, reason: String },

    #[error("notation `{token}` matches {candidates} pieces, expected exactly one")]
    Ambiguous { token: String, candidates: usize },

    #[error("malformed game record: {0}")]
    MalformedRecord(String),

    #[error("illegal move from {from} to {to}")]
    IllegalMove { from: Square, to: Square },

    #[error("no piece on {0}")]
    NoPiece(Square),

    #[error("it is not {color:?}'s turn")]
    OutOfTurn { color: Color },

    #[error("the game is already over")]
    GameOver,

    #[error("piece on {0} cannot be promoted to that kind")]
    InvalidPromotion(Square),

    #[error("pawn on {0} must be promoted before the turn passes")]
    PromotionPending(Square),

    #[error("{0:?} has no legal moves")]
    NoLegalMoves(Color),

    #[error("invalid square `{0}`")]
    InvalidSquare(String),

    #[error("square {0} is already occupied")]
    SquareOccupied(Square),

    #[error("{0:?} already has a king")]
    DuplicateKing(Color),

    #[error("{0:?} roster is full")]
    RosterFull(Color),

    #[error("kings cannot be removed from the board")]
    KingRemoval,

    #[error("unknown command `{0}`")]
    UnknownCommand(String),
}

impl EngineError {
    /// Errors that abandon the rest of a recorded game without failing the batch.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            EngineError::MalformedNotation { .. }
                | EngineError::Ambiguous { .. }
                | EngineError::MalformedRecord(_)
                | EngineError::IllegalMove { .. }
                | EngineError::OutOfTurn { .. }
                | EngineError::GameOver
                | EngineError::InvalidPromotion(_)
                | EngineError::PromotionPending(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
