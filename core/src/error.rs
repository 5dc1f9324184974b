use thiserror::Error;

use crate::Variant;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Invalid coordinates")]
    InvalidCoords,
    #[error("No puzzles registered for variant {0}")]
    NoPuzzlesForVariant(Variant),
    #[error("Puzzle {id} declares {declared} targets but lists {actual}")]
    TargetCountMismatch {
        id: String,
        declared: usize,
        actual: usize,
    },
    #[error("Puzzle {0} lists the same target twice")]
    DuplicateTarget(String),
    #[error("Puzzle {0} has no filler symbols")]
    MissingFiller(String),
    #[error("Board shape does not match declared size")]
    InvalidBoardShape,
    #[error("A session is already running")]
    SessionActive,
    #[error("Session already ended, reset before starting again")]
    AlreadyEnded,
    #[error("Session is not accepting moves")]
    NotPlaying,
    #[error("Interaction does not match the puzzle layout")]
    UnsupportedInteraction,
}

pub type Result<T> = core::result::Result<T, GameError>;
