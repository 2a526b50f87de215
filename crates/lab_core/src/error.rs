use thiserror::Error;

use crate::{IngredientId, Turn};

/// Errors produced by the pure game functions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// Malformed input the caller can fix (non-positive quantity, oversize order).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A game rule was broken. Recoverable: the player corrects state and retries.
    #[error(transparent)]
    Violation(#[from] Violation),
    #[error("{kind} not found: {id}")]
    ObjectNotFound { kind: &'static str, id: String },
    /// Attempted to create a uniquely keyed entity twice.
    #[error("{kind} already exists: {id}")]
    Integrity { kind: &'static str, id: String },
}

impl GameError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::ObjectNotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// The game-logic family of failures. These are the only errors that are
/// turned into user-facing messages instead of propagating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("not enough cash: need {required}, have {available}")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("not enough {ingredient}: need {required}, have {available}")]
    InsufficientIngredients {
        ingredient: IngredientId,
        required: u64,
        available: u64,
    },
    #[error("battery is empty")]
    InsufficientBattery,
    #[error("this action belongs to the {expected} turn, but the current turn is {actual}")]
    WrongTurn { expected: Turn, actual: Turn },
    #[error("finish the current research before starting another")]
    UnfinishedResearchExists,
    #[error("claim the reward for the finished research before starting another")]
    UnrewardedResearchExists,
    #[error("there is no research in progress")]
    NoUnfinishedResearch,
    #[error("there is no finished research awaiting its reward")]
    NoUnrewardedResearch,
    #[error("research is already finished")]
    AlreadyFinished,
    #[error("reward was already received")]
    AlreadyRewarded,
    #[error("research is not finished yet")]
    NotFinished,
    #[error("problem {0} was not offered this turn")]
    NotOffered(String),
}
