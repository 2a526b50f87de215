use lab_core::{GameError, PlayerId};
use thiserror::Error;

use crate::{CatalogError, RepoError, Unauthenticated};

/// Failures that are not game-rule rejections. These surface as hard errors
/// (4xx for caller mistakes, 5xx for infrastructure).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Unauthenticated(#[from] Unauthenticated),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{kind} already exists: {id}")]
    Integrity { kind: &'static str, id: String },
    /// Someone else committed for this player between our load and commit.
    #[error("concurrent update for player {0}")]
    Conflict(PlayerId),
    #[error("repository failure: {0}")]
    Repository(RepoError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl From<RepoError> for ServiceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Conflict { player, .. } => ServiceError::Conflict(player),
            RepoError::AlreadyExists(player) => ServiceError::Integrity {
                kind: "player",
                id: player.to_string(),
            },
            other => ServiceError::Repository(other),
        }
    }
}

impl From<GameError> for ServiceError {
    /// The service turns violations into rejections first; any that get
    /// here are reported as invalid arguments.
    fn from(err: GameError) -> Self {
        match err {
            GameError::InvalidArgument(message) => ServiceError::InvalidArgument(message),
            GameError::ObjectNotFound { kind, id } => ServiceError::NotFound { kind, id },
            GameError::Integrity { kind, id } => ServiceError::Integrity { kind, id },
            GameError::Violation(violation) => ServiceError::InvalidArgument(violation.to_string()),
        }
    }
}
