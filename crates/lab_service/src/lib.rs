//! `lab_service`: the Progression Service and the collaborators it talks to.
//!
//! The service loads a player's ledger, laboratory and turn, runs one
//! `lab_core::apply` transaction, and commits the three together. Domain
//! rule violations come back as [`Outcome::Rejected`]; everything else is a
//! [`ServiceError`].

mod clock;
mod collaborators;
mod error;
mod outcome;
mod repository;
mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    CatalogError, Identity, IdentityProvider, ProblemCatalog, StaticProblemCatalog,
    StaticSubmissionTracker, SubmissionEntry, SubmissionTracker, TrackerError, Unauthenticated,
};
pub use error::ServiceError;
pub use outcome::{Outcome, Rejection};
pub use repository::{
    is_valid_player_key, JsonFileRepository, LaboratoryRepository, LedgerRepository,
    MemoryRepository, PlayerRepository, PlayerSnapshot, RepoError, TurnRepository,
    MAX_PLAYER_KEY_LEN,
};
pub use service::{Collaborators, PlayerView, ProgressionService, Step};
