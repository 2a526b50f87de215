//! `lab_core`: turn-gated progression rules for the forge-and-research game.
//!
//! No IO, no clock. Callers pass the current time and an Rng.

mod catalog;
mod engine;
mod error;
mod id;
mod laboratory;
mod ledger;
mod research;
pub mod sampling;
mod turn;
mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;

pub use catalog::bucket_for_rank;
pub use engine::{apply, Action, OrderLine, PlayerState, Report, Sale, Transition};
pub use error::{GameError, Violation};
pub use id::{generate_research_id, generate_uuid};
pub use laboratory::{Laboratory, LaboratoryRecords};
pub use ledger::Ledger;
pub use research::{Growth, Research, ResearchStage};
pub use turn::{Turn, TURNS};
pub use types::*;
