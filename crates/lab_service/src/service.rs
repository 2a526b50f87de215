//! The Progression Service: one method per player-facing operation.
//!
//! Each call loads the player's state (creating defaults on first access),
//! runs the phase action through `lab_core::apply`, and commits ledger,
//! laboratory and turn together against the revision it loaded.

use lab_core::{
    apply, Action, GameContent, GameError, IngredientId, Ledger, OrderLine, PlayerId,
    PlayerState, ProblemId, ProblemSnapshot, ProductId, Report, Research, SubmissionStatus, Turn,
    UserHandle,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    Clock, Outcome, PlayerRepository, ProblemCatalog, RepoError, ServiceError, SubmissionTracker,
};

/// A concurrent first access can race our default initialization once.
const INIT_ATTEMPTS: usize = 2;

fn fnv1a64(bytes: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash = (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Seed for one transaction. Draws depend only on the service seed, the
/// player, and the revision the transaction starts from.
fn transaction_seed(seed: u64, player: &PlayerId, revision: u64) -> u64 {
    let mut buf = Vec::with_capacity(player.as_str().len() + 20);
    buf.extend_from_slice(b"LAB-");
    buf.extend_from_slice(&seed.to_le_bytes());
    buf.extend_from_slice(player.as_str().as_bytes());
    buf.extend_from_slice(&revision.to_le_bytes());
    fnv1a64(&buf)
}

pub struct Collaborators {
    pub repository: Arc<dyn PlayerRepository>,
    pub catalog: Arc<dyn ProblemCatalog>,
    pub tracker: Arc<dyn SubmissionTracker>,
    pub clock: Arc<dyn Clock>,
}

/// What a player sees: stored state plus the derived laboratory metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerView {
    pub player: PlayerId,
    pub ledger: Ledger,
    pub turn: Turn,
    pub battery_capacity: f64,
    pub battery_charge: u32,
    pub performance: f64,
    pub researcher_rank: f64,
    pub active_research: Option<Research>,
    pub candidates: Vec<ProblemSnapshot>,
    pub completed_research: usize,
}

impl PlayerView {
    pub fn of(player: &PlayerId, state: &PlayerState, content: &GameContent) -> Self {
        let constants = &content.constants;
        let lab = &state.laboratory;
        Self {
            player: player.clone(),
            ledger: state.ledger.clone(),
            turn: state.turn,
            battery_capacity: lab.battery_capacity(constants),
            battery_charge: lab.battery_charge(constants),
            performance: lab.performance(constants),
            researcher_rank: lab.researcher_rank(constants.rank_window),
            active_research: lab.active().cloned(),
            candidates: lab.candidates().to_vec(),
            completed_research: lab.records().filter(|r| r.is_rewarded()).count(),
        }
    }
}

/// An applied action: what happened and where the player stands now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub report: Report,
    pub view: PlayerView,
}

struct Loaded {
    revision: u64,
    state: PlayerState,
}

pub struct ProgressionService {
    content: Arc<GameContent>,
    repository: Arc<dyn PlayerRepository>,
    catalog: Arc<dyn ProblemCatalog>,
    tracker: Arc<dyn SubmissionTracker>,
    clock: Arc<dyn Clock>,
    seed: u64,
}

impl ProgressionService {
    pub fn new(content: Arc<GameContent>, collaborators: Collaborators, seed: u64) -> Self {
        Self {
            content,
            repository: collaborators.repository,
            catalog: collaborators.catalog,
            tracker: collaborators.tracker,
            clock: collaborators.clock,
            seed,
        }
    }

    pub fn content(&self) -> &GameContent {
        &self.content
    }

    pub async fn state(&self, player: &PlayerId) -> Result<PlayerView, ServiceError> {
        let loaded = self.load(player).await?;
        Ok(PlayerView::of(player, &loaded.state, &self.content))
    }

    pub async fn buy_ingredients(
        &self,
        player: &PlayerId,
        order: Vec<OrderLine<IngredientId>>,
    ) -> Result<Outcome<Step>, ServiceError> {
        let loaded = self.load(player).await?;
        self.run(player, loaded, vec![Action::BuyIngredients { order }])
            .await
    }

    pub async fn forge_and_sell(
        &self,
        player: &PlayerId,
        order: Vec<OrderLine<ProductId>>,
    ) -> Result<Outcome<Step>, ServiceError> {
        let loaded = self.load(player).await?;
        self.run(player, loaded, vec![Action::ForgeAndSell { order }])
            .await
    }

    /// Offer problems from the bucket matching the player's rank. An
    /// existing offer is returned as is, without asking the catalog.
    pub async fn offer_candidates(
        &self,
        player: &PlayerId,
    ) -> Result<Outcome<Step>, ServiceError> {
        let loaded = self.load(player).await?;
        let lab = &loaded.state.laboratory;
        let pool = if loaded.state.turn == Turn::SelectProblems && lab.candidates().is_empty() {
            let rank = lab.researcher_rank(self.content.constants.rank_window);
            self.catalog.find_by_difficulty_bucket(rank).await?
        } else {
            Vec::new()
        };
        self.run(player, loaded, vec![Action::OfferCandidates { pool }])
            .await
    }

    pub async fn select_problem(
        &self,
        player: &PlayerId,
        problem_id: ProblemId,
    ) -> Result<Outcome<Step>, ServiceError> {
        let loaded = self.load(player).await?;
        self.run(player, loaded, vec![Action::SelectProblem { problem_id }])
            .await
    }

    /// Poll the tracker for the research in progress and record whatever
    /// it reports.
    pub async fn refresh_submissions(
        &self,
        player: &PlayerId,
        handle: &UserHandle,
    ) -> Result<Outcome<Step>, ServiceError> {
        let loaded = self.load(player).await?;
        let status = self.poll(handle, &loaded.state).await;
        self.run(player, loaded, vec![Action::RecordSubmission { status }])
            .await
    }

    /// End the research in progress, solved or not. The tracker gets one
    /// last look first so a late solve still counts.
    pub async fn finish_research(
        &self,
        player: &PlayerId,
        handle: &UserHandle,
    ) -> Result<Outcome<Step>, ServiceError> {
        let loaded = self.load(player).await?;
        let mut actions = Vec::with_capacity(2);
        if loaded.state.turn == Turn::SolveProblems && loaded.state.laboratory.unfinished().is_some()
        {
            let status = self.poll(handle, &loaded.state).await;
            actions.push(Action::RecordSubmission { status });
        }
        actions.push(Action::FinishResearch);
        self.run(player, loaded, actions).await
    }

    pub async fn show_answer(&self, player: &PlayerId) -> Result<Outcome<Step>, ServiceError> {
        let loaded = self.load(player).await?;
        self.run(player, loaded, vec![Action::ShowAnswer]).await
    }

    pub async fn claim_reward(&self, player: &PlayerId) -> Result<Outcome<Step>, ServiceError> {
        let loaded = self.load(player).await?;
        self.run(player, loaded, vec![Action::ClaimReward]).await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Load all three entities in one read, storing defaults for any that
    /// are missing.
    async fn load(&self, player: &PlayerId) -> Result<Loaded, ServiceError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let snapshot = self.repository.snapshot(player).await?;
            let missing = snapshot.ledger.is_none()
                || snapshot.laboratory.is_none()
                || snapshot.turn.is_none();
            let state = PlayerState {
                ledger: snapshot
                    .ledger
                    .unwrap_or_else(|| Ledger::starting(&self.content.constants)),
                laboratory: snapshot.laboratory.unwrap_or_default(),
                turn: snapshot.turn.unwrap_or_default(),
            };
            if !missing {
                return Ok(Loaded {
                    revision: snapshot.revision,
                    state,
                });
            }
            match self.repository.commit(player, snapshot.revision, &state).await {
                Ok(revision) => {
                    info!(player = %player, "initialized player state");
                    return Ok(Loaded { revision, state });
                }
                Err(RepoError::AlreadyExists(_) | RepoError::Conflict { .. })
                    if attempt < INIT_ATTEMPTS => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Apply `actions` in order as one transaction. A violation in any of
    /// them rejects the whole batch and nothing is written.
    async fn run(
        &self,
        player: &PlayerId,
        loaded: Loaded,
        actions: Vec<Action>,
    ) -> Result<Outcome<Step>, ServiceError> {
        let now = self.clock.now();
        let mut state = loaded.state;
        let mut changed = false;
        let mut last = None;
        let mut rng =
            ChaCha8Rng::seed_from_u64(transaction_seed(self.seed, player, loaded.revision));
        for action in actions {
            match apply(&state, player, &action, &self.content, &mut rng, now) {
                Ok(transition) => {
                    changed |= transition.changed;
                    state = transition.state;
                    last = Some((action, transition.report));
                }
                Err(GameError::Violation(violation)) => {
                    debug!(
                        player = %player,
                        action = action.label(),
                        reason = %violation,
                        "action rejected"
                    );
                    return Ok(Outcome::rejected(violation));
                }
                Err(err) => return Err(err.into()),
            }
        }
        let Some((action, report)) = last else {
            return Err(ServiceError::InvalidArgument("no action to apply".to_string()));
        };
        if changed {
            self.repository
                .commit(player, loaded.revision, &state)
                .await?;
        }
        info!(
            player = %player,
            action = action.label(),
            turn = %state.turn,
            changed,
            "action applied"
        );
        Ok(Outcome::Applied(Step {
            report,
            view: PlayerView::of(player, &state, &self.content),
        }))
    }

    /// Ask the tracker about the research in progress. Skipped once both
    /// timestamps are known; a tracker failure reads as "nothing new".
    async fn poll(&self, handle: &UserHandle, state: &PlayerState) -> SubmissionStatus {
        let Some(research) = state.laboratory.unfinished() else {
            return SubmissionStatus::default();
        };
        if research.submitted_at.is_some() && research.solved_at.is_some() {
            return SubmissionStatus::default();
        }
        let since = research.created_at.timestamp();
        match self
            .tracker
            .first_solve_and_submit_time(&research.problem.id, handle, since)
            .await
        {
            Ok(status) => status,
            Err(err) => {
                warn!(
                    problem = %research.problem.id,
                    handle = %handle,
                    "submission lookup failed: {err}"
                );
                SubmissionStatus::default()
            }
        }
    }
}
