//! Scripted players for the progression service.
//!
//! [`Autoplayer`] decides one action at a time from a [`PlayerView`];
//! [`play_cycle`] drives it through a full five-turn cycle. [`SimulatedJudge`]
//! stands in for the external submission tracker, and [`SteppingClock`]
//! moves time forward on every read so runs are reproducible.

use async_trait::async_trait;
use chrono::Duration;
use lab_core::{
    Action, GameContent, IngredientId, OrderLine, ProblemId, ProblemSnapshot, ProductDef,
    ProductId, Report, SubmissionStatus, Timestamp, Turn, UserHandle,
};
use lab_service::{
    Clock, Identity, Outcome, PlayerView, ProgressionService, Rejection, ServiceError, Step,
    SubmissionTracker, TrackerError,
};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Upper bound on actions per cycle; a healthy cycle needs at most eight.
const MAX_STEPS_PER_CYCLE: usize = 16;

pub trait ActionSource {
    fn next_action(&mut self, view: &PlayerView, content: &GameContent) -> Action;
}

/// Plays every phase with a fixed policy:
/// 1. Buy ingredients for the cheapest recipe, one item per battery charge.
/// 2. Forge whatever the stock and battery allow, most valuable first.
/// 3. Take the easiest offered problem.
/// 4. Finish (the service polls the tracker one last time).
/// 5. Read the answer if something was submitted, then claim the reward.
#[derive(Debug, Default, Clone, Copy)]
pub struct Autoplayer;

impl ActionSource for Autoplayer {
    fn next_action(&mut self, view: &PlayerView, content: &GameContent) -> Action {
        match view.turn {
            Turn::BuyIngredients => Action::BuyIngredients {
                order: purchase_plan(view, content),
            },
            Turn::ForgeSwords => Action::ForgeAndSell {
                order: forge_plan(view, content),
            },
            Turn::SelectProblems => match easiest(&view.candidates) {
                Some(problem) => Action::SelectProblem {
                    problem_id: problem.id.clone(),
                },
                None => Action::OfferCandidates { pool: Vec::new() },
            },
            Turn::SolveProblems => Action::FinishResearch,
            Turn::GetReward => {
                let review = view
                    .active_research
                    .as_ref()
                    .is_some_and(|r| r.submitted_at.is_some() && r.answer_shown_at.is_none());
                if review {
                    Action::ShowAnswer
                } else {
                    Action::ClaimReward
                }
            }
        }
    }
}

fn easiest(candidates: &[ProblemSnapshot]) -> Option<&ProblemSnapshot> {
    candidates
        .iter()
        .min_by_key(|p| (p.difficulty, p.id.clone()))
}

/// Cost of the ingredients still missing for `count` items of `product`.
fn shortfall(
    product: &ProductDef,
    count: u64,
    view: &PlayerView,
    content: &GameContent,
) -> Option<(u64, Vec<OrderLine<IngredientId>>)> {
    let mut cost = 0_u64;
    let mut order = Vec::new();
    for (ingredient, amount) in &product.recipe {
        let needed = u64::from(*amount).checked_mul(count)?;
        let missing = needed.saturating_sub(view.ledger.stock_of(ingredient));
        if missing == 0 {
            continue;
        }
        let price = content.ingredient(ingredient).ok()?.unit_price;
        cost = cost.checked_add(price.checked_mul(missing)?)?;
        order.push(OrderLine::new(
            ingredient.clone(),
            i64::try_from(missing).ok()?,
        ));
    }
    Some((cost, order))
}

fn recipe_cost(product: &ProductDef, content: &GameContent) -> u64 {
    product
        .recipe
        .iter()
        .map(|(id, amount)| {
            content
                .ingredient(id)
                .map_or(u64::MAX, |def| def.unit_price.saturating_mul(u64::from(*amount)))
        })
        .fold(0, u64::saturating_add)
}

fn purchase_plan(view: &PlayerView, content: &GameContent) -> Vec<OrderLine<IngredientId>> {
    let Some(product) = content
        .products
        .iter()
        .min_by_key(|p| (recipe_cost(p, content), p.id.clone()))
    else {
        return Vec::new();
    };
    let mut count = u64::from(view.ledger.battery);
    while count > 0 {
        if let Some((cost, order)) = shortfall(product, count, view, content) {
            if cost <= view.ledger.cash {
                return order;
            }
        }
        count -= 1;
    }
    Vec::new()
}

fn forge_plan(view: &PlayerView, content: &GameContent) -> Vec<OrderLine<ProductId>> {
    let mut products: Vec<&ProductDef> = content.products.iter().collect();
    products.sort_by(|a, b| b.price_mean.total_cmp(&a.price_mean).then(a.id.cmp(&b.id)));

    let mut stock: BTreeMap<IngredientId, u64> = view.ledger.stock.clone();
    let mut battery = u64::from(view.ledger.battery);
    let mut order = Vec::new();
    for product in products {
        let mut count = 0_u64;
        while battery > 0
            && product.recipe.iter().all(|(id, amount)| {
                stock.get(id).copied().unwrap_or(0) >= u64::from(*amount)
            })
        {
            for (id, amount) in &product.recipe {
                if let Some(held) = stock.get_mut(id) {
                    *held -= u64::from(*amount);
                }
            }
            battery -= 1;
            count += 1;
        }
        if count > 0 {
            if let Ok(quantity) = i64::try_from(count) {
                order.push(OrderLine::new(product.id.clone(), quantity));
            }
        }
    }
    order
}

/// Send `action` to the matching service operation.
pub async fn perform(
    service: &ProgressionService,
    identity: &Identity,
    action: Action,
) -> Result<Outcome<Step>, ServiceError> {
    let player = &identity.player;
    match action {
        Action::BuyIngredients { order } => service.buy_ingredients(player, order).await,
        Action::ForgeAndSell { order } => service.forge_and_sell(player, order).await,
        Action::OfferCandidates { .. } => service.offer_candidates(player).await,
        Action::SelectProblem { problem_id } => service.select_problem(player, problem_id).await,
        Action::RecordSubmission { .. } => {
            service.refresh_submissions(player, &identity.handle).await
        }
        Action::FinishResearch => service.finish_research(player, &identity.handle).await,
        Action::ShowAnswer => service.show_answer(player).await,
        Action::ClaimReward => service.claim_reward(player).await,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub actions: usize,
    pub earned: u64,
    pub solved: Option<bool>,
    /// Set when the cycle stopped on a rejected action.
    pub rejection: Option<Rejection>,
    pub view: PlayerView,
}

/// Play until a reward is claimed (or something is rejected).
pub async fn play_cycle(
    service: &ProgressionService,
    identity: &Identity,
    source: &mut impl ActionSource,
) -> Result<CycleSummary, ServiceError> {
    let mut view = service.state(&identity.player).await?;
    let mut summary = CycleSummary {
        actions: 0,
        earned: 0,
        solved: None,
        rejection: None,
        view: view.clone(),
    };
    for _ in 0..MAX_STEPS_PER_CYCLE {
        let action = source.next_action(&view, service.content());
        let claims = matches!(action, Action::ClaimReward);
        summary.actions += 1;
        match perform(service, identity, action).await? {
            Outcome::Applied(step) => {
                match &step.report {
                    Report::Sold { earned, .. } => summary.earned += earned,
                    Report::Finished { solved, .. } => summary.solved = Some(*solved),
                    _ => {}
                }
                view = step.view;
            }
            Outcome::Rejected { error } => {
                summary.rejection = Some(error);
                break;
            }
        }
        if claims {
            break;
        }
    }
    summary.view = view;
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Simulated judge
// ---------------------------------------------------------------------------

/// Chance that a player rated `skill` solves a problem of `difficulty`.
/// Elo-style: 50% at equal rating, 10:1 odds per 400 points.
pub fn solve_probability(skill: f64, difficulty: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf((f64::from(difficulty) - skill) / 400.0))
}

#[derive(Debug, Clone, Copy)]
struct Verdict {
    submitted_at: Timestamp,
    solved: bool,
}

/// Submission tracker that plays the contestant. The verdict for each
/// attempt (handle, problem, start time) is rolled on the first poll and
/// never changes.
pub struct SimulatedJudge {
    skill: f64,
    difficulties: HashMap<ProblemId, i32>,
    solve_after: Duration,
    rng: Mutex<ChaCha8Rng>,
    verdicts: Mutex<HashMap<(UserHandle, ProblemId, i64), Verdict>>,
}

impl SimulatedJudge {
    pub fn new(skill: f64, problems: &[ProblemSnapshot], seed: u64) -> Self {
        Self {
            skill,
            difficulties: problems.iter().map(|p| (p.id.clone(), p.difficulty)).collect(),
            solve_after: Duration::minutes(5),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            verdicts: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SubmissionTracker for SimulatedJudge {
    async fn first_solve_and_submit_time(
        &self,
        problem: &ProblemId,
        handle: &UserHandle,
        since_epoch_secs: i64,
    ) -> Result<SubmissionStatus, TrackerError> {
        let difficulty = *self
            .difficulties
            .get(problem)
            .ok_or_else(|| TrackerError::Unavailable(format!("unknown problem {problem}")))?;
        let since = Timestamp::from_timestamp(since_epoch_secs, 0)
            .ok_or_else(|| TrackerError::Unavailable(format!("bad epoch {since_epoch_secs}")))?;
        let verdict = *self
            .verdicts
            .lock()
            .entry((handle.clone(), problem.clone(), since_epoch_secs))
            .or_insert_with(|| Verdict {
                submitted_at: since + self.solve_after,
                solved: self
                    .rng
                    .lock()
                    .gen_bool(solve_probability(self.skill, difficulty).clamp(0.0, 1.0)),
            });
        Ok(SubmissionStatus {
            first_submitted_at: Some(verdict.submitted_at),
            first_solved_at: verdict.solved.then_some(verdict.submitted_at),
        })
    }
}

/// Clock that advances by `step` after every read.
pub struct SteppingClock {
    next: Mutex<Timestamp>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(start: Timestamp, step: Duration) -> Self {
        Self {
            next: Mutex::new(start),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Timestamp {
        let mut next = self.next.lock();
        let now = *next;
        *next += self.step;
        now
    }
}
