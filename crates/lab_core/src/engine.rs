use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::id::generate_research_id;
use crate::research::Growth;
use crate::sampling::growth_rate;
use crate::{
    GameContent, GameError, IngredientId, Laboratory, Ledger, PlayerId, ProblemId,
    ProblemSnapshot, ProductId, ResearchId, SubmissionStatus, Timestamp, Turn, Violation,
};

/// Everything the game stores for one player. Committed as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub ledger: Ledger,
    pub laboratory: Laboratory,
    pub turn: Turn,
}

impl PlayerState {
    pub fn new(content: &GameContent) -> Self {
        Self {
            ledger: Ledger::starting(&content.constants),
            laboratory: Laboratory::default(),
            turn: Turn::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine<K> {
    pub item: K,
    pub quantity: i64,
}

impl<K> OrderLine<K> {
    pub fn new(item: K, quantity: i64) -> Self {
        Self { item, quantity }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    BuyIngredients { order: Vec<OrderLine<IngredientId>> },
    ForgeAndSell { order: Vec<OrderLine<ProductId>> },
    /// Offer a subset of `pool`. Keeps an existing offer instead of rerolling.
    OfferCandidates { pool: Vec<ProblemSnapshot> },
    SelectProblem { problem_id: ProblemId },
    RecordSubmission { status: SubmissionStatus },
    FinishResearch,
    ShowAnswer,
    ClaimReward,
}

impl Action {
    /// The turn this action is legal in.
    pub fn phase(&self) -> Turn {
        match self {
            Action::BuyIngredients { .. } => Turn::BuyIngredients,
            Action::ForgeAndSell { .. } => Turn::ForgeSwords,
            Action::OfferCandidates { .. } | Action::SelectProblem { .. } => Turn::SelectProblems,
            Action::RecordSubmission { .. } | Action::FinishResearch => Turn::SolveProblems,
            Action::ShowAnswer | Action::ClaimReward => Turn::GetReward,
        }
    }

    /// Whether a successful application advances the turn.
    pub fn ends_turn(&self) -> bool {
        matches!(
            self,
            Action::BuyIngredients { .. }
                | Action::ForgeAndSell { .. }
                | Action::SelectProblem { .. }
                | Action::FinishResearch
                | Action::ClaimReward
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::BuyIngredients { .. } => "buy_ingredients",
            Action::ForgeAndSell { .. } => "forge_and_sell",
            Action::OfferCandidates { .. } => "offer_candidates",
            Action::SelectProblem { .. } => "select_problem",
            Action::RecordSubmission { .. } => "record_submission",
            Action::FinishResearch => "finish_research",
            Action::ShowAnswer => "show_answer",
            Action::ClaimReward => "claim_reward",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub product: ProductId,
    pub price: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Report {
    Bought { spent: u64 },
    Sold { sales: Vec<Sale>, earned: u64 },
    Offered { candidates: Vec<ProblemSnapshot> },
    Started { research_id: ResearchId },
    SubmissionRecorded { changed: bool },
    Finished { research_id: ResearchId, solved: bool },
    AnswerShown { changed: bool },
    Rewarded { research_id: ResearchId, battery: u32 },
}

/// Result of a successful `apply`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: PlayerState,
    pub report: Report,
    /// `false` when the action was a no-op and there is nothing to persist.
    pub changed: bool,
}

/// Apply one action to a copy of `state`.
///
/// Order of operations:
/// 1. Check the stored turn matches the action's phase.
/// 2. Apply the ledger / laboratory mutation.
/// 3. Advance the turn if the action ends the phase.
///
/// `state` is never modified; on error nothing happened.
pub fn apply(
    state: &PlayerState,
    player: &PlayerId,
    action: &Action,
    content: &GameContent,
    rng: &mut impl Rng,
    now: Timestamp,
) -> Result<Transition, GameError> {
    state.turn.ensure(action.phase())?;

    let mut next = state.clone();
    let report = match action {
        Action::BuyIngredients { order } => buy_ingredients(&mut next.ledger, order, content)?,
        Action::ForgeAndSell { order } => forge_and_sell(&mut next.ledger, order, content, rng)?,
        Action::OfferCandidates { pool } => {
            offer_candidates(&mut next.laboratory, pool, content, rng)?
        }
        Action::SelectProblem { problem_id } => {
            let id = generate_research_id(rng);
            let research =
                next.laboratory
                    .start_research(problem_id, id, player.clone(), now)?;
            Report::Started {
                research_id: research.id.clone(),
            }
        }
        Action::RecordSubmission { status } => Report::SubmissionRecorded {
            changed: next.laboratory.record_submission(*status)?,
        },
        Action::FinishResearch => {
            let research = next.laboratory.finish(now)?;
            Report::Finished {
                research_id: research.id.clone(),
                solved: research.is_solved(),
            }
        }
        Action::ShowAnswer => Report::AnswerShown {
            changed: next.laboratory.show_answer(now)?,
        },
        Action::ClaimReward => claim_reward(&mut next, content, rng, now)?,
    };

    if action.ends_turn() {
        next.turn = next.turn.next();
    }
    let changed = next != *state;
    Ok(Transition {
        state: next,
        report,
        changed,
    })
}

fn buy_ingredients(
    ledger: &mut Ledger,
    order: &[OrderLine<IngredientId>],
    content: &GameContent,
) -> Result<Report, GameError> {
    let before = ledger.cash;
    let mut working = ledger.clone();
    for line in order {
        working = working.buy_ingredient(content, &line.item, line.quantity)?;
    }
    *ledger = working;
    Ok(Report::Bought {
        spent: before - ledger.cash,
    })
}

fn forge_and_sell(
    ledger: &mut Ledger,
    order: &[OrderLine<ProductId>],
    content: &GameContent,
    rng: &mut impl Rng,
) -> Result<Report, GameError> {
    let mut working = ledger.clone();
    let mut sales = Vec::new();
    for line in order {
        if line.quantity <= 0 {
            return Err(GameError::invalid(format!(
                "quantity must be positive, got {}",
                line.quantity
            )));
        }
        let product = content.product(&line.item)?;
        for _ in 0..line.quantity {
            let (crafted, price) = working.craft_and_sell(product, rng)?;
            working = crafted;
            sales.push(Sale {
                product: line.item.clone(),
                price,
            });
        }
    }
    *ledger = working;
    let earned = sales.iter().map(|sale| sale.price).sum();
    Ok(Report::Sold { sales, earned })
}

fn offer_candidates(
    laboratory: &mut Laboratory,
    pool: &[ProblemSnapshot],
    content: &GameContent,
    rng: &mut impl Rng,
) -> Result<Report, GameError> {
    if laboratory.candidates().is_empty() {
        if pool.is_empty() {
            return Err(GameError::not_found(
                "problem",
                "any problem in the current difficulty bucket",
            ));
        }
        let picked: Vec<ProblemSnapshot> = pool
            .choose_multiple(rng, content.constants.candidate_count)
            .cloned()
            .collect();
        laboratory.offer(picked)?;
    }
    Ok(Report::Offered {
        candidates: laboratory.candidates().to_vec(),
    })
}

fn claim_reward(
    state: &mut PlayerState,
    content: &GameContent,
    rng: &mut impl Rng,
    now: Timestamp,
) -> Result<Report, GameError> {
    let constants = &content.constants;
    let difficulty = state
        .laboratory
        .unrewarded()
        .ok_or(Violation::NoUnrewardedResearch)?
        .problem
        .difficulty;
    // Both draws happen regardless of qualification so RNG use is stable.
    let growth = Growth {
        battery_capacity: growth_rate(difficulty, constants, rng),
        performance: growth_rate(difficulty, constants, rng),
    };
    let research_id = state.laboratory.claim_reward(now, growth)?.id.clone();
    let battery = state.laboratory.battery_charge(constants);
    state.ledger = state.ledger.charge_battery(battery);
    Ok(Report::Rewarded {
        research_id,
        battery,
    })
}
