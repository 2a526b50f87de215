//! End-to-end flows through `ProgressionService` with in-memory
//! collaborators and a manual clock.

use chrono::Duration;
use lab_core::test_fixtures::{at, base_content, color_buckets, sample_problems};
use lab_core::{
    IngredientId, OrderLine, PlayerId, ProblemId, ProductId, Report, Turn, UserHandle, Violation,
};
use lab_service::{
    Collaborators, JsonFileRepository, ManualClock, MemoryRepository, Outcome, PlayerRepository,
    ProgressionService, ServiceError, StaticProblemCatalog, StaticSubmissionTracker,
    SubmissionEntry, Step,
};
use std::sync::Arc;

struct Harness {
    service: ProgressionService,
    repository: Arc<dyn PlayerRepository>,
    tracker: Arc<StaticSubmissionTracker>,
    clock: Arc<ManualClock>,
}

fn harness_with(repository: Arc<dyn PlayerRepository>) -> Harness {
    let tracker = Arc::new(StaticSubmissionTracker::new());
    let clock = Arc::new(ManualClock::new(at(0)));
    let service = ProgressionService::new(
        Arc::new(base_content()),
        Collaborators {
            repository: repository.clone(),
            catalog: Arc::new(StaticProblemCatalog::new(sample_problems(), color_buckets())),
            tracker: tracker.clone(),
            clock: clock.clone(),
        },
        42,
    );
    Harness {
        service,
        repository,
        tracker,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(MemoryRepository::new()))
}

fn alice() -> PlayerId {
    PlayerId::new("player_alice")
}

fn handle() -> UserHandle {
    UserHandle::new("alice")
}

fn iron(quantity: i64) -> Vec<OrderLine<IngredientId>> {
    vec![OrderLine::new(IngredientId::new("iron"), quantity)]
}

fn swords(quantity: i64) -> Vec<OrderLine<ProductId>> {
    vec![OrderLine::new(ProductId::new("sword"), quantity)]
}

fn applied(outcome: Outcome<Step>) -> Step {
    match outcome {
        Outcome::Applied(step) => step,
        Outcome::Rejected { error } => panic!("unexpected rejection: {}", error.message),
    }
}

/// Play buy/forge/select with empty orders and the first offered problem.
async fn start_research(h: &Harness) -> ProblemId {
    applied(h.service.buy_ingredients(&alice(), vec![]).await.unwrap());
    applied(h.service.forge_and_sell(&alice(), vec![]).await.unwrap());
    let offer = applied(h.service.offer_candidates(&alice()).await.unwrap());
    let problem_id = offer.view.candidates[0].id.clone();
    applied(
        h.service
            .select_problem(&alice(), problem_id.clone())
            .await
            .unwrap(),
    );
    problem_id
}

#[tokio::test]
async fn new_player_gets_starting_state() {
    let h = harness();
    let view = h.service.state(&alice()).await.unwrap();
    assert_eq!(view.ledger.cash, 1000);
    assert_eq!(view.ledger.battery, 1);
    assert!(view.ledger.stock.is_empty());
    assert_eq!(view.turn, Turn::BuyIngredients);
    assert!((view.battery_capacity - 1.0).abs() < 1e-9);
    assert!(view.researcher_rank.abs() < 1e-9);
    assert_eq!(h.repository.revision(&alice()).await.unwrap(), 1);

    // A second read does not write again.
    h.service.state(&alice()).await.unwrap();
    assert_eq!(h.repository.revision(&alice()).await.unwrap(), 1);
}

#[tokio::test]
async fn buy_then_forge_until_battery_runs_out() {
    let h = harness();
    let step = applied(h.service.buy_ingredients(&alice(), iron(5)).await.unwrap());
    assert_eq!(step.report, Report::Bought { spent: 500 });
    assert_eq!(step.view.ledger.cash, 500);
    assert_eq!(step.view.ledger.stock_of(&IngredientId::new("iron")), 5);
    assert_eq!(step.view.turn, Turn::ForgeSwords);

    let rejected = h.service.forge_and_sell(&alice(), swords(2)).await.unwrap();
    assert_eq!(rejected.violation(), Some(&Violation::InsufficientBattery));
    let view = h.service.state(&alice()).await.unwrap();
    assert_eq!(view.ledger.cash, 500);
    assert_eq!(view.ledger.battery, 1);
    assert_eq!(view.turn, Turn::ForgeSwords);

    let step = applied(h.service.forge_and_sell(&alice(), swords(1)).await.unwrap());
    assert_eq!(step.view.ledger.battery, 0);
    assert_eq!(step.view.ledger.stock_of(&IngredientId::new("iron")), 2);
    assert!(step.view.ledger.cash > 500);
    assert_eq!(step.view.turn, Turn::SelectProblems);
}

#[tokio::test]
async fn out_of_turn_request_is_rejected_with_message() {
    let h = harness();
    let outcome = h.service.claim_reward(&alice()).await.unwrap();
    assert!(matches!(
        outcome.violation(),
        Some(Violation::WrongTurn {
            expected: Turn::GetReward,
            actual: Turn::BuyIngredients
        })
    ));
    let json = serde_json::to_value(&outcome).unwrap();
    assert!(json["error"]["message"].as_str().unwrap().contains("get-reward"));
}

#[tokio::test]
async fn repeated_offer_keeps_the_same_candidates() {
    let h = harness();
    applied(h.service.buy_ingredients(&alice(), vec![]).await.unwrap());
    applied(h.service.forge_and_sell(&alice(), vec![]).await.unwrap());
    let first = applied(h.service.offer_candidates(&alice()).await.unwrap());
    let second = applied(h.service.offer_candidates(&alice()).await.unwrap());
    assert_eq!(first.view.candidates.len(), 3);
    assert_eq!(first.view.candidates, second.view.candidates);
    assert_eq!(second.view.turn, Turn::SelectProblems);
}

#[tokio::test]
async fn selecting_an_unoffered_problem_is_rejected() {
    let h = harness();
    applied(h.service.buy_ingredients(&alice(), vec![]).await.unwrap());
    applied(h.service.forge_and_sell(&alice(), vec![]).await.unwrap());
    let offer = applied(h.service.offer_candidates(&alice()).await.unwrap());
    let outsider = sample_problems()
        .into_iter()
        .find(|p| !offer.view.candidates.iter().any(|c| c.id == p.id))
        .unwrap();
    let outcome = h.service.select_problem(&alice(), outsider.id).await.unwrap();
    assert!(matches!(outcome.violation(), Some(Violation::NotOffered(_))));
}

#[tokio::test]
async fn solved_cycle_grows_capacity_performance_and_rank() {
    let h = harness();
    let problem_id = start_research(&h).await;
    let difficulty = sample_problems()
        .into_iter()
        .find(|p| p.id == problem_id)
        .unwrap()
        .difficulty;

    h.tracker.record(SubmissionEntry {
        handle: handle(),
        problem_id: problem_id.clone(),
        submitted_at: at(60),
        accepted: true,
    });
    h.clock.advance(Duration::seconds(120));
    let step = applied(
        h.service
            .refresh_submissions(&alice(), &handle())
            .await
            .unwrap(),
    );
    assert_eq!(step.report, Report::SubmissionRecorded { changed: true });
    let active = step.view.active_research.unwrap();
    assert_eq!(active.solved_at, Some(at(60)));

    let step = applied(h.service.finish_research(&alice(), &handle()).await.unwrap());
    assert!(matches!(step.report, Report::Finished { solved: true, .. }));
    assert_eq!(step.view.turn, Turn::GetReward);

    let step = applied(h.service.show_answer(&alice()).await.unwrap());
    assert_eq!(step.report, Report::AnswerShown { changed: true });
    let again = applied(h.service.show_answer(&alice()).await.unwrap());
    assert_eq!(again.report, Report::AnswerShown { changed: false });

    let step = applied(h.service.claim_reward(&alice()).await.unwrap());
    let view = step.view;
    assert_eq!(view.turn, Turn::BuyIngredients);
    assert!(view.battery_capacity > 1.0);
    assert!(view.performance > 1.0);
    assert!((view.researcher_rank - f64::from(difficulty)).abs() < 1e-9);
    assert_eq!(view.ledger.battery, view.battery_charge);
    assert_eq!(view.completed_research, 1);
    assert!(view.active_research.is_none());
}

#[tokio::test]
async fn finish_polls_the_tracker_one_last_time() {
    let h = harness();
    let problem_id = start_research(&h).await;
    h.tracker.record(SubmissionEntry {
        handle: handle(),
        problem_id,
        submitted_at: at(30),
        accepted: true,
    });
    let step = applied(h.service.finish_research(&alice(), &handle()).await.unwrap());
    assert!(matches!(step.report, Report::Finished { solved: true, .. }));
}

#[tokio::test]
async fn tracker_outage_fails_open() {
    let h = harness();
    let problem_id = start_research(&h).await;
    h.tracker.record(SubmissionEntry {
        handle: handle(),
        problem_id,
        submitted_at: at(30),
        accepted: true,
    });
    h.tracker.set_offline(true);

    let step = applied(
        h.service
            .refresh_submissions(&alice(), &handle())
            .await
            .unwrap(),
    );
    assert_eq!(step.report, Report::SubmissionRecorded { changed: false });

    let step = applied(h.service.finish_research(&alice(), &handle()).await.unwrap());
    assert!(matches!(step.report, Report::Finished { solved: false, .. }));

    // Unsolved and unsubmitted: the reward is claimed but grants nothing.
    applied(h.service.claim_reward(&alice()).await.unwrap());
    let view = h.service.state(&alice()).await.unwrap();
    assert!((view.battery_capacity - 1.0).abs() < 1e-9);
    assert!((view.performance - 1.0).abs() < 1e-9);
    assert!(view.researcher_rank.abs() < 1e-9);
    assert_eq!(view.ledger.battery, 1);
}

#[tokio::test]
async fn second_research_cannot_start_before_reward() {
    let h = harness();
    start_research(&h).await;
    let outcome = h.service.select_problem(&alice(), ProblemId::new("abc300_a")).await.unwrap();
    assert!(matches!(
        outcome.violation(),
        Some(Violation::WrongTurn { .. })
    ));
}

#[tokio::test]
async fn malformed_orders_are_errors_not_rejections() {
    let h = harness();
    let err = h.service.buy_ingredients(&alice(), iron(0)).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));

    let unknown = vec![OrderLine::new(IngredientId::new("mithril"), 1)];
    let err = h.service.buy_ingredients(&alice(), unknown).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::NotFound {
            kind: "ingredient",
            ..
        }
    ));
    assert_eq!(h.service.state(&alice()).await.unwrap().ledger.cash, 1000);
}

#[tokio::test]
async fn players_do_not_share_state() {
    let h = harness();
    let bob = PlayerId::new("player_bob");
    applied(h.service.buy_ingredients(&alice(), iron(5)).await.unwrap());
    let view = h.service.state(&bob).await.unwrap();
    assert_eq!(view.ledger.cash, 1000);
    assert_eq!(view.turn, Turn::BuyIngredients);
}

#[tokio::test]
async fn file_backed_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let repo = Arc::new(JsonFileRepository::open(dir.path()).await.unwrap());
        let h = harness_with(repo);
        applied(h.service.buy_ingredients(&alice(), iron(3)).await.unwrap());
    }
    let repo = Arc::new(JsonFileRepository::open(dir.path()).await.unwrap());
    let h = harness_with(repo);
    let view = h.service.state(&alice()).await.unwrap();
    assert_eq!(view.ledger.cash, 700);
    assert_eq!(view.turn, Turn::ForgeSwords);
}

#[tokio::test]
async fn other_players_do_not_change_a_players_draws() {
    async fn sword_sale(h: &Harness) -> u64 {
        applied(h.service.buy_ingredients(&alice(), iron(3)).await.unwrap());
        applied(h.service.forge_and_sell(&alice(), swords(1)).await.unwrap())
            .view
            .ledger
            .cash
    }

    let alone = harness();
    let expected = sword_sale(&alone).await;

    let shared = harness();
    let bob = PlayerId::new("player_bob");
    applied(shared.service.buy_ingredients(&bob, iron(3)).await.unwrap());
    applied(shared.service.forge_and_sell(&bob, swords(1)).await.unwrap());
    assert_eq!(sword_sale(&shared).await, expected);
}
