mod routes;
mod state;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::Parser;
use lab_content::{load_content, load_problems};
use lab_service::{
    Collaborators, JsonFileRepository, MemoryRepository, PlayerRepository, ProgressionService,
    StaticProblemCatalog, StaticSubmissionTracker, SubmissionEntry, SystemClock,
};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::routes::make_router_with_cors;
use crate::state::{AppState, HeaderIdentity};

#[derive(Parser)]
#[command(name = "lab_daemon", about = "HTTP API for the forge & research game")]
struct Args {
    #[arg(long, default_value = "./content")]
    content_dir: String,
    #[arg(long, default_value = "127.0.0.1:3001")]
    bind: SocketAddr,
    /// RNG seed for prices, offers and growth. Random if omitted.
    #[arg(long)]
    seed: Option<u64>,
    /// Persist player state as JSON here. In-memory if omitted.
    #[arg(long)]
    state_dir: Option<String>,
    #[arg(long, default_value = "http://localhost:5173")]
    cors_origin: String,
    /// JSON file of known judge submissions to seed the tracker with.
    #[arg(long)]
    submissions: Option<String>,
}

#[derive(Deserialize)]
struct SubmissionsFile {
    submissions: Vec<SubmissionEntry>,
}

fn load_submissions(path: &str) -> Result<StaticSubmissionTracker> {
    let text = std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("reading submissions file: {path}"))?;
    let file: SubmissionsFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing submissions file: {path}"))?;
    Ok(StaticSubmissionTracker::from_entries(file.submissions))
}

async fn build_state(args: &Args, seed: u64) -> Result<AppState> {
    let content = load_content(&args.content_dir)?;
    let problems = load_problems(&args.content_dir)?;
    let catalog = StaticProblemCatalog::new(problems, content.difficulty_buckets.clone());
    let tracker = match &args.submissions {
        Some(path) => load_submissions(path)?,
        None => StaticSubmissionTracker::new(),
    };
    let repository: Arc<dyn PlayerRepository> = match &args.state_dir {
        Some(dir) => Arc::new(
            JsonFileRepository::open(dir)
                .await
                .with_context(|| format!("opening state directory {dir}"))?,
        ),
        None => Arc::new(MemoryRepository::new()),
    };
    tracing::info!(
        content_version = %content.content_version,
        problems = catalog.len(),
        persistent = args.state_dir.is_some(),
        "content loaded"
    );
    let service = ProgressionService::new(
        Arc::new(content),
        Collaborators {
            repository,
            catalog: Arc::new(catalog),
            tracker: Arc::new(tracker),
            clock: Arc::new(SystemClock),
        },
        seed,
    );
    Ok(AppState {
        service: Arc::new(service),
        identity: Arc::new(HeaderIdentity),
        seed,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);
    let cors_origin: HeaderValue = args
        .cors_origin
        .parse()
        .with_context(|| format!("invalid --cors-origin {}", args.cors_origin))?;
    let app_state = build_state(&args, seed).await?;
    let app = make_router_with_cors(app_state, cors_origin);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    tracing::info!(addr = %args.bind, seed, "listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::make_router;
    use axum::{body::Body, http::Request, http::StatusCode, Router};
    use http_body_util::BodyExt;
    use lab_core::test_fixtures::{at, base_content, color_buckets, sample_problems};
    use lab_service::ManualClock;
    use tower::ServiceExt;

    fn make_test_state() -> AppState {
        let service = ProgressionService::new(
            Arc::new(base_content()),
            Collaborators {
                repository: Arc::new(MemoryRepository::new()),
                catalog: Arc::new(StaticProblemCatalog::new(sample_problems(), color_buckets())),
                tracker: Arc::new(StaticSubmissionTracker::new()),
                clock: Arc::new(ManualClock::new(at(0))),
            },
            7,
        );
        AppState {
            service: Arc::new(service),
            identity: Arc::new(HeaderIdentity),
            seed: 7,
        }
    }

    fn get(uri: &str, player: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(player) = player {
            builder = builder.header("x-player-id", player);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post(uri: &str, player: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-player-id", player)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_meta_returns_content_version() {
        let app = make_router(make_test_state());
        let (status, json) = send(&app, get("/api/v1/meta", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["content_version"], "test");
        assert_eq!(json["seed"], 7);
        assert_eq!(json["turns"][0], "buy-ingredients");
    }

    #[tokio::test]
    async fn test_state_requires_identity() {
        let app = make_router(make_test_state());
        let (status, json) = send(&app, get("/api/v1/state", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("x-player-id"));
    }

    #[tokio::test]
    async fn test_oversized_player_id_is_unauthorized() {
        let app = make_router(make_test_state());
        let long = "p".repeat(lab_service::MAX_PLAYER_KEY_LEN + 1);
        let (status, json) = send(&app, get("/api/v1/state", Some(&long))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("malformed"));

        let longest = "p".repeat(lab_service::MAX_PLAYER_KEY_LEN);
        let (status, _) = send(&app, get("/api/v1/state", Some(&longest))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_new_player_state() {
        let app = make_router(make_test_state());
        let (status, json) = send(&app, get("/api/v1/state", Some("player_1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ledger"]["cash"], 1000);
        assert_eq!(json["ledger"]["battery"], 1);
        assert_eq!(json["turn"], "buy-ingredients");
    }

    #[tokio::test]
    async fn test_buy_then_wrong_turn_is_conflict() {
        let app = make_router(make_test_state());
        let order = serde_json::json!({"order": [{"item": "iron", "quantity": 5}]});
        let (status, json) = send(&app, post("/api/v1/buy", "player_1", order.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["view"]["ledger"]["cash"], 500);
        assert_eq!(json["view"]["turn"], "forge-swords");

        let (status, json) = send(&app, post("/api/v1/buy", "player_1", order)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"]["message"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_non_positive_quantity_is_bad_request() {
        let app = make_router(make_test_state());
        let order = serde_json::json!({"order": [{"item": "iron", "quantity": -2}]});
        let (status, _) = send(&app, post("/api/v1/buy", "player_1", order)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let app = make_router(make_test_state());
        let empty = serde_json::json!({"order": []});
        send(&app, post("/api/v1/buy", "player_1", empty)).await;
        let order = serde_json::json!({"order": [{"item": "trebuchet", "quantity": 1}]});
        let (status, _) = send(&app, post("/api/v1/forge", "player_1", order)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_full_cycle_over_http() {
        let app = make_router(make_test_state());
        let empty = serde_json::json!({"order": []});
        send(&app, post("/api/v1/buy", "player_1", empty.clone())).await;
        send(&app, post("/api/v1/forge", "player_1", empty)).await;

        let (status, json) = send(&app, get("/api/v1/candidates", Some("player_1"))).await;
        assert_eq!(status, StatusCode::OK);
        let problem_id = json["view"]["candidates"][0]["id"].as_str().unwrap().to_string();

        let select = serde_json::json!({"problem_id": problem_id});
        let (status, json) = send(&app, post("/api/v1/select", "player_1", select)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["view"]["turn"], "solve-problems");

        let none = serde_json::Value::Null;
        let (status, _) = send(&app, post("/api/v1/refresh", "player_1", none.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (status, json) = send(&app, post("/api/v1/finish", "player_1", none.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["report"]["solved"], false);
        let (status, _) = send(&app, post("/api/v1/answer", "player_1", none.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (status, json) = send(&app, post("/api/v1/reward", "player_1", none)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["view"]["turn"], "buy-ingredients");
        assert_eq!(json["view"]["battery_capacity"], 1.0);
    }
}
