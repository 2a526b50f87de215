use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use lab_core::{IngredientId, OrderLine, ProblemId, ProductId, TURNS};
use lab_service::{IdentityProvider, Outcome, ServiceError, Step, Unauthenticated};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[cfg(test)]
pub fn make_router(state: AppState) -> Router {
    make_router_with_cors(state, HeaderValue::from_static("http://localhost:5173"))
}

pub fn make_router_with_cors(state: AppState, cors_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/meta", get(meta_handler))
        .route("/api/v1/state", get(state_handler))
        .route("/api/v1/buy", post(buy_handler))
        .route("/api/v1/forge", post(forge_handler))
        .route("/api/v1/candidates", get(candidates_handler))
        .route("/api/v1/select", post(select_handler))
        .route("/api/v1/refresh", post(refresh_handler))
        .route("/api/v1/finish", post(finish_handler))
        .route("/api/v1/answer", post(answer_handler))
        .route("/api/v1/reward", post(reward_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<Unauthenticated> for ApiError {
    fn from(err: Unauthenticated) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::Integrity { .. } | ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Repository(_) | ServiceError::Catalog(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self.0);
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        (
            status,
            Json(serde_json::json!({"error": {"message": message}})),
        )
            .into_response()
    }
}

/// Applied steps are 200; game-rule rejections are 409 with the message.
fn outcome_response(outcome: Outcome<Step>) -> Response {
    let status = if outcome.is_applied() {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };
    (status, Json(outcome)).into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct BuyRequest {
    pub order: Vec<OrderLine<IngredientId>>,
}

#[derive(Deserialize)]
pub struct ForgeRequest {
    pub order: Vec<OrderLine<ProductId>>,
}

#[derive(Deserialize)]
pub struct SelectRequest {
    pub problem_id: ProblemId,
}

pub async fn meta_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let content = app_state.service.content();
    Json(serde_json::json!({
        "content_version": content.content_version,
        "seed": app_state.seed,
        "turns": TURNS,
        "ingredients": content.ingredients,
        "products": content.products,
        "difficulty_buckets": content.difficulty_buckets,
    }))
}

pub async fn state_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = app_state.identity.current_user(&headers)?;
    let view = app_state.service.state(&identity.player).await?;
    Ok(Json(view).into_response())
}

pub async fn buy_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BuyRequest>,
) -> Result<Response, ApiError> {
    let identity = app_state.identity.current_user(&headers)?;
    let outcome = app_state
        .service
        .buy_ingredients(&identity.player, body.order)
        .await?;
    Ok(outcome_response(outcome))
}

pub async fn forge_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ForgeRequest>,
) -> Result<Response, ApiError> {
    let identity = app_state.identity.current_user(&headers)?;
    let outcome = app_state
        .service
        .forge_and_sell(&identity.player, body.order)
        .await?;
    Ok(outcome_response(outcome))
}

pub async fn candidates_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = app_state.identity.current_user(&headers)?;
    let outcome = app_state.service.offer_candidates(&identity.player).await?;
    Ok(outcome_response(outcome))
}

pub async fn select_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SelectRequest>,
) -> Result<Response, ApiError> {
    let identity = app_state.identity.current_user(&headers)?;
    let outcome = app_state
        .service
        .select_problem(&identity.player, body.problem_id)
        .await?;
    Ok(outcome_response(outcome))
}

pub async fn refresh_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = app_state.identity.current_user(&headers)?;
    let outcome = app_state
        .service
        .refresh_submissions(&identity.player, &identity.handle)
        .await?;
    Ok(outcome_response(outcome))
}

pub async fn finish_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = app_state.identity.current_user(&headers)?;
    let outcome = app_state
        .service
        .finish_research(&identity.player, &identity.handle)
        .await?;
    Ok(outcome_response(outcome))
}

pub async fn answer_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = app_state.identity.current_user(&headers)?;
    let outcome = app_state.service.show_answer(&identity.player).await?;
    Ok(outcome_response(outcome))
}

pub async fn reward_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = app_state.identity.current_user(&headers)?;
    let outcome = app_state.service.claim_reward(&identity.player).await?;
    Ok(outcome_response(outcome))
}
