//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/ideas` | Submit an idea (201 scored from cache, 202 queued) |
//! | `GET`  | `/api/ideas/{id}` | One idea, redacted unless the caller owns it |
//! | `GET`  | `/api/me/ideas` | The caller's ideas, newest first |
//! | `GET`  | `/api/leaderboard?limit=N` | Top public scored ideas |
//! | `GET`  | `/api/best-of-day?utc_offset_minutes=M` | Today's best idea or `null` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "rate_limited", "message": "daily submission limit reached" } }
//! ```
//!
//! Error codes: `bad_request` (400), `verification_failed` (400),
//! `unauthorized` (401), `not_found` (404), `rate_limited` (429),
//! `internal` (500).
//!
//! # Worker
//!
//! With `[worker].embedded = true` the queue consumer runs inside the
//! server process and is stopped after the listener shuts down.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use idea_pipeline_core::models::IdeaStatus;
use idea_pipeline_core::sanitize::{IdeaView, RankedIdea};
use idea_pipeline_core::store::Store;

use crate::analysis::{create_analyzer, IdeaAnalyzer};
use crate::auth::{Auth, SessionAuth};
use crate::config::Config;
use crate::db;
use crate::dispatch::{Dispatcher, SubmitOutcome, SubmitRequest};
use crate::error::SubmitError;
use crate::migrate::apply_schema;
use crate::queue::SqliteQueue;
use crate::sqlite_store::SqliteStore;
use crate::verify::{create_verifier, Verifier};
use crate::views;
use crate::worker::Worker;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub dispatcher: Arc<Dispatcher>,
    pub auth: Arc<dyn Auth>,
    /// Default day boundary for best-of-day.
    pub utc_offset_minutes: i32,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ideas", post(handle_submit))
        .route("/api/ideas/{id}", get(handle_get_idea))
        .route("/api/me/ideas", get(handle_my_ideas))
        .route("/api/leaderboard", get(handle_leaderboard))
        .route("/api/best-of-day", get(handle_best_of_day))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`, plus the embedded worker
/// when configured. Runs until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
    let queue = Arc::new(SqliteQueue::new(
        pool.clone(),
        config.worker.visibility_timeout_secs,
    ));
    let verifier: Arc<dyn Verifier> = Arc::from(create_verifier(&config.verification)?);
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        queue.clone(),
        verifier,
        config.submission.daily_limit,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = if config.worker.embedded {
        let analyzer: Arc<dyn IdeaAnalyzer> = Arc::from(create_analyzer(&config.analysis)?);
        let worker = Arc::new(Worker::new(store.clone(), queue, analyzer, &config.worker));
        Some(tokio::spawn(worker.run(shutdown_rx)))
    } else {
        None
    };

    let state = AppState {
        store,
        dispatcher,
        auth: Arc::new(SessionAuth::new(pool.clone())),
        utc_offset_minutes: config.app.utc_offset_minutes,
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, embedded_worker = config.worker.embedded, "server listening");
    println!("Idea pipeline listening on http://{}", config.server.bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker_handle {
        handle.await??;
    }
    pool.close().await;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into the JSON error envelope.
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

fn unauthorized() -> AppError {
    app_error(StatusCode::UNAUTHORIZED, "unauthorized", "sign in required")
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %err, "request failed");
        app_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal error",
        )
    }
}

impl From<SubmitError> for AppError {
    fn from(err: SubmitError) -> Self {
        let status = match &err {
            SubmitError::Unauthorized => StatusCode::UNAUTHORIZED,
            SubmitError::InvalidInput(_) | SubmitError::VerificationFailed => {
                StatusCode::BAD_REQUEST
            }
            SubmitError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            SubmitError::Internal(_) => {
                error!(error = %err, "submission failed");
                return app_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    err.code(),
                    "internal error",
                );
            }
        };
        app_error(status, err.code(), err.to_string())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/ideas ============

/// 201 when answered from the cache, 202 when queued.
async fn handle_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitOutcome>), AppError> {
    let owner_id = state.auth.current_user_id(&headers).await?;
    if owner_id.is_none() {
        return Err(SubmitError::Unauthorized.into());
    }
    let Json(req) = body.map_err(|e| bad_request(format!("invalid input: {}", e.body_text())))?;

    let outcome = state.dispatcher.submit(owner_id.as_deref(), &req).await?;
    let status = match outcome.status {
        IdeaStatus::Scored => StatusCode::CREATED,
        _ => StatusCode::ACCEPTED,
    };
    Ok((status, Json(outcome)))
}

// ============ GET /api/ideas/{id} ============

async fn handle_get_idea(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<IdeaView>, AppError> {
    let viewer = state.auth.current_user_id(&headers).await?;
    let view = views::idea_view(state.store.as_ref(), &id, viewer.as_deref())
        .await?
        .ok_or_else(|| not_found(format!("idea not found: {}", id)))?;
    Ok(Json(view))
}

// ============ GET /api/me/ideas ============

async fn handle_my_ideas(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<IdeaView>>, AppError> {
    let owner_id = state
        .auth
        .current_user_id(&headers)
        .await?
        .ok_or_else(unauthorized)?;
    Ok(Json(views::my_ideas(state.store.as_ref(), &owner_id).await?))
}

// ============ GET /api/leaderboard ============

#[derive(Deserialize)]
struct LeaderboardParams {
    limit: Option<i64>,
}

async fn handle_leaderboard(
    State(state): State<AppState>,
    params: Result<Query<LeaderboardParams>, QueryRejection>,
) -> Result<Json<Vec<RankedIdea>>, AppError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    Ok(Json(
        views::leaderboard(state.store.as_ref(), params.limit).await?,
    ))
}

// ============ GET /api/best-of-day ============

#[derive(Deserialize)]
struct BestOfDayParams {
    utc_offset_minutes: Option<i32>,
}

async fn handle_best_of_day(
    State(state): State<AppState>,
    params: Result<Query<BestOfDayParams>, QueryRejection>,
) -> Result<Json<Option<RankedIdea>>, AppError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let offset = params
        .utc_offset_minutes
        .unwrap_or(state.utc_offset_minutes);
    let now = Utc::now();
    views::day_window(now, offset).map_err(|e| bad_request(e.to_string()))?;

    Ok(Json(
        views::best_of_day(state.store.as_ref(), now, offset).await?,
    ))
}
