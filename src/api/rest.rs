// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Three routes: `GET /api/v1/snapshot` (the latest published snapshot, or
// 503 before the first cycle), `GET /api/v1/summary` (a live RunSummary,
// computed on demand rather than waiting for shutdown), and
// `POST /api/v1/command` (the sole write path into the kernel — pushes onto
// the CommandQueue the Engine drains at its next cycle boundary). CORS is
// permissive — this is a local operator/UI surface, not an edge service.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::ApiState;
use crate::command::Command;
use crate::queues::QueueError;

/// Build the full StatusApi router with CORS middleware and shared state.
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/snapshot", get(snapshot))
        .route("/api/v1/summary", get(summary))
        .route("/api/v1/command", post(command))
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Snapshot
// =============================================================================

async fn snapshot(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.data_hub.latest() {
        Some(snapshot) => Json(snapshot.as_ref().clone()).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "no snapshot published yet" })),
        )
            .into_response(),
    }
}

// =============================================================================
// Summary
// =============================================================================

#[derive(Serialize)]
struct LiveSummaryResponse {
    #[serde(flatten)]
    summary: crate::metrics::RunSummary,
    state_version: u64,
}

async fn summary(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let now_unix_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let summary = state.metrics.summary(
        &state.run_id,
        state.run_start_ts_unix_ms,
        now_unix_ms,
        state.logger_enabled,
    );
    Json(LiveSummaryResponse {
        summary,
        state_version: state.data_hub.version(),
    })
}

// =============================================================================
// Command
// =============================================================================

async fn command(
    State(state): State<Arc<ApiState>>,
    Json(cmd): Json<Command>,
) -> impl IntoResponse {
    let id = cmd.id;
    match state.commands.push(cmd) {
        Ok(()) => {
            info!(id, "command accepted");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "status": "accepted", "id": id })),
            )
                .into_response()
        }
        Err(QueueError::Full) => {
            warn!(id, "command queue full — rejecting");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "command queue full" })),
            )
                .into_response()
        }
        Err(QueueError::Disconnected) => {
            warn!(id, "command queue disconnected — engine not running");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "engine not accepting commands" })),
            )
                .into_response()
        }
    }
}
