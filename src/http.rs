//! Operational HTTP surface: liveness plus queue connectivity.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::queue::DurableQueue;
use crate::store::Database;

/// Shared state for the health route.
#[derive(Clone)]
pub struct HealthState {
    pub db: Arc<dyn Database>,
    pub queue: Arc<DurableQueue>,
}

#[derive(Debug, Serialize)]
struct QueueHealth {
    name: String,
    connected: bool,
    pending: u64,
    processing: u64,
    dead: u64,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
    queue: QueueHealth,
}

/// GET /health
///
/// 200 with queue depths when the store answers; 503 `degraded` otherwise.
async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    let stats = match state.db.ping().await {
        Ok(()) => state.queue.stats().await.ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check: database unreachable");
            None
        }
    };

    let connected = stats.is_some();
    let stats = stats.unwrap_or_default();
    let body = HealthBody {
        status: if connected { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        queue: QueueHealth {
            name: state.queue.name().to_string(),
            connected,
            pending: stats.pending,
            processing: stats.processing,
            dead: stats.dead,
        },
    };
    let code = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

/// Build the operational routes.
pub fn health_routes(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
