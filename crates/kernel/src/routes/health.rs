//! Health check endpoint.
//!
//! Returns 200 OK if every configured backing store is reachable,
//! 503 Service Unavailable otherwise. Unconfigured stores are reported
//! as null and do not count against health.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    postgres: Option<bool>,
    redis: Option<bool>,
    catalog_generation: u64,
    capabilities: usize,
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (postgres, redis) = tokio::join!(state.postgres_healthy(), state.redis_healthy());

    let healthy = postgres.unwrap_or(true) && redis.unwrap_or(true);
    let (status, status_code) = if healthy {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        status_code,
        Json(HealthResponse {
            status,
            postgres,
            redis,
            catalog_generation: state.catalog().snapshot().generation(),
            capabilities: state.resolver().registry().len(),
        }),
    )
}

/// Create the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
