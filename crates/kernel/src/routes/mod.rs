//! HTTP route handlers.

pub mod admin;
pub mod auth;
pub mod health;
pub mod menu;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full router with bearer authentication applied.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(menu::router())
        .merge(admin::router())
        .merge(auth::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::authenticate_bearer_token,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
