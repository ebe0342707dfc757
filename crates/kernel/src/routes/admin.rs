//! Administrative endpoints: menu refresh, cache invalidation and
//! permission reconciliation.
//!
//! Every handler runs the capability chain resolved for its admin
//! operation before doing any work.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::capability::{ADMIN_OWNER, ChainOutcome, InvocationContext};
use crate::error::{AppError, AppResult};
use crate::middleware::BearerAuth;
use crate::permissions::ReconcileReport;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct RefreshResponse {
    generation: u64,
    nodes: usize,
}

/// Run the admin capability chain for `operation`.
fn authorize(state: &AppState, auth: &BearerAuth, operation: &str) -> AppResult<()> {
    let chain = state
        .resolver()
        .resolve_capabilities(ADMIN_OWNER, operation);
    let mut ctx = InvocationContext::new(ADMIN_OWNER, operation)
        .with_principal(auth.claims.user_id, &auth.claims.role);

    match chain.run(&mut ctx) {
        ChainOutcome::Completed => Ok(()),
        ChainOutcome::Halted { handler, reason } => {
            debug!(operation, handler = %handler, reason = %reason, "admin request denied");
            Err(AppError::Forbidden(reason))
        }
    }
}

async fn refresh_menu(
    State(state): State<AppState>,
    auth: BearerAuth,
) -> AppResult<Json<RefreshResponse>> {
    authorize(&state, &auth, "menu.refresh")?;

    let nodes = state.menus().refresh_menu_metadata().await?;
    Ok(Json(RefreshResponse {
        generation: state.catalog().snapshot().generation(),
        nodes,
    }))
}

async fn clear_menu_cache(
    State(state): State<AppState>,
    auth: BearerAuth,
) -> AppResult<StatusCode> {
    authorize(&state, &auth, "menu.clear_cache")?;

    state.menus().clear_all_menu_cache();
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_user_menu_cache(
    State(state): State<AppState>,
    auth: BearerAuth,
    Path(user_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&state, &auth, "menu.clear_user_cache")?;

    state.menus().clear_user_menu_cache(user_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn sync_permissions(
    State(state): State<AppState>,
    auth: BearerAuth,
) -> AppResult<Json<ReconcileReport>> {
    authorize(&state, &auth, "permissions.sync")?;

    let report = state.reconciler().sync_from_catalog(state.catalog()).await;
    // Grants may have changed what users can see.
    state.menus().clear_all_menu_cache();

    info!(
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        "permissions re-synced on request"
    );
    Ok(Json(report))
}

/// Create the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/menu/refresh", post(refresh_menu))
        .route("/api/admin/menu/cache", delete(clear_menu_cache))
        .route(
            "/api/admin/menu/cache/{user_id}",
            delete(clear_user_menu_cache),
        )
        .route("/api/admin/permissions/sync", post(sync_permissions))
}
