//! Per-user menu tree endpoint.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::AppResult;
use crate::menu::MenuNode;
use crate::middleware::BearerAuth;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct MenuQuery {
    /// "1" or "true" bypasses the per-user cache.
    fresh: Option<String>,
}

impl MenuQuery {
    fn bypass_cache(&self) -> bool {
        matches!(self.fresh.as_deref(), Some("1" | "true"))
    }
}

/// The caller's permission-filtered menu tree.
async fn user_menu(
    State(state): State<AppState>,
    auth: BearerAuth,
    Query(query): Query<MenuQuery>,
) -> AppResult<Json<Vec<MenuNode>>> {
    let tree = state
        .menus()
        .get_user_menu_tree(auth.claims.user_id, !query.bypass_cache())
        .await?;

    Ok(Json(tree.as_ref().clone()))
}

/// Create the menu router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/menu", get(user_menu))
}
