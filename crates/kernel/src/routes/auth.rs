//! Token endpoints: revocation and refresh.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::middleware::BearerAuth;
use crate::state::AppState;
use crate::token::{RevokeOutcome, TokenFailure, TokenPair, TokenType};

/// Revoke the presented bearer token.
async fn revoke(
    State(state): State<AppState>,
    auth: BearerAuth,
) -> AppResult<Json<RevokeOutcome>> {
    let outcome = state.tokens().revoke(&auth.token).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

/// Exchange a refresh token for a new pair. The old refresh token is
/// revoked so it cannot be replayed; when two requests race with the same
/// token, only the one whose revocation lands first gets a pair.
async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let tokens = state.tokens();
    let claims = tokens
        .validate_typed(&body.refresh_token, TokenType::Refresh)
        .await?;

    match tokens.revoke(&body.refresh_token).await? {
        RevokeOutcome::Revoked { .. } => {}
        RevokeOutcome::AlreadyRevoked => return Err(TokenFailure::Revoked.into()),
        RevokeOutcome::AlreadyExpired => return Err(TokenFailure::Expired.into()),
    }
    debug!(user_id = %claims.user_id, "refresh token exchanged");

    let pair = tokens
        .issue_pair(claims.user_id, &claims.email, &claims.role)
        .map_err(AppError::Internal)?;
    Ok(Json(pair))
}

/// Create the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/revoke", post(revoke))
        .route("/api/auth/refresh", post(refresh))
}
