//! Bearer token authentication middleware.
//!
//! Checks `Authorization: Bearer <token>` headers with the lightweight
//! validation mode and stores the verified claims in request extensions.
//! Only access tokens are accepted; refresh tokens go to the refresh route.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::state::AppState;
use crate::token::{TokenFailure, TokenType, VerifiedClaims};

/// Middleware to authenticate Bearer tokens.
///
/// If a valid Bearer token is present, stores a [`BearerAuth`] in request
/// extensions. If no token is present, passes through without modification.
/// If an invalid token or a non-access token is present, returns 401.
pub async fn authenticate_bearer_token(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let Some(auth_header) = auth_header else {
        return next.run(request).await;
    };

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        return next.run(request).await;
    };
    let token = token.trim().to_string();

    let claims = match state
        .tokens()
        .validate_lightweight_typed(&token, TokenType::Access)
        .await
    {
        Ok(claims) => claims,
        Err(failure @ TokenFailure::RevocationUnavailable) => {
            warn!("token status unknown; denying request");
            return (StatusCode::SERVICE_UNAVAILABLE, failure.to_string()).into_response();
        }
        Err(failure) => {
            debug!(failure = ?failure, "invalid bearer token");
            return (
                StatusCode::UNAUTHORIZED,
                [("WWW-Authenticate", "Bearer error=\"invalid_token\"")],
                failure.to_string(),
            )
                .into_response();
        }
    };

    request.extensions_mut().insert(BearerAuth { claims, token });

    next.run(request).await
}

/// A request's verified bearer token.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    pub claims: VerifiedClaims,
    /// The raw token, for revocation.
    pub token: String,
}

impl<S: Send + Sync> FromRequestParts<S> for BearerAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<BearerAuth>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}
