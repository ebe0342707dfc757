//! Session token claims.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Token type: short-lived access or long-lived refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => f.write_str("access"),
            TokenType::Refresh => f.write_str("refresh"),
        }
    }
}

impl FromStr for TokenType {
    type Err = TokenFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(TokenType::Access),
            "refresh" => Ok(TokenType::Refresh),
            _ => Err(TokenFailure::Decode),
        }
    }
}

/// JWT claims as signed into the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Issuer.
    pub iss: String,
    /// Subject (user ID).
    pub sub: String,
    pub email: String,
    pub role: String,
    pub token_type: TokenType,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// JWT ID (unique per token).
    pub jti: String,
}

/// Claims of a token that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedClaims {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub token_type: TokenType,
    pub issued_at: i64,
    pub expires_at: i64,
    pub jti: String,
}

impl TryFrom<SessionClaims> for VerifiedClaims {
    type Error = TokenFailure;

    fn try_from(claims: SessionClaims) -> Result<Self, Self::Error> {
        let user_id = claims
            .sub
            .parse::<Uuid>()
            .map_err(|_| TokenFailure::Decode)?;

        Ok(Self {
            user_id,
            email: claims.email,
            role: claims.role,
            token_type: claims.token_type,
            issued_at: claims.iat,
            expires_at: claims.exp,
            jti: claims.jti,
        })
    }
}

/// The first check a token failed. Never fatal.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenFailure {
    #[error("empty token")]
    Empty,

    #[error("invalid signature or issuer")]
    BadSignature,

    #[error("malformed token claims")]
    Decode,

    #[error("token expired")]
    Expired,

    #[error("token has been revoked")]
    Revoked,

    #[error("unexpected token type")]
    WrongType,

    #[error("user no longer exists")]
    UnknownUser,

    #[error("user is inactive")]
    InactiveUser,

    #[error("revocation list unavailable")]
    RevocationUnavailable,

    #[error("identity lookup unavailable")]
    IdentityUnavailable,
}
