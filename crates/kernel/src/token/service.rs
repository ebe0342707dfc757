//! Token issue, validation and revocation.

use std::sync::Arc;

use anyhow::{Context, Result};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::claims::{SessionClaims, TokenFailure, TokenType, VerifiedClaims};
use super::clock::{Clock, SystemClock};
use super::identity::UserDirectory;
use super::revocation::RevocationList;

/// Default issuer identity.
pub const DEFAULT_ISSUER: &str = "custode";

/// Access token lifetime (1 hour).
const DEFAULT_ACCESS_TTL: u64 = 3600;

/// Refresh token lifetime (30 days).
const DEFAULT_REFRESH_TTL: u64 = 30 * 24 * 3600;

/// Issued access and refresh tokens.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// What `revoke` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RevokeOutcome {
    /// Denylisted for the token's remaining lifetime.
    Revoked { ttl_secs: u64 },
    /// Another call revoked it first.
    AlreadyRevoked,
    /// Past expiry; nothing to record.
    AlreadyExpired,
}

/// Signs and checks session tokens.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_ttl: u64,
    refresh_ttl: u64,
    clock: Arc<dyn Clock>,
    revocations: RevocationList,
    users: Option<Arc<dyn UserDirectory>>,
}

impl TokenService {
    /// Create a token service signing with `secret` under `issuer`.
    pub fn new(secret: &[u8], issuer: &str, revocations: RevocationList) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_aud = false;
        // Expiry runs against our own clock.
        validation.validate_exp = false;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer: issuer.to_string(),
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            clock: Arc::new(SystemClock),
            revocations,
            users: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enable the active-user check in full validation.
    pub fn with_user_directory(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn with_ttls(mut self, access_ttl: u64, refresh_ttl: u64) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign a token for `user_id` valid for `ttl_secs` from now.
    pub fn issue(
        &self,
        user_id: Uuid,
        email: &str,
        role: &str,
        token_type: TokenType,
        ttl_secs: u64,
    ) -> Result<String> {
        let now = self.clock.now();
        let ttl = i64::try_from(ttl_secs).context("token ttl out of range")?;

        let claims = SessionClaims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            token_type,
            iat: now,
            exp: now.saturating_add(ttl),
            jti: Uuid::now_v7().to_string(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode token")
    }

    /// Issue an access and refresh token with the configured lifetimes.
    pub fn issue_pair(&self, user_id: Uuid, email: &str, role: &str) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue(user_id, email, role, TokenType::Access, self.access_ttl)?,
            refresh_token: self.issue(
                user_id,
                email,
                role,
                TokenType::Refresh,
                self.refresh_ttl,
            )?,
            token_type: "Bearer",
            expires_in: self.access_ttl,
        })
    }

    /// Full validation, including the active-user check when a user
    /// directory is configured.
    pub async fn validate(&self, token: &str) -> Result<VerifiedClaims, TokenFailure> {
        let claims = self.validate_lightweight(token).await?;

        let Some(users) = &self.users else {
            return Ok(claims);
        };

        match users.find_user(claims.user_id).await {
            Ok(Some(user)) if user.is_active() => Ok(claims),
            Ok(Some(_)) => {
                debug!(user_id = %claims.user_id, "token for inactive user");
                Err(TokenFailure::InactiveUser)
            }
            Ok(None) => {
                debug!(user_id = %claims.user_id, "token for unknown user");
                Err(TokenFailure::UnknownUser)
            }
            Err(e) => {
                warn!(error = %e, "identity lookup failed; denying token");
                Err(TokenFailure::IdentityUnavailable)
            }
        }
    }

    /// Validation without the identity lookup.
    ///
    /// Surrounding whitespace is stripped before anything else, so a padded
    /// token shares its revocation entry with the bare one.
    pub async fn validate_lightweight(&self, token: &str) -> Result<VerifiedClaims, TokenFailure> {
        let token = token.trim();
        let claims = self.decode(token)?;

        if self.clock.now() >= claims.expires_at {
            return Err(TokenFailure::Expired);
        }

        match self.revocations.contains(token).await {
            Ok(false) => Ok(claims),
            Ok(true) => Err(TokenFailure::Revoked),
            Err(e) => {
                warn!(error = %e, "failed to check token revocation; denying token");
                Err(TokenFailure::RevocationUnavailable)
            }
        }
    }

    /// Full validation that also requires a specific token type.
    pub async fn validate_typed(
        &self,
        token: &str,
        expected: TokenType,
    ) -> Result<VerifiedClaims, TokenFailure> {
        let claims = self.validate(token).await?;
        expect_type(claims, expected)
    }

    /// Lightweight validation that also requires a specific token type.
    pub async fn validate_lightweight_typed(
        &self,
        token: &str,
        expected: TokenType,
    ) -> Result<VerifiedClaims, TokenFailure> {
        let claims = self.validate_lightweight(token).await?;
        expect_type(claims, expected)
    }

    /// Denylist a token for the rest of its natural life.
    ///
    /// The token must carry a valid signature. Tokens already past expiry
    /// are left out of the list. Of several concurrent calls for one token,
    /// exactly one sees [`RevokeOutcome::Revoked`].
    pub async fn revoke(&self, token: &str) -> Result<RevokeOutcome, TokenFailure> {
        let token = token.trim();
        let claims = self.decode(token)?;
        let remaining = self.remaining(&claims);

        if remaining == 0 {
            return Ok(RevokeOutcome::AlreadyExpired);
        }

        let recorded = self
            .revocations
            .insert(token, remaining)
            .await
            .map_err(|e| {
                warn!(error = %e, "failed to record token revocation");
                TokenFailure::RevocationUnavailable
            })?;

        if !recorded {
            debug!(jti = %claims.jti, "token already revoked");
            return Ok(RevokeOutcome::AlreadyRevoked);
        }

        debug!(jti = %claims.jti, ttl_secs = remaining, "token revoked");
        Ok(RevokeOutcome::Revoked {
            ttl_secs: remaining,
        })
    }

    /// Seconds until expiry, clamped at zero. `None` if the token does not
    /// verify.
    pub fn remaining_lifetime(&self, token: &str) -> Option<u64> {
        self.decode(token.trim()).ok().map(|c| self.remaining(&c))
    }

    fn remaining(&self, claims: &VerifiedClaims) -> u64 {
        u64::try_from(claims.expires_at.saturating_sub(self.clock.now())).unwrap_or(0)
    }

    /// Signature, issuer and claim decoding. No time or revocation checks.
    fn decode(&self, token: &str) -> Result<VerifiedClaims, TokenFailure> {
        if token.is_empty() {
            return Err(TokenFailure::Empty);
        }

        let data =
            jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
                .map_err(|e| match e.kind() {
                    ErrorKind::InvalidSignature
                    | ErrorKind::InvalidIssuer
                    | ErrorKind::InvalidAlgorithm => TokenFailure::BadSignature,
                    _ => TokenFailure::Decode,
                })?;

        VerifiedClaims::try_from(data.claims)
    }
}

fn expect_type(
    claims: VerifiedClaims,
    expected: TokenType,
) -> Result<VerifiedClaims, TokenFailure> {
    if claims.token_type != expected {
        debug!(expected = %expected, actual = %claims.token_type, "wrong token type");
        return Err(TokenFailure::WrongType);
    }
    Ok(claims)
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("user_check", &self.users.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::token::clock::ManualClock;

    const SECRET: &[u8] = b"test-secret-key-that-is-long-enough-for-hs256";

    fn service(clock: Arc<ManualClock>) -> TokenService {
        let revocations = RevocationList::new(Arc::new(MemoryCache::new()));
        TokenService::new(SECRET, DEFAULT_ISSUER, revocations).with_clock(clock)
    }

    #[tokio::test]
    async fn issued_token_validates() {
        let clock = Arc::new(ManualClock::at(1_700_000_000));
        let tokens = service(Arc::clone(&clock));
        let user = Uuid::now_v7();

        let token = tokens
            .issue(user, "a@example.com", "editor", TokenType::Access, 60)
            .unwrap();
        let claims = tokens.validate(&token).await.unwrap();

        assert_eq!(claims.user_id, user);
        assert_eq!(claims.role, "editor");
        assert_eq!(claims.issued_at, 1_700_000_000);
        assert_eq!(claims.expires_at, 1_700_000_060);
    }

    #[tokio::test]
    async fn expiry_is_exclusive() {
        let clock = Arc::new(ManualClock::at(1_000));
        let tokens = service(Arc::clone(&clock));
        let token = tokens
            .issue(Uuid::now_v7(), "", "", TokenType::Access, 10)
            .unwrap();

        clock.advance(9);
        assert!(tokens.validate_lightweight(&token).await.is_ok());
        clock.advance(1);
        assert_eq!(
            tokens.validate_lightweight(&token).await,
            Err(TokenFailure::Expired)
        );
    }

    #[tokio::test]
    async fn other_issuer_is_a_bad_signature() {
        let clock = Arc::new(ManualClock::starting_now());
        let ours = service(Arc::clone(&clock));
        let revocations = RevocationList::new(Arc::new(MemoryCache::new()));
        let theirs = TokenService::new(SECRET, "someone-else", revocations).with_clock(clock);

        let token = theirs
            .issue(Uuid::now_v7(), "", "", TokenType::Access, 60)
            .unwrap();
        assert_eq!(ours.validate(&token).await, Err(TokenFailure::BadSignature));
    }

    #[tokio::test]
    async fn garbage_and_empty_tokens_fail_with_tags() {
        let tokens = service(Arc::new(ManualClock::starting_now()));
        assert_eq!(tokens.validate("   ").await, Err(TokenFailure::Empty));
        assert_eq!(
            tokens.validate("invalid.jwt.token").await,
            Err(TokenFailure::Decode)
        );
        assert_eq!(tokens.remaining_lifetime("nope"), None);
    }

    #[tokio::test]
    async fn identical_issues_differ_by_jti() {
        let tokens = service(Arc::new(ManualClock::at(5_000)));
        let user = Uuid::now_v7();
        let a = tokens.issue(user, "", "", TokenType::Access, 60).unwrap();
        let b = tokens.issue(user, "", "", TokenType::Access, 60).unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn revoke_expired_token_records_nothing() {
        let clock = Arc::new(ManualClock::at(10_000));
        let tokens = service(Arc::clone(&clock));
        let token = tokens
            .issue(Uuid::now_v7(), "", "", TokenType::Access, 5)
            .unwrap();

        clock.advance(30);
        assert_eq!(
            tokens.revoke(&token).await,
            Ok(RevokeOutcome::AlreadyExpired)
        );
        assert_eq!(tokens.remaining_lifetime(&token), Some(0));
    }

    #[tokio::test]
    async fn typed_validation_rejects_other_type() {
        let tokens = service(Arc::new(ManualClock::starting_now()));
        let pair = tokens.issue_pair(Uuid::now_v7(), "", "editor").unwrap();

        assert!(tokens
            .validate_typed(&pair.refresh_token, TokenType::Refresh)
            .await
            .is_ok());
        assert_eq!(
            tokens
                .validate_typed(&pair.refresh_token, TokenType::Access)
                .await,
            Err(TokenFailure::WrongType)
        );
        assert_eq!(pair.expires_in, DEFAULT_ACCESS_TTL);
    }

    #[tokio::test]
    async fn lightweight_typed_rejects_refresh_as_access() {
        let tokens = service(Arc::new(ManualClock::starting_now()));
        let pair = tokens.issue_pair(Uuid::now_v7(), "", "admin").unwrap();

        assert_eq!(
            tokens
                .validate_lightweight_typed(&pair.refresh_token, TokenType::Access)
                .await,
            Err(TokenFailure::WrongType)
        );
        assert!(tokens
            .validate_lightweight_typed(&pair.access_token, TokenType::Access)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn padding_does_not_escape_revocation() {
        let tokens = service(Arc::new(ManualClock::at(1_000)));
        let token = tokens
            .issue(Uuid::now_v7(), "", "", TokenType::Access, 60)
            .unwrap();

        tokens.revoke(&format!(" {token}\n")).await.unwrap();
        assert_eq!(tokens.validate(&token).await, Err(TokenFailure::Revoked));
        assert_eq!(
            tokens.validate(&format!("{token} ")).await,
            Err(TokenFailure::Revoked)
        );
        assert_eq!(
            tokens.revoke(&format!("{token}\t")).await,
            Ok(RevokeOutcome::AlreadyRevoked)
        );
    }
}
