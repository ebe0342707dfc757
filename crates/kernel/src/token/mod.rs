//! Signed, revocable session tokens.
//!
//! Tokens are HS256 JWTs carrying the subject, role and token type. Expiry
//! is judged by an injectable [`Clock`]; revocation goes through a
//! TTL-bounded [`RevocationList`] on top of the key-value cache.

mod claims;
mod clock;
mod identity;
mod revocation;
mod service;

pub use claims::{SessionClaims, TokenFailure, TokenType, VerifiedClaims};
pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::{MemoryUserDirectory, PgUserDirectory, UserDirectory, UserRecord};
pub use revocation::RevocationList;
pub use service::{DEFAULT_ISSUER, RevokeOutcome, TokenPair, TokenService};
