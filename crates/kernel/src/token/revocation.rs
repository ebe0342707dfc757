//! Revocation list backed by the key-value cache.
//!
//! Entries live exactly as long as the token they deny would have, so the
//! list never grows past the set of live, revoked tokens.

use std::sync::Arc;

use anyhow::Result;

use crate::cache::KvCache;

const KEY_PREFIX: &str = "revoked:";
const SENTINEL: &str = "1";

/// TTL-bounded denylist of raw tokens.
#[derive(Clone)]
pub struct RevocationList {
    cache: Arc<dyn KvCache>,
}

impl RevocationList {
    pub fn new(cache: Arc<dyn KvCache>) -> Self {
        Self { cache }
    }

    fn key(token: &str) -> String {
        format!("{KEY_PREFIX}{token}")
    }

    /// Deny `token` for the next `ttl_secs` seconds.
    ///
    /// Returns `true` only for the call that recorded the token; a token
    /// already on the list, or a zero TTL, gives `false`.
    pub async fn insert(&self, token: &str, ttl_secs: u64) -> Result<bool> {
        if ttl_secs == 0 {
            return Ok(false);
        }
        self.cache
            .put_if_absent(&Self::key(token), SENTINEL, ttl_secs)
            .await
    }

    pub async fn contains(&self, token: &str) -> Result<bool> {
        self.cache.exists(&Self::key(token)).await
    }
}

impl std::fmt::Debug for RevocationList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationList").finish_non_exhaustive()
    }
}
