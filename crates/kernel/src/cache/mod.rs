//! Key-value cache abstraction with Moka (in-process) and Redis backends.
//!
//! The core only needs `get`, `put` with a TTL, `remove` and `exists`, plus
//! an atomic `put_if_absent`. The token revocation list is the main
//! consumer; a deployment with several
//! kernel instances should point it at Redis so a revocation on one instance
//! is seen by all of them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use redis::AsyncCommands;
use redis::Client as RedisClient;
use tracing::debug;

/// Maximum entries held by the in-process cache.
const MEMORY_MAX_CAPACITY: u64 = 100_000;

/// Minimal key-value cache contract.
///
/// A `ttl_secs` of zero stores the value without expiry.
#[async_trait]
pub trait KvCache: Send + Sync {
    /// Fetch a value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value with a time-to-live in seconds.
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Store a value only if no live value exists. Returns `true` when this
    /// call stored it. Concurrent callers for one key see exactly one `true`.
    async fn put_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool>;

    /// Delete a value. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Check whether a live value exists.
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Value stored in the Moka cache alongside its own TTL.
#[derive(Debug, Clone)]
struct TimedValue {
    value: String,
    ttl: Option<Duration>,
}

/// Per-entry expiry policy: each value carries its own TTL.
struct PerEntryTtl;

impl Expiry<String, TimedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &TimedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &TimedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// In-process cache backed by Moka.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Arc<Cache<String, TimedValue>>,
}

impl MemoryCache {
    /// Create an empty in-process cache.
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(MEMORY_MAX_CAPACITY)
            .expire_after(PerEntryTtl)
            .build();

        Self {
            inner: Arc::new(cache),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.get(key).await.map(|v| v.value))
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let ttl = (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs));
        self.inner
            .insert(
                key.to_string(),
                TimedValue {
                    value: value.to_string(),
                    ttl,
                },
            )
            .await;
        debug!(key = %key, ttl = %ttl_secs, "memory cache set");
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let ttl = (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs));
        let entry = self
            .inner
            .entry(key.to_string())
            .or_insert_with(async {
                TimedValue {
                    value: value.to_string(),
                    ttl,
                }
            })
            .await;
        debug!(key = %key, stored = entry.is_fresh(), "memory cache set-if-absent");
        Ok(entry.is_fresh())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.invalidate(key).await;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.inner.get(key).await.is_some())
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

/// Cache shared across instances through Redis.
#[derive(Clone)]
pub struct RedisCache {
    client: RedisClient,
}

impl RedisCache {
    /// Create a Redis-backed cache. No connection is opened until first use.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .context("failed to get Redis connection for cache")
    }
}

#[async_trait]
impl KvCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let val: Option<String> = conn
            .get(key)
            .await
            .with_context(|| format!("failed to read cache key {key}"))?;
        Ok(val)
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.connection().await?;
        if ttl_secs > 0 {
            conn.set_ex::<_, _, ()>(key, value, ttl_secs)
                .await
                .with_context(|| format!("failed to set cache key {key}"))?;
        } else {
            conn.set::<_, _, ()>(key, value)
                .await
                .with_context(|| format!("failed to set cache key {key}"))?;
        }
        debug!(key = %key, ttl = %ttl_secs, "redis cache set");
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if ttl_secs > 0 {
            cmd.arg("EX").arg(ttl_secs);
        }
        // Nil reply means the key was already there.
        let reply: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .with_context(|| format!("failed to set cache key {key}"))?;
        debug!(key = %key, stored = reply.is_some(), "redis cache set-if-absent");
        Ok(reply.is_some())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key)
            .await
            .with_context(|| format!("failed to delete cache key {key}"))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let found: bool = conn
            .exists(key)
            .await
            .with_context(|| format!("failed to check cache key {key}"))?;
        Ok(found)
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish()
    }
}
