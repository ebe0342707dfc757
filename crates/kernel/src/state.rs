//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use redis::Client as RedisClient;
use sqlx::PgPool;
use tracing::info;

use crate::cache::{KvCache, MemoryCache, RedisCache};
use crate::capability::{
    CapabilityRegistry, CapabilityResolver, declare_admin_operations, register_builtin,
};
use crate::catalog::{ManifestSource, MetadataCatalog};
use crate::config::Config;
use crate::db;
use crate::menu::MenuService;
use crate::permissions::{
    MemoryRolePermissionStore, PermissionLookup, PermissionReconciler, PgRolePermissionStore,
    RolePermissionStore,
};
use crate::token::{PgUserDirectory, RevocationList, TokenService};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Capability resolver with the built-in handlers registered.
    resolver: Arc<CapabilityResolver>,

    /// Declared menu and permission metadata.
    catalog: Arc<MetadataCatalog>,

    /// Per-user menu trees.
    menus: MenuService,

    /// Boot-time and on-demand permission reconciliation.
    reconciler: PermissionReconciler,

    /// Token issue, validation and revocation.
    tokens: Arc<TokenService>,

    /// PostgreSQL pool, when configured.
    db: Option<PgPool>,

    /// Redis client, when configured.
    redis: Option<RedisClient>,
}

/// The services an [`AppState`] is assembled from.
pub struct StateParts {
    pub resolver: Arc<CapabilityResolver>,
    pub catalog: Arc<MetadataCatalog>,
    pub menus: MenuService,
    pub reconciler: PermissionReconciler,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    /// Create application state from configuration.
    ///
    /// Fails if the metadata directory cannot be scanned or declares an
    /// inconsistent menu, so the host never starts with a broken tree.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = match &config.database_url {
            Some(url) => Some(
                db::create_pool(url, config.database_max_connections)
                    .await
                    .context("failed to create database pool")?,
            ),
            None => None,
        };

        let redis = match &config.redis_url {
            Some(url) => {
                let client =
                    RedisClient::open(url.as_str()).context("failed to create Redis client")?;
                let mut conn = client
                    .get_multiplexed_async_connection()
                    .await
                    .context("failed to connect to Redis")?;
                redis::cmd("PING")
                    .query_async::<String>(&mut conn)
                    .await
                    .context("Redis PING failed")?;
                Some(client)
            }
            None => None,
        };

        let (store, lookup): (Arc<dyn RolePermissionStore>, Arc<dyn PermissionLookup>) =
            match &db {
                Some(pool) => {
                    let store = Arc::new(PgRolePermissionStore::new(pool.clone()));
                    store
                        .ensure_schema()
                        .await
                        .context("failed to prepare role-permission schema")?;
                    let lookup: Arc<dyn PermissionLookup> = store.clone();
                    let store: Arc<dyn RolePermissionStore> = store;
                    (store, lookup)
                }
                None => {
                    info!("DATABASE_URL not set; role permissions kept in memory");
                    let store = Arc::new(MemoryRolePermissionStore::new());
                    let lookup: Arc<dyn PermissionLookup> = store.clone();
                    let store: Arc<dyn RolePermissionStore> = store;
                    (store, lookup)
                }
            };

        let cache: Arc<dyn KvCache> = match &redis {
            Some(client) => Arc::new(RedisCache::new(client.clone())),
            None => {
                info!("REDIS_URL not set; revocation list kept in memory");
                Arc::new(MemoryCache::new())
            }
        };

        let resolver = Arc::new(CapabilityResolver::new(Arc::new(CapabilityRegistry::new())));
        register_builtin(&resolver).context("failed to register built-in capabilities")?;
        declare_admin_operations(&resolver);

        let source = Arc::new(ManifestSource::new(config.metadata_dir.clone()));
        let catalog = Arc::new(
            MetadataCatalog::load(source)
                .await
                .context("failed to build menu metadata catalog")?,
        );

        let menus = MenuService::new(Arc::clone(&catalog), lookup, config.menu_visibility);
        let reconciler = PermissionReconciler::new(store);

        let mut tokens = TokenService::new(
            config.token_secret.as_bytes(),
            &config.token_issuer,
            RevocationList::new(cache),
        )
        .with_ttls(config.access_token_ttl, config.refresh_token_ttl);
        if let Some(pool) = &db {
            tokens = tokens.with_user_directory(Arc::new(PgUserDirectory::new(pool.clone())));
        }

        Ok(Self {
            inner: Arc::new(AppStateInner {
                resolver,
                catalog,
                menus,
                reconciler,
                tokens: Arc::new(tokens),
                db,
                redis,
            }),
        })
    }

    /// Assemble state from already-built services, without external stores.
    pub fn from_parts(parts: StateParts) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                resolver: parts.resolver,
                catalog: parts.catalog,
                menus: parts.menus,
                reconciler: parts.reconciler,
                tokens: parts.tokens,
                db: None,
                redis: None,
            }),
        }
    }

    /// Get the capability resolver.
    pub fn resolver(&self) -> &CapabilityResolver {
        &self.inner.resolver
    }

    /// Get the metadata catalog.
    pub fn catalog(&self) -> &MetadataCatalog {
        &self.inner.catalog
    }

    /// Get the menu service.
    pub fn menus(&self) -> &MenuService {
        &self.inner.menus
    }

    /// Get the permission reconciler.
    pub fn reconciler(&self) -> &PermissionReconciler {
        &self.inner.reconciler
    }

    /// Get the token service.
    pub fn tokens(&self) -> &TokenService {
        &self.inner.tokens
    }

    /// Check if PostgreSQL is healthy. `None` when not configured.
    pub async fn postgres_healthy(&self) -> Option<bool> {
        match &self.inner.db {
            Some(pool) => Some(db::check_health(pool).await),
            None => None,
        }
    }

    /// Check if Redis is healthy. `None` when not configured.
    pub async fn redis_healthy(&self) -> Option<bool> {
        let client = self.inner.redis.as_ref()?;
        let Ok(mut conn) = client.get_multiplexed_async_connection().await else {
            return Some(false);
        };

        Some(
            redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .is_ok(),
        )
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("menus", &self.inner.menus)
            .field("tokens", &self.inner.tokens)
            .field("db", &self.inner.db.is_some())
            .field("redis", &self.inner.redis.is_some())
            .finish_non_exhaustive()
    }
}
