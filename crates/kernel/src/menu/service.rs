//! Menu service - per-user filtered menu trees with DashMap-based caching.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::filter::{VisibilityPolicy, filter_for_user};
use super::tree::{MenuNode, find_in};
use crate::catalog::{CatalogError, MetadataCatalog};
use crate::permissions::PermissionLookup;

/// Cached per-user view, tagged with the catalog generation it came from.
#[derive(Debug, Clone)]
struct CachedMenu {
    generation: u64,
    tree: Arc<Vec<MenuNode>>,
}

/// Serves permission-filtered menu trees.
#[derive(Clone)]
pub struct MenuService {
    inner: Arc<MenuServiceInner>,
}

struct MenuServiceInner {
    catalog: Arc<MetadataCatalog>,
    permissions: Arc<dyn PermissionLookup>,
    policy: VisibilityPolicy,
    /// Cache of user_id -> filtered tree.
    user_cache: DashMap<Uuid, CachedMenu>,
    /// Bumped before every clear. A view computed across a bump is
    /// returned to its caller but not cached.
    invalidations: AtomicU64,
}

impl MenuService {
    /// Create a menu service over a loaded catalog.
    pub fn new(
        catalog: Arc<MetadataCatalog>,
        permissions: Arc<dyn PermissionLookup>,
        policy: VisibilityPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(MenuServiceInner {
                catalog,
                permissions,
                policy,
                user_cache: DashMap::new(),
                invalidations: AtomicU64::new(0),
            }),
        }
    }

    /// The unfiltered tree.
    pub fn tree(&self) -> Arc<Vec<MenuNode>> {
        self.inner.catalog.snapshot().tree()
    }

    /// Find a node by id in the unfiltered tree.
    pub fn find(&self, id: &str) -> Option<MenuNode> {
        find_in(&self.tree(), id)
    }

    /// The active visibility policy.
    pub fn policy(&self) -> VisibilityPolicy {
        self.inner.policy
    }

    /// The menu tree a user may see.
    ///
    /// Cached views built from an older catalog generation are treated as
    /// misses, so a view computed concurrently with a rescan is never served
    /// after the rescan completes. Likewise a view whose computation overlaps
    /// a cache clear may be returned once but is never stored.
    pub async fn get_user_menu_tree(
        &self,
        user_id: Uuid,
        use_cache: bool,
    ) -> Result<Arc<Vec<MenuNode>>> {
        let snapshot = self.inner.catalog.snapshot();

        if use_cache
            && let Some(cached) = self.inner.user_cache.get(&user_id)
            && cached.generation == snapshot.generation()
        {
            debug!(user_id = %user_id, "menu cache hit");
            return Ok(Arc::clone(&cached.tree));
        }

        let epoch = self.inner.invalidations.load(Ordering::Acquire);
        let permissions = self.inner.permissions.permissions_for(user_id).await?;
        let tree = Arc::new(filter_for_user(
            &snapshot.tree(),
            &permissions,
            self.inner.policy,
        ));

        let cached = CachedMenu {
            generation: snapshot.generation(),
            tree: Arc::clone(&tree),
        };
        // Compared under the entry's shard lock; a clear bumps the counter
        // before it removes, so it either sees this insert or prevents it.
        let slot = self.inner.user_cache.entry(user_id);
        if self.inner.invalidations.load(Ordering::Acquire) == epoch {
            slot.insert(cached);
        } else {
            debug!(user_id = %user_id, "menu cache cleared mid-flight; not caching");
        }

        debug!(
            user_id = %user_id,
            permissions = permissions.len(),
            roots = tree.len(),
            "menu tree computed"
        );

        Ok(tree)
    }

    /// Invalidate one user's cached view.
    ///
    /// Call this when a user's roles or permissions change.
    pub fn clear_user_menu_cache(&self, user_id: Uuid) {
        self.inner.invalidations.fetch_add(1, Ordering::AcqRel);
        self.inner.user_cache.remove(&user_id);
    }

    /// Invalidate every cached view.
    ///
    /// Call this when role permissions change.
    pub fn clear_all_menu_cache(&self) {
        self.inner.invalidations.fetch_add(1, Ordering::AcqRel);
        self.inner.user_cache.clear();
    }

    /// Rescan metadata, rebuild the tree, and drop every cached view.
    ///
    /// On a catalog error the previous tree stays in service.
    pub async fn refresh_menu_metadata(&self) -> Result<usize, CatalogError> {
        let snapshot = self.inner.catalog.rescan().await?;
        self.clear_all_menu_cache();

        let nodes = snapshot.tree().iter().map(MenuNode::count).sum();
        info!(
            generation = snapshot.generation(),
            nodes, "menu metadata refreshed"
        );
        Ok(nodes)
    }

    /// Number of cached views (for monitoring).
    pub fn cache_size(&self) -> usize {
        self.inner.user_cache.len()
    }
}

impl std::fmt::Debug for MenuService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuService")
            .field("policy", &self.inner.policy)
            .field("cached", &self.inner.user_cache.len())
            .finish()
    }
}
