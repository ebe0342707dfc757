//! Metadata catalog - the flat menu and permission declarations of every
//! plugin, plus the menu tree built from them.
//!
//! The catalog is loaded once at startup and replaced wholesale on rescan.
//! A scan that produces inconsistent metadata (duplicate ids, dangling
//! parents, cycles) is rejected and the previous snapshot stays in place.

mod record;
mod source;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

use crate::menu::{MenuNode, build_tree};

pub use record::{MenuKind, MenuRecord, MenuTarget, PermissionRecord};
pub use source::{ManifestSource, MetadataSource, PluginManifest, StaticSource};

/// Catalog construction errors. These are fatal at boot.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate menu id '{0}'")]
    DuplicateMenuId(String),

    #[error("menu '{id}' references unknown parent '{parent}'")]
    MissingParent { id: String, parent: String },

    #[error("menu '{0}' is its own ancestor")]
    Cycle(String),

    #[error("duplicate permission code '{0}'")]
    DuplicatePermission(String),

    #[error("metadata scan failed: {0:#}")]
    Source(#[from] anyhow::Error),
}

/// One consistent view of the catalog.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    generation: u64,
    menus: Vec<MenuRecord>,
    permissions: Vec<PermissionRecord>,
    tree: Arc<Vec<MenuNode>>,
}

impl CatalogSnapshot {
    /// Bumped on every successful rescan.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Flat menu records in scan order.
    pub fn menus(&self) -> &[MenuRecord] {
        &self.menus
    }

    /// Permission records in scan order.
    pub fn permissions(&self) -> &[PermissionRecord] {
        &self.permissions
    }

    /// Unfiltered menu tree.
    pub fn tree(&self) -> Arc<Vec<MenuNode>> {
        Arc::clone(&self.tree)
    }
}

/// Process-wide metadata catalog.
pub struct MetadataCatalog {
    source: Arc<dyn MetadataSource>,
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl MetadataCatalog {
    /// Scan the source and build the initial snapshot.
    pub async fn load(source: Arc<dyn MetadataSource>) -> Result<Self, CatalogError> {
        let catalog = Self {
            source,
            current: RwLock::new(Arc::new(CatalogSnapshot::default())),
        };
        catalog.rescan().await?;
        Ok(catalog)
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Re-pull every record from the source, validate, and swap.
    ///
    /// Readers see either the old or the new snapshot, never a mix.
    pub async fn rescan(&self) -> Result<Arc<CatalogSnapshot>, CatalogError> {
        let menus = self.source.menu_items().await?;
        let permissions = self.source.permissions().await?;

        let mut codes = HashSet::new();
        for perm in &permissions {
            if !codes.insert(perm.code.as_str()) {
                return Err(CatalogError::DuplicatePermission(perm.code.clone()));
            }
        }

        let tree = Arc::new(build_tree(&menus)?);

        let snapshot = {
            let mut current = self.current.write();
            let snapshot = Arc::new(CatalogSnapshot {
                generation: current.generation + 1,
                menus,
                permissions,
                tree,
            });
            *current = Arc::clone(&snapshot);
            snapshot
        };

        info!(
            generation = snapshot.generation,
            menus = snapshot.menus.len(),
            permissions = snapshot.permissions.len(),
            "metadata catalog loaded"
        );

        Ok(snapshot)
    }
}

impl std::fmt::Debug for MetadataCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCatalog")
            .field("generation", &self.current.read().generation)
            .finish()
    }
}
