//! Metadata sources - where menu and permission declarations come from.
//!
//! Plugins declare their menus and permissions in their `{name}.info.toml`
//! manifest:
//!
//! ```toml
//! name = "blog"
//! version = "1.0.0"
//!
//! [[permission]]
//! code = "blog.post.edit"
//! name = "Edit blog posts"
//! default_roles = ["editor"]
//!
//! [[menu]]
//! id = "blog"
//! title = "Blog"
//! path = "/admin/blog"
//! parent = "content"
//! permissions_all = ["blog.post.edit"]
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{MenuRecord, PermissionRecord};

/// Scanner collaborator feeding the metadata catalog.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Every declared menu entry, in scan order.
    async fn menu_items(&self) -> Result<Vec<MenuRecord>>;

    /// Every declared permission, in scan order.
    async fn permissions(&self) -> Result<Vec<PermissionRecord>>;
}

/// Fixed, in-memory metadata.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    menus: Vec<MenuRecord>,
    permissions: Vec<PermissionRecord>,
}

impl StaticSource {
    pub fn new(menus: Vec<MenuRecord>, permissions: Vec<PermissionRecord>) -> Self {
        Self { menus, permissions }
    }
}

#[async_trait]
impl MetadataSource for StaticSource {
    async fn menu_items(&self) -> Result<Vec<MenuRecord>> {
        Ok(self.menus.clone())
    }

    async fn permissions(&self) -> Result<Vec<PermissionRecord>> {
        Ok(self.permissions.clone())
    }
}

/// Menu and permission declarations from one plugin manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    /// Plugin machine name.
    pub name: String,

    /// Semantic version (e.g., "1.0.0").
    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, rename = "menu")]
    pub menus: Vec<MenuRecord>,

    #[serde(default, rename = "permission")]
    pub permissions: Vec<PermissionRecord>,
}

impl PluginManifest {
    /// Parse a manifest file.
    pub fn parse(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plugin manifest: {}", path.display()))?;

        Self::parse_str(&content, path)
    }

    /// Parse a manifest from TOML, stamping each record with its origin.
    pub fn parse_str(content: &str, path: &Path) -> Result<Self> {
        let mut manifest: PluginManifest = toml::from_str(content)
            .with_context(|| format!("failed to parse plugin manifest at {}", path.display()))?;

        manifest.validate(path)?;

        for menu in &mut manifest.menus {
            menu.source_plugin = manifest.name.clone();
            menu.source_version = manifest.version.clone();
        }
        for perm in &mut manifest.permissions {
            perm.source_plugin = manifest.name.clone();
            perm.source_version = manifest.version.clone();
        }

        Ok(manifest)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.name.is_empty() {
            bail!("plugin manifest at {} has empty 'name' field", path.display());
        }

        if self.version.is_empty() {
            bail!(
                "plugin '{}' at {} has empty 'version' field",
                self.name,
                path.display()
            );
        }

        if let Some(menu) = self.menus.iter().find(|m| m.id.is_empty()) {
            bail!(
                "plugin '{}' declares a menu entry '{}' without an id",
                self.name,
                menu.title
            );
        }

        if let Some(perm) = self.permissions.iter().find(|p| p.code.is_empty()) {
            bail!(
                "plugin '{}' declares a permission '{}' without a code",
                self.name,
                perm.name
            );
        }

        Ok(())
    }
}

/// Scans a plugins directory for `*/*.info.toml` manifests.
///
/// Plugin directories are visited in name order, so scan order (and hence
/// the tie-break between equally ordered menu siblings) is deterministic.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    plugins_dir: PathBuf,
}

impl ManifestSource {
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
        }
    }

    /// Parse every manifest under the plugins directory.
    pub fn scan(&self) -> Result<Vec<PluginManifest>> {
        let entries = std::fs::read_dir(&self.plugins_dir).with_context(|| {
            format!(
                "failed to read plugins directory {}",
                self.plugins_dir.display()
            )
        })?;

        let mut dirs: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .collect();
        dirs.sort_by_key(|e| e.file_name());

        let mut manifests = Vec::new();
        for entry in dirs {
            let plugin_dir = entry.path();
            let Some(manifest_path) = find_manifest(&plugin_dir)? else {
                warn!(dir = %plugin_dir.display(), "no .info.toml manifest found, skipping");
                continue;
            };

            let manifest = PluginManifest::parse(&manifest_path)?;
            debug!(
                plugin = %manifest.name,
                menus = manifest.menus.len(),
                permissions = manifest.permissions.len(),
                "scanned plugin manifest"
            );
            manifests.push(manifest);
        }

        Ok(manifests)
    }
}

fn find_manifest(plugin_dir: &Path) -> Result<Option<PathBuf>> {
    let entries = std::fs::read_dir(plugin_dir)
        .with_context(|| format!("failed to read plugin directory {}", plugin_dir.display()))?;

    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".info.toml"))
        })
        .collect();
    found.sort();

    if found.len() > 1 {
        bail!(
            "plugin directory {} contains more than one .info.toml manifest",
            plugin_dir.display()
        );
    }

    Ok(found.pop())
}

#[async_trait]
impl MetadataSource for ManifestSource {
    async fn menu_items(&self) -> Result<Vec<MenuRecord>> {
        Ok(self.scan()?.into_iter().flat_map(|m| m.menus).collect())
    }

    async fn permissions(&self) -> Result<Vec<PermissionRecord>> {
        Ok(self
            .scan()?
            .into_iter()
            .flat_map(|m| m.permissions)
            .collect())
    }
}
