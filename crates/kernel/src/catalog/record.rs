//! Flat metadata records declared by plugins.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// How a menu entry is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuKind {
    /// Grouping node without its own page.
    Directory,
    /// A page inside the host.
    #[default]
    Page,
    /// An external link.
    Link,
}

/// Where a menu entry opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuTarget {
    #[default]
    #[serde(rename = "self")]
    SelfFrame,
    Blank,
}

/// A menu entry as declared, before tree construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuRecord {
    /// Globally unique identifier.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub path: String,
    /// Parent entry id; `None` for top-level entries.
    #[serde(default, alias = "parent")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    /// Sort key among siblings (lower = first).
    #[serde(default, alias = "weight")]
    pub order: i32,
    /// The user must hold every one of these.
    #[serde(default)]
    pub permissions_all: BTreeSet<String>,
    /// The user must hold at least one of these.
    #[serde(default)]
    pub permissions_any: BTreeSet<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub kind: MenuKind,
    #[serde(default)]
    pub target: MenuTarget,
    #[serde(default)]
    pub source_plugin: String,
    #[serde(default)]
    pub source_version: String,
}

fn default_true() -> bool {
    true
}

impl MenuRecord {
    /// A visible page entry with no permission requirements.
    pub fn new(id: &str, title: &str, path: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            path: path.to_string(),
            parent_id: None,
            icon: None,
            order: 0,
            permissions_all: BTreeSet::new(),
            permissions_any: BTreeSet::new(),
            visible: true,
            kind: MenuKind::Page,
            target: MenuTarget::SelfFrame,
            source_plugin: String::new(),
            source_version: String::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn requiring_all<I: IntoIterator<Item = &'static str>>(mut self, codes: I) -> Self {
        self.permissions_all = codes.into_iter().map(String::from).collect();
        self
    }

    pub fn requiring_any<I: IntoIterator<Item = &'static str>>(mut self, codes: I) -> Self {
        self.permissions_any = codes.into_iter().map(String::from).collect();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// A permission declared by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    /// Unique permission code (e.g. "blog.post.edit").
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Roles granted this permission on reconciliation.
    #[serde(default)]
    pub default_roles: BTreeSet<String>,
    #[serde(default)]
    pub source_plugin: String,
    #[serde(default)]
    pub source_version: String,
}

impl PermissionRecord {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            description: String::new(),
            default_roles: BTreeSet::new(),
            source_plugin: String::new(),
            source_version: String::new(),
        }
    }

    pub fn with_default_roles<I: IntoIterator<Item = &'static str>>(mut self, roles: I) -> Self {
        self.default_roles = roles.into_iter().map(String::from).collect();
        self
    }
}
