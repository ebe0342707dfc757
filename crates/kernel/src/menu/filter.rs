//! Per-principal menu filtering with AND/OR permission predicates.

use std::collections::HashSet;
use std::str::FromStr;

use anyhow::bail;

use super::MenuNode;

/// How a rejected node affects its descendants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VisibilityPolicy {
    /// A rejected node hides its whole subtree.
    #[default]
    PruneSubtree,
    /// A rejected node is dropped; its retained descendants take its place.
    PerNode,
}

impl FromStr for VisibilityPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prune" | "prune_subtree" => Ok(Self::PruneSubtree),
            "per_node" | "per-node" => Ok(Self::PerNode),
            other => bail!("unknown menu visibility policy '{other}'"),
        }
    }
}

/// Whether a single node admits a principal, ignoring its ancestors.
pub fn is_permitted(node: &MenuNode, user_permissions: &HashSet<String>) -> bool {
    node.visible
        && node
            .permissions_all
            .iter()
            .all(|p| user_permissions.contains(p))
        && (node.permissions_any.is_empty()
            || node
                .permissions_any
                .iter()
                .any(|p| user_permissions.contains(p)))
}

/// Filter a tree for a principal's permission set.
pub fn filter_for_user(
    tree: &[MenuNode],
    user_permissions: &HashSet<String>,
    policy: VisibilityPolicy,
) -> Vec<MenuNode> {
    let mut out = Vec::new();
    for node in tree {
        filter_node(node, user_permissions, policy, &mut out);
    }
    out
}

fn filter_node(
    node: &MenuNode,
    user_permissions: &HashSet<String>,
    policy: VisibilityPolicy,
    out: &mut Vec<MenuNode>,
) {
    if is_permitted(node, user_permissions) {
        let mut kept = node.shallow_clone();
        for child in &node.children {
            filter_node(child, user_permissions, policy, &mut kept.children);
        }
        out.push(kept);
    } else if policy == VisibilityPolicy::PerNode {
        for child in &node.children {
            filter_node(child, user_permissions, policy, out);
        }
    }
}
