//! Menu tree construction from flat records.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::catalog::{CatalogError, MenuKind, MenuRecord, MenuTarget};

/// One entry in the navigation hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuNode {
    pub id: String,
    pub title: String,
    pub path: String,
    pub parent_id: Option<String>,
    pub icon: Option<String>,
    pub order: i32,
    pub permissions_all: BTreeSet<String>,
    pub permissions_any: BTreeSet<String>,
    pub visible: bool,
    pub kind: MenuKind,
    pub target: MenuTarget,
    pub source_plugin: String,
    pub source_version: String,
    /// Children sorted by `order`, ties in scan order.
    pub children: Vec<MenuNode>,
}

impl MenuNode {
    fn leaf(record: &MenuRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            path: record.path.clone(),
            parent_id: record.parent_id.clone(),
            icon: record.icon.clone(),
            order: record.order,
            permissions_all: record.permissions_all.clone(),
            permissions_any: record.permissions_any.clone(),
            visible: record.visible,
            kind: record.kind,
            target: record.target,
            source_plugin: record.source_plugin.clone(),
            source_version: record.source_version.clone(),
            children: Vec::new(),
        }
    }

    /// Copy of this node without its children.
    pub(crate) fn shallow_clone(&self) -> MenuNode {
        MenuNode {
            id: self.id.clone(),
            title: self.title.clone(),
            path: self.path.clone(),
            parent_id: self.parent_id.clone(),
            icon: self.icon.clone(),
            order: self.order,
            permissions_all: self.permissions_all.clone(),
            permissions_any: self.permissions_any.clone(),
            visible: self.visible,
            kind: self.kind,
            target: self.target,
            source_plugin: self.source_plugin.clone(),
            source_version: self.source_version.clone(),
            children: Vec::new(),
        }
    }

    /// Depth-first search for a node by id.
    pub fn find(&self, id: &str) -> Option<&MenuNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// Number of nodes in this subtree, including this one.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(MenuNode::count).sum::<usize>()
    }
}

/// Find a node by id anywhere in a forest.
pub fn find_in(tree: &[MenuNode], id: &str) -> Option<MenuNode> {
    tree.iter().find_map(|n| n.find(id)).cloned()
}

/// Link flat records into an ordered forest.
///
/// Every id must be unique, every parent must exist, and no record may be
/// its own ancestor. Violations are errors, never repaired.
pub fn build_tree(records: &[MenuRecord]) -> Result<Vec<MenuNode>, CatalogError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        if index.insert(record.id.as_str(), i).is_some() {
            return Err(CatalogError::DuplicateMenuId(record.id.clone()));
        }
    }

    let mut roots = Vec::new();
    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        match &record.parent_id {
            None => roots.push(i),
            Some(parent) => {
                let Some(&p) = index.get(parent.as_str()) else {
                    return Err(CatalogError::MissingParent {
                        id: record.id.clone(),
                        parent: parent.clone(),
                    });
                };
                children.entry(p).or_default().push(i);
            }
        }
    }

    check_acyclic(records, &index)?;

    // Stable sorts: equal orders keep scan order.
    roots.sort_by_key(|&i| records[i].order);
    for list in children.values_mut() {
        list.sort_by_key(|&i| records[i].order);
    }

    Ok(roots
        .into_iter()
        .map(|i| assemble(i, records, &children))
        .collect())
}

/// Walk each record's parent chain; reaching a record twice in one walk is a
/// cycle. Records already proven to reach a root are not walked again.
fn check_acyclic(records: &[MenuRecord], index: &HashMap<&str, usize>) -> Result<(), CatalogError> {
    let mut rooted: HashSet<usize> = HashSet::new();

    for start in 0..records.len() {
        let mut path: Vec<usize> = Vec::new();
        let mut on_path: HashSet<usize> = HashSet::new();
        let mut current = Some(start);

        while let Some(i) = current {
            if rooted.contains(&i) {
                break;
            }
            if !on_path.insert(i) {
                return Err(CatalogError::Cycle(records[i].id.clone()));
            }
            path.push(i);
            current = records[i]
                .parent_id
                .as_deref()
                .and_then(|p| index.get(p).copied());
        }

        rooted.extend(path);
    }

    Ok(())
}

fn assemble(i: usize, records: &[MenuRecord], children: &HashMap<usize, Vec<usize>>) -> MenuNode {
    let mut node = MenuNode::leaf(&records[i]);
    if let Some(kids) = children.get(&i) {
        node.children = kids
            .iter()
            .map(|&c| assemble(c, records, children))
            .collect();
    }
    node
}
