//! Declarative capability selections attached to routable operations.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// A list of capability names declared on an operation or owner type.
///
/// An empty list selects every registered handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection {
    names: Vec<String>,
}

impl Selection {
    /// Select every registered handler.
    pub fn all() -> Self {
        Self::default()
    }

    /// Select handlers by name.
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// True if this selects every handler.
    pub fn selects_all(&self) -> bool {
        self.names.is_empty()
    }

    /// Explicit names, in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Capability configuration for one routable operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    pub owner_type: String,
    pub operation: String,
    /// Selection declared on the operation itself.
    #[serde(default)]
    pub operation_selection: Option<Selection>,
    /// Selection declared on the owner type, overriding any owner-wide
    /// declaration for this operation only.
    #[serde(default)]
    pub owner_selection: Option<Selection>,
}

impl OperationSpec {
    /// An operation with no selections of its own.
    pub fn new(owner_type: &str, operation: &str) -> Self {
        Self {
            owner_type: owner_type.to_string(),
            operation: operation.to_string(),
            operation_selection: None,
            owner_selection: None,
        }
    }

    pub fn with_operation_selection(mut self, selection: Selection) -> Self {
        self.operation_selection = Some(selection);
        self
    }

    pub fn with_owner_selection(mut self, selection: Selection) -> Self {
        self.owner_selection = Some(selection);
        self
    }
}

/// Table of operations and owner-wide selections.
#[derive(Debug, Default)]
pub struct OperationTable {
    operations: DashMap<(String, String), OperationSpec>,
    owners: DashMap<String, Selection>,
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an operation.
    pub fn insert(&self, spec: OperationSpec) {
        self.operations
            .insert((spec.owner_type.clone(), spec.operation.clone()), spec);
    }

    /// Declare a selection for every operation of an owner type.
    pub fn declare_owner(&self, owner_type: &str, selection: Selection) {
        self.owners.insert(owner_type.to_string(), selection);
    }

    /// The effective (operation, owner) selections for an operation.
    ///
    /// Unknown operations still pick up the owner-wide selection.
    pub fn selections(
        &self,
        owner_type: &str,
        operation: &str,
    ) -> (Option<Selection>, Option<Selection>) {
        let spec = self
            .operations
            .get(&(owner_type.to_string(), operation.to_string()));

        let operation_selection = spec.as_ref().and_then(|s| s.operation_selection.clone());
        let owner_selection = spec
            .as_ref()
            .and_then(|s| s.owner_selection.clone())
            .or_else(|| self.owners.get(owner_type).map(|s| s.clone()));

        (operation_selection, owner_selection)
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
