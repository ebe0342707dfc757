//! Contracts for the persistent role-permission store.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Role every authenticated user holds implicitly.
pub const AUTHENTICATED_ROLE: &str = "authenticated";

/// Outcome of registering a permission by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionUpsert {
    /// The code was new.
    Created,
    /// The code existed and its name or description changed.
    Updated,
    /// The code existed with identical name and description.
    Unchanged,
}

/// Persistent permission catalog and role grants.
#[async_trait]
pub trait RolePermissionStore: Send + Sync {
    /// Create the permission if absent, else update its name/description.
    async fn register_permission(
        &self,
        code: &str,
        name: &str,
        description: &str,
    ) -> Result<PermissionUpsert>;

    /// Grant a permission to a role. `Ok(false)` means it was already granted.
    async fn grant_permission_to_role(&self, role: &str, code: &str) -> Result<bool>;

    /// Grant many permissions in one round trip.
    ///
    /// Returns the number of new grants, or `None` if the store has no bulk
    /// path and the caller should grant pair by pair.
    async fn batch_grant_permissions_to_roles(
        &self,
        _grants: &BTreeMap<String, Vec<String>>,
    ) -> Result<Option<usize>> {
        Ok(None)
    }
}

/// Resolves the effective permission set of a principal.
#[async_trait]
pub trait PermissionLookup: Send + Sync {
    async fn permissions_for(&self, user_id: Uuid) -> Result<HashSet<String>>;
}
