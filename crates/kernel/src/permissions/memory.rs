//! In-process role-permission store backed by DashMap.
//!
//! Used when no database is configured, and throughout the tests.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::store::{AUTHENTICATED_ROLE, PermissionLookup, PermissionUpsert, RolePermissionStore};

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredPermission {
    name: String,
    description: String,
}

/// Role-permission store held in memory.
#[derive(Debug, Default)]
pub struct MemoryRolePermissionStore {
    permissions: DashMap<String, StoredPermission>,
    role_permissions: DashMap<String, BTreeSet<String>>,
    user_roles: DashMap<Uuid, BTreeSet<String>>,
}

impl MemoryRolePermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a role to a user.
    pub fn assign_role(&self, user_id: Uuid, role: &str) {
        self.user_roles
            .entry(user_id)
            .or_default()
            .insert(role.to_string());
    }

    /// Permission codes granted to a role.
    pub fn role_permissions(&self, role: &str) -> BTreeSet<String> {
        self.role_permissions
            .get(role)
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Name of a registered permission.
    pub fn permission_name(&self, code: &str) -> Option<String> {
        self.permissions.get(code).map(|p| p.name.clone())
    }

    /// Number of registered permissions.
    pub fn permission_count(&self) -> usize {
        self.permissions.len()
    }

    /// Total number of (role, permission) grants.
    pub fn grant_count(&self) -> usize {
        self.role_permissions.iter().map(|r| r.value().len()).sum()
    }
}

#[async_trait]
impl RolePermissionStore for MemoryRolePermissionStore {
    async fn register_permission(
        &self,
        code: &str,
        name: &str,
        description: &str,
    ) -> Result<PermissionUpsert> {
        let incoming = StoredPermission {
            name: name.to_string(),
            description: description.to_string(),
        };

        let outcome = match self.permissions.entry(code.to_string()) {
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(incoming);
                PermissionUpsert::Created
            }
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if *entry.get() == incoming {
                    PermissionUpsert::Unchanged
                } else {
                    entry.insert(incoming);
                    PermissionUpsert::Updated
                }
            }
        };

        Ok(outcome)
    }

    async fn grant_permission_to_role(&self, role: &str, code: &str) -> Result<bool> {
        Ok(self
            .role_permissions
            .entry(role.to_string())
            .or_default()
            .insert(code.to_string()))
    }

    async fn batch_grant_permissions_to_roles(
        &self,
        grants: &BTreeMap<String, Vec<String>>,
    ) -> Result<Option<usize>> {
        let mut granted = 0;
        for (role, codes) in grants {
            let mut entry = self.role_permissions.entry(role.clone()).or_default();
            for code in codes {
                if entry.insert(code.clone()) {
                    granted += 1;
                }
            }
        }
        Ok(Some(granted))
    }
}

#[async_trait]
impl PermissionLookup for MemoryRolePermissionStore {
    async fn permissions_for(&self, user_id: Uuid) -> Result<HashSet<String>> {
        let mut roles: Vec<String> = self
            .user_roles
            .get(&user_id)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default();
        roles.push(AUTHENTICATED_ROLE.to_string());

        let mut permissions = HashSet::new();
        for role in roles {
            if let Some(perms) = self.role_permissions.get(&role) {
                permissions.extend(perms.iter().cloned());
            }
        }

        Ok(permissions)
    }
}
