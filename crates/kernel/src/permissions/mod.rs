//! Permissions: the persistent role-permission store and the reconciler
//! that keeps it in line with plugin declarations.

mod memory;
mod pg;
mod reconcile;
mod store;

pub use memory::MemoryRolePermissionStore;
pub use pg::PgRolePermissionStore;
pub use reconcile::{PermissionReconciler, ReconcileReport, is_conflict};
pub use store::{AUTHENTICATED_ROLE, PermissionLookup, PermissionUpsert, RolePermissionStore};
