//! Permission reconciler - syncs declared permissions and default role
//! grants into the persistent store.
//!
//! Runs at boot and on demand. Re-running with the same records is safe: it
//! creates nothing new and treats existing grants as expected outcomes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::store::{PermissionUpsert, RolePermissionStore};
use crate::catalog::{MetadataCatalog, PermissionRecord};

/// SQLSTATE for unique-constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Message fragments that mark a duplicate-association failure.
const CONFLICT_SIGNATURES: &[&str] = &[
    "duplicate key",
    "unique constraint",
    "already exists",
    "already granted",
];

/// Counts from one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Permissions that did not exist before.
    pub created: usize,
    /// Permissions whose name or description changed.
    pub updated: usize,
    /// Permissions already present and identical.
    pub unchanged: usize,
    /// Permissions that failed to register.
    pub skipped: usize,
    /// New (role, permission) grants.
    pub role_assignments: usize,
    /// Grants that already existed.
    pub role_assignment_conflicts: usize,
    /// Grants that failed for any other reason.
    pub role_assignment_failures: usize,
}

/// Recognise a duplicate-association error anywhere in the chain.
pub fn is_conflict(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(sqlx::Error::Database(db)) = cause.downcast_ref::<sqlx::Error>()
            && db.code().as_deref() == Some(UNIQUE_VIOLATION)
        {
            return true;
        }
        let message = cause.to_string().to_lowercase();
        CONFLICT_SIGNATURES.iter().any(|sig| message.contains(sig))
    })
}

/// Syncs permission declarations into a role-permission store.
#[derive(Clone)]
pub struct PermissionReconciler {
    store: Arc<dyn RolePermissionStore>,
}

impl PermissionReconciler {
    pub fn new(store: Arc<dyn RolePermissionStore>) -> Self {
        Self { store }
    }

    /// Reconcile the catalog's current permission records.
    pub async fn sync_from_catalog(&self, catalog: &MetadataCatalog) -> ReconcileReport {
        let snapshot = catalog.snapshot();
        self.reconcile(snapshot.permissions()).await
    }

    /// Upsert every record, then grant every default role.
    ///
    /// A failure on one record or one grant never aborts the batch.
    pub async fn reconcile(&self, records: &[PermissionRecord]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for record in records {
            match self
                .store
                .register_permission(&record.code, &record.name, &record.description)
                .await
            {
                Ok(PermissionUpsert::Created) => report.created += 1,
                Ok(PermissionUpsert::Updated) => report.updated += 1,
                Ok(PermissionUpsert::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    warn!(
                        code = %record.code,
                        plugin = %record.source_plugin,
                        error = %e,
                        "failed to register permission, skipping"
                    );
                    report.skipped += 1;
                }
            }
        }

        let grants = collect_grants(records);
        self.grant_all(&grants, &mut report).await;

        info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            role_assignments = report.role_assignments,
            conflicts = report.role_assignment_conflicts,
            failures = report.role_assignment_failures,
            "permission reconciliation complete"
        );

        report
    }

    async fn grant_all(
        &self,
        grants: &BTreeMap<String, Vec<String>>,
        report: &mut ReconcileReport,
    ) {
        let total: usize = grants.values().map(Vec::len).sum();
        if total == 0 {
            return;
        }

        match self.store.batch_grant_permissions_to_roles(grants).await {
            Ok(Some(granted)) => {
                report.role_assignments += granted;
                report.role_assignment_conflicts += total.saturating_sub(granted);
                return;
            }
            Ok(None) => debug!("store has no bulk grant path, granting pair by pair"),
            Err(e) => warn!(error = %e, "bulk grant failed, falling back to per-pair grants"),
        }

        for (role, codes) in grants {
            for code in codes {
                match self.store.grant_permission_to_role(role, code).await {
                    Ok(true) => report.role_assignments += 1,
                    Ok(false) => report.role_assignment_conflicts += 1,
                    Err(e) if is_conflict(&e) => {
                        debug!(role = %role, code = %code, "permission already granted");
                        report.role_assignment_conflicts += 1;
                    }
                    Err(e) => {
                        warn!(role = %role, code = %code, error = %e, "failed to grant permission");
                        report.role_assignment_failures += 1;
                    }
                }
            }
        }
    }
}

/// Group default-role grants by role, deduplicated.
fn collect_grants(records: &[PermissionRecord]) -> BTreeMap<String, Vec<String>> {
    let mut grants: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for record in records {
        for role in &record.default_roles {
            grants
                .entry(role.clone())
                .or_default()
                .insert(record.code.clone());
        }
    }

    grants
        .into_iter()
        .map(|(role, codes)| (role, codes.into_iter().collect()))
        .collect()
}

impl std::fmt::Debug for PermissionReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionReconciler").finish()
    }
}
