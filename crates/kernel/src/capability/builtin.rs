//! Built-in capability handlers registered at boot.

use std::sync::Arc;

use tracing::info;

use super::{
    CapabilityHandler, CapabilityResolver, Flow, InvocationContext, OperationSpec, RegistryError,
    Selection,
};

/// Role claim that passes [`AdminRoleOnly`].
pub const ADMIN_ROLE: &str = "admin";

/// Owner type of the administrative operations.
pub const ADMIN_OWNER: &str = "admin";

/// Administrative operations exposed over HTTP and the CLI.
pub const ADMIN_OPERATIONS: &[&str] = &[
    "menu.refresh",
    "menu.clear_cache",
    "menu.clear_user_cache",
    "permissions.sync",
];

/// Halts anonymous invocations.
#[derive(Debug, Default)]
pub struct AuthenticatedOnly;

impl CapabilityHandler for AuthenticatedOnly {
    fn name(&self) -> &str {
        "authenticated"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn description(&self) -> &str {
        "Rejects invocations without an authenticated principal"
    }

    fn apply(&self, ctx: &mut InvocationContext) -> Flow {
        if ctx.user_id.is_some() {
            Flow::Continue
        } else {
            Flow::Halt("authentication required".to_string())
        }
    }
}

/// Halts invocations whose principal lacks the admin role claim.
#[derive(Debug, Default)]
pub struct AdminRoleOnly;

impl CapabilityHandler for AdminRoleOnly {
    fn name(&self) -> &str {
        "admin_role"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn description(&self) -> &str {
        "Rejects invocations from principals without the admin role"
    }

    fn apply(&self, ctx: &mut InvocationContext) -> Flow {
        match ctx.role.as_deref() {
            Some(ADMIN_ROLE) => Flow::Continue,
            _ => Flow::Halt("admin role required".to_string()),
        }
    }
}

/// Logs every invocation that reaches it.
#[derive(Debug, Default)]
pub struct AuditTrail;

impl CapabilityHandler for AuditTrail {
    fn name(&self) -> &str {
        "audit"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn description(&self) -> &str {
        "Records the invocation in the audit log"
    }

    fn apply(&self, ctx: &mut InvocationContext) -> Flow {
        info!(
            owner = %ctx.owner_type,
            operation = %ctx.operation,
            user_id = ?ctx.user_id,
            "audit"
        );
        Flow::Continue
    }
}

/// Register the built-in handlers.
pub fn register_builtin(resolver: &CapabilityResolver) -> Result<(), RegistryError> {
    resolver.register(Arc::new(AuthenticatedOnly))?;
    resolver.register(Arc::new(AdminRoleOnly))?;
    resolver.register(Arc::new(AuditTrail))?;
    Ok(())
}

/// Declare the admin operations. Every registered handler applies to them.
pub fn declare_admin_operations(resolver: &CapabilityResolver) {
    resolver.declare_owner(ADMIN_OWNER, Selection::all());
    for operation in ADMIN_OPERATIONS {
        resolver.register_operation(OperationSpec::new(ADMIN_OWNER, operation));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityRegistry, Selection};
    use uuid::Uuid;

    #[test]
    fn builtin_order() {
        let resolver = CapabilityResolver::new(Arc::new(CapabilityRegistry::new()));
        register_builtin(&resolver).unwrap();

        let chain = resolver.resolve("admin", "x", None, Some(&Selection::all()));
        assert_eq!(chain.names(), vec!["authenticated", "admin_role", "audit"]);
    }

    #[test]
    fn admin_role_gate() {
        let mut anon = InvocationContext::new("admin", "x");
        assert!(matches!(AdminRoleOnly.apply(&mut anon), Flow::Halt(_)));

        let mut editor =
            InvocationContext::new("admin", "x").with_principal(Uuid::now_v7(), "editor");
        assert!(matches!(AdminRoleOnly.apply(&mut editor), Flow::Halt(_)));

        let mut admin =
            InvocationContext::new("admin", "x").with_principal(Uuid::now_v7(), ADMIN_ROLE);
        assert_eq!(AdminRoleOnly.apply(&mut admin), Flow::Continue);
    }

    #[test]
    fn authenticated_gate() {
        let mut anon = InvocationContext::new("menu", "view");
        assert!(matches!(AuthenticatedOnly.apply(&mut anon), Flow::Halt(_)));

        let mut user =
            InvocationContext::new("menu", "view").with_principal(Uuid::now_v7(), "editor");
        assert_eq!(AuthenticatedOnly.apply(&mut user), Flow::Continue);
    }

    #[test]
    fn admin_operations_run_every_handler() {
        let resolver = CapabilityResolver::new(Arc::new(CapabilityRegistry::new()));
        register_builtin(&resolver).unwrap();
        declare_admin_operations(&resolver);

        for operation in ADMIN_OPERATIONS {
            let chain = resolver.resolve_capabilities(ADMIN_OWNER, operation);
            assert_eq!(chain.len(), 3, "{operation}");
        }
    }
}
