//! Capability system for cross-cutting operation handlers.
//!
//! Handlers register once with a name and priority. Operations declare which
//! handlers apply to them (at operation level and/or owner-type level), and
//! the resolver turns those declarations into an ordered, cached chain that
//! runs around each request.

mod builtin;
mod dispatcher;
mod operation;
mod registry;
mod resolver;

pub use builtin::{
    ADMIN_OPERATIONS, ADMIN_OWNER, ADMIN_ROLE, AdminRoleOnly, AuditTrail, AuthenticatedOnly,
    declare_admin_operations, register_builtin,
};
pub use dispatcher::{CapabilityChain, ChainOutcome, Flow, InvocationContext};
pub use operation::{OperationSpec, OperationTable, Selection};
pub use registry::{CapabilityHandler, CapabilityRegistry, RegistryError, RegistrySnapshot};
pub use resolver::CapabilityResolver;
