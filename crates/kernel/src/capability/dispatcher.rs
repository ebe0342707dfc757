//! Capability chain execution.
//!
//! A resolved chain is applied to an invocation in order. The first handler
//! that halts stops the chain; later handlers do not run.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use super::CapabilityHandler;

/// Result of applying one handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Proceed with the next handler.
    Continue,
    /// Stop the chain with a reason.
    Halt(String),
}

/// Per-invocation state handed to each handler.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    /// Owner type of the operation being invoked.
    pub owner_type: String,
    /// Operation being invoked.
    pub operation: String,
    /// Authenticated principal, if any.
    pub user_id: Option<Uuid>,
    /// Role claim of the principal.
    pub role: Option<String>,
    /// Free-form values handlers may read or add.
    pub attributes: HashMap<String, serde_json::Value>,
    /// Names of handlers applied so far, in order.
    pub applied: Vec<String>,
}

impl InvocationContext {
    /// Context for an anonymous invocation.
    pub fn new(owner_type: &str, operation: &str) -> Self {
        Self {
            owner_type: owner_type.to_string(),
            operation: operation.to_string(),
            ..Default::default()
        }
    }

    /// Attach a principal.
    pub fn with_principal(mut self, user_id: Uuid, role: &str) -> Self {
        self.user_id = Some(user_id);
        self.role = Some(role.to_string());
        self
    }
}

/// Outcome of running a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Every handler continued.
    Completed,
    /// A handler halted the chain.
    Halted { handler: String, reason: String },
}

impl ChainOutcome {
    /// True if no handler halted.
    pub fn is_completed(&self) -> bool {
        matches!(self, ChainOutcome::Completed)
    }
}

/// An ordered, shareable list of handlers for one operation.
#[derive(Debug, Clone, Default)]
pub struct CapabilityChain {
    handlers: Arc<[Arc<dyn CapabilityHandler>]>,
}

impl CapabilityChain {
    pub(crate) fn new(handlers: Vec<Arc<dyn CapabilityHandler>>) -> Self {
        Self {
            handlers: handlers.into(),
        }
    }

    /// Handlers in execution order.
    pub fn handlers(&self) -> &[Arc<dyn CapabilityHandler>] {
        &self.handlers
    }

    /// Handler names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// True if both chains hold the same handler instances in the same order.
    pub fn same_handlers(&self, other: &CapabilityChain) -> bool {
        self.handlers.len() == other.handlers.len()
            && self
                .handlers
                .iter()
                .zip(other.handlers.iter())
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }

    /// Apply each handler in order until one halts.
    pub fn run(&self, ctx: &mut InvocationContext) -> ChainOutcome {
        for handler in self.handlers.iter() {
            let flow = handler.apply(ctx);
            ctx.applied.push(handler.name().to_string());

            if let Flow::Halt(reason) = flow {
                debug!(
                    handler = %handler.name(),
                    operation = %ctx.operation,
                    reason = %reason,
                    "capability chain halted"
                );
                return ChainOutcome::Halted {
                    handler: handler.name().to_string(),
                    reason,
                };
            }
        }

        ChainOutcome::Completed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct Step(&'static str, bool);

    impl CapabilityHandler for Step {
        fn name(&self) -> &str {
            self.0
        }
        fn priority(&self) -> i32 {
            0
        }
        fn apply(&self, _ctx: &mut InvocationContext) -> Flow {
            if self.1 {
                Flow::Continue
            } else {
                Flow::Halt(format!("{} said no", self.0))
            }
        }
    }

    #[test]
    fn empty_chain_completes() {
        let chain = CapabilityChain::default();
        let mut ctx = InvocationContext::new("admin", "view");
        assert!(chain.run(&mut ctx).is_completed());
        assert!(ctx.applied.is_empty());
    }

    #[test]
    fn halt_stops_later_handlers() {
        let chain = CapabilityChain::new(vec![
            Arc::new(Step("a", true)),
            Arc::new(Step("b", false)),
            Arc::new(Step("c", true)),
        ]);
        let mut ctx = InvocationContext::new("admin", "view");

        let outcome = chain.run(&mut ctx);

        assert_eq!(
            outcome,
            ChainOutcome::Halted {
                handler: "b".to_string(),
                reason: "b said no".to_string()
            }
        );
        assert_eq!(ctx.applied, vec!["a", "b"]);
    }
}
