//! Capability registry - owns every registered capability handler.
//!
//! Handlers are kept sorted by priority (lower = earlier). Ties keep
//! registration order. The registry is copy-on-write: readers take a cheap
//! `Arc` snapshot, and each registration publishes a new snapshot with a
//! bumped generation so caches built from an older snapshot can tell.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

use super::dispatcher::{Flow, InvocationContext};

/// A named cross-cutting behavior applied around an operation.
pub trait CapabilityHandler: Send + Sync {
    /// Unique name within the registry.
    fn name(&self) -> &str;

    /// Ordering key (lower = runs earlier).
    fn priority(&self) -> i32;

    /// Human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Apply the capability to an invocation.
    fn apply(&self, ctx: &mut InvocationContext) -> Flow;
}

impl std::fmt::Debug for dyn CapabilityHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityHandler")
            .field("name", &self.name())
            .field("priority", &self.priority())
            .finish()
    }
}

/// Registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("capability handler '{0}' is already registered")]
    DuplicateName(String),
}

/// An immutable view of the registry at one generation.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    handlers: Vec<Arc<dyn CapabilityHandler>>,
}

impl RegistrySnapshot {
    /// Generation counter; bumped on every registration.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Handlers in execution order.
    pub fn handlers(&self) -> &[Arc<dyn CapabilityHandler>] {
        &self.handlers
    }

    /// Look up a handler by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn CapabilityHandler>> {
        self.handlers.iter().find(|h| h.name() == name)
    }
}

/// Process-wide registry of capability handlers.
///
/// Handlers are never removed at runtime.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler and re-sort by priority.
    ///
    /// Returns the new generation.
    pub fn register(&self, handler: Arc<dyn CapabilityHandler>) -> Result<u64, RegistryError> {
        let mut current = self.current.write();

        if current.get(handler.name()).is_some() {
            return Err(RegistryError::DuplicateName(handler.name().to_string()));
        }

        let mut handlers = current.handlers.clone();
        handlers.push(Arc::clone(&handler));
        // sort_by_key is stable: equal priorities keep registration order
        handlers.sort_by_key(|h| h.priority());

        let generation = current.generation + 1;
        *current = Arc::new(RegistrySnapshot {
            generation,
            handlers,
        });

        info!(
            handler = %handler.name(),
            priority = handler.priority(),
            generation,
            "registered capability handler"
        );

        Ok(generation)
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Handler names in execution order.
    pub fn names(&self) -> Vec<String> {
        self.snapshot()
            .handlers
            .iter()
            .map(|h| h.name().to_string())
            .collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.current.read().handlers.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
