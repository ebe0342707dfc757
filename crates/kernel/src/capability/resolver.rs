//! Capability resolver - maps (owner type, operation) to an ordered chain.
//!
//! Resolution is explicit opt-in: an operation with no selection at either
//! level gets an empty chain. Results are cached per key. Every cache entry
//! records the registry generation and operation-table epoch it was computed
//! from, so a chain computed concurrently with a registration is never served
//! once the registration is visible.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::dispatcher::CapabilityChain;
use super::operation::{OperationSpec, OperationTable, Selection};
use super::registry::{CapabilityHandler, CapabilityRegistry, RegistryError, RegistrySnapshot};

type CacheKey = (String, String);

#[derive(Debug, Clone)]
struct CachedChain {
    generation: u64,
    epoch: u64,
    chain: CapabilityChain,
}

/// Resolves and caches capability chains.
#[derive(Debug)]
pub struct CapabilityResolver {
    registry: Arc<CapabilityRegistry>,
    operations: OperationTable,
    /// Bumped whenever the operation table changes.
    epoch: AtomicU64,
    cache: DashMap<CacheKey, CachedChain>,
}

impl CapabilityResolver {
    /// Create a resolver over a registry.
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            operations: OperationTable::new(),
            epoch: AtomicU64::new(0),
            cache: DashMap::new(),
        }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Register a handler and drop every cached chain.
    pub fn register(&self, handler: Arc<dyn CapabilityHandler>) -> Result<(), RegistryError> {
        // The registry lock is released before the cache is touched.
        self.registry.register(handler)?;
        self.cache.clear();
        Ok(())
    }

    /// Attach capability selections to a routable operation.
    pub fn register_operation(&self, spec: OperationSpec) {
        debug!(
            owner = %spec.owner_type,
            operation = %spec.operation,
            "registered operation"
        );
        self.operations.insert(spec);
        self.bump_epoch();
    }

    /// Declare a selection for every operation of an owner type.
    pub fn declare_owner(&self, owner_type: &str, selection: Selection) {
        self.operations.declare_owner(owner_type, selection);
        self.bump_epoch();
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.cache.clear();
    }

    /// Resolve the chain for a registered operation.
    pub fn resolve_capabilities(&self, owner_type: &str, operation: &str) -> CapabilityChain {
        let (operation_selection, owner_selection) =
            self.operations.selections(owner_type, operation);
        self.resolve(
            owner_type,
            operation,
            operation_selection.as_ref(),
            owner_selection.as_ref(),
        )
    }

    /// Resolve a chain from explicit selections, caching by key.
    ///
    /// Compute-if-absent runs under the key's map entry, so concurrent first
    /// resolutions of one key retain a single result.
    pub fn resolve(
        &self,
        owner_type: &str,
        operation: &str,
        operation_selection: Option<&Selection>,
        owner_selection: Option<&Selection>,
    ) -> CapabilityChain {
        let snapshot = self.registry.snapshot();
        let epoch = self.epoch.load(Ordering::Acquire);
        let key = (owner_type.to_string(), operation.to_string());

        // An entry computed from a newer registry than our snapshot is
        // also acceptable.
        let fresh = |entry: &CachedChain| {
            entry.generation >= snapshot.generation() && entry.epoch >= epoch
        };

        if let Some(hit) = self.cache.get(&key)
            && fresh(hit.value())
        {
            return hit.chain.clone();
        }

        match self.cache.entry(key) {
            Entry::Occupied(entry) if fresh(entry.get()) => entry.get().chain.clone(),
            Entry::Occupied(mut entry) => {
                let chain = compute_chain(&snapshot, operation_selection, owner_selection);
                entry.insert(CachedChain {
                    generation: snapshot.generation(),
                    epoch,
                    chain: chain.clone(),
                });
                chain
            }
            Entry::Vacant(entry) => {
                let chain = compute_chain(&snapshot, operation_selection, owner_selection);
                debug!(
                    owner = %owner_type,
                    operation = %operation,
                    handlers = chain.len(),
                    "resolved capability chain"
                );
                entry.insert(CachedChain {
                    generation: snapshot.generation(),
                    epoch,
                    chain: chain.clone(),
                });
                chain
            }
        }
    }

    /// Number of cached chains (for monitoring).
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Drop every cached chain.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Expand a selection into handler references.
///
/// Unknown names are dropped.
fn expand(snapshot: &RegistrySnapshot, selection: &Selection) -> Vec<Arc<dyn CapabilityHandler>> {
    if selection.selects_all() {
        return snapshot.handlers().to_vec();
    }

    selection
        .names()
        .iter()
        .filter_map(|name| match snapshot.get(name) {
            Some(handler) => Some(Arc::clone(handler)),
            None => {
                debug!(handler = %name, "ignoring unknown capability handler");
                None
            }
        })
        .collect()
}

/// Operation-level handlers first, then owner-level; duplicates keep their
/// first occurrence; the result is stably sorted by priority.
fn compute_chain(
    snapshot: &RegistrySnapshot,
    operation_selection: Option<&Selection>,
    owner_selection: Option<&Selection>,
) -> CapabilityChain {
    if operation_selection.is_none() && owner_selection.is_none() {
        return CapabilityChain::default();
    }

    let mut handlers: Vec<Arc<dyn CapabilityHandler>> = Vec::new();
    for selection in [operation_selection, owner_selection].into_iter().flatten() {
        for handler in expand(snapshot, selection) {
            if !handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
                handlers.push(handler);
            }
        }
    }

    handlers.sort_by_key(|h| h.priority());
    CapabilityChain::new(handlers)
}
