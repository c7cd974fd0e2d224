//! The shared context-node capability.
//!
//! Every level of the runtime tree embeds a [`ContextCore`]. Parent links are
//! plain [`ContextId`] handles resolved through the arena owned by the
//! [`ConfigurationContext`], so no level owns its ancestors.

use super::{
    ConfigurationContext, OperationContext, PropertyBag, ServiceContext, ServiceGroupContext,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle of a context node inside the configuration arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocates a fresh, process-unique id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A recorded change to a replicable property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyDifference {
    /// The property was set to this value.
    Set(serde_json::Value),
    /// The property was removed.
    Removed,
}

/// State shared by every context node.
pub struct ContextCore {
    id: ContextId,
    parent: RwLock<Option<ContextId>>,
    root: RwLock<Weak<ConfigurationContext>>,
    properties: PropertyBag,
    non_replicable: PropertyBag,
    differences: Mutex<HashMap<String, PropertyDifference>>,
    last_touched: AtomicI64,
}

impl ContextCore {
    /// Creates a detached node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ContextId::next(),
            parent: RwLock::new(None),
            root: RwLock::new(Weak::new()),
            properties: PropertyBag::new(),
            non_replicable: PropertyBag::new(),
            differences: Mutex::new(HashMap::new()),
            last_touched: AtomicI64::new(crate::utils::now_millis()),
        }
    }

    /// Creates a node under `parent` in the arena of `root`.
    #[must_use]
    pub fn with_parent(parent: ContextId, root: &Arc<ConfigurationContext>) -> Self {
        let core = Self::new();
        *core.parent.write() = Some(parent);
        *core.root.write() = Arc::downgrade(root);
        core
    }

    /// Returns the node id.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns the parent handle.
    #[must_use]
    pub fn parent_id(&self) -> Option<ContextId> {
        *self.parent.read()
    }

    /// Re-points the parent handle.
    pub fn set_parent_id(&self, parent: Option<ContextId>) {
        *self.parent.write() = parent;
    }

    /// Returns the owning configuration context if it is still alive.
    #[must_use]
    pub fn root(&self) -> Option<Arc<ConfigurationContext>> {
        self.root.read().upgrade()
    }

    /// Attaches the node to an arena.
    pub fn set_root(&self, root: &Arc<ConfigurationContext>) {
        *self.root.write() = Arc::downgrade(root);
    }

    pub(crate) fn set_root_weak(&self, root: Weak<ConfigurationContext>) {
        *self.root.write() = root;
    }

    /// Replicable local properties.
    #[must_use]
    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    /// Local properties excluded from replication.
    #[must_use]
    pub fn non_replicable_properties(&self) -> &PropertyBag {
        &self.non_replicable
    }

    fn record(&self, key: &str, difference: PropertyDifference) {
        self.differences.lock().insert(key.to_string(), difference);
    }
}

impl Default for ContextCore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContextCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextCore")
            .field("id", &self.id)
            .field("parent", &self.parent_id())
            .field("properties", &self.properties.len())
            .finish_non_exhaustive()
    }
}

/// A live node of the context hierarchy, resolved from the arena.
#[derive(Debug, Clone)]
pub enum ContextRef {
    /// The root.
    Configuration(Arc<ConfigurationContext>),
    /// A service group context.
    ServiceGroup(Arc<ServiceGroupContext>),
    /// A service context.
    Service(Arc<ServiceContext>),
    /// An operation context.
    Operation(Arc<OperationContext>),
}

impl ContextRef {
    /// Borrows the node as the shared capability.
    #[must_use]
    pub fn as_context(&self) -> &dyn Context {
        match self {
            Self::Configuration(c) => c.as_ref(),
            Self::ServiceGroup(c) => c.as_ref(),
            Self::Service(c) => c.as_ref(),
            Self::Operation(c) => c.as_ref(),
        }
    }

    /// Returns the node id.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.as_context().id()
    }
}

/// Walks `start` and its ancestors, skipping nodes already in `visited`.
pub(crate) fn lookup_in_chain(
    start: ContextRef,
    key: &str,
    visited: &mut HashSet<ContextId>,
) -> Option<serde_json::Value> {
    let mut current = Some(start);
    while let Some(node) = current {
        let ctx = node.as_context();
        if visited.insert(ctx.id()) {
            if let Some(value) = ctx.get_local_property(key) {
                return Some(value);
            }
        }
        current = ctx.parent();
    }
    None
}

/// Collects `start` and its ancestors, nearest first.
pub(crate) fn ancestry(start: ContextRef) -> Vec<ContextRef> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(start);
    while let Some(node) = current {
        if !seen.insert(node.id()) {
            break;
        }
        current = node.as_context().parent();
        chain.push(node);
    }
    chain
}

/// Hierarchical property lookup, change tracking and idle tracking.
pub trait Context: Send + Sync {
    /// Returns the embedded node state.
    fn core(&self) -> &ContextCore;

    /// Returns the node id.
    fn id(&self) -> ContextId {
        self.core().id()
    }

    /// Resolves the parent through the arena.
    fn parent(&self) -> Option<ContextRef> {
        let parent = self.core().parent_id()?;
        self.core().root()?.node(parent)
    }

    /// Looks a property up on this node only.
    fn get_local_property(&self, key: &str) -> Option<serde_json::Value> {
        self.core()
            .properties()
            .get(key)
            .or_else(|| self.core().non_replicable_properties().get(key))
    }

    /// Looks a property up here, then up the parent chain.
    fn get_property(&self, key: &str) -> Option<serde_json::Value> {
        if let Some(value) = self.get_local_property(key) {
            return Some(value);
        }
        let mut visited = HashSet::from([self.id()]);
        lookup_in_chain(self.parent()?, key, &mut visited)
    }

    /// Sets a local property and records the change.
    fn set_property(&self, key: &str, value: serde_json::Value) {
        self.core().properties().insert(key, value.clone());
        self.core().record(key, PropertyDifference::Set(value));
    }

    /// Sets a local property that is never replicated.
    fn set_non_replicable_property(&self, key: &str, value: serde_json::Value) {
        self.core().non_replicable_properties().insert(key, value);
    }

    /// Removes a local property, returning it.
    fn remove_property(&self, key: &str) -> Option<serde_json::Value> {
        let removed = self.core().properties().remove(key);
        if removed.is_some() {
            self.core().record(key, PropertyDifference::Removed);
        }
        removed.or_else(|| self.core().non_replicable_properties().remove(key))
    }

    /// Snapshot of every visible property, nearer scopes winning.
    fn get_properties(&self) -> HashMap<String, serde_json::Value> {
        let mut merged = HashMap::new();
        if let Some(parent) = self.parent() {
            for node in ancestry(parent).iter().rev() {
                merged.extend(node.as_context().local_properties());
            }
        }
        merged.extend(self.local_properties());
        merged
    }

    /// Snapshot of this node's own properties.
    fn local_properties(&self) -> HashMap<String, serde_json::Value> {
        let mut props = self.core().non_replicable_properties().to_dict();
        props.extend(self.core().properties().to_dict());
        props
    }

    /// The change log pending replication.
    fn property_differences(&self) -> HashMap<String, PropertyDifference> {
        self.core().differences.lock().clone()
    }

    /// Clears the change log after replication.
    fn clear_property_differences(&self) {
        self.core().differences.lock().clear();
    }

    /// Marks the node as used now.
    fn touch(&self) {
        self.core()
            .last_touched
            .store(crate::utils::now_millis(), Ordering::Relaxed);
    }

    /// Epoch milliseconds of the last touch.
    fn last_touched_time(&self) -> i64 {
        self.core().last_touched.load(Ordering::Relaxed)
    }

    /// Overrides the last touch time.
    fn set_last_touched_time(&self, millis: i64) {
        self.core().last_touched.store(millis, Ordering::Relaxed);
    }

    /// Returns true if `other` is this node or one of its ancestors.
    fn is_ancestor(&self, other: ContextId) -> bool {
        if self.id() == other {
            return true;
        }
        self.parent()
            .is_some_and(|p| ancestry(p).iter().any(|n| n.id() == other))
    }
}
