//! Thread-safe property and parameter bags.

use crate::errors::ParameterLockedError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A thread-safe bag of context properties.
///
/// Unlike parameters, properties are freely overwritten; change tracking
/// for replication is layered on top by the context node.
#[derive(Debug, Default)]
pub struct PropertyBag {
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl PropertyBag {
    /// Creates a new empty property bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a property bag from existing data.
    #[must_use]
    pub fn from_data(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Gets a value from the bag.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.read().get(key).cloned()
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Sets a value, returning the previous one.
    pub fn insert(
        &self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.data.write().insert(key.into(), value)
    }

    /// Removes a value, returning it.
    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.data.write().remove(key)
    }

    /// Replaces the whole content of the bag.
    pub fn replace_all(&self, data: HashMap<String, serde_json::Value>) {
        *self.data.write() = data;
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        self.data.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns all keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }
}

impl Clone for PropertyBag {
    fn clone(&self) -> Self {
        Self {
            data: RwLock::new(self.data.read().clone()),
        }
    }
}

/// A named configuration value attached to a description node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// The parameter name.
    pub name: String,
    /// The parameter value.
    pub value: serde_json::Value,
    /// Locked parameters cannot be overridden, here or below.
    #[serde(default)]
    pub locked: bool,
}

impl Parameter {
    /// Creates an unlocked parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            value,
            locked: false,
        }
    }

    /// Creates a locked parameter.
    #[must_use]
    pub fn locked(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            locked: true,
            ..Self::new(name, value)
        }
    }
}

/// Receives notifications when a parameter store changes.
pub trait ParameterObserver: Send + Sync {
    /// Called after a parameter was added or replaced.
    fn parameter_changed(&self, parameter: &Parameter);

    /// Called after a parameter was removed.
    fn parameter_removed(&self, _name: &str) {}
}

/// A thread-safe parameter store chained to its parent's store.
///
/// Lookups fall through to the parent. A parameter locked anywhere up the
/// chain cannot be added, replaced or removed at this level.
#[derive(Default)]
pub struct ParameterStore {
    parameters: RwLock<HashMap<String, Parameter>>,
    observers: RwLock<Vec<Arc<dyn ParameterObserver>>>,
    parent: RwLock<Option<Arc<ParameterStore>>>,
}

impl ParameterStore {
    /// Creates a root store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that inherits from `parent`.
    #[must_use]
    pub fn with_parent(parent: Arc<ParameterStore>) -> Self {
        Self {
            parent: RwLock::new(Some(parent)),
            ..Self::default()
        }
    }

    /// Chains this store to `parent`, replacing any previous parent.
    pub fn set_parent(&self, parent: Arc<ParameterStore>) {
        *self.parent.write() = Some(parent);
    }

    /// Registers an observer.
    pub fn add_observer(&self, observer: Arc<dyn ParameterObserver>) {
        self.observers.write().push(observer);
    }

    /// Adds or replaces a parameter.
    ///
    /// # Errors
    ///
    /// Returns `ParameterLockedError` if the name is locked here or in a parent.
    pub fn add_parameter(&self, parameter: Parameter) -> Result<(), ParameterLockedError> {
        if self.is_locked_by_parent(&parameter.name) {
            return Err(ParameterLockedError::new(&parameter.name, true));
        }
        {
            let mut params = self.parameters.write();
            if params.get(&parameter.name).is_some_and(|p| p.locked) {
                return Err(ParameterLockedError::new(&parameter.name, false));
            }
            params.insert(parameter.name.clone(), parameter.clone());
        }
        for observer in self.observers.read().iter() {
            observer.parameter_changed(&parameter);
        }
        Ok(())
    }

    /// Removes a parameter from this level.
    ///
    /// # Errors
    ///
    /// Returns `ParameterLockedError` if the parameter is locked.
    pub fn remove_parameter(&self, name: &str) -> Result<Option<Parameter>, ParameterLockedError> {
        if self.is_locked_by_parent(name) {
            return Err(ParameterLockedError::new(name, true));
        }
        let removed = {
            let mut params = self.parameters.write();
            if params.get(name).is_some_and(|p| p.locked) {
                return Err(ParameterLockedError::new(name, false));
            }
            params.remove(name)
        };
        if removed.is_some() {
            for observer in self.observers.read().iter() {
                observer.parameter_removed(name);
            }
        }
        Ok(removed)
    }

    /// Gets a parameter, falling through to the parent chain.
    #[must_use]
    pub fn get_parameter(&self, name: &str) -> Option<Parameter> {
        if let Some(p) = self.parameters.read().get(name) {
            return Some(p.clone());
        }
        let parent = self.parent.read().clone();
        parent.and_then(|p| p.get_parameter(name))
    }

    /// Gets a parameter's value, falling through to the parent chain.
    #[must_use]
    pub fn get_parameter_value(&self, name: &str) -> Option<serde_json::Value> {
        self.get_parameter(name).map(|p| p.value)
    }

    /// Returns true if the parameter is locked at this level or above.
    #[must_use]
    pub fn is_parameter_locked(&self, name: &str) -> bool {
        self.parameters.read().get(name).is_some_and(|p| p.locked) || self.is_locked_by_parent(name)
    }

    fn is_locked_by_parent(&self, name: &str) -> bool {
        let parent = self.parent.read().clone();
        parent.is_some_and(|p| p.is_parameter_locked(name))
    }

    /// Returns the parameters defined at this level.
    #[must_use]
    pub fn local_parameters(&self) -> Vec<Parameter> {
        self.parameters.read().values().cloned().collect()
    }
}

impl std::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStore")
            .field("parameters", &self.parameters.read().len())
            .field("observers", &self.observers.read().len())
            .field("has_parent", &self.parent.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_property_bag_insert_and_get() {
        let bag = PropertyBag::new();
        assert_eq!(bag.insert("key", serde_json::json!("value")), None);

        assert_eq!(bag.get("key"), Some(serde_json::json!("value")));
        assert!(bag.contains_key("key"));
        assert!(!bag.contains_key("other"));
    }

    #[test]
    fn test_property_bag_overwrite_returns_previous() {
        let bag = PropertyBag::new();
        bag.insert("key", serde_json::json!(1));

        let previous = bag.insert("key", serde_json::json!(2));
        assert_eq!(previous, Some(serde_json::json!(1)));
        assert_eq!(bag.get("key"), Some(serde_json::json!(2)));
    }

    #[test]
    fn test_property_bag_snapshot_is_detached() {
        let bag = PropertyBag::new();
        bag.insert("a", serde_json::json!(1));

        let mut dict = bag.to_dict();
        dict.insert("b".to_string(), serde_json::json!(2));

        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn test_parameter_lookup_falls_through() {
        let parent = Arc::new(ParameterStore::new());
        parent
            .add_parameter(Parameter::new("timeout", serde_json::json!(30)))
            .unwrap();
        let child = ParameterStore::with_parent(parent);

        assert_eq!(child.get_parameter_value("timeout"), Some(serde_json::json!(30)));
        assert!(child.local_parameters().is_empty());
    }

    #[test]
    fn test_locked_parameter_cannot_be_replaced() {
        let store = ParameterStore::new();
        store
            .add_parameter(Parameter::locked("mode", serde_json::json!("strict")))
            .unwrap();

        let err = store
            .add_parameter(Parameter::new("mode", serde_json::json!("lax")))
            .unwrap_err();
        assert!(!err.by_parent);
        assert!(store.remove_parameter("mode").is_err());
    }

    #[test]
    fn test_parent_lock_blocks_child_override() {
        let parent = Arc::new(ParameterStore::new());
        parent
            .add_parameter(Parameter::locked("mode", serde_json::json!("strict")))
            .unwrap();
        let child = ParameterStore::with_parent(parent);

        let err = child
            .add_parameter(Parameter::new("mode", serde_json::json!("lax")))
            .unwrap_err();
        assert!(err.by_parent);
        assert!(child.is_parameter_locked("mode"));
    }

    #[test]
    fn test_observers_notified() {
        struct Counter(AtomicUsize);
        impl ParameterObserver for Counter {
            fn parameter_changed(&self, _parameter: &Parameter) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn parameter_removed(&self, _name: &str) {
                self.0.fetch_add(10, Ordering::SeqCst);
            }
        }

        let store = ParameterStore::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        store.add_observer(counter.clone());

        store.add_parameter(Parameter::new("a", serde_json::json!(1))).unwrap();
        store.remove_parameter("a").unwrap();
        store.remove_parameter("missing").unwrap();

        assert_eq!(counter.0.load(Ordering::SeqCst), 11);
    }
}
