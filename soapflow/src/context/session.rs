//! Transport-level session state.

use super::{Context, ContextCore, ContextRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// State shared by the messages of one client session.
#[derive(Debug)]
pub struct SessionContext {
    core: ContextCore,
    cookie_id: String,
}

/// The persisted form of a [`SessionContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The session cookie.
    pub cookie_id: String,
    /// Epoch milliseconds of the last touch.
    pub last_touched: i64,
    /// The session's properties.
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl SessionContext {
    /// Creates a session with a fresh cookie id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cookie_id(crate::utils::generate_uuid().to_string())
    }

    /// Creates a session for a known cookie id.
    #[must_use]
    pub fn with_cookie_id(cookie_id: impl Into<String>) -> Self {
        Self {
            core: ContextCore::new(),
            cookie_id: cookie_id.into(),
        }
    }

    /// Returns the session cookie.
    #[must_use]
    pub fn cookie_id(&self) -> &str {
        &self.cookie_id
    }

    /// Captures the session for persistence.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            cookie_id: self.cookie_id.clone(),
            last_touched: self.last_touched_time(),
            properties: self.core.properties().to_dict(),
        }
    }

    /// Rebuilds a session from its persisted form.
    #[must_use]
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let session = Self::with_cookie_id(snapshot.cookie_id);
        session.core.properties().replace_all(snapshot.properties);
        session.set_last_touched_time(snapshot.last_touched);
        session
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Context for SessionContext {
    fn core(&self) -> &ContextCore {
        &self.core
    }

    fn parent(&self) -> Option<ContextRef> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_roundtrip_keeps_properties() {
        let session = SessionContext::with_cookie_id("JSESSION-1");
        session.set_property("cart", serde_json::json!(["a", "b"]));

        let restored = SessionContext::from_snapshot(session.snapshot());
        assert_eq!(restored.cookie_id(), "JSESSION-1");
        assert_eq!(restored.get_property("cart"), Some(serde_json::json!(["a", "b"])));
        assert_eq!(restored.last_touched_time(), session.last_touched_time());
    }
}
