//! Transport descriptions.

use crate::context::ParameterStore;
use crate::engine::TransportSender;
use std::fmt;
use std::sync::Arc;

/// An inbound transport, identified by name (e.g. `http`).
#[derive(Debug)]
pub struct TransportInDescription {
    name: String,
    parameters: Arc<ParameterStore>,
}

impl TransportInDescription {
    /// Creates an inbound transport description.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Arc::new(ParameterStore::new()),
        }
    }

    /// The transport name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The transport's parameters.
    #[must_use]
    pub fn parameters(&self) -> &Arc<ParameterStore> {
        &self.parameters
    }
}

/// An outbound transport with the sender that writes messages out.
pub struct TransportOutDescription {
    name: String,
    sender: Option<Arc<dyn TransportSender>>,
    parameters: Arc<ParameterStore>,
}

impl TransportOutDescription {
    /// Creates an outbound transport description without a sender.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sender: None,
            parameters: Arc::new(ParameterStore::new()),
        }
    }

    /// Sets the sender.
    #[must_use]
    pub fn with_sender(mut self, sender: Arc<dyn TransportSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// The transport name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sender, if any.
    #[must_use]
    pub fn sender(&self) -> Option<Arc<dyn TransportSender>> {
        self.sender.clone()
    }

    /// The transport's parameters.
    #[must_use]
    pub fn parameters(&self) -> &Arc<ParameterStore> {
        &self.parameters
    }
}

impl fmt::Debug for TransportOutDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportOutDescription")
            .field("name", &self.name)
            .field("has_sender", &self.sender.is_some())
            .finish_non_exhaustive()
    }
}
