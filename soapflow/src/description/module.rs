//! Module descriptions.

use crate::context::ParameterStore;
use crate::core::Flow;
use crate::engine::Handler;
use std::sync::Arc;

/// Places one handler of a module into a named phase of a flow.
#[derive(Debug, Clone)]
pub struct HandlerRule {
    /// The handler to insert.
    pub handler: Arc<dyn Handler>,
    /// The target phase name.
    pub phase: String,
    /// The flow the phase belongs to.
    pub flow: Flow,
}

/// A deployable bundle of handlers, engaged globally or per service.
#[derive(Debug)]
pub struct ModuleDescription {
    name: String,
    handlers: Vec<HandlerRule>,
    parameters: Arc<ParameterStore>,
}

impl ModuleDescription {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: Vec::new(),
            parameters: Arc::new(ParameterStore::new()),
        }
    }

    /// Adds a handler targeting `phase` on `flow`.
    #[must_use]
    pub fn with_handler(mut self, flow: Flow, phase: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.handlers.push(HandlerRule {
            handler,
            phase: phase.into(),
            flow,
        });
        self
    }

    /// The module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module's handler placements.
    #[must_use]
    pub fn handlers(&self) -> &[HandlerRule] {
        &self.handlers
    }

    /// The module's parameters.
    #[must_use]
    pub fn parameters(&self) -> &Arc<ParameterStore> {
        &self.parameters
    }
}
