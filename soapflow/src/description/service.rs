//! Service and service group descriptions.

use super::{AxisOperation, ModuleDescription};
use crate::context::{Parameter, ParameterStore};
use crate::core::QName;
use crate::errors::SoapflowError;
use crate::message::MessageContextListener;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// How long a service's runtime state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceScope {
    /// A fresh service group context per exchange.
    #[default]
    Request,
    /// One service group context shared by every exchange.
    Application,
}

impl fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Application => write!(f, "application"),
        }
    }
}

/// Describes a deployed service.
pub struct AxisService {
    name: String,
    group_name: String,
    scope: ServiceScope,
    operations: HashMap<QName, Arc<AxisOperation>>,
    action_map: HashMap<String, QName>,
    parameters: Arc<ParameterStore>,
    listeners: RwLock<Vec<Arc<dyn MessageContextListener>>>,
    engaged_modules: DashMap<String, Arc<ModuleDescription>>,
}

impl AxisService {
    /// Creates an empty, request-scoped service.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            group_name: name.clone(),
            name,
            scope: ServiceScope::default(),
            operations: HashMap::new(),
            action_map: HashMap::new(),
            parameters: Arc::new(ParameterStore::new()),
            listeners: RwLock::new(Vec::new()),
            engaged_modules: DashMap::new(),
        }
    }

    /// Sets the scope.
    #[must_use]
    pub fn with_scope(mut self, scope: ServiceScope) -> Self {
        self.scope = scope;
        self
    }

    /// Adds an operation and maps its actions to it.
    #[must_use]
    pub fn with_operation(mut self, mut operation: AxisOperation) -> Self {
        operation.set_service_name(&self.name);
        operation.parameters().set_parent(self.parameters.clone());
        let name = operation.name().clone();
        for action in operation.soap_action().into_iter().chain(
            operation.actions().iter().map(String::as_str),
        ) {
            self.action_map.insert(action.to_string(), name.clone());
        }
        self.operations.insert(name, Arc::new(operation));
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(self, parameter: Parameter) -> Self {
        if let Err(err) = self.parameters.add_parameter(parameter) {
            warn!(service = %self.name, error = %err, "Ignoring parameter");
        }
        self
    }

    pub(crate) fn set_group_name(&mut self, group_name: &str) {
        self.group_name = group_name.to_string();
    }

    /// The service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning group's name.
    #[must_use]
    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    /// The service scope.
    #[must_use]
    pub fn scope(&self) -> ServiceScope {
        self.scope
    }

    /// Finds an operation by qualified name.
    #[must_use]
    pub fn operation(&self, name: &QName) -> Option<Arc<AxisOperation>> {
        self.operations.get(name).cloned()
    }

    /// Finds an operation by local name, ignoring namespaces.
    #[must_use]
    pub fn operation_by_local_name(&self, local: &str) -> Option<Arc<AxisOperation>> {
        self.operations
            .values()
            .find(|op| op.name().local_part == local)
            .cloned()
    }

    /// Finds the operation an action is mapped to.
    #[must_use]
    pub fn operation_by_action(&self, action: &str) -> Option<Arc<AxisOperation>> {
        self.action_map
            .get(action)
            .and_then(|name| self.operation(name))
    }

    /// All operations.
    #[must_use]
    pub fn operations(&self) -> Vec<Arc<AxisOperation>> {
        self.operations.values().cloned().collect()
    }

    /// The service's parameters.
    #[must_use]
    pub fn parameters(&self) -> &Arc<ParameterStore> {
        &self.parameters
    }

    /// Registers a listener for envelope and service-context attachment.
    pub fn add_message_context_listener(&self, listener: Arc<dyn MessageContextListener>) {
        self.listeners.write().push(listener);
    }

    /// The registered listeners.
    #[must_use]
    pub fn message_context_listeners(&self) -> Vec<Arc<dyn MessageContextListener>> {
        self.listeners.read().clone()
    }

    /// Engages a module on every operation of this service.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if a module handler targets a phase the
    /// operations do not have.
    pub fn engage_module(&self, module: &Arc<ModuleDescription>) -> Result<(), SoapflowError> {
        if self.engaged_modules.contains_key(module.name()) {
            return Ok(());
        }
        for rule in module.handlers() {
            for op in self.operations.values() {
                let phase = op.find_phase(rule.flow, &rule.phase).ok_or_else(|| {
                    SoapflowError::Internal(format!(
                        "module '{}' targets unknown phase '{}' on {}",
                        module.name(),
                        rule.phase,
                        op.name()
                    ))
                })?;
                phase.add_handler(rule.handler.clone());
            }
        }
        self.engaged_modules
            .insert(module.name().to_string(), module.clone());
        Ok(())
    }

    /// Returns true if the named module is engaged on this service.
    #[must_use]
    pub fn is_module_engaged(&self, name: &str) -> bool {
        self.engaged_modules.contains_key(name)
    }
}

impl fmt::Debug for AxisService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AxisService")
            .field("name", &self.name)
            .field("group", &self.group_name)
            .field("scope", &self.scope)
            .field("operations", &self.operations.len())
            .finish_non_exhaustive()
    }
}

/// Describes a group of services deployed together.
#[derive(Debug)]
pub struct AxisServiceGroup {
    name: String,
    services: Vec<Arc<AxisService>>,
    parameters: Arc<ParameterStore>,
}

impl AxisServiceGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: Vec::new(),
            parameters: Arc::new(ParameterStore::new()),
        }
    }

    /// Adds a service to the group.
    #[must_use]
    pub fn with_service(mut self, mut service: AxisService) -> Self {
        service.set_group_name(&self.name);
        service.parameters().set_parent(self.parameters.clone());
        self.services.push(Arc::new(service));
        self
    }

    /// The group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The group's services.
    #[must_use]
    pub fn services(&self) -> &[Arc<AxisService>] {
        &self.services
    }

    /// Finds a member service.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<Arc<AxisService>> {
        self.services.iter().find(|s| s.name() == name).cloned()
    }

    /// The group's parameters.
    #[must_use]
    pub fn parameters(&self) -> &Arc<ParameterStore> {
        &self.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Mep;

    #[test]
    fn test_action_lookup() {
        let service = AxisService::new("Echo").with_operation(
            AxisOperation::new("echo", Mep::InOut)
                .with_soap_action("urn:echo")
                .with_action("http://example.org/Echo/echo"),
        );

        assert_eq!(
            service.operation_by_action("urn:echo").unwrap().name(),
            &QName::local("echo")
        );
        assert!(service
            .operation_by_action("http://example.org/Echo/echo")
            .is_some());
        assert!(service.operation_by_action("urn:other").is_none());
        assert_eq!(service.operation_by_local_name("echo").unwrap().service_name(), "Echo");
    }

    #[test]
    fn test_group_parameters_inherited() {
        let group = AxisServiceGroup::new("Tools")
            .with_service(AxisService::new("Echo").with_operation(AxisOperation::new("echo", Mep::InOut)));
        group
            .parameters()
            .add_parameter(Parameter::locked("timeout", serde_json::json!(10)))
            .unwrap();

        let service = group.service("Echo").unwrap();
        assert_eq!(service.group_name(), "Tools");
        let op = service.operation_by_local_name("echo").unwrap();
        assert_eq!(
            op.parameters().get_parameter_value("timeout"),
            Some(serde_json::json!(10))
        );
        assert!(op
            .parameters()
            .add_parameter(Parameter::new("timeout", serde_json::json!(1)))
            .is_err());
    }
}
