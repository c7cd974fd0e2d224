//! The deployed description tree's root.

use super::{
    AxisService, AxisServiceGroup, ModuleDescription, TransportInDescription,
    TransportOutDescription,
};
use crate::context::ParameterStore;
use crate::core::Flow;
use crate::engine::{ActionDispatcher, DispatchPhaseCheck, Phase};
use crate::errors::SoapflowError;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Names of the global phases installed by [`AxisConfiguration::with_default_phases`].
pub mod global_phases {
    /// Transport-level processing.
    pub const TRANSPORT: &str = "Transport";
    /// WS-Addressing processing.
    pub const ADDRESSING: &str = "Addressing";
    /// Work that must happen before dispatch.
    pub const PRE_DISPATCH: &str = "PreDispatch";
    /// Service and operation resolution.
    pub const DISPATCH: &str = "Dispatch";
    /// The last outbound phase before the transport sender.
    pub const MESSAGE_OUT: &str = "MessageOut";
}

/// The engine-wide description root: services, modules, transports and the
/// global phase lists of the four flows.
#[derive(Debug, Default)]
pub struct AxisConfiguration {
    parameters: Arc<ParameterStore>,
    service_groups: DashMap<String, Arc<AxisServiceGroup>>,
    services: DashMap<String, Arc<AxisService>>,
    modules: DashMap<String, Arc<ModuleDescription>>,
    engaged_modules: DashMap<String, Arc<ModuleDescription>>,
    transports_in: DashMap<String, Arc<TransportInDescription>>,
    transports_out: DashMap<String, Arc<TransportOutDescription>>,
    phases: RwLock<HashMap<Flow, Vec<Arc<Phase>>>>,
}

impl AxisConfiguration {
    /// Creates an empty configuration with no phases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with the standard phase layout; the
    /// dispatch phase resolves service and operation.
    #[must_use]
    pub fn with_default_phases() -> Self {
        let config = Self::new();
        config.set_phases(Flow::In, Self::default_in_phases());
        config.set_phases(Flow::InFault, Self::default_in_phases());
        config.set_phases(Flow::Out, vec![Phase::new(global_phases::MESSAGE_OUT)]);
        config.set_phases(Flow::OutFault, vec![Phase::new(global_phases::MESSAGE_OUT)]);
        config
    }

    fn default_in_phases() -> Vec<Phase> {
        vec![
            Phase::new(global_phases::TRANSPORT),
            Phase::new(global_phases::ADDRESSING),
            Phase::new(global_phases::PRE_DISPATCH),
            Phase::new(global_phases::DISPATCH)
                .with_handler(Arc::new(ActionDispatcher::new()))
                .with_condition(Arc::new(DispatchPhaseCheck::new())),
        ]
    }

    /// The engine-wide parameters.
    #[must_use]
    pub fn parameters(&self) -> &Arc<ParameterStore> {
        &self.parameters
    }

    /// Deploys a service group.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if a group or service of the same name exists.
    pub fn add_service_group(&self, group: AxisServiceGroup) -> Result<Arc<AxisServiceGroup>, SoapflowError> {
        if self.service_groups.contains_key(group.name()) {
            return Err(SoapflowError::Internal(format!(
                "service group '{}' already deployed",
                group.name()
            )));
        }
        if let Some(dup) = group.services().iter().find(|s| self.services.contains_key(s.name())) {
            return Err(SoapflowError::Internal(format!(
                "service '{}' already deployed",
                dup.name()
            )));
        }
        group.parameters().set_parent(self.parameters.clone());
        let group = Arc::new(group);
        for service in group.services() {
            self.services
                .insert(service.name().to_string(), service.clone());
        }
        self.service_groups
            .insert(group.name().to_string(), group.clone());
        info!(group = %group.name(), services = group.services().len(), "Deployed service group");
        Ok(group)
    }

    /// Deploys a single service in a group of the same name.
    ///
    /// # Errors
    ///
    /// See [`AxisConfiguration::add_service_group`].
    pub fn add_service(&self, service: AxisService) -> Result<Arc<AxisService>, SoapflowError> {
        let name = service.name().to_string();
        let group = self.add_service_group(AxisServiceGroup::new(name.clone()).with_service(service))?;
        group
            .service(&name)
            .ok_or_else(|| SoapflowError::Internal(format!("service '{name}' lost on deploy")))
    }

    /// Finds a service by name.
    #[must_use]
    pub fn get_service(&self, name: &str) -> Option<Arc<AxisService>> {
        self.services.get(name).map(|s| s.value().clone())
    }

    /// Finds a service group by name.
    #[must_use]
    pub fn get_service_group(&self, name: &str) -> Option<Arc<AxisServiceGroup>> {
        self.service_groups.get(name).map(|g| g.value().clone())
    }

    /// All deployed services.
    #[must_use]
    pub fn services(&self) -> Vec<Arc<AxisService>> {
        self.services.iter().map(|s| s.value().clone()).collect()
    }

    /// Registers a module so it can be engaged.
    pub fn add_module(&self, module: ModuleDescription) -> Arc<ModuleDescription> {
        module.parameters().set_parent(self.parameters.clone());
        let module = Arc::new(module);
        self.modules
            .insert(module.name().to_string(), module.clone());
        module
    }

    /// Finds a registered module.
    #[must_use]
    pub fn get_module(&self, name: &str) -> Option<Arc<ModuleDescription>> {
        self.modules.get(name).map(|m| m.value().clone())
    }

    /// Engages a registered module engine-wide.
    ///
    /// Handlers targeting a global phase go there; the rest go into the
    /// matching operation phase of every deployed service.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the module is unknown or one of its handlers
    /// targets a phase that exists nowhere.
    pub fn engage_module(&self, name: &str) -> Result<(), SoapflowError> {
        if self.engaged_modules.contains_key(name) {
            return Ok(());
        }
        let module = self
            .get_module(name)
            .ok_or_else(|| SoapflowError::Internal(format!("module '{name}' is not registered")))?;
        for rule in module.handlers() {
            if let Some(phase) = self.find_phase(rule.flow, &rule.phase) {
                phase.add_handler(rule.handler.clone());
                continue;
            }
            let mut placed = false;
            for service in self.services() {
                for op in service.operations() {
                    if let Some(phase) = op.find_phase(rule.flow, &rule.phase) {
                        phase.add_handler(rule.handler.clone());
                        placed = true;
                    }
                }
            }
            if !placed {
                return Err(SoapflowError::Internal(format!(
                    "module '{name}' targets unknown phase '{}' on the {} flow",
                    rule.phase, rule.flow
                )));
            }
        }
        self.engaged_modules.insert(name.to_string(), module);
        info!(module = %name, "Engaged module");
        Ok(())
    }

    /// Returns true if the module is engaged engine-wide.
    #[must_use]
    pub fn is_engaged(&self, name: &str) -> bool {
        self.engaged_modules.contains_key(name)
    }

    /// Registers an inbound transport.
    pub fn add_transport_in(&self, transport: TransportInDescription) -> Arc<TransportInDescription> {
        let transport = Arc::new(transport);
        self.transports_in
            .insert(transport.name().to_string(), transport.clone());
        transport
    }

    /// Finds an inbound transport.
    #[must_use]
    pub fn get_transport_in(&self, name: &str) -> Option<Arc<TransportInDescription>> {
        self.transports_in.get(name).map(|t| t.value().clone())
    }

    /// Registers an outbound transport.
    pub fn add_transport_out(&self, transport: TransportOutDescription) -> Arc<TransportOutDescription> {
        let transport = Arc::new(transport);
        self.transports_out
            .insert(transport.name().to_string(), transport.clone());
        transport
    }

    /// Finds an outbound transport.
    #[must_use]
    pub fn get_transport_out(&self, name: &str) -> Option<Arc<TransportOutDescription>> {
        self.transports_out.get(name).map(|t| t.value().clone())
    }

    /// Replaces the global phases of `flow`.
    pub fn set_phases(&self, flow: Flow, phases: Vec<Phase>) {
        self.phases
            .write()
            .insert(flow, phases.into_iter().map(Arc::new).collect());
    }

    /// The global phases of `flow`.
    #[must_use]
    pub fn phases(&self, flow: Flow) -> Vec<Arc<Phase>> {
        self.phases.read().get(&flow).cloned().unwrap_or_default()
    }

    /// The global inbound phases.
    #[must_use]
    pub fn in_flow_phases(&self) -> Vec<Arc<Phase>> {
        self.phases(Flow::In)
    }

    /// The global outbound phases.
    #[must_use]
    pub fn out_flow_phases(&self) -> Vec<Arc<Phase>> {
        self.phases(Flow::Out)
    }

    /// The global inbound fault phases.
    #[must_use]
    pub fn in_fault_flow_phases(&self) -> Vec<Arc<Phase>> {
        self.phases(Flow::InFault)
    }

    /// The global outbound fault phases.
    #[must_use]
    pub fn out_fault_flow_phases(&self) -> Vec<Arc<Phase>> {
        self.phases(Flow::OutFault)
    }

    /// Finds a global phase by name.
    #[must_use]
    pub fn find_phase(&self, flow: Flow, name: &str) -> Option<Arc<Phase>> {
        self.phases
            .read()
            .get(&flow)?
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Mep;
    use crate::description::AxisOperation;
    use crate::testing::RecordingHandler;

    #[test]
    fn test_default_phase_layout() {
        let config = AxisConfiguration::with_default_phases();
        let names: Vec<String> = config
            .in_flow_phases()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, ["Transport", "Addressing", "PreDispatch", "Dispatch"]);
        assert_eq!(config.out_flow_phases().len(), 1);
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let config = AxisConfiguration::new();
        config.add_service(AxisService::new("Echo")).unwrap();
        assert!(config.add_service(AxisService::new("Echo")).is_err());
    }

    #[test]
    fn test_engage_module_places_handlers() {
        let config = AxisConfiguration::with_default_phases();
        config
            .add_service(
                AxisService::new("Echo").with_operation(AxisOperation::new("echo", Mep::InOut)),
            )
            .unwrap();
        config.add_module(
            ModuleDescription::new("audit")
                .with_handler(Flow::In, "PreDispatch", Arc::new(RecordingHandler::new("audit-in")))
                .with_handler(Flow::Out, "OperationOutPhase", Arc::new(RecordingHandler::new("audit-out"))),
        );

        config.engage_module("audit").unwrap();

        assert!(config.is_engaged("audit"));
        let pre = config.find_phase(Flow::In, "PreDispatch").unwrap();
        assert_eq!(pre.handler_count(), 1);
        let op = config
            .get_service("Echo")
            .unwrap()
            .operation_by_local_name("echo")
            .unwrap();
        assert_eq!(op.find_phase(Flow::Out, "OperationOutPhase").unwrap().handler_count(), 1);
    }

    #[test]
    fn test_engage_unknown_module_fails() {
        let config = AxisConfiguration::new();
        assert!(config.engage_module("missing").is_err());
    }
}
