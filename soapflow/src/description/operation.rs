//! Operation and message descriptions.

use crate::context::{Parameter, ParameterStore};
use crate::core::{Flow, Mep, MessageLabel, QName};
use crate::engine::{MessageReceiver, Phase};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Phase names every operation carries.
pub mod operation_phases {
    /// Operation-specific inbound phase.
    pub const IN: &str = "OperationInPhase";
    /// Operation-specific outbound phase.
    pub const OUT: &str = "OperationOutPhase";
    /// Operation-specific inbound fault phase.
    pub const IN_FAULT: &str = "OperationInFaultPhase";
    /// Operation-specific outbound fault phase.
    pub const OUT_FAULT: &str = "OperationOutFaultPhase";
}

/// Describes one message slot of an operation.
#[derive(Debug)]
pub struct AxisMessage {
    label: MessageLabel,
    direction: Flow,
    element: Option<QName>,
    parameters: Arc<ParameterStore>,
}

impl AxisMessage {
    /// Creates a message description for `label`.
    #[must_use]
    pub fn new(label: MessageLabel) -> Self {
        let direction = match label {
            MessageLabel::In => Flow::In,
            MessageLabel::Out => Flow::Out,
            MessageLabel::Fault => Flow::OutFault,
        };
        Self {
            label,
            direction,
            element: None,
            parameters: Arc::new(ParameterStore::new()),
        }
    }

    /// Sets the body element this message carries.
    #[must_use]
    pub fn with_element(mut self, element: QName) -> Self {
        self.element = Some(element);
        self
    }

    /// The slot label.
    #[must_use]
    pub fn label(&self) -> MessageLabel {
        self.label
    }

    /// The flow this message travels on.
    #[must_use]
    pub fn direction(&self) -> Flow {
        self.direction
    }

    /// The body element, if declared.
    #[must_use]
    pub fn element(&self) -> Option<&QName> {
        self.element.as_ref()
    }

    /// The message's parameters.
    #[must_use]
    pub fn parameters(&self) -> &Arc<ParameterStore> {
        &self.parameters
    }
}

/// Describes one operation of a service.
pub struct AxisOperation {
    name: QName,
    mep: Mep,
    service_name: String,
    soap_action: Option<String>,
    actions: Vec<String>,
    messages: HashMap<MessageLabel, Arc<AxisMessage>>,
    phases: HashMap<Flow, Vec<Arc<Phase>>>,
    receiver: Option<Arc<dyn MessageReceiver>>,
    parameters: Arc<ParameterStore>,
}

impl AxisOperation {
    /// Creates an operation with one message description per slot of its
    /// pattern plus the fault slot, and the four operation phases.
    #[must_use]
    pub fn new(name: impl Into<QName>, mep: Mep) -> Self {
        let mut messages = HashMap::new();
        for label in mep.slots().allowed.iter().chain([&MessageLabel::Fault]) {
            messages.insert(*label, Arc::new(AxisMessage::new(*label)));
        }
        let phases = [
            (Flow::In, operation_phases::IN),
            (Flow::Out, operation_phases::OUT),
            (Flow::InFault, operation_phases::IN_FAULT),
            (Flow::OutFault, operation_phases::OUT_FAULT),
        ]
        .into_iter()
        .map(|(flow, name)| (flow, vec![Arc::new(Phase::new(name))]))
        .collect();
        Self {
            name: name.into(),
            mep,
            service_name: String::new(),
            soap_action: None,
            actions: Vec::new(),
            messages,
            phases,
            receiver: None,
            parameters: Arc::new(ParameterStore::new()),
        }
    }

    /// Sets the SOAP action that routes to this operation.
    #[must_use]
    pub fn with_soap_action(mut self, action: impl Into<String>) -> Self {
        self.soap_action = Some(action.into());
        self
    }

    /// Adds a WS-Addressing action that routes to this operation.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Sets the message receiver.
    #[must_use]
    pub fn with_receiver(mut self, receiver: Arc<dyn MessageReceiver>) -> Self {
        self.receiver = Some(receiver);
        self
    }

    /// Appends an extra phase to one of the operation's flows.
    #[must_use]
    pub fn with_phase(mut self, flow: Flow, phase: Phase) -> Self {
        self.phases.entry(flow).or_default().push(Arc::new(phase));
        self
    }

    /// Replaces a message description.
    #[must_use]
    pub fn with_message(mut self, message: AxisMessage) -> Self {
        self.messages.insert(message.label(), Arc::new(message));
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(self, parameter: Parameter) -> Self {
        if let Err(err) = self.parameters.add_parameter(parameter) {
            warn!(operation = %self.name, error = %err, "Ignoring parameter");
        }
        self
    }

    pub(crate) fn set_service_name(&mut self, service_name: &str) {
        self.service_name = service_name.to_string();
    }

    /// The operation name.
    #[must_use]
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// The exchange pattern.
    #[must_use]
    pub fn mep(&self) -> Mep {
        self.mep
    }

    /// The owning service's name.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The SOAP action, if any.
    #[must_use]
    pub fn soap_action(&self) -> Option<&str> {
        self.soap_action.as_deref()
    }

    /// The WS-Addressing actions.
    #[must_use]
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// The description of `label`'s message.
    #[must_use]
    pub fn message(&self, label: MessageLabel) -> Option<Arc<AxisMessage>> {
        self.messages.get(&label).cloned()
    }

    /// The operation's phases for `flow`.
    #[must_use]
    pub fn phases(&self, flow: Flow) -> Vec<Arc<Phase>> {
        self.phases.get(&flow).cloned().unwrap_or_default()
    }

    /// Finds an operation phase by name.
    #[must_use]
    pub fn find_phase(&self, flow: Flow, name: &str) -> Option<Arc<Phase>> {
        self.phases
            .get(&flow)?
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    /// The message receiver, if any.
    #[must_use]
    pub fn message_receiver(&self) -> Option<Arc<dyn MessageReceiver>> {
        self.receiver.clone()
    }

    /// The operation's parameters.
    #[must_use]
    pub fn parameters(&self) -> &Arc<ParameterStore> {
        &self.parameters
    }
}

impl fmt::Debug for AxisOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AxisOperation")
            .field("name", &self.name)
            .field("mep", &self.mep)
            .field("service", &self.service_name)
            .field("has_receiver", &self.receiver.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_follow_pattern() {
        let op = AxisOperation::new("ping", Mep::InOnly);
        assert!(op.message(MessageLabel::In).is_some());
        assert!(op.message(MessageLabel::Out).is_none());
        assert!(op.message(MessageLabel::Fault).is_some());
    }

    #[test]
    fn test_default_phases_present() {
        let op = AxisOperation::new("echo", Mep::InOut);
        assert_eq!(op.phases(Flow::In)[0].name(), operation_phases::IN);
        assert!(op.find_phase(Flow::OutFault, operation_phases::OUT_FAULT).is_some());
    }
}
