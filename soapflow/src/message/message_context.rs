//! The unit of work flowing through the engine.

use super::{
    Attachments, EndpointReference, ExecutionTracker, Options, RelatesTo, SharedEnvelope,
    SoapEnvelope,
};
use crate::context::{
    lookup_in_chain, ConfigurationContext, Context, ContextCore, ContextRef, OperationContext,
    ServiceContext, ServiceGroupContext, SessionContext,
};
use crate::core::{Flow, MessageLabel, QName, SoapVersion};
use crate::description::{
    AxisMessage, AxisOperation, AxisService, AxisServiceGroup, TransportInDescription,
    TransportOutDescription,
};
use crate::engine::Handler;
use crate::errors::{ContextConsistencyError, SoapFault, SoapflowError};
use crate::persistence::PendingActivation;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::warn;

/// Well-known message property names.
pub mod property_names {
    /// Names of mustUnderstand headers left for the message receiver.
    pub const UNPROCESSED_HEADER_QNAMES: &str = "unprocessedHeaderQNames";
}

/// Boolean processing flags of a message.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    /// The message is a REST call.
    pub doing_rest: bool,
    /// The message uses MTOM.
    pub doing_mtom: bool,
    /// The message uses SOAP with attachments.
    pub doing_swa: bool,
    /// The message carries a fault.
    pub processing_fault: bool,
    /// The engine is acting as the server for this exchange.
    pub server_side: bool,
    /// A handler suspended the message.
    pub paused: bool,
    /// The response has already been written out.
    pub response_written: bool,
    /// The envelope is SOAP 1.1.
    pub soap11: bool,
}

#[derive(Default)]
struct MessageState {
    options: Options,
    envelope: Option<SharedEnvelope>,
    attachments: Option<Attachments>,
    flags: MessageFlags,
    flow: Flow,
    operation_context: Option<Arc<OperationContext>>,
    service_context: Option<Arc<ServiceContext>>,
    service_group_context: Option<Arc<ServiceGroupContext>>,
    service_context_id: Option<String>,
    service_group_context_id: Option<String>,
    axis_service_group: Option<Arc<AxisServiceGroup>>,
    axis_service: Option<Arc<AxisService>>,
    axis_operation: Option<Arc<AxisOperation>>,
    axis_message: Option<Arc<AxisMessage>>,
    transport_in: Option<Arc<TransportInDescription>>,
    transport_out: Option<Arc<TransportOutDescription>>,
    incoming_transport_name: Option<String>,
    failure_reason: Option<String>,
    session_context: Option<Arc<SessionContext>>,
}

/// A message plus all engine-owned runtime state attached to it.
///
/// Shared as `Arc<MessageContext>`; every field uses interior mutability so
/// handlers receive `&MessageContext`. Locks are never held while calling
/// out to handlers, listeners or other contexts.
pub struct MessageContext {
    core: ContextCore,
    handle: OnceLock<Weak<MessageContext>>,
    log_correlation_id: OnceLock<String>,
    state: RwLock<MessageState>,
    tracker: Mutex<ExecutionTracker>,
    self_managed_data: Mutex<HashMap<String, serde_json::Value>>,
    configuration_context: RwLock<Option<Arc<ConfigurationContext>>>,
    pending: Mutex<Option<PendingActivation>>,
    needs_activation: AtomicBool,
}

impl MessageContext {
    /// Creates an unattached message.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: ContextCore::new(),
            handle: OnceLock::new(),
            log_correlation_id: OnceLock::new(),
            state: RwLock::new(MessageState::default()),
            tracker: Mutex::new(ExecutionTracker::new()),
            self_managed_data: Mutex::new(HashMap::new()),
            configuration_context: RwLock::new(None),
            pending: Mutex::new(None),
            needs_activation: AtomicBool::new(false),
        }
    }

    /// Records the shared handle so code holding `&MessageContext` can
    /// register the message with an operation context. Idempotent.
    pub fn bind_handle(self: &Arc<Self>) {
        let _ = self.handle.set(Arc::downgrade(self));
    }

    /// The shared handle recorded by [`MessageContext::bind_handle`].
    #[must_use]
    pub fn handle(&self) -> Option<Arc<MessageContext>> {
        self.handle.get().and_then(Weak::upgrade)
    }

    /// The id used to correlate log lines; generated on first use.
    pub fn log_correlation_id(&self) -> &str {
        self.log_correlation_id
            .get_or_init(|| crate::utils::generate_uuid().to_string())
    }

    pub(crate) fn restore_log_correlation_id(&self, id: String) {
        if self.log_correlation_id.set(id).is_err() {
            warn!(
                log_correlation_id = %self.log_correlation_id(),
                "Log correlation id already assigned"
            );
        }
    }

    fn warn_if_inactive(&self, accessor: &'static str) {
        if self.needs_to_be_activated() {
            warn!(
                log_correlation_id = %self.log_correlation_id(),
                accessor,
                "Message context accessed before activation"
            );
        }
    }

    // ---- configuration -------------------------------------------------

    /// The owning configuration context.
    #[must_use]
    pub fn configuration_context(&self) -> Option<Arc<ConfigurationContext>> {
        self.configuration_context.read().clone()
    }

    /// Roots the message under `config`.
    pub fn set_configuration_context(&self, config: &Arc<ConfigurationContext>) {
        self.core.set_root(config);
        *self.configuration_context.write() = Some(config.clone());
    }

    // ---- options -------------------------------------------------------

    /// A copy of the options.
    #[must_use]
    pub fn options(&self) -> Options {
        self.state.read().options.clone()
    }

    /// Replaces the options.
    pub fn set_options(&self, options: Options) {
        self.state.write().options = options;
    }

    /// Mutates the options in place.
    pub fn update_options<R>(&self, f: impl FnOnce(&mut Options) -> R) -> R {
        f(&mut self.state.write().options)
    }

    /// The message id.
    #[must_use]
    pub fn message_id(&self) -> Option<String> {
        self.state.read().options.message_id.clone()
    }

    /// Sets the message id.
    pub fn set_message_id(&self, id: impl Into<String>) {
        self.state.write().options.message_id = Some(id.into());
    }

    /// The destination.
    #[must_use]
    pub fn to(&self) -> Option<EndpointReference> {
        self.state.read().options.to.clone()
    }

    /// Sets the destination.
    pub fn set_to(&self, to: Option<EndpointReference>) {
        self.state.write().options.to = to;
    }

    /// Where replies go.
    #[must_use]
    pub fn reply_to(&self) -> Option<EndpointReference> {
        self.state.read().options.reply_to.clone()
    }

    /// Where faults go.
    #[must_use]
    pub fn fault_to(&self) -> Option<EndpointReference> {
        self.state.read().options.fault_to.clone()
    }

    /// The WS-Addressing action.
    #[must_use]
    pub fn wsa_action(&self) -> Option<String> {
        self.state.read().options.action.clone()
    }

    /// The SOAP action.
    #[must_use]
    pub fn soap_action(&self) -> Option<String> {
        self.state.read().options.soap_action.clone()
    }

    /// The reply relationship, if any.
    #[must_use]
    pub fn relates_to(&self) -> Option<RelatesTo> {
        self.state.read().options.reply_relationship().cloned()
    }

    /// Adds a relationship.
    pub fn add_relates_to(&self, relates_to: RelatesTo) {
        self.state.write().options.relates_to.push(relates_to);
    }

    // ---- envelope and attachments ---------------------------------------

    /// The envelope, shared with any copies of this message.
    #[must_use]
    pub fn envelope(&self) -> Option<SharedEnvelope> {
        self.state.read().envelope.clone()
    }

    /// Attaches an envelope, detecting its SOAP version.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedSoapVersion` for an unknown namespace; the
    /// previous envelope is kept.
    pub fn set_envelope(&self, envelope: SoapEnvelope) -> Result<(), SoapflowError> {
        self.set_shared_envelope(Arc::new(RwLock::new(envelope)))
    }

    /// Attaches an already shared envelope.
    ///
    /// Listeners registered on the bound service are notified afterwards;
    /// their failures are logged and do not undo the attachment.
    ///
    /// # Errors
    ///
    /// See [`MessageContext::set_envelope`].
    pub fn set_shared_envelope(&self, envelope: SharedEnvelope) -> Result<(), SoapflowError> {
        let namespace = envelope.read().namespace_uri().to_string();
        let version = SoapVersion::from_namespace(&namespace)
            .ok_or(SoapflowError::UnsupportedSoapVersion { namespace })?;
        let service = {
            let mut state = self.state.write();
            state.envelope = Some(envelope);
            state.flags.soap11 = version == SoapVersion::Soap11;
            state.axis_service.clone()
        };
        if let Some(service) = service {
            for listener in service.message_context_listeners() {
                if let Err(err) = listener.attach_envelope(self) {
                    warn!(
                        log_correlation_id = %self.log_correlation_id(),
                        service = %service.name(),
                        error = %err,
                        "Envelope listener failed"
                    );
                }
            }
        }
        Ok(())
    }

    /// The SOAP version of the attached envelope (1.2 when none is attached).
    #[must_use]
    pub fn soap_version(&self) -> SoapVersion {
        if self.state.read().flags.soap11 {
            SoapVersion::Soap11
        } else {
            SoapVersion::Soap12
        }
    }

    /// Returns true for SOAP 1.1 envelopes.
    #[must_use]
    pub fn is_soap11(&self) -> bool {
        self.state.read().flags.soap11
    }

    /// The attachments, created empty on first use.
    pub fn attachments(&self) -> Attachments {
        self.state
            .write()
            .attachments
            .get_or_insert_with(Attachments::new)
            .clone()
    }

    /// Replaces the attachments.
    pub fn set_attachments(&self, attachments: Option<Attachments>) {
        self.state.write().attachments = attachments;
    }

    /// Returns true if at least one attachment exists.
    #[must_use]
    pub fn has_attachments(&self) -> bool {
        self.state
            .read()
            .attachments
            .as_ref()
            .is_some_and(|a| !a.is_empty())
    }

    // ---- flags and flow -------------------------------------------------

    /// A copy of the flags.
    #[must_use]
    pub fn flags(&self) -> MessageFlags {
        self.state.read().flags
    }

    /// Mutates the flags in place.
    pub fn update_flags(&self, f: impl FnOnce(&mut MessageFlags)) {
        f(&mut self.state.write().flags);
    }

    /// Returns true if the message carries a fault.
    #[must_use]
    pub fn is_processing_fault(&self) -> bool {
        self.state.read().flags.processing_fault
    }

    /// Marks the message as carrying a fault.
    pub fn set_processing_fault(&self, value: bool) {
        self.state.write().flags.processing_fault = value;
    }

    /// Returns true on the serving side of an exchange.
    #[must_use]
    pub fn is_server_side(&self) -> bool {
        self.state.read().flags.server_side
    }

    /// Marks the serving side.
    pub fn set_server_side(&self, value: bool) {
        self.state.write().flags.server_side = value;
    }

    /// Returns true while suspended.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.read().flags.paused
    }

    /// Sets the paused flag.
    pub fn set_paused(&self, value: bool) {
        self.state.write().flags.paused = value;
    }

    /// Returns true once the response is written.
    #[must_use]
    pub fn is_response_written(&self) -> bool {
        self.state.read().flags.response_written
    }

    /// Sets the response-written flag.
    pub fn set_response_written(&self, value: bool) {
        self.state.write().flags.response_written = value;
    }

    /// The flow the message is on.
    #[must_use]
    pub fn flow(&self) -> Flow {
        self.state.read().flow
    }

    /// Sets the flow.
    pub fn set_flow(&self, flow: Flow) {
        self.state.write().flow = flow;
    }

    /// The operation-context slot this message fills: its message
    /// description's label, else one implied by the flow.
    #[must_use]
    pub fn message_label(&self) -> MessageLabel {
        let state = self.state.read();
        if let Some(message) = &state.axis_message {
            return message.label();
        }
        if state.flow.is_inbound() {
            MessageLabel::In
        } else {
            MessageLabel::Out
        }
    }

    // ---- runtime contexts ----------------------------------------------

    /// The operation context.
    #[must_use]
    pub fn operation_context(&self) -> Option<Arc<OperationContext>> {
        self.warn_if_inactive("operation_context");
        self.state.read().operation_context.clone()
    }

    /// Binds the message to an operation context, adopting its service
    /// context when none is set yet.
    ///
    /// # Errors
    ///
    /// Returns `ContextConsistency` if the operation context's parent is not
    /// the message's service context.
    pub fn set_operation_context(&self, op: Option<Arc<OperationContext>>) -> Result<(), SoapflowError> {
        let Some(op) = op else {
            self.state.write().operation_context = None;
            self.core.set_parent_id(None);
            return Ok(());
        };
        let current_service = self.state.read().service_context.clone();
        if let Some(service) = &current_service {
            if op.core().parent_id() != Some(service.id()) {
                return Err(ContextConsistencyError::new(
                    "service context of the operation context does not match",
                )
                .into());
            }
        }
        self.core.set_parent_id(Some(op.id()));
        let parent_service = op.service_context();
        self.state.write().operation_context = Some(op);
        if current_service.is_none() {
            if let Some(service) = parent_service {
                self.set_service_context(Some(service))?;
            }
        }
        Ok(())
    }

    /// The service context.
    #[must_use]
    pub fn service_context(&self) -> Option<Arc<ServiceContext>> {
        self.warn_if_inactive("service_context");
        self.state.read().service_context.clone()
    }

    /// Binds the message to a service context, adopting its group context
    /// and service description, and notifies the service's listeners.
    ///
    /// # Errors
    ///
    /// Returns `ContextConsistency` if the message's operation context is not
    /// a child of `service`.
    pub fn set_service_context(&self, service: Option<Arc<ServiceContext>>) -> Result<(), SoapflowError> {
        let Some(service) = service else {
            let mut state = self.state.write();
            state.service_context = None;
            state.service_context_id = None;
            return Ok(());
        };
        let op = self.state.read().operation_context.clone();
        if let Some(op) = op {
            if op.core().parent_id() != Some(service.id()) {
                return Err(ContextConsistencyError::new(
                    "operation context parent does not match the service context",
                )
                .into());
            }
        }
        let config = self
            .configuration_context()
            .or_else(|| service.core().root());
        if let Some(config) = &config {
            if self.configuration_context().is_none() {
                self.set_configuration_context(config);
            }
        }
        let described = config
            .as_ref()
            .and_then(|c| c.axis_configuration().get_service(service.service_name()));
        let group = service.service_group_context();
        let need_group = {
            let mut state = self.state.write();
            state.service_context_id = Some(service.service_context_id().to_string());
            state.service_context = Some(service.clone());
            state.service_group_context.is_none()
        };
        if need_group {
            self.set_service_group_context(group);
        }
        if let Some(described) = described {
            self.set_axis_service(Some(described.clone()));
            for listener in described.message_context_listeners() {
                if let Err(err) = listener.attach_service_context(self) {
                    warn!(
                        log_correlation_id = %self.log_correlation_id(),
                        service = %described.name(),
                        error = %err,
                        "Service context listener failed"
                    );
                }
            }
        }
        Ok(())
    }

    /// The service group context.
    #[must_use]
    pub fn service_group_context(&self) -> Option<Arc<ServiceGroupContext>> {
        self.warn_if_inactive("service_group_context");
        self.state.read().service_group_context.clone()
    }

    /// Binds the message to a service group context.
    pub fn set_service_group_context(&self, group: Option<Arc<ServiceGroupContext>>) {
        let mut state = self.state.write();
        state.service_group_context_id = group.as_ref().map(|g| g.group_id().to_string());
        state.service_group_context = group;
    }

    /// The id of the service context, kept even when the context is absent.
    #[must_use]
    pub fn service_context_id(&self) -> Option<String> {
        self.state.read().service_context_id.clone()
    }

    /// The id of the service group context, kept even when the context is absent.
    #[must_use]
    pub fn service_group_context_id(&self) -> Option<String> {
        self.state.read().service_group_context_id.clone()
    }

    pub(crate) fn set_context_ids(&self, service: Option<String>, group: Option<String>) {
        let mut state = self.state.write();
        state.service_context_id = service;
        state.service_group_context_id = group;
    }

    /// The session context.
    #[must_use]
    pub fn session_context(&self) -> Option<Arc<SessionContext>> {
        self.state.read().session_context.clone()
    }

    /// Sets the session context.
    pub fn set_session_context(&self, session: Option<Arc<SessionContext>>) {
        self.state.write().session_context = session;
    }

    // ---- descriptions ---------------------------------------------------

    /// The service description.
    #[must_use]
    pub fn axis_service(&self) -> Option<Arc<AxisService>> {
        self.warn_if_inactive("axis_service");
        self.state.read().axis_service.clone()
    }

    /// Sets the service description, resolving its group description.
    pub fn set_axis_service(&self, service: Option<Arc<AxisService>>) {
        let group = service.as_ref().and_then(|s| {
            self.configuration_context()
                .and_then(|c| c.axis_configuration().get_service_group(s.group_name()))
        });
        let mut state = self.state.write();
        if group.is_some() || service.is_none() {
            state.axis_service_group = group;
        }
        state.axis_service = service;
    }

    /// The service group description.
    #[must_use]
    pub fn axis_service_group(&self) -> Option<Arc<AxisServiceGroup>> {
        self.warn_if_inactive("axis_service_group");
        self.state.read().axis_service_group.clone()
    }

    /// Sets the service group description.
    pub fn set_axis_service_group(&self, group: Option<Arc<AxisServiceGroup>>) {
        self.state.write().axis_service_group = group;
    }

    /// The operation description.
    #[must_use]
    pub fn axis_operation(&self) -> Option<Arc<AxisOperation>> {
        self.warn_if_inactive("axis_operation");
        self.state.read().axis_operation.clone()
    }

    /// Sets the operation description.
    pub fn set_axis_operation(&self, op: Option<Arc<AxisOperation>>) {
        self.state.write().axis_operation = op;
    }

    /// The message description.
    #[must_use]
    pub fn axis_message(&self) -> Option<Arc<AxisMessage>> {
        self.warn_if_inactive("axis_message");
        self.state.read().axis_message.clone()
    }

    /// Sets the message description.
    pub fn set_axis_message(&self, message: Option<Arc<AxisMessage>>) {
        self.state.write().axis_message = message;
    }

    /// The inbound transport.
    #[must_use]
    pub fn transport_in(&self) -> Option<Arc<TransportInDescription>> {
        self.warn_if_inactive("transport_in");
        self.state.read().transport_in.clone()
    }

    /// Sets the inbound transport.
    pub fn set_transport_in(&self, transport: Option<Arc<TransportInDescription>>) {
        self.state.write().transport_in = transport;
    }

    /// The outbound transport.
    #[must_use]
    pub fn transport_out(&self) -> Option<Arc<TransportOutDescription>> {
        self.warn_if_inactive("transport_out");
        self.state.read().transport_out.clone()
    }

    /// Sets the outbound transport.
    pub fn set_transport_out(&self, transport: Option<Arc<TransportOutDescription>>) {
        self.state.write().transport_out = transport;
    }

    /// The name of the transport the message arrived on.
    #[must_use]
    pub fn incoming_transport_name(&self) -> Option<String> {
        self.state.read().incoming_transport_name.clone()
    }

    /// Sets the name of the transport the message arrived on.
    pub fn set_incoming_transport_name(&self, name: Option<String>) {
        self.state.write().incoming_transport_name = name;
    }

    /// Why the flow failed, if it did.
    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        self.state.read().failure_reason.clone()
    }

    pub(crate) fn set_failure_reason(&self, reason: Option<String>) {
        self.state.write().failure_reason = reason;
    }

    // ---- execution chain ------------------------------------------------

    /// Runs `f` with exclusive access to the cursor.
    pub fn with_tracker<R>(&self, f: impl FnOnce(&mut ExecutionTracker) -> R) -> R {
        f(&mut self.tracker.lock())
    }

    /// Replaces the execution chain and rewinds the cursor.
    pub fn set_execution_chain(&self, chain: Vec<Arc<dyn Handler>>) {
        self.tracker.lock().set_execution_chain(chain);
    }

    /// Appends units to the execution chain.
    pub fn extend_execution_chain(&self, units: impl IntoIterator<Item = Arc<dyn Handler>>) {
        self.tracker.lock().extend_execution_chain(units);
    }

    /// A copy of the execution chain.
    #[must_use]
    pub fn execution_chain(&self) -> Vec<Arc<dyn Handler>> {
        self.tracker.lock().execution_chain().to_vec()
    }

    /// The chain unit at `index`.
    #[must_use]
    pub fn handler_at(&self, index: i32) -> Option<Arc<dyn Handler>> {
        self.tracker.lock().handler_at(index)
    }

    /// The top-level cursor.
    #[must_use]
    pub fn current_handler_index(&self) -> i32 {
        self.tracker.lock().current_handler_index()
    }

    /// Moves the top-level cursor.
    pub fn set_current_handler_index(&self, index: i32) {
        self.tracker.lock().set_current_handler_index(index);
    }

    /// The in-phase cursor.
    #[must_use]
    pub fn current_phase_index(&self) -> i32 {
        self.tracker.lock().current_phase_index()
    }

    /// Moves the in-phase cursor.
    pub fn set_current_phase_index(&self, index: i32) {
        self.tracker.lock().set_current_phase_index(index);
    }

    /// Records a unit as executed.
    pub fn add_executed_phase(&self, unit: Arc<dyn Handler>) {
        self.tracker.lock().add_executed_phase(unit);
    }

    /// Pops the most recently executed unit.
    pub fn remove_first_executed_phase(&self) -> Option<Arc<dyn Handler>> {
        self.tracker.lock().remove_first_executed_phase()
    }

    /// Forgets every executed unit.
    pub fn reset_executed_phases(&self) {
        self.tracker.lock().reset_executed_phases();
    }

    /// Executed units, most recent first.
    #[must_use]
    pub fn executed_phases(&self) -> Vec<Arc<dyn Handler>> {
        self.tracker.lock().executed_phases()
    }

    // ---- self-managed data ----------------------------------------------

    fn self_managed_key(owner_class: &str, key: &str) -> String {
        format!("{owner_class}*{key}*{}", crate::utils::string_hash_code(key))
    }

    /// Stores auxiliary per-message data on behalf of a handler class.
    pub fn set_self_managed_data(&self, owner_class: &str, key: &str, value: serde_json::Value) {
        self.self_managed_data
            .lock()
            .insert(Self::self_managed_key(owner_class, key), value);
    }

    /// Reads auxiliary per-message data.
    #[must_use]
    pub fn get_self_managed_data(&self, owner_class: &str, key: &str) -> Option<serde_json::Value> {
        self.self_managed_data
            .lock()
            .get(&Self::self_managed_key(owner_class, key))
            .cloned()
    }

    /// Returns true if a handler class stored data under `key`.
    #[must_use]
    pub fn contains_self_managed_data_key(&self, owner_class: &str, key: &str) -> bool {
        self.self_managed_data
            .lock()
            .contains_key(&Self::self_managed_key(owner_class, key))
    }

    /// Removes auxiliary per-message data.
    pub fn remove_self_managed_data(&self, owner_class: &str, key: &str) -> Option<serde_json::Value> {
        self.self_managed_data
            .lock()
            .remove(&Self::self_managed_key(owner_class, key))
    }

    /// A copy of the whole self-managed data map.
    #[must_use]
    pub fn self_managed_data_map(&self) -> HashMap<String, serde_json::Value> {
        self.self_managed_data.lock().clone()
    }

    // ---- protocol checks ------------------------------------------------

    /// Checks that every mustUnderstand header targeted at this node was
    /// processed.
    ///
    /// When the operation's receiver defers the check, offending header
    /// names are appended to [`property_names::UNPROCESSED_HEADER_QNAMES`]
    /// instead.
    ///
    /// # Errors
    ///
    /// Returns a `MustUnderstand` fault naming the first offending header.
    pub fn check_must_understand(&self) -> Result<(), SoapflowError> {
        let Some(envelope) = self.envelope() else {
            return Ok(());
        };
        let roles = self
            .configuration_context()
            .map(|c| c.config().roles.clone())
            .unwrap_or_default();
        let offending: Vec<QName> = envelope
            .read()
            .headers()
            .iter()
            .filter(|h| h.must_understand && !h.processed && h.targets_us(&roles))
            .map(|h| h.name.clone())
            .collect();
        let Some(first) = offending.first() else {
            return Ok(());
        };
        let defers = self
            .axis_operation()
            .and_then(|op| op.message_receiver())
            .is_some_and(|r| r.defers_must_understand());
        if !defers {
            return Err(SoapFault::must_understand(self.soap_version(), first.clone()).into());
        }
        let mut names = match self.get_local_property(property_names::UNPROCESSED_HEADER_QNAMES) {
            Some(serde_json::Value::Array(existing)) => existing,
            _ => Vec::new(),
        };
        names.extend(offending.iter().map(|q| serde_json::Value::String(q.to_string())));
        self.set_property(
            property_names::UNPROCESSED_HEADER_QNAMES,
            serde_json::Value::Array(names),
        );
        Ok(())
    }

    // ---- copies ---------------------------------------------------------

    /// Copies the message for independent processing.
    ///
    /// The copy shares the envelope and attachments, owns its flags, local
    /// properties, cursor and self-managed data, and keeps the service and
    /// group context ids. Runtime contexts and the service/operation
    /// descriptions are not carried over.
    #[must_use]
    pub fn extract_copy_message_context(&self) -> MessageContext {
        let copy = MessageContext::new();
        {
            let src = self.state.read();
            let mut dst = copy.state.write();
            dst.options = src.options.clone();
            dst.envelope = src.envelope.clone();
            dst.attachments = src.attachments.clone();
            dst.flags = src.flags;
            dst.flow = src.flow;
            dst.service_context_id = src.service_context_id.clone();
            dst.service_group_context_id = src.service_group_context_id.clone();
            dst.axis_message = src.axis_message.clone();
            dst.transport_in = src.transport_in.clone();
            dst.transport_out = src.transport_out.clone();
            dst.incoming_transport_name = src.incoming_transport_name.clone();
            dst.session_context = src.session_context.clone();
        }
        copy.core.properties().replace_all(self.core.properties().to_dict());
        copy.core
            .non_replicable_properties()
            .replace_all(self.core.non_replicable_properties().to_dict());
        *copy.tracker.lock() = self.tracker.lock().clone();
        *copy.self_managed_data.lock() = self.self_managed_data_map();
        if let Some(config) = self.configuration_context() {
            copy.set_configuration_context(&config);
        }
        copy.restore_log_correlation_id(self.log_correlation_id().to_string());
        copy
    }

    // ---- activation -----------------------------------------------------

    /// Returns true while the message was read from a stream but not yet
    /// re-attached to a live engine.
    #[must_use]
    pub fn needs_to_be_activated(&self) -> bool {
        self.needs_activation.load(Ordering::SeqCst)
    }

    pub(crate) fn set_needs_activation(&self, value: bool) {
        self.needs_activation.store(value, Ordering::SeqCst);
    }

    pub(crate) fn stage_pending(&self, pending: PendingActivation) {
        *self.pending.lock() = Some(pending);
        self.set_needs_activation(true);
    }

    pub(crate) fn pending(&self) -> &Mutex<Option<PendingActivation>> {
        &self.pending
    }

    pub(crate) fn staged_operation_context(&self) -> Option<Arc<OperationContext>> {
        self.state.read().operation_context.clone()
    }

    pub(crate) fn restore_contexts(
        &self,
        group: Option<Arc<ServiceGroupContext>>,
        service: Option<Arc<ServiceContext>>,
    ) {
        let mut state = self.state.write();
        if let Some(group) = &group {
            state.service_group_context_id = Some(group.group_id().to_string());
        }
        if let Some(service) = &service {
            state.service_context_id = Some(service.service_context_id().to_string());
        }
        state.service_group_context = group;
        state.service_context = service;
    }

    fn scope_chain(&self) -> Vec<ContextRef> {
        let (op, service, group) = {
            let state = self.state.read();
            (
                state.operation_context.clone(),
                state.service_context.clone(),
                state.service_group_context.clone(),
            )
        };
        let mut chain = Vec::with_capacity(4);
        chain.extend(op.map(ContextRef::Operation));
        chain.extend(service.map(ContextRef::Service));
        chain.extend(group.map(ContextRef::ServiceGroup));
        chain.extend(self.configuration_context().map(ContextRef::Configuration));
        chain
    }
}

impl Default for MessageContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Context for MessageContext {
    fn core(&self) -> &ContextCore {
        &self.core
    }

    fn parent(&self) -> Option<ContextRef> {
        self.scope_chain().into_iter().next()
    }

    fn get_local_property(&self, key: &str) -> Option<serde_json::Value> {
        self.core
            .properties()
            .get(key)
            .or_else(|| self.core.non_replicable_properties().get(key))
            .or_else(|| self.state.read().options.property(key).cloned())
    }

    fn get_property(&self, key: &str) -> Option<serde_json::Value> {
        if let Some(value) = self.get_local_property(key) {
            return Some(value);
        }
        let mut visited = HashSet::from([self.core.id()]);
        for scope in self.scope_chain() {
            if visited.contains(&scope.id()) {
                continue;
            }
            if let Some(value) = lookup_in_chain(scope, key, &mut visited) {
                return Some(value);
            }
        }
        None
    }

    fn get_properties(&self) -> HashMap<String, serde_json::Value> {
        let mut merged = HashMap::new();
        for scope in self.scope_chain().iter().rev() {
            merged.extend(scope.as_context().local_properties());
        }
        merged.extend(self.core.non_replicable_properties().to_dict());
        merged.extend(self.core.properties().to_dict());
        merged.extend(self.state.read().options.properties.clone());
        merged
    }

    fn local_properties(&self) -> HashMap<String, serde_json::Value> {
        let mut props = self.core.non_replicable_properties().to_dict();
        props.extend(self.core.properties().to_dict());
        props
    }
}

impl fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("MessageContext")
            .field("id", &self.core.id())
            .field("log_correlation_id", &self.log_correlation_id.get())
            .field("message_id", &state.options.message_id)
            .field("flow", &state.flow)
            .field("flags", &state.flags)
            .field("needs_activation", &self.needs_to_be_activated())
            .finish_non_exhaustive()
    }
}
