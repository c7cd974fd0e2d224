//! A deployed echo service for engine tests.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::context::{ConfigurationContext, Context, OperationContext};
use crate::core::{Flow, Mep, MessageLabel, SoapVersion};
use crate::description::{
    AxisConfiguration, AxisOperation, AxisService, TransportInDescription, TransportOutDescription,
};
use crate::engine::{AxisEngine, DispatchPhaseCheck, Handler, InOnlyFnReceiver, InOutFnReceiver, PhaseCondition};
use crate::errors::SoapflowError;
use crate::events::CollectingEventSink;
use crate::message::{EndpointReference, MessageContext, Options, SoapEnvelope};
use crate::testing::RecordingSender;
use crate::utils::generate_message_id;

/// Address of the echo service.
pub const ECHO_ENDPOINT: &str = "http://localhost:8080/services/Echo";
/// Action of the request/response `echo` operation.
pub const ECHO_ACTION: &str = "urn:echo";
/// Action of the one-way `notify` operation.
pub const NOTIFY_ACTION: &str = "urn:notify";
/// Action of the client-side `query` operation.
pub const QUERY_ACTION: &str = "urn:query";

const TRANSPORT: &str = "local";

/// An engine with one deployed `Echo` service.
///
/// `Echo` has three operations:
/// - `echo` (in-out) answers with the request body under `echoResponse`
/// - `notify` (in-only) sets the `notified` property on the message
/// - `query` (out-in) has no receiver and is used for client-side exchanges
///
/// Every message sent goes to [`EngineFixture::sender`].
pub struct EngineFixture {
    /// The description tree.
    pub axis_configuration: Arc<AxisConfiguration>,
    /// The root context.
    pub config_context: Arc<ConfigurationContext>,
    /// Every engine event.
    pub events: Arc<CollectingEventSink>,
    /// The `local` transport sender.
    pub sender: Arc<RecordingSender>,
}

impl EngineFixture {
    /// Builds the fixture with default settings.
    #[must_use]
    pub fn echo() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Builds the fixture with `config`.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        let axis_configuration = Arc::new(AxisConfiguration::with_default_phases());
        let sender = Arc::new(RecordingSender::new());
        axis_configuration.add_transport_in(TransportInDescription::new(TRANSPORT));
        axis_configuration.add_transport_out(TransportOutDescription::new(TRANSPORT).with_sender(sender.clone()));

        let echo = AxisOperation::new("echo", Mep::InOut)
            .with_action(ECHO_ACTION)
            .with_receiver(Arc::new(InOutFnReceiver::new(|msg| {
                let envelope = msg
                    .envelope()
                    .ok_or_else(|| SoapflowError::Dispatch("request has no envelope".into()))?;
                let content = envelope
                    .read()
                    .body()
                    .first()
                    .map(|e| e.content.clone())
                    .unwrap_or_default();
                Ok(SoapEnvelope::new(msg.soap_version()).with_body_element("{urn:echo}echoResponse", content))
            })));
        let notify = AxisOperation::new("notify", Mep::InOnly)
            .with_action(NOTIFY_ACTION)
            .with_receiver(Arc::new(InOnlyFnReceiver::new(|msg| {
                msg.set_property("notified", serde_json::json!(true));
                Ok(())
            })));
        let query = AxisOperation::new("query", Mep::OutIn).with_action(QUERY_ACTION);
        let service = AxisService::new("Echo")
            .with_operation(echo)
            .with_operation(notify)
            .with_operation(query);
        if let Err(err) = axis_configuration.add_service(service) {
            panic!("deploying the echo service: {err}");
        }

        let config_context = ConfigurationContext::new(axis_configuration.clone(), config);
        let events = Arc::new(CollectingEventSink::new());
        config_context.set_event_sink(events.clone());
        Self {
            axis_configuration,
            config_context,
            events,
            sender,
        }
    }

    /// An engine over the fixture's configuration context.
    #[must_use]
    pub fn engine(&self) -> AxisEngine {
        AxisEngine::new(self.config_context.clone())
    }

    /// The `Echo` service description.
    #[must_use]
    pub fn service(&self) -> Arc<AxisService> {
        self.axis_configuration
            .get_service("Echo")
            .unwrap_or_else(|| panic!("echo service not deployed"))
    }

    /// An operation of the `Echo` service.
    #[must_use]
    pub fn operation(&self, local_name: &str) -> Arc<AxisOperation> {
        self.service()
            .operation_by_local_name(local_name)
            .unwrap_or_else(|| panic!("no operation '{local_name}'"))
    }

    /// Appends `handler` to an operation phase.
    pub fn add_operation_handler(&self, operation: &str, flow: Flow, handler: Arc<dyn Handler>) {
        let op = self.operation(operation);
        match op.phases(flow).first() {
            Some(phase) => phase.add_handler(handler),
            None => panic!("operation '{operation}' has no {flow} phase"),
        }
    }

    /// Appends `handler` to a global phase.
    pub fn add_global_handler(&self, flow: Flow, phase: &str, handler: Arc<dyn Handler>) {
        match self.axis_configuration.find_phase(flow, phase) {
            Some(phase) => phase.add_handler(handler),
            None => panic!("no global phase '{phase}' on {flow}"),
        }
    }

    /// A server-side request to the echo endpoint with `action`, a fresh
    /// message id and a SOAP 1.2 `{urn:echo}echo` body.
    #[must_use]
    pub fn request(&self, action: &str) -> Arc<MessageContext> {
        let msg = self.config_context.create_message_context();
        msg.set_options(
            Options::new()
                .with_to(EndpointReference::new(ECHO_ENDPOINT))
                .with_reply_to(EndpointReference::anonymous())
                .with_message_id(generate_message_id())
                .with_action(action),
        );
        msg.set_server_side(true);
        msg.set_transport_in(self.axis_configuration.get_transport_in(TRANSPORT));
        msg.set_transport_out(self.axis_configuration.get_transport_out(TRANSPORT));
        msg.set_incoming_transport_name(Some(TRANSPORT.to_string()));
        let envelope = SoapEnvelope::new(SoapVersion::Soap12)
            .with_body_element("{urn:echo}echo", serde_json::json!({"text": "hello"}));
        if let Err(err) = msg.set_envelope(envelope) {
            panic!("attaching the request envelope: {err}");
        }
        msg
    }

    /// An `echo` request already dispatched: its service, operation and
    /// runtime contexts are bound and it sits in the `In` slot.
    #[must_use]
    pub fn bound_message(&self) -> Arc<MessageContext> {
        let msg = self.request(ECHO_ACTION);
        msg.set_axis_service(Some(self.service()));
        msg.set_axis_operation(Some(self.operation("echo")));
        if let Err(err) = DispatchPhaseCheck::new().check_post_condition(&msg) {
            panic!("binding the fixture message: {err}");
        }
        msg
    }

    /// A client-side `query` exchange: the outbound request is in the `Out`
    /// slot and the exchange is registered under the request's message id.
    #[must_use]
    pub fn client_exchange(&self) -> (Arc<OperationContext>, Arc<MessageContext>) {
        let service = self.service();
        let operation = self.operation("query");
        let Some(group) = self.axis_configuration.get_service_group(service.group_name()) else {
            panic!("echo service group not deployed");
        };
        let group_ctx = self.config_context.service_group_context_for(&group, service.scope());
        let service_ctx = group_ctx.service_context_for(&service);
        let op_ctx = service_ctx.create_operation_context(&operation);

        let request = self.request(QUERY_ACTION);
        request.set_server_side(false);
        request.set_flow(Flow::Out);
        request.set_axis_operation(Some(operation.clone()));
        request.set_axis_message(operation.message(MessageLabel::Out));
        let bound = request
            .set_operation_context(Some(op_ctx.clone()))
            .and_then(|()| op_ctx.add_message_context(&request));
        if let Err(err) = bound {
            panic!("binding the client request: {err}");
        }
        if let Some(id) = request.message_id() {
            self.config_context.register_operation_context(id, &op_ctx);
        }
        (op_ctx, request)
    }
}
