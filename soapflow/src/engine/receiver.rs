//! Terminal consumers of inbound messages.

use super::AxisEngine;
use crate::context::Context;
use crate::core::{Flow, MessageLabel};
use crate::errors::SoapflowError;
use crate::message::{EndpointReference, MessageContext, RelatesTo, SoapEnvelope};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Consumes a fully processed inbound message.
#[async_trait]
pub trait MessageReceiver: Send + Sync {
    /// Handles the message after the inbound flow completed.
    async fn receive(&self, msg: &Arc<MessageContext>) -> Result<(), SoapflowError>;

    /// Returns true if the receiver handles unprocessed mustUnderstand
    /// headers itself.
    fn defers_must_understand(&self) -> bool {
        false
    }
}

type InOnlyFn = dyn Fn(&MessageContext) -> Result<(), SoapflowError> + Send + Sync;
type InOutFn = dyn Fn(&MessageContext) -> Result<SoapEnvelope, SoapflowError> + Send + Sync;

/// A receiver for one-way operations backed by a closure.
pub struct InOnlyFnReceiver {
    func: Box<InOnlyFn>,
    defers_must_understand: bool,
}

impl InOnlyFnReceiver {
    /// Wraps `func`.
    pub fn new(func: impl Fn(&MessageContext) -> Result<(), SoapflowError> + Send + Sync + 'static) -> Self {
        Self {
            func: Box::new(func),
            defers_must_understand: false,
        }
    }

    /// Makes the receiver responsible for unprocessed mustUnderstand headers.
    #[must_use]
    pub fn deferring_must_understand(mut self) -> Self {
        self.defers_must_understand = true;
        self
    }
}

impl fmt::Debug for InOnlyFnReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InOnlyFnReceiver").finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageReceiver for InOnlyFnReceiver {
    async fn receive(&self, msg: &Arc<MessageContext>) -> Result<(), SoapflowError> {
        (self.func)(msg)
    }

    fn defers_must_understand(&self) -> bool {
        self.defers_must_understand
    }
}

/// A request/response receiver backed by a closure returning the response
/// envelope, which is sent through the outbound flow.
pub struct InOutFnReceiver {
    func: Box<InOutFn>,
    defers_must_understand: bool,
}

impl InOutFnReceiver {
    /// Wraps `func`.
    pub fn new(
        func: impl Fn(&MessageContext) -> Result<SoapEnvelope, SoapflowError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            func: Box::new(func),
            defers_must_understand: false,
        }
    }

    /// Makes the receiver responsible for unprocessed mustUnderstand headers.
    #[must_use]
    pub fn deferring_must_understand(mut self) -> Self {
        self.defers_must_understand = true;
        self
    }
}

impl fmt::Debug for InOutFnReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InOutFnReceiver").finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageReceiver for InOutFnReceiver {
    async fn receive(&self, msg: &Arc<MessageContext>) -> Result<(), SoapflowError> {
        let envelope = (self.func)(msg)?;
        let response = create_out_message_context(msg)?;
        response.set_envelope(envelope)?;
        let config = msg
            .configuration_context()
            .ok_or_else(|| SoapflowError::Internal("message has no configuration context".into()))?;
        AxisEngine::new(config).send(&response).await?;
        Ok(())
    }

    fn defers_must_understand(&self) -> bool {
        self.defers_must_understand
    }
}

fn new_response(request: &Arc<MessageContext>, flow: Flow) -> Result<Arc<MessageContext>, SoapflowError> {
    let config = request
        .configuration_context()
        .ok_or_else(|| SoapflowError::Internal("request has no configuration context".into()))?;
    let response = config.create_message_context();
    response.set_flow(flow);
    response.set_server_side(request.is_server_side());
    response.set_transport_in(request.transport_in());
    response.set_transport_out(request.transport_out());
    response.set_incoming_transport_name(request.incoming_transport_name());
    response.set_session_context(request.session_context());
    response.update_options(|options| {
        options.message_id = Some(crate::utils::generate_message_id());
        if let Some(id) = request.message_id() {
            options.relates_to.push(RelatesTo::reply(id));
        }
    });
    if let Some(service) = request.service_context() {
        response.set_service_context(Some(service))?;
    } else {
        response.set_axis_service(request.axis_service());
    }
    response.set_axis_operation(request.axis_operation());
    Ok(response)
}

/// Builds the response to `request`.
///
/// `To` is the request's `ReplyTo` (anonymous when absent), `RelatesTo` is
/// the request's message id and the response gets a fresh message id. The
/// response joins the request's operation context.
///
/// # Errors
///
/// Fails if the request has no configuration context or the exchange
/// cannot take an outbound message.
pub fn create_out_message_context(request: &Arc<MessageContext>) -> Result<Arc<MessageContext>, SoapflowError> {
    let response = new_response(request, Flow::Out)?;
    let to = request.reply_to().unwrap_or_else(EndpointReference::anonymous);
    response.set_to(Some(to));
    let operation = request.axis_operation();
    response.set_axis_message(operation.as_ref().and_then(|op| op.message(MessageLabel::Out)));
    if let Some(op_ctx) = request.operation_context() {
        response.set_operation_context(Some(op_ctx.clone()))?;
        op_ctx.add_message_context(&response)?;
    }
    debug!(
        log_correlation_id = %response.log_correlation_id(),
        relates_to = ?request.message_id(),
        "Created response message"
    );
    Ok(response)
}

/// Builds a fault response to `request` carrying `error`.
///
/// The fault goes to the request's `FaultTo`, then `ReplyTo`. It joins the
/// request's operation context unless that exchange is already complete.
///
/// # Errors
///
/// Fails if the request has no configuration context.
pub fn create_fault_message_context(
    request: &Arc<MessageContext>,
    error: &SoapflowError,
) -> Result<Arc<MessageContext>, SoapflowError> {
    let response = new_response(request, Flow::OutFault)?;
    response.set_processing_fault(true);
    let to = request
        .fault_to()
        .or_else(|| request.reply_to())
        .unwrap_or_else(EndpointReference::anonymous);
    response.set_to(Some(to));
    let operation = request.axis_operation();
    response.set_axis_message(operation.as_ref().and_then(|op| op.message(MessageLabel::Fault)));

    let version = request.soap_version();
    let mut envelope = SoapEnvelope::new(version);
    envelope.set_fault(error.to_soap_fault(version));
    response.set_envelope(envelope)?;
    response.set_property("failureReason", serde_json::json!(error.to_string()));

    if let Some(op_ctx) = request.operation_context() {
        if op_ctx.is_complete() {
            warn!(
                log_correlation_id = %request.log_correlation_id(),
                operation = %op_ctx.operation_name(),
                "Exchange already complete; fault not added to it"
            );
        } else {
            response.set_operation_context(Some(op_ctx.clone()))?;
            op_ctx.add_message_context_with_label(MessageLabel::Fault, &response)?;
        }
    }
    Ok(response)
}
