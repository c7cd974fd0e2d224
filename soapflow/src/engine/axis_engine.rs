//! The flow driver.

use super::Handler;
use crate::context::ConfigurationContext;
use crate::core::{Flow, InvocationResponse};
use crate::errors::SoapflowError;
use crate::events::event_types;
use crate::message::MessageContext;
use crate::observability::{FlowSpanAttributes, SpanTimer};
use crate::persistence::Continuation;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info_span, trace, warn, Instrument};

/// Drives messages through the receive and send flows.
///
/// The engine is stateless apart from its configuration context; all
/// progress is kept in each message's execution tracker, which is what lets
/// a suspended message be resumed by a different engine instance.
#[derive(Debug, Clone)]
pub struct AxisEngine {
    config: Arc<ConfigurationContext>,
}

impl AxisEngine {
    /// Creates an engine over `config`.
    #[must_use]
    pub fn new(config: Arc<ConfigurationContext>) -> Self {
        Self { config }
    }

    /// The configuration context.
    #[must_use]
    pub fn configuration_context(&self) -> &Arc<ConfigurationContext> {
        &self.config
    }

    /// Runs an inbound message through the global in-phases (in-fault
    /// phases for faults), dispatch, the operation's in-phases and finally
    /// its message receiver.
    pub async fn receive(&self, msg: &Arc<MessageContext>) -> Result<InvocationResponse, SoapflowError> {
        let flow = if msg.is_processing_fault() { Flow::InFault } else { Flow::In };
        self.prepare(msg, flow);
        let phases = self.config.axis_configuration().phases(flow);
        msg.set_execution_chain(phases.into_iter().map(|p| p as Arc<dyn Handler>).collect());
        let span = info_span!("receive", log_correlation_id = %msg.log_correlation_id(), %flow);
        async {
            let timer = SpanTimer::start();
            self.emit(event_types::FLOW_STARTED, FlowSpanAttributes::for_message(msg, flow));
            let response = self.invoke(msg, false).await?;
            self.finish_receive(msg, response, &timer).await
        }
        .instrument(span)
        .await
    }

    /// Runs an outbound message through the operation's out-phases and the
    /// global out-phases, then hands it to the transport sender.
    pub async fn send(&self, msg: &Arc<MessageContext>) -> Result<InvocationResponse, SoapflowError> {
        let flow = if msg.is_processing_fault() { Flow::OutFault } else { Flow::Out };
        self.prepare(msg, flow);
        let mut chain: Vec<Arc<dyn Handler>> = msg
            .axis_operation()
            .map(|op| op.phases(flow).into_iter().map(|p| p as Arc<dyn Handler>).collect())
            .unwrap_or_default();
        chain.extend(
            self.config
                .axis_configuration()
                .phases(flow)
                .into_iter()
                .map(|p| p as Arc<dyn Handler>),
        );
        msg.set_execution_chain(chain);
        let span = info_span!("send", log_correlation_id = %msg.log_correlation_id(), %flow);
        async {
            let timer = SpanTimer::start();
            self.emit(event_types::FLOW_STARTED, FlowSpanAttributes::for_message(msg, flow));
            let response = self.invoke(msg, false).await?;
            self.finish_send(msg, response, &timer).await
        }
        .instrument(span)
        .await
    }

    /// Sends a fault message through the out-fault flow.
    pub async fn send_fault(&self, msg: &Arc<MessageContext>) -> Result<InvocationResponse, SoapflowError> {
        msg.set_processing_fault(true);
        self.send(msg).await
    }

    /// Continues a suspended inbound message from its saved cursor.
    pub async fn resume_receive(&self, msg: &Arc<MessageContext>) -> Result<InvocationResponse, SoapflowError> {
        let flow = msg.flow();
        self.prepare_resume(msg, flow);
        let span = info_span!("resume_receive", log_correlation_id = %msg.log_correlation_id(), %flow);
        async {
            let timer = SpanTimer::start();
            let response = self.invoke(msg, true).await?;
            self.finish_receive(msg, response, &timer).await
        }
        .instrument(span)
        .await
    }

    /// Continues a suspended outbound message from its saved cursor.
    pub async fn resume_send(&self, msg: &Arc<MessageContext>) -> Result<InvocationResponse, SoapflowError> {
        let flow = msg.flow();
        self.prepare_resume(msg, flow);
        let span = info_span!("resume_send", log_correlation_id = %msg.log_correlation_id(), %flow);
        async {
            let timer = SpanTimer::start();
            let response = self.invoke(msg, true).await?;
            self.finish_send(msg, response, &timer).await
        }
        .instrument(span)
        .await
    }

    /// Continues a suspended message in whichever direction it was going.
    pub async fn resume(&self, msg: &Arc<MessageContext>) -> Result<InvocationResponse, SoapflowError> {
        if msg.flow().is_inbound() {
            self.resume_receive(msg).await
        } else {
            self.resume_send(msg).await
        }
    }

    /// Restores a captured continuation against this engine and resumes it.
    pub async fn resume_continuation(
        &self,
        continuation: &Continuation,
    ) -> Result<(Arc<MessageContext>, InvocationResponse), SoapflowError> {
        let msg = continuation.restore(&self.config)?;
        let response = self.resume(&msg).await?;
        Ok((msg, response))
    }

    /// Resumes several continuations concurrently. Results keep input order.
    pub async fn resume_all(
        &self,
        continuations: &[Continuation],
    ) -> Vec<Result<(Arc<MessageContext>, InvocationResponse), SoapflowError>> {
        join_all(continuations.iter().map(|c| self.resume_continuation(c))).await
    }

    /// Calls `flow_complete` on every executed unit, most recent first, then
    /// forgets them.
    pub async fn flow_complete(&self, msg: &MessageContext) {
        for unit in msg.executed_phases() {
            trace!(handler = %unit.name(), "Completing unit");
            unit.flow_complete(msg).await;
        }
        msg.reset_executed_phases();
    }

    fn prepare(&self, msg: &Arc<MessageContext>, flow: Flow) {
        msg.bind_handle();
        if msg.configuration_context().is_none() {
            msg.set_configuration_context(&self.config);
        }
        msg.set_flow(flow);
        msg.set_paused(false);
        msg.set_failure_reason(None);
        msg.reset_executed_phases();
    }

    fn prepare_resume(&self, msg: &Arc<MessageContext>, flow: Flow) {
        msg.bind_handle();
        msg.set_paused(false);
        self.emit(event_types::FLOW_RESUMED, FlowSpanAttributes::for_message(msg, flow));
    }

    async fn invoke(&self, msg: &MessageContext, mut resuming: bool) -> Result<InvocationResponse, SoapflowError> {
        if msg.current_handler_index() == -1 {
            msg.set_current_handler_index(0);
        }
        loop {
            let index = msg.current_handler_index();
            let Some(unit) = msg.handler_at(index) else {
                break;
            };
            if resuming {
                resuming = false;
            } else {
                msg.add_executed_phase(unit.clone());
            }
            trace!(handler = %unit.name(), index, "Invoking unit");
            match unit.invoke(msg).await {
                Ok(InvocationResponse::Continue) => msg.set_current_handler_index(index + 1),
                Ok(InvocationResponse::Suspend) => {
                    msg.set_paused(true);
                    debug!(handler = %unit.name(), "Message suspended");
                    self.emit(
                        event_types::FLOW_SUSPENDED,
                        FlowSpanAttributes::for_message(msg, msg.flow()).with_handler(unit.name()),
                    );
                    return Ok(InvocationResponse::Suspend);
                }
                Ok(InvocationResponse::Abort) => {
                    debug!(handler = %unit.name(), "Flow aborted");
                    self.flow_complete(msg).await;
                    self.emit(
                        event_types::FLOW_ABORTED,
                        FlowSpanAttributes::for_message(msg, msg.flow()).with_handler(unit.name()),
                    );
                    return Ok(InvocationResponse::Abort);
                }
                Err(err) => return Err(self.fail(msg, Some(unit.name()), err).await),
            }
        }
        Ok(InvocationResponse::Continue)
    }

    async fn finish_receive(
        &self,
        msg: &Arc<MessageContext>,
        response: InvocationResponse,
        timer: &SpanTimer,
    ) -> Result<InvocationResponse, SoapflowError> {
        if response != InvocationResponse::Continue {
            return Ok(response);
        }
        if let Err(err) = msg.check_must_understand() {
            return Err(self.fail(msg, None, err).await);
        }
        if let Some(receiver) = msg.axis_operation().and_then(|op| op.message_receiver()) {
            if let Err(err) = receiver.receive(msg).await {
                return Err(self.fail(msg, None, err).await);
            }
        }
        self.complete(msg, timer).await;
        Ok(InvocationResponse::Continue)
    }

    async fn finish_send(
        &self,
        msg: &Arc<MessageContext>,
        response: InvocationResponse,
        timer: &SpanTimer,
    ) -> Result<InvocationResponse, SoapflowError> {
        if response != InvocationResponse::Continue {
            return Ok(response);
        }
        match msg.transport_out().and_then(|t| t.sender()) {
            Some(sender) => {
                let sent = sender.invoke(msg).await;
                sender.cleanup(msg).await;
                match sent {
                    Ok(InvocationResponse::Suspend) => {
                        msg.set_paused(true);
                        return Ok(InvocationResponse::Suspend);
                    }
                    Ok(_) => {}
                    Err(err) => return Err(self.fail(msg, None, err).await),
                }
            }
            None => debug!(
                log_correlation_id = %msg.log_correlation_id(),
                "No transport sender; message not written"
            ),
        }
        self.complete(msg, timer).await;
        Ok(InvocationResponse::Continue)
    }

    async fn complete(&self, msg: &MessageContext, timer: &SpanTimer) {
        self.flow_complete(msg).await;
        self.emit(
            event_types::FLOW_COMPLETED,
            FlowSpanAttributes::for_message(msg, msg.flow()).with_duration_ms(timer.elapsed_ms()),
        );
        if let Some(op) = msg.operation_context() {
            if msg.flow() == Flow::In && op.mep().slots().settles_after_receive && op.settle() {
                debug!(operation = %op.operation_name(), "No optional follow-up; exchange settled");
            }
            let in_flight = op.message_contexts().iter().any(|(_, m)| m.is_paused());
            if op.is_complete() && !in_flight && op.cleanup() {
                debug!(operation = %op.operation_name(), "Released completed exchange");
            }
        }
    }

    async fn fail(&self, msg: &MessageContext, handler: Option<&str>, err: SoapflowError) -> SoapflowError {
        warn!(
            log_correlation_id = %msg.log_correlation_id(),
            handler = handler.unwrap_or_default(),
            error = %err,
            "Flow failed"
        );
        msg.set_failure_reason(Some(err.to_string()));
        self.flow_complete(msg).await;
        let mut attrs = FlowSpanAttributes::for_message(msg, msg.flow()).with_error(err.to_string());
        if let Some(handler) = handler {
            attrs = attrs.with_handler(handler);
        }
        self.emit(event_types::FLOW_FAILED, attrs);
        err
    }

    fn emit(&self, event_type: &str, attrs: FlowSpanAttributes) {
        self.config.emit(event_type, attrs.to_event_data());
    }
}
