//! Service and operation resolution for inbound messages.

use super::{Handler, PhaseCondition};
use crate::context::Context;
use crate::core::{Flow, InvocationResponse, MessageLabel};
use crate::errors::{CorrelationError, SoapflowError};
use crate::message::MessageContext;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Resolves the service from the last path segment of `To` and the
/// operation from the action, falling back to the first body element.
///
/// Leaves already-resolved descriptions alone.
#[derive(Debug, Default)]
pub struct ActionDispatcher;

impl ActionDispatcher {
    /// Creates the dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for ActionDispatcher {
    fn name(&self) -> &str {
        "ActionDispatcher"
    }

    async fn invoke(&self, msg: &MessageContext) -> Result<InvocationResponse, SoapflowError> {
        if msg.axis_service().is_none() {
            let service = msg.configuration_context().and_then(|config| {
                msg.to()
                    .and_then(|to| to.last_path_segment().map(str::to_string))
                    .and_then(|name| config.axis_configuration().get_service(&name))
            });
            if let Some(service) = service {
                debug!(
                    log_correlation_id = %msg.log_correlation_id(),
                    service = %service.name(),
                    "Dispatched service"
                );
                msg.set_axis_service(Some(service));
            }
        }
        if msg.axis_operation().is_none() {
            if let Some(service) = msg.axis_service() {
                let by_action = msg
                    .options()
                    .dispatch_action()
                    .and_then(|action| service.operation_by_action(action));
                let operation = by_action.or_else(|| {
                    let element = msg
                        .envelope()
                        .and_then(|env| env.read().first_body_element().cloned())?;
                    service
                        .operation(&element)
                        .or_else(|| service.operation_by_local_name(&element.local_part))
                });
                if let Some(operation) = operation {
                    debug!(
                        log_correlation_id = %msg.log_correlation_id(),
                        operation = %operation.name(),
                        "Dispatched operation"
                    );
                    msg.set_axis_operation(Some(operation));
                }
            }
        }
        Ok(InvocationResponse::Continue)
    }
}

/// Post-condition of the dispatch phase.
///
/// Requires a resolved service and operation, then finds or creates the
/// runtime contexts for the exchange, adds the message to its operation
/// context and appends the operation's inbound phases to the chain.
#[derive(Debug, Default)]
pub struct DispatchPhaseCheck;

impl DispatchPhaseCheck {
    /// Creates the check.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PhaseCondition for DispatchPhaseCheck {
    fn check_post_condition(&self, msg: &MessageContext) -> Result<(), SoapflowError> {
        let service = msg.axis_service().ok_or_else(|| {
            let to = msg.to().map(|to| to.address).unwrap_or_default();
            SoapflowError::Dispatch(format!("the endpoint reference '{to}' did not resolve to a service"))
        })?;
        let operation = msg.axis_operation().ok_or_else(|| {
            let action = msg.options().dispatch_action().unwrap_or_default().to_string();
            SoapflowError::Dispatch(format!(
                "operation for action '{action}' not found on service '{}'",
                service.name()
            ))
        })?;
        let config = msg
            .configuration_context()
            .ok_or_else(|| SoapflowError::Internal("message has no configuration context".into()))?;
        let shared = msg
            .handle()
            .ok_or_else(|| SoapflowError::Internal("message has no shared handle".into()))?;

        let label = if msg.is_processing_fault() {
            MessageLabel::Fault
        } else {
            MessageLabel::In
        };
        if msg.axis_message().is_none() {
            msg.set_axis_message(operation.message(label));
        }

        if msg.operation_context().is_none() {
            let op_ctx = match msg.relates_to() {
                Some(relates_to) => config
                    .find_operation_context(&relates_to.value)
                    .ok_or_else(|| CorrelationError::unknown(relates_to.value.clone()))?,
                None => {
                    let group = config
                        .axis_configuration()
                        .get_service_group(service.group_name())
                        .ok_or_else(|| {
                            SoapflowError::Dispatch(format!(
                                "service group '{}' is not deployed",
                                service.group_name()
                            ))
                        })?;
                    let group_ctx = config.service_group_context_for(&group, service.scope());
                    let service_ctx = group_ctx.service_context_for(&service);
                    let op_ctx = service_ctx.create_operation_context(&operation);
                    if let Some(id) = msg.message_id() {
                        config.register_operation_context(id, &op_ctx);
                    }
                    op_ctx
                }
            };
            op_ctx.add_message_context(&shared)?;
            msg.set_operation_context(Some(op_ctx.clone()))?;
            op_ctx.touch();
        }

        let flow = if msg.is_processing_fault() { Flow::InFault } else { Flow::In };
        msg.extend_execution_chain(
            operation
                .phases(flow)
                .into_iter()
                .map(|phase| phase as Arc<dyn Handler>),
        );
        Ok(())
    }
}
