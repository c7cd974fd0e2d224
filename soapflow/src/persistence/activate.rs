//! Re-attaching a message read from a stream to a live engine.

use super::externalize::PendingActivation;
use super::metadata::{resolve_entry, MetaDataEntry, SelfManagedDataHolder};
use crate::context::{
    ConfigurationContext, Context, ContextRef, OperationContext, ServiceContext, ServiceGroupContext,
};
use crate::core::{Flow, MessageLabel, QName};
use crate::description::{AxisConfiguration, AxisOperation, AxisService, AxisServiceGroup, ServiceScope};
use crate::engine::Handler;
use crate::errors::{HandlerNotFoundError, SoapflowError};
use crate::events::event_types;
use crate::message::{flatten_handlers, MessageContext};
use std::sync::Arc;
use tracing::{debug, warn};

impl MessageContext {
    /// Resolves everything a read message refers to against `config`.
    ///
    /// Descriptions are looked up by name; a miss leaves the reference empty
    /// and logs a warning. Runtime contexts are found by id or recreated.
    /// The execution chain and executed units are rebuilt from the live
    /// phases with the cursor preserved, then each handler's self-managed
    /// data is handed back to it. Other messages of the same exchange are
    /// activated too. Does nothing for a message that is already active.
    ///
    /// # Errors
    ///
    /// Returns `HandlerNotFound` when saved self-managed data has no live
    /// owner; the message then stays inactive.
    pub fn activate(&self, config: &Arc<ConfigurationContext>) -> Result<(), SoapflowError> {
        activate_message(self, config, true)
    }

    /// Activates the message as a member of a live operation context,
    /// typically one whose owning message was activated first.
    ///
    /// # Errors
    ///
    /// Fails if `op` is not attached to a configuration context, and as
    /// [`MessageContext::activate`].
    pub fn activate_with_operation_context(&self, op: &Arc<OperationContext>) -> Result<(), SoapflowError> {
        if !self.needs_to_be_activated() {
            return Ok(());
        }
        let config = op.core().root().ok_or_else(|| {
            SoapflowError::Internal("operation context is not attached to a configuration context".into())
        })?;
        let staged = self.staged_operation_context();
        if !staged.is_some_and(|s| Arc::ptr_eq(&s, op)) {
            self.set_operation_context(Some(op.clone()))?;
        }
        activate_message(self, &config, false)
    }
}

fn activate_message(
    msg: &MessageContext,
    config: &Arc<ConfigurationContext>,
    with_siblings: bool,
) -> Result<(), SoapflowError> {
    if !msg.needs_to_be_activated() {
        return Ok(());
    }
    let Some(pending) = msg.pending().lock().clone() else {
        msg.set_needs_activation(false);
        return Ok(());
    };
    let log_id = msg.log_correlation_id().to_string();
    msg.set_configuration_context(config);
    let axis = config.axis_configuration();

    let service = pending
        .axis_service
        .as_ref()
        .and_then(|entry| found(axis.get_service(&entry.qualified_name), entry, &log_id));
    let group = match &pending.axis_service_group {
        Some(entry) => found(axis.get_service_group(&entry.qualified_name), entry, &log_id),
        None => service.as_ref().and_then(|s| axis.get_service_group(s.group_name())),
    };
    let operation = pending.axis_operation.as_ref().and_then(|entry| {
        let resolved = service
            .as_ref()
            .and_then(|s| s.operation(&QName::parse(&entry.qualified_name)));
        found(resolved, entry, &log_id)
    });
    let message = pending.axis_message.as_ref().and_then(|entry| {
        let resolved = MessageLabel::parse(&entry.qualified_name)
            .and_then(|label| operation.as_ref().and_then(|op| op.message(label)));
        found(resolved, entry, &log_id)
    });
    let transport_in = pending
        .transport_in
        .as_ref()
        .and_then(|entry| found(axis.get_transport_in(&entry.qualified_name), entry, &log_id));
    let transport_out = pending
        .transport_out
        .as_ref()
        .and_then(|entry| found(axis.get_transport_out(&entry.qualified_name), entry, &log_id));

    msg.set_axis_service(service.clone());
    if group.is_some() {
        msg.set_axis_service_group(group.clone());
    }
    msg.set_axis_operation(operation.clone());
    msg.set_axis_message(message);
    msg.set_transport_in(transport_in);
    msg.set_transport_out(transport_out);

    let scope = service.as_ref().map_or(ServiceScope::Request, |s| s.scope());
    let group_ctx = restore_group_context(msg, config, &pending, group.as_deref(), scope);
    let service_ctx = restore_service_context(group_ctx.as_ref(), service.as_deref(), &pending);
    let operation_ctx = msg.staged_operation_context();
    if let Some(op) = &operation_ctx {
        attach_operation_context(op, config, service_ctx.as_ref());
    }
    msg.restore_contexts(group_ctx, service_ctx);

    let live = flatten_handlers(&live_units(axis, operation.as_deref(), msg.flow()));
    let chain = resolve_list(pending.execution_chain.as_deref(), &live, &log_id);
    let executed = resolve_list(pending.executed_phases.as_deref(), &live, &log_id);
    let chain_units = flatten_handlers(&chain);
    restore_self_managed_data(msg, &pending.self_managed_data, &chain_units, &live)?;

    msg.with_tracker(|tracker| {
        tracker.set_execution_chain(chain);
        tracker.set_current_handler_index(pending.handler_index);
        tracker.set_current_phase_index(pending.phase_index);
        tracker.set_executed_phases(executed);
    });
    for unit in &chain_units {
        let Some(manager) = unit.self_managed_data() else {
            continue;
        };
        if !pending.self_managed_data.iter().any(|h| h.is_owned_by(unit.as_ref())) {
            manager.restore_transient_data(msg);
        }
    }

    *msg.pending().lock() = None;
    msg.set_needs_activation(false);
    debug!(log_correlation_id = %log_id, "Message activated");
    config.emit(
        event_types::MESSAGE_ACTIVATED,
        serde_json::json!({
            "log_correlation_id": log_id,
            "message_id": msg.message_id(),
            "handler_index": pending.handler_index,
        }),
    );

    if with_siblings {
        if let Some(op) = &operation_ctx {
            for (_, sibling) in op.message_contexts() {
                if !std::ptr::eq(Arc::as_ptr(&sibling), msg) && sibling.needs_to_be_activated() {
                    activate_message(&sibling, config, false)?;
                }
            }
        }
    }
    Ok(())
}

fn found<T>(resolved: Option<T>, entry: &MetaDataEntry, log_id: &str) -> Option<T> {
    if resolved.is_none() {
        warn!(
            log_correlation_id = %log_id,
            class_name = %entry.class_name,
            qualified_name = %entry.qualified_name,
            "Could not resolve saved reference; leaving it empty"
        );
    }
    resolved
}

fn live_units(axis: &AxisConfiguration, operation: Option<&AxisOperation>, flow: Flow) -> Vec<Arc<dyn Handler>> {
    let global = axis.phases(flow).into_iter().map(|p| p as Arc<dyn Handler>);
    let local: Vec<Arc<dyn Handler>> = operation
        .map(|op| op.phases(flow).into_iter().map(|p| p as Arc<dyn Handler>).collect())
        .unwrap_or_default();
    if flow.is_inbound() {
        global.chain(local).collect()
    } else {
        local.into_iter().chain(global).collect()
    }
}

fn resolve_list(
    entries: Option<&[MetaDataEntry]>,
    live: &[Arc<dyn Handler>],
    log_id: &str,
) -> Vec<Arc<dyn Handler>> {
    entries
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| found(resolve_entry(entry, live), entry, log_id))
        .collect()
}

fn restore_group_context(
    msg: &MessageContext,
    config: &Arc<ConfigurationContext>,
    pending: &PendingActivation,
    group: Option<&AxisServiceGroup>,
    scope: ServiceScope,
) -> Option<Arc<ServiceGroupContext>> {
    let id = msg.service_group_context_id()?;
    if let Some(existing) = config.get_service_group_context(&id) {
        existing.touch();
        return Some(existing);
    }
    let state = pending.service_group_context.as_ref()?;
    let Some(group) = group else {
        warn!(
            log_correlation_id = %msg.log_correlation_id(),
            service_group_context = %id,
            "No service group description; group context not restored"
        );
        return None;
    };
    let ctx = ServiceGroupContext::with_id(config, id, group.name(), scope);
    ctx.core().properties().replace_all(state.properties.clone());
    config.add_service_group_context(&ctx);
    Some(ctx)
}

fn restore_service_context(
    group_ctx: Option<&Arc<ServiceGroupContext>>,
    service: Option<&AxisService>,
    pending: &PendingActivation,
) -> Option<Arc<ServiceContext>> {
    let (group_ctx, service) = (group_ctx?, service?);
    let existed = group_ctx.find_service_context(service.name()).is_some();
    let ctx = group_ctx.service_context_for(service);
    if !existed {
        if let Some(state) = &pending.service_context {
            ctx.core().properties().replace_all(state.properties.clone());
        }
    }
    Some(ctx)
}

fn attach_operation_context(
    op: &Arc<OperationContext>,
    config: &Arc<ConfigurationContext>,
    service_ctx: Option<&Arc<ServiceContext>>,
) {
    if config.node(op.id()).is_some() {
        return;
    }
    op.core().set_root(config);
    if let Some(service) = service_ctx {
        op.core().set_parent_id(Some(service.id()));
    }
    config.register_node(ContextRef::Operation(op.clone()));
    if let Some(key) = op.registration_key() {
        config.register_operation_context(key, op);
    }
}

fn restore_self_managed_data(
    msg: &MessageContext,
    holders: &[SelfManagedDataHolder],
    chain_units: &[Arc<dyn Handler>],
    live: &[Arc<dyn Handler>],
) -> Result<(), SoapflowError> {
    for holder in holders {
        let owner = chain_units
            .iter()
            .chain(live)
            .find(|unit| holder.is_owned_by(unit.as_ref()) && unit.self_managed_data().is_some());
        let Some(manager) = owner.and_then(|unit| unit.self_managed_data()) else {
            warn!(
                log_correlation_id = %msg.log_correlation_id(),
                class_name = %holder.class_name,
                qualified_name = %holder.qualified_name,
                "Self-managed data has no live owner"
            );
            return Err(HandlerNotFoundError::new(&holder.class_name, &holder.qualified_name).into());
        };
        manager.deserialize_self_managed_data(&holder.data, msg)?;
    }
    Ok(())
}
