//! The root of the runtime context tree.

use super::{Context, ContextCore, ContextId, ContextRef, OperationContext, ServiceGroupContext};
use crate::config::EngineConfig;
use crate::description::{AxisConfiguration, AxisServiceGroup, ServiceScope};
use crate::events::{EventSink, NoOpEventSink};
use crate::message::MessageContext;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// The root context: owns the arena of live context nodes, the
/// operation-context registry and the engine-wide event sink.
///
/// Always handled as `Arc<ConfigurationContext>`; child nodes keep only a
/// weak handle back to it.
pub struct ConfigurationContext {
    core: ContextCore,
    self_ref: Weak<ConfigurationContext>,
    axis_configuration: Arc<AxisConfiguration>,
    config: EngineConfig,
    event_sink: RwLock<Arc<dyn EventSink>>,
    nodes: DashMap<ContextId, ContextRef>,
    service_group_contexts: DashMap<String, Arc<ServiceGroupContext>>,
    application_groups: DashMap<String, String>,
    operation_contexts: DashMap<String, Arc<OperationContext>>,
}

impl ConfigurationContext {
    /// Creates a configuration context over a deployed description tree.
    #[must_use]
    pub fn new(axis_configuration: Arc<AxisConfiguration>, config: EngineConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let core = ContextCore::new();
            core.set_root_weak(weak.clone());
            Self {
                core,
                self_ref: weak.clone(),
                axis_configuration,
                config,
                event_sink: RwLock::new(Arc::new(NoOpEventSink)),
                nodes: DashMap::new(),
                service_group_contexts: DashMap::new(),
                application_groups: DashMap::new(),
                operation_contexts: DashMap::new(),
            }
        })
    }

    /// Returns the description tree.
    #[must_use]
    pub fn axis_configuration(&self) -> &Arc<AxisConfiguration> {
        &self.axis_configuration
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> Arc<dyn EventSink> {
        self.event_sink.read().clone()
    }

    /// Replaces the event sink.
    pub fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        *self.event_sink.write() = sink;
    }

    /// Emits an event without blocking.
    pub fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.event_sink().try_emit(event_type, Some(data));
    }

    /// Creates a message rooted under this context.
    #[must_use]
    pub fn create_message_context(self: &Arc<Self>) -> Arc<MessageContext> {
        let msg = Arc::new(MessageContext::new());
        msg.bind_handle();
        msg.set_configuration_context(self);
        msg
    }

    /// Resolves a node handle.
    #[must_use]
    pub fn node(&self, id: ContextId) -> Option<ContextRef> {
        if id == self.core.id() {
            return self.self_ref.upgrade().map(ContextRef::Configuration);
        }
        self.nodes.get(&id).map(|n| n.value().clone())
    }

    /// Adds a node to the arena.
    pub fn register_node(&self, node: ContextRef) {
        self.nodes.insert(node.id(), node);
    }

    /// Drops a node from the arena. Its children stay alive but detached.
    pub fn remove_node(&self, id: ContextId) -> Option<ContextRef> {
        self.nodes.remove(&id).map(|(_, n)| n)
    }

    /// Number of live non-root nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Finds or creates the service group context for `group`.
    ///
    /// Application-scoped groups share one context; request-scoped groups
    /// get a fresh one per call.
    pub fn service_group_context_for(
        self: &Arc<Self>,
        group: &AxisServiceGroup,
        scope: ServiceScope,
    ) -> Arc<ServiceGroupContext> {
        if scope == ServiceScope::Application {
            let existing = self
                .application_groups
                .get(group.name())
                .and_then(|id| self.get_service_group_context(id.value()));
            if let Some(existing) = existing {
                existing.touch();
                return existing;
            }
        }
        let ctx = ServiceGroupContext::new(self, group.name(), scope);
        self.add_service_group_context(&ctx);
        ctx
    }

    /// Registers a service group context under its id. The first
    /// application-scoped context of a group becomes the shared one.
    pub fn add_service_group_context(&self, ctx: &Arc<ServiceGroupContext>) {
        self.register_node(ContextRef::ServiceGroup(ctx.clone()));
        self.service_group_contexts
            .insert(ctx.group_id().to_string(), ctx.clone());
        if ctx.scope() == ServiceScope::Application {
            self.application_groups
                .entry(ctx.group_name().to_string())
                .or_insert_with(|| ctx.group_id().to_string());
        }
    }

    /// Looks a service group context up by its id.
    #[must_use]
    pub fn get_service_group_context(&self, id: &str) -> Option<Arc<ServiceGroupContext>> {
        self.service_group_contexts.get(id).map(|c| c.value().clone())
    }

    /// Removes a service group context and its service contexts from the arena.
    pub fn remove_service_group_context(&self, id: &str) -> Option<Arc<ServiceGroupContext>> {
        let (_, ctx) = self.service_group_contexts.remove(id)?;
        self.application_groups.retain(|_, v| v != id);
        for service_ctx in ctx.service_contexts() {
            self.remove_node(Context::id(service_ctx.as_ref()));
        }
        self.remove_node(Context::id(ctx.as_ref()));
        Some(ctx)
    }

    /// Removes a request-scoped group once none of its service contexts
    /// parents a live operation context. Returns true if it was removed.
    pub fn release_request_scoped_group(&self, group: &ServiceGroupContext) -> bool {
        if group.scope() != ServiceScope::Request {
            return false;
        }
        let services: HashSet<ContextId> = group
            .service_contexts()
            .iter()
            .map(|s| Context::id(s.as_ref()))
            .collect();
        let busy = self.nodes.iter().any(|node| match node.value() {
            ContextRef::Operation(op) => op.core().parent_id().is_some_and(|p| services.contains(&p)),
            _ => false,
        });
        if busy {
            return false;
        }
        debug!(service_group_context = %group.group_id(), "Releasing request-scoped group");
        self.remove_service_group_context(group.group_id()).is_some()
    }

    /// All live service group contexts.
    #[must_use]
    pub fn service_group_contexts(&self) -> Vec<Arc<ServiceGroupContext>> {
        self.service_group_contexts
            .iter()
            .map(|c| c.value().clone())
            .collect()
    }

    /// Removes request-scoped service group contexts idle longer than the
    /// configured timeout. Returns how many were removed.
    pub fn cleanup_service_group_contexts(&self) -> usize {
        let now = crate::utils::now_millis();
        let timeout = self.config.service_group_timeout_ms;
        let expired: Vec<String> = self
            .service_group_contexts
            .iter()
            .filter(|c| c.scope() == ServiceScope::Request)
            .filter(|c| now.saturating_sub(c.last_touched_time()) > timeout)
            .map(|c| c.key().clone())
            .collect();
        for id in &expired {
            debug!(service_group_context = %id, "Expiring idle service group context");
            self.remove_service_group_context(id);
        }
        expired.len()
    }

    /// Registers an operation context under a correlation key.
    pub fn register_operation_context(&self, key: impl Into<String>, op: &Arc<OperationContext>) {
        let key = key.into();
        op.set_registration_key(Some(key.clone()));
        self.operation_contexts.insert(key, op.clone());
    }

    /// Looks a registered operation context up.
    #[must_use]
    pub fn find_operation_context(&self, key: &str) -> Option<Arc<OperationContext>> {
        self.operation_contexts.get(key).map(|o| o.value().clone())
    }

    /// Drops a registry entry.
    pub fn unregister_operation_context(&self, key: &str) -> Option<Arc<OperationContext>> {
        self.operation_contexts.remove(key).map(|(_, o)| o)
    }

    /// Number of registered operation contexts.
    #[must_use]
    pub fn operation_context_count(&self) -> usize {
        self.operation_contexts.len()
    }
}

impl Context for ConfigurationContext {
    fn core(&self) -> &ContextCore {
        &self.core
    }

    fn parent(&self) -> Option<ContextRef> {
        None
    }
}

impl fmt::Debug for ConfigurationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationContext")
            .field("id", &self.core.id())
            .field("nodes", &self.nodes.len())
            .field("operation_contexts", &self.operation_contexts.len())
            .finish_non_exhaustive()
    }
}
