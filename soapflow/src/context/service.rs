//! Service contexts.

use super::{Context, ContextCore, ContextRef, OperationContext, ServiceGroupContext};
use crate::description::AxisOperation;
use std::sync::Arc;

/// Runtime state of one service inside a service group context.
#[derive(Debug)]
pub struct ServiceContext {
    core: ContextCore,
    service_name: String,
    service_context_id: String,
    group_context_id: String,
}

impl ServiceContext {
    pub(crate) fn new(group: &Arc<ServiceGroupContext>, service_name: &str) -> Arc<Self> {
        let core = ContextCore::new();
        core.set_parent_id(Some(Context::id(group.as_ref())));
        if let Some(root) = group.core().root() {
            core.set_root(&root);
        }
        Arc::new(Self {
            core,
            service_name: service_name.to_string(),
            service_context_id: crate::utils::generate_uuid().to_string(),
            group_context_id: group.group_id().to_string(),
        })
    }

    /// Returns the described service's name.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Returns the id messages persist to find this context again.
    #[must_use]
    pub fn service_context_id(&self) -> &str {
        &self.service_context_id
    }

    /// Returns the owning group context's id.
    #[must_use]
    pub fn group_context_id(&self) -> &str {
        &self.group_context_id
    }

    /// Resolves the owning group context through the arena.
    #[must_use]
    pub fn service_group_context(&self) -> Option<Arc<ServiceGroupContext>> {
        match self.parent()? {
            ContextRef::ServiceGroup(group) => Some(group),
            _ => None,
        }
    }

    /// Creates and registers a fresh operation context for `operation`.
    #[must_use]
    pub fn create_operation_context(self: &Arc<Self>, operation: &AxisOperation) -> Arc<OperationContext> {
        self.touch();
        let op = Arc::new(OperationContext::new(
            operation.name().clone(),
            self.service_name.clone(),
            operation.mep(),
        ));
        op.core().set_parent_id(Some(self.id()));
        if let Some(root) = self.core.root() {
            op.core().set_root(&root);
            root.register_node(ContextRef::Operation(op.clone()));
        }
        op
    }
}

impl Context for ServiceContext {
    fn core(&self) -> &ContextCore {
        &self.core
    }
}
