//! Service group contexts.

use super::{ConfigurationContext, Context, ContextCore, ContextRef, ServiceContext};
use crate::description::{AxisService, ServiceScope};
use dashmap::DashMap;
use std::sync::Arc;

/// Runtime state shared by the services of one group.
#[derive(Debug)]
pub struct ServiceGroupContext {
    core: ContextCore,
    id: String,
    group_name: String,
    scope: ServiceScope,
    service_contexts: DashMap<String, Arc<ServiceContext>>,
}

impl ServiceGroupContext {
    /// Creates a group context under `root`. The caller registers it.
    #[must_use]
    pub fn new(root: &Arc<ConfigurationContext>, group_name: &str, scope: ServiceScope) -> Arc<Self> {
        Self::with_id(root, crate::utils::generate_uuid().to_string(), group_name, scope)
    }

    /// Creates a group context with a known id, as when reactivating.
    #[must_use]
    pub fn with_id(
        root: &Arc<ConfigurationContext>,
        id: String,
        group_name: &str,
        scope: ServiceScope,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: ContextCore::with_parent(root.id(), root),
            id,
            group_name: group_name.to_string(),
            scope,
            service_contexts: DashMap::new(),
        })
    }

    /// Returns the string id that messages refer to.
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.id
    }

    /// Returns the described group's name.
    #[must_use]
    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    /// Returns the scope the group was created for.
    #[must_use]
    pub fn scope(&self) -> ServiceScope {
        self.scope
    }

    /// Finds or creates the context for `service`.
    pub fn service_context_for(self: &Arc<Self>, service: &AxisService) -> Arc<ServiceContext> {
        self.touch();
        if let Some(existing) = self.find_service_context(service.name()) {
            return existing;
        }
        let ctx = ServiceContext::new(self, service.name());
        self.service_contexts
            .insert(service.name().to_string(), ctx.clone());
        if let Some(root) = self.core.root() {
            root.register_node(ContextRef::Service(ctx.clone()));
        }
        ctx
    }

    /// Looks a service context up by service name.
    #[must_use]
    pub fn find_service_context(&self, service_name: &str) -> Option<Arc<ServiceContext>> {
        self.service_contexts
            .get(service_name)
            .map(|c| c.value().clone())
    }

    /// All service contexts of this group.
    #[must_use]
    pub fn service_contexts(&self) -> Vec<Arc<ServiceContext>> {
        self.service_contexts
            .iter()
            .map(|c| c.value().clone())
            .collect()
    }
}

impl Context for ServiceGroupContext {
    fn core(&self) -> &ContextCore {
        &self.core
    }
}
