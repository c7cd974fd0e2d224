//! Tests for the context hierarchy.

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::context::{
        ConfigurationContext, Context, ContextId, ContextRef, OperationContext, PropertyDifference,
        ServiceGroupContext,
    };
    use crate::core::{Mep, QName};
    use crate::description::{AxisConfiguration, ServiceScope};
    use crate::errors::SoapflowError;
    use crate::message::MessageContext;
    use crate::testing::{EngineFixture, ECHO_ACTION};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn root() -> Arc<ConfigurationContext> {
        ConfigurationContext::new(Arc::new(AxisConfiguration::new()), EngineConfig::default())
    }

    #[test]
    fn test_context_ids_are_unique() {
        let a = ContextId::next();
        let b = ContextId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_nearest_scope_wins() {
        let fixture = EngineFixture::echo();
        let msg = fixture.bound_message();
        let op = msg.operation_context().unwrap();
        let service = msg.service_context().unwrap();
        let group = msg.service_group_context().unwrap();

        fixture.config_context.set_property("level", json!("configuration"));
        group.set_property("level", json!("group"));
        service.set_property("level", json!("service"));
        assert_eq!(msg.get_property("level"), Some(json!("service")));

        op.set_property("level", json!("operation"));
        assert_eq!(msg.get_property("level"), Some(json!("operation")));

        msg.set_property("level", json!("message"));
        assert_eq!(msg.get_property("level"), Some(json!("message")));
        assert_eq!(service.get_property("level"), Some(json!("service")));
    }

    #[test]
    fn test_lookup_reaches_the_root() {
        let fixture = EngineFixture::echo();
        let msg = fixture.bound_message();
        fixture.config_context.set_property("region", json!("eu"));

        assert_eq!(msg.get_property("region"), Some(json!("eu")));
        assert_eq!(msg.get_local_property("region"), None);
        assert_eq!(msg.get_property("absent"), None);
    }

    #[test]
    fn test_options_properties_are_visible() {
        let fixture = EngineFixture::echo();
        let msg = fixture.request(ECHO_ACTION);
        msg.update_options(|o| {
            o.properties.insert("timeout".into(), json!(5));
        });

        assert_eq!(msg.get_property("timeout"), Some(json!(5)));
    }

    #[test]
    fn test_merged_properties_prefer_nearer_scopes() {
        let fixture = EngineFixture::echo();
        let msg = fixture.bound_message();
        fixture.config_context.set_property("shared", json!(1));
        fixture.config_context.set_property("root-only", json!(true));
        msg.service_context().unwrap().set_property("shared", json!(2));

        let merged = msg.get_properties();

        assert_eq!(merged.get("shared"), Some(&json!(2)));
        assert_eq!(merged.get("root-only"), Some(&json!(true)));
    }

    #[test]
    fn test_parent_links_resolve_through_the_arena() {
        let fixture = EngineFixture::echo();
        let msg = fixture.bound_message();
        let op = msg.operation_context().unwrap();
        let service = msg.service_context().unwrap();
        let group = msg.service_group_context().unwrap();

        assert_eq!(op.parent().map(|p| p.id()), Some(service.id()));
        assert_eq!(service.parent().map(|p| p.id()), Some(group.id()));
        assert_eq!(group.parent().map(|p| p.id()), Some(fixture.config_context.id()));
        assert!(op.is_ancestor(fixture.config_context.id()));
        assert!(!group.is_ancestor(op.id()));
        assert!(Arc::ptr_eq(&op.service_context().unwrap(), &service));
    }

    #[test]
    fn test_property_changes_are_recorded() {
        let ctx = root();
        ctx.set_property("a", json!(1));
        ctx.set_property("b", json!(2));
        ctx.remove_property("b");
        ctx.set_non_replicable_property("local", json!(true));

        let diffs = ctx.property_differences();
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs.get("a"), Some(&PropertyDifference::Set(json!(1))));
        assert_eq!(diffs.get("b"), Some(&PropertyDifference::Removed));

        ctx.clear_property_differences();
        assert!(ctx.property_differences().is_empty());
        assert_eq!(ctx.get_local_property("local"), Some(json!(true)));
    }

    #[test]
    fn test_touch_moves_last_touched_forward() {
        let ctx = root();
        ctx.set_last_touched_time(0);
        ctx.touch();
        assert!(ctx.last_touched_time() > 0);
    }

    #[test]
    fn test_application_group_is_shared() {
        let fixture = EngineFixture::echo();
        let service = fixture.service();
        let group = fixture
            .axis_configuration
            .get_service_group(service.group_name())
            .unwrap();

        let first = fixture
            .config_context
            .service_group_context_for(&group, ServiceScope::Application);
        let second = fixture
            .config_context
            .service_group_context_for(&group, ServiceScope::Application);
        let request = fixture
            .config_context
            .service_group_context_for(&group, ServiceScope::Request);

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &request));
        assert_eq!(fixture.config_context.service_group_contexts().len(), 2);
    }

    #[test]
    fn test_service_context_is_reused_within_group() {
        let fixture = EngineFixture::echo();
        let service = fixture.service();
        let group = fixture
            .axis_configuration
            .get_service_group(service.group_name())
            .unwrap();
        let group_ctx = fixture
            .config_context
            .service_group_context_for(&group, ServiceScope::Request);

        let first = group_ctx.service_context_for(&service);
        let second = group_ctx.service_context_for(&service);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.group_context_id(), group_ctx.group_id());
        assert!(fixture.config_context.node(first.id()).is_some());
    }

    #[test]
    fn test_removing_a_group_drops_its_nodes() {
        let fixture = EngineFixture::echo();
        let msg = fixture.bound_message();
        let group = msg.service_group_context().unwrap();
        let service = msg.service_context().unwrap();

        let removed = fixture
            .config_context
            .remove_service_group_context(group.group_id())
            .unwrap();

        assert!(Arc::ptr_eq(&removed, &group));
        assert!(fixture.config_context.node(group.id()).is_none());
        assert!(fixture.config_context.node(service.id()).is_none());
        assert!(fixture
            .config_context
            .get_service_group_context(group.group_id())
            .is_none());
    }

    #[test]
    fn test_request_group_is_released_with_its_last_exchange() {
        let fixture = EngineFixture::echo();
        let service = fixture.service();
        let group = fixture
            .axis_configuration
            .get_service_group(service.group_name())
            .unwrap();
        let group_ctx = fixture
            .config_context
            .service_group_context_for(&group, ServiceScope::Request);
        let service_ctx = group_ctx.service_context_for(&service);
        let first = service_ctx.create_operation_context(&fixture.operation("notify"));
        let second = service_ctx.create_operation_context(&fixture.operation("notify"));

        assert!(first.cleanup());
        assert!(fixture
            .config_context
            .get_service_group_context(group_ctx.group_id())
            .is_some());

        assert!(second.cleanup());
        assert!(fixture
            .config_context
            .get_service_group_context(group_ctx.group_id())
            .is_none());
        assert_eq!(fixture.config_context.node_count(), 0);
    }

    #[test]
    fn test_application_group_outlives_its_exchanges() {
        let fixture = EngineFixture::echo();
        let service = fixture.service();
        let group = fixture
            .axis_configuration
            .get_service_group(service.group_name())
            .unwrap();
        let group_ctx = fixture
            .config_context
            .service_group_context_for(&group, ServiceScope::Application);
        let op = group_ctx
            .service_context_for(&service)
            .create_operation_context(&fixture.operation("notify"));

        assert!(op.cleanup());

        assert!(!fixture.config_context.release_request_scoped_group(&group_ctx));
        assert_eq!(fixture.config_context.service_group_contexts().len(), 1);
        assert_eq!(fixture.config_context.node_count(), 2);
    }

    #[test]
    fn test_group_with_known_id_is_registered() {
        let ctx = root();
        let group = ServiceGroupContext::with_id(&ctx, "group-1".into(), "Echo", ServiceScope::Request);

        ctx.add_service_group_context(&group);

        assert!(Arc::ptr_eq(&ctx.get_service_group_context("group-1").unwrap(), &group));
        assert!(matches!(ctx.node(group.id()), Some(ContextRef::ServiceGroup(_))));
    }

    #[test]
    fn test_operation_registry() {
        let ctx = root();
        let op = Arc::new(OperationContext::new(QName::local("echo"), "Echo".into(), Mep::InOut));

        ctx.register_operation_context("urn:uuid:1", &op);

        assert_eq!(op.registration_key().as_deref(), Some("urn:uuid:1"));
        assert!(Arc::ptr_eq(&ctx.find_operation_context("urn:uuid:1").unwrap(), &op));
        assert!(ctx.unregister_operation_context("urn:uuid:1").is_some());
        assert_eq!(ctx.operation_context_count(), 0);
    }

    #[test]
    fn test_mismatched_operation_context_is_rejected() {
        let fixture = EngineFixture::echo();
        let bound = fixture.bound_message();
        let other = fixture.bound_message();

        let msg = fixture.request(ECHO_ACTION);
        msg.set_service_context(bound.service_context()).unwrap();
        let err = msg
            .set_operation_context(other.operation_context())
            .unwrap_err();

        assert!(matches!(err, SoapflowError::ContextConsistency(_)));
        assert!(msg.operation_context().is_none());
    }

    #[test]
    fn test_operation_context_brings_its_service() {
        let fixture = EngineFixture::echo();
        let bound = fixture.bound_message();
        let msg = fixture.request(ECHO_ACTION);

        msg.set_operation_context(bound.operation_context()).unwrap();

        assert!(Arc::ptr_eq(
            &msg.service_context().unwrap(),
            &bound.service_context().unwrap()
        ));
        assert_eq!(msg.service_group_context_id(), bound.service_group_context_id());
        assert_eq!(msg.axis_service().unwrap().name(), "Echo");
    }

    #[test]
    fn test_free_standing_message_has_no_parent() {
        let msg = MessageContext::new();
        assert!(msg.parent().is_none());
        assert_eq!(msg.get_property("anything"), None);
    }
}
