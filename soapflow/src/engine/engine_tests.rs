//! Flow scenarios against the deployed echo service.

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::context::Context;
    use crate::core::{Flow, InvocationResponse, Mep, MessageLabel, QName};
    use crate::description::{
        global_phases, operation_phases, AxisOperation, AxisService, ModuleDescription, ServiceScope,
    };
    use crate::engine::*;
    use crate::errors::SoapflowError;
    use crate::events::event_types;
    use crate::message::{
        property_names, EndpointReference, MessageContext, RelatesTo, SoapEnvelope, SoapHeaderBlock,
    };
    use crate::testing::{
        EngineFixture, FailingHandler, Journal, RecordingHandler, SuspendingHandler, ECHO_ACTION,
        NOTIFY_ACTION, QUERY_ACTION,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn add_must_understand_header(msg: &MessageContext) {
        let envelope = msg.envelope().unwrap();
        envelope
            .write()
            .headers_mut()
            .push(SoapHeaderBlock::new("{urn:sec}Token", json!("t")).must_understand());
    }

    fn deploy_counter(fixture: &EngineFixture) {
        let count = AxisOperation::new("count", Mep::InOnly)
            .with_action("urn:count")
            .with_receiver(Arc::new(InOnlyFnReceiver::new(|msg| {
                let service = msg
                    .service_context()
                    .ok_or_else(|| SoapflowError::Internal("no service context".into()))?;
                let hits = service.get_property("hits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
                service.set_property("hits", json!(hits));
                Ok(())
            })));
        fixture
            .axis_configuration
            .add_service(
                AxisService::new("Counter")
                    .with_scope(ServiceScope::Application)
                    .with_operation(count),
            )
            .unwrap();
    }

    fn deploy_optional_patterns(fixture: &EngineFixture) {
        let ping = AxisOperation::new("ping", Mep::RobustInOnly)
            .with_action("urn:ping")
            .with_receiver(Arc::new(InOnlyFnReceiver::new(|msg| {
                if msg.get_property("reject").is_some() {
                    return Err(SoapflowError::Dispatch("ping rejected".into()));
                }
                Ok(())
            })));
        let maybe = AxisOperation::new("maybe", Mep::InOptionalOut)
            .with_action("urn:maybe")
            .with_receiver(Arc::new(InOnlyFnReceiver::new(|_| Ok(()))));
        let maybe_reply = AxisOperation::new("maybeReply", Mep::InOptionalOut)
            .with_action("urn:maybe-reply")
            .with_receiver(Arc::new(InOutFnReceiver::new(|msg| {
                Ok(SoapEnvelope::new(msg.soap_version()).with_body_element("{urn:opt}reply", json!({})))
            })));
        fixture
            .axis_configuration
            .add_service(
                AxisService::new("Optional")
                    .with_operation(ping)
                    .with_operation(maybe)
                    .with_operation(maybe_reply),
            )
            .unwrap();
    }

    fn optional_request(fixture: &EngineFixture, action: &str) -> Arc<MessageContext> {
        let msg = fixture.request(action);
        msg.set_to(Some(EndpointReference::new("http://localhost:8080/services/Optional")));
        msg
    }

    fn assert_nothing_retained(fixture: &EngineFixture) {
        assert_eq!(fixture.config_context.operation_context_count(), 0);
        assert!(fixture.config_context.service_group_contexts().is_empty());
        assert_eq!(fixture.config_context.node_count(), 0);
    }

    fn counter_request(fixture: &EngineFixture) -> Arc<MessageContext> {
        let msg = fixture.request("urn:count");
        msg.set_to(Some(EndpointReference::new("http://localhost:8080/services/Counter")));
        msg
    }

    #[tokio::test]
    async fn test_echo_request_is_answered() {
        let fixture = EngineFixture::echo();
        let request = fixture.request(ECHO_ACTION);

        let response = fixture.engine().receive(&request).await.unwrap();

        assert_eq!(response, InvocationResponse::Continue);
        assert_eq!(fixture.sender.sent_count(), 1);
        let reply = fixture.sender.last_envelope().unwrap();
        assert_eq!(reply.first_body_element(), Some(&QName::new("urn:echo", "echoResponse")));
        assert_eq!(reply.body()[0].content, json!({"text": "hello"}));

        let op = request.operation_context().unwrap();
        assert!(op.is_complete());
        assert!(op.is_cleaned_up());
        assert_eq!(fixture.config_context.operation_context_count(), 0);
        assert_eq!(
            fixture.events.events_of_type(event_types::FLOW_COMPLETED).len(),
            2,
            "request and response flows both complete"
        );
    }

    #[tokio::test]
    async fn test_response_correlates_with_request() {
        let fixture = EngineFixture::echo();
        let request = fixture.request(ECHO_ACTION);
        fixture.engine().receive(&request).await.unwrap();

        let ids = fixture.sender.sent_message_ids();
        assert_eq!(ids.len(), 1);
        assert_ne!(ids[0], request.message_id());
    }

    #[tokio::test]
    async fn test_one_way_request() {
        let fixture = EngineFixture::echo();
        let msg = fixture.request(NOTIFY_ACTION);

        fixture.engine().receive(&msg).await.unwrap();

        assert_eq!(msg.get_property("notified"), Some(json!(true)));
        assert_eq!(fixture.sender.sent_count(), 0);
        assert!(msg.operation_context().unwrap().is_cleaned_up());
    }

    #[tokio::test]
    async fn test_suspend_then_resume() {
        let fixture = EngineFixture::echo();
        let approval = Arc::new(SuspendingHandler::new("approval", 1));
        fixture.add_operation_handler("echo", Flow::In, approval.clone());
        let msg = fixture.request(ECHO_ACTION);

        let first = fixture.engine().receive(&msg).await.unwrap();
        assert_eq!(first, InvocationResponse::Suspend);
        assert!(msg.is_paused());
        assert_eq!(fixture.sender.sent_count(), 0);
        let suspended_at = msg.current_handler_index();

        let second = fixture.engine().resume(&msg).await.unwrap();
        assert_eq!(second, InvocationResponse::Continue);
        assert!(!msg.is_paused());
        assert_eq!(approval.invocations(), 2);
        assert_eq!(msg.current_handler_index(), suspended_at + 1);
        assert_eq!(fixture.sender.sent_count(), 1);

        let types = fixture.events.event_types();
        let position = |t: &str| types.iter().position(|e| e == t).unwrap();
        assert!(position(event_types::FLOW_SUSPENDED) < position(event_types::FLOW_RESUMED));
    }

    #[tokio::test]
    async fn test_failure_completes_executed_units_in_reverse() {
        let fixture = EngineFixture::echo();
        let journal = Journal::default();
        fixture.add_global_handler(
            Flow::In,
            global_phases::PRE_DISPATCH,
            Arc::new(RecordingHandler::new("outer").with_journal(journal.clone())),
        );
        fixture.add_operation_handler(
            "echo",
            Flow::In,
            Arc::new(RecordingHandler::new("inner").with_journal(journal.clone())),
        );
        let failing = Arc::new(FailingHandler::new("broken", "boom"));
        fixture.add_operation_handler("echo", Flow::In, failing.clone());
        let msg = fixture.request(ECHO_ACTION);

        let err = fixture.engine().receive(&msg).await.unwrap_err();

        assert!(matches!(err, SoapflowError::Internal(ref m) if m == "boom"));
        assert_eq!(msg.failure_reason(), Some(err.to_string()));
        assert_eq!(
            journal.lock().clone(),
            ["invoke:outer", "invoke:inner", "complete:inner", "complete:outer"]
        );
        assert_eq!(failing.completions(), 0);
        assert!(msg.executed_phases().is_empty());
        let failed = fixture.events.events_of_type(event_types::FLOW_FAILED);
        assert_eq!(failed.len(), 1);
        assert_eq!(fixture.sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_abort_stops_the_flow() {
        let fixture = EngineFixture::echo();
        let gate = Arc::new(RecordingHandler::new("gate").with_response(InvocationResponse::Abort));
        let after = Arc::new(RecordingHandler::new("after"));
        fixture.add_operation_handler("echo", Flow::In, gate.clone());
        fixture.add_operation_handler("echo", Flow::In, after.clone());

        let msg = fixture.request(ECHO_ACTION);
        let response = fixture.engine().receive(&msg).await.unwrap();

        assert_eq!(response, InvocationResponse::Abort);
        assert_eq!(gate.invocations(), 1);
        assert_eq!(after.invocations(), 0);
        assert_eq!(fixture.sender.sent_count(), 0);
        assert_eq!(fixture.events.events_of_type(event_types::FLOW_ABORTED).len(), 1);
    }

    #[tokio::test]
    async fn test_unprocessed_must_understand_header_faults() {
        let fixture = EngineFixture::echo();
        let msg = fixture.request(ECHO_ACTION);
        add_must_understand_header(&msg);

        let err = fixture.engine().receive(&msg).await.unwrap_err();

        let SoapflowError::Fault(fault) = err else {
            panic!("expected a fault, got {err:?}");
        };
        assert_eq!(fault.header, Some(QName::new("urn:sec", "Token")));
        assert_eq!(fixture.sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_processed_header_passes() {
        let fixture = EngineFixture::echo();
        let msg = fixture.request(ECHO_ACTION);
        add_must_understand_header(&msg);
        msg.envelope()
            .unwrap()
            .write()
            .mark_processed(&QName::new("urn:sec", "Token"));

        fixture.engine().receive(&msg).await.unwrap();

        assert_eq!(fixture.sender.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_deferring_receiver_gets_unprocessed_headers() {
        let fixture = EngineFixture::echo();
        let log = AxisOperation::new("log", Mep::InOnly)
            .with_action("urn:log")
            .with_receiver(Arc::new(InOnlyFnReceiver::new(|_| Ok(())).deferring_must_understand()));
        fixture
            .axis_configuration
            .add_service(AxisService::new("Audit").with_operation(log))
            .unwrap();
        let msg = fixture.request("urn:log");
        msg.set_to(Some(EndpointReference::new("http://localhost:8080/services/Audit")));
        add_must_understand_header(&msg);

        fixture.engine().receive(&msg).await.unwrap();

        assert_eq!(
            msg.get_property(property_names::UNPROCESSED_HEADER_QNAMES),
            Some(json!(["{urn:sec}Token"]))
        );
    }

    #[tokio::test]
    async fn test_reply_joins_client_exchange() {
        let fixture = EngineFixture::echo();
        let (op_ctx, request) = fixture.client_exchange();
        let reply = fixture.request(QUERY_ACTION);
        reply.set_server_side(false);
        reply.add_relates_to(RelatesTo::reply(request.message_id().unwrap()));

        fixture.engine().receive(&reply).await.unwrap();

        assert!(Arc::ptr_eq(&reply.operation_context().unwrap(), &op_ctx));
        assert!(op_ctx.is_complete());
        assert!(op_ctx.is_cleaned_up());
        assert_eq!(fixture.config_context.operation_context_count(), 0);
    }

    #[tokio::test]
    async fn test_fault_response_goes_through_out_fault_flow() {
        let fixture = EngineFixture::echo();
        let request = fixture.bound_message();
        let observer = Arc::new(RecordingHandler::new("fault-observer"));
        fixture.add_operation_handler("echo", Flow::OutFault, observer.clone());
        let error = SoapflowError::Dispatch("no such customer".into());

        let fault = create_fault_message_context(&request, &error).unwrap();
        assert!(fault.is_processing_fault());
        assert_eq!(fault.relates_to().unwrap().value, request.message_id().unwrap());
        assert_eq!(fault.message_label(), MessageLabel::Fault);

        fixture.engine().send_fault(&fault).await.unwrap();

        assert_eq!(observer.invocations(), 1);
        let sent = fixture.sender.last_envelope().unwrap();
        assert!(sent.has_fault());
        assert!(sent.fault().unwrap().reason.contains("no such customer"));
        assert!(request.operation_context().unwrap().is_cleaned_up());
    }

    #[tokio::test]
    async fn test_out_message_context_addresses_reply_to() {
        let fixture = EngineFixture::echo();
        let request = fixture.bound_message();

        let response = create_out_message_context(&request).unwrap();

        assert!(response.to().unwrap().is_anonymous());
        assert_eq!(response.relates_to().unwrap().value, request.message_id().unwrap());
        assert_ne!(response.message_id(), request.message_id());
        assert!(Arc::ptr_eq(
            &response.operation_context().unwrap(),
            &request.operation_context().unwrap()
        ));
        assert!(Arc::ptr_eq(
            &response.service_context().unwrap(),
            &request.service_context().unwrap()
        ));
    }

    #[tokio::test]
    async fn test_application_scope_shares_service_state() {
        let fixture = EngineFixture::echo();
        deploy_counter(&fixture);
        let first = counter_request(&fixture);
        let second = counter_request(&fixture);

        fixture.engine().receive(&first).await.unwrap();
        fixture.engine().receive(&second).await.unwrap();

        assert!(Arc::ptr_eq(
            &first.service_group_context().unwrap(),
            &second.service_group_context().unwrap()
        ));
        assert_eq!(second.get_property("hits"), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_request_scope_gets_fresh_contexts() {
        let fixture = EngineFixture::echo();
        let first = fixture.request(NOTIFY_ACTION);
        let second = fixture.request(NOTIFY_ACTION);

        fixture.engine().receive(&first).await.unwrap();
        fixture.engine().receive(&second).await.unwrap();

        assert_ne!(first.service_group_context_id(), second.service_group_context_id());
    }

    #[tokio::test]
    async fn test_idle_request_scoped_groups_expire() {
        let fixture =
            EngineFixture::with_config(EngineConfig::new().with_service_group_timeout(Duration::from_secs(60)));
        deploy_counter(&fixture);
        let request_scoped = fixture.bound_message();
        let application_scoped = counter_request(&fixture);
        fixture.engine().receive(&application_scoped).await.unwrap();
        for group in fixture.config_context.service_group_contexts() {
            group.set_last_touched_time(0);
        }

        assert_eq!(fixture.config_context.cleanup_service_group_contexts(), 1);

        let expired = request_scoped.service_group_context_id().unwrap();
        let kept = application_scoped.service_group_context_id().unwrap();
        assert!(fixture.config_context.get_service_group_context(&expired).is_none());
        assert!(fixture.config_context.get_service_group_context(&kept).is_some());
    }

    #[tokio::test]
    async fn test_completed_request_scoped_exchanges_release_their_contexts() {
        let fixture = EngineFixture::echo();
        for _ in 0..5 {
            fixture.engine().receive(&fixture.request(ECHO_ACTION)).await.unwrap();
            fixture.engine().receive(&fixture.request(NOTIFY_ACTION)).await.unwrap();
        }

        assert_eq!(fixture.sender.sent_count(), 5);
        assert_nothing_retained(&fixture);
    }

    #[tokio::test]
    async fn test_suspended_exchange_keeps_its_group() {
        let fixture = EngineFixture::echo();
        fixture.add_operation_handler("echo", Flow::In, Arc::new(SuspendingHandler::new("hold", 1)));
        let held = fixture.request(ECHO_ACTION);
        assert_eq!(fixture.engine().receive(&held).await.unwrap(), InvocationResponse::Suspend);
        fixture.engine().receive(&fixture.request(NOTIFY_ACTION)).await.unwrap();

        let groups = fixture.config_context.service_group_contexts();
        assert_eq!(groups.len(), 1);
        assert_eq!(Some(groups[0].group_id().to_string()), held.service_group_context_id());

        fixture.engine().resume(&held).await.unwrap();
        assert_nothing_retained(&fixture);
    }

    #[tokio::test]
    async fn test_robust_in_only_without_fault_is_settled() {
        let fixture = EngineFixture::echo();
        deploy_optional_patterns(&fixture);
        let msg = optional_request(&fixture, "urn:ping");

        fixture.engine().receive(&msg).await.unwrap();

        let op = msg.operation_context().unwrap();
        assert_eq!(op.mep(), Mep::RobustInOnly);
        assert!(op.is_complete());
        assert!(op.is_cleaned_up());
        assert_eq!(fixture.sender.sent_count(), 0);
        assert_nothing_retained(&fixture);
    }

    #[tokio::test]
    async fn test_robust_in_only_failure_takes_the_fault() {
        let fixture = EngineFixture::echo();
        deploy_optional_patterns(&fixture);
        let msg = optional_request(&fixture, "urn:ping");
        msg.set_property("reject", json!(true));

        let err = fixture.engine().receive(&msg).await.unwrap_err();
        let op = msg.operation_context().unwrap();
        assert!(!op.is_complete(), "the exchange waits for the fault");

        let fault = create_fault_message_context(&msg, &err).unwrap();
        assert!(Arc::ptr_eq(&op.get_message_context(MessageLabel::Fault).unwrap(), &fault));
        assert!(op.is_complete());
        fixture.engine().send_fault(&fault).await.unwrap();

        assert!(fixture.sender.last_envelope().unwrap().has_fault());
        assert!(op.is_cleaned_up());
        assert_nothing_retained(&fixture);
    }

    #[tokio::test]
    async fn test_optional_reply_not_sent_settles_the_exchange() {
        let fixture = EngineFixture::echo();
        deploy_optional_patterns(&fixture);
        let msg = optional_request(&fixture, "urn:maybe");

        fixture.engine().receive(&msg).await.unwrap();

        let op = msg.operation_context().unwrap();
        assert_eq!(op.mep(), Mep::InOptionalOut);
        assert!(op.is_complete());
        assert!(op.is_cleaned_up());
        assert_eq!(fixture.sender.sent_count(), 0);
        assert_nothing_retained(&fixture);
    }

    #[tokio::test]
    async fn test_optional_reply_sent_completes_the_exchange() {
        let fixture = EngineFixture::echo();
        deploy_optional_patterns(&fixture);
        let msg = optional_request(&fixture, "urn:maybe-reply");

        fixture.engine().receive(&msg).await.unwrap();

        assert_eq!(fixture.sender.sent_count(), 1);
        let reply = fixture.sender.last_envelope().unwrap();
        assert_eq!(reply.first_body_element(), Some(&QName::new("urn:opt", "reply")));
        assert!(msg.operation_context().unwrap().is_cleaned_up());
        assert_eq!(
            fixture.events.events_of_type(event_types::OPERATION_COMPLETED).len(),
            1
        );
        assert_nothing_retained(&fixture);
    }

    #[tokio::test]
    async fn test_engaged_module_handlers_run() {
        let fixture = EngineFixture::echo();
        let inbound = Arc::new(RecordingHandler::new("audit-in"));
        let outbound = Arc::new(RecordingHandler::new("audit-out"));
        fixture.axis_configuration.add_module(
            ModuleDescription::new("audit")
                .with_handler(Flow::In, global_phases::PRE_DISPATCH, inbound.clone())
                .with_handler(Flow::Out, operation_phases::OUT, outbound.clone()),
        );

        fixture.axis_configuration.engage_module("audit").unwrap();
        fixture.axis_configuration.engage_module("audit").unwrap();
        fixture.engine().receive(&fixture.request(ECHO_ACTION)).await.unwrap();

        assert!(fixture.axis_configuration.is_engaged("audit"));
        assert_eq!(inbound.invocations(), 1);
        assert_eq!(outbound.invocations(), 1);
    }

    #[test]
    fn test_module_with_unknown_phase_is_rejected() {
        let fixture = EngineFixture::echo();
        fixture.axis_configuration.add_module(
            ModuleDescription::new("broken").with_handler(
                Flow::In,
                "Nowhere",
                Arc::new(RecordingHandler::new("lost")),
            ),
        );

        assert!(fixture.axis_configuration.engage_module("broken").is_err());
        assert!(!fixture.axis_configuration.is_engaged("broken"));
        assert!(fixture.axis_configuration.engage_module("missing").is_err());
    }

    #[tokio::test]
    async fn test_suspended_response_keeps_exchange_alive() {
        let fixture = EngineFixture::echo();
        let hold = Arc::new(SuspendingHandler::new("hold", 1));
        fixture.add_operation_handler("echo", Flow::Out, hold.clone());
        let request = fixture.request(ECHO_ACTION);

        fixture.engine().receive(&request).await.unwrap();

        let op = request.operation_context().unwrap();
        assert!(op.is_complete());
        assert!(!op.is_cleaned_up());
        let response = op.get_message_context(MessageLabel::Out).unwrap();
        assert!(response.is_paused());
        assert_eq!(fixture.sender.sent_count(), 0);

        fixture.engine().resume(&response).await.unwrap();
        assert_eq!(fixture.sender.sent_count(), 1);
        assert!(op.is_cleaned_up());
    }

    #[tokio::test]
    async fn test_continuations_resume_concurrently() {
        let fixture = EngineFixture::echo();
        fixture.add_operation_handler("echo", Flow::In, Arc::new(SuspendingHandler::new("batch", 2)));
        let mut continuations = Vec::new();
        for _ in 0..2 {
            let msg = fixture.request(ECHO_ACTION);
            assert_eq!(fixture.engine().receive(&msg).await.unwrap(), InvocationResponse::Suspend);
            continuations.push(crate::persistence::Continuation::capture(&msg).unwrap());
        }

        let results = fixture.engine().resume_all(&continuations).await;

        assert_eq!(results.len(), 2);
        for (result, continuation) in results.iter().zip(&continuations) {
            let (msg, response) = result.as_ref().unwrap();
            assert_eq!(*response, InvocationResponse::Continue);
            assert_eq!(msg.log_correlation_id(), continuation.log_correlation_id());
        }
        assert_eq!(fixture.sender.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_endpoint_fails_dispatch() {
        let fixture = EngineFixture::echo();
        let msg = fixture.request(ECHO_ACTION);
        msg.set_to(Some(EndpointReference::new("http://localhost:8080/services/Missing")));

        let err = fixture.engine().receive(&msg).await.unwrap_err();

        assert!(matches!(err, SoapflowError::Dispatch(_)));
        assert!(msg.failure_reason().is_some());
    }
}
