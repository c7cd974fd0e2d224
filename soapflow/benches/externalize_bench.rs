//! Benchmarks for writing and reading suspended messages.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use soapflow::config::EngineConfig;
use soapflow::context::ConfigurationContext;
use soapflow::core::{Mep, SoapVersion};
use soapflow::description::{AxisConfiguration, AxisOperation, AxisService};
use soapflow::engine::{DispatchPhaseCheck, PhaseCondition};
use soapflow::message::{EndpointReference, MessageContext, Options, SoapEnvelope};
use std::sync::Arc;

fn bound_message() -> (Arc<ConfigurationContext>, Arc<MessageContext>) {
    let axis = Arc::new(AxisConfiguration::with_default_phases());
    let echo = AxisOperation::new("echo", Mep::InOut).with_action("urn:echo");
    let service = axis.add_service(AxisService::new("Echo").with_operation(echo)).unwrap();
    let config = ConfigurationContext::new(axis, EngineConfig::default());

    let msg = config.create_message_context();
    msg.set_options(
        Options::new()
            .with_to(EndpointReference::new("http://localhost/services/Echo"))
            .with_message_id("urn:uuid:bench")
            .with_action("urn:echo"),
    );
    let envelope = SoapEnvelope::new(SoapVersion::Soap12)
        .with_body_element("{urn:echo}echo", serde_json::json!({"text": "x".repeat(512)}));
    msg.set_envelope(envelope).unwrap();
    msg.set_axis_operation(service.operation_by_local_name("echo"));
    msg.set_axis_service(Some(service));
    DispatchPhaseCheck::new().check_post_condition(&msg).unwrap();
    (config, msg)
}

fn externalize_benchmark(c: &mut Criterion) {
    let (config, msg) = bound_message();
    let bytes = msg.write_external().unwrap();

    c.bench_function("write_external", |b| {
        b.iter(|| black_box(msg.write_external().unwrap()))
    });

    c.bench_function("read_external_and_activate", |b| {
        b.iter(|| {
            let restored = MessageContext::read_external(bytes.clone()).unwrap();
            restored.activate(&config).unwrap();
            black_box(restored)
        })
    });
}

criterion_group!(benches, externalize_benchmark);
criterion_main!(benches);
