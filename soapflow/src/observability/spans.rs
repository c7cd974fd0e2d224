//! Attributes describing one pass of a message through a flow.

use crate::core::Flow;
use crate::message::MessageContext;
use crate::utils::iso_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// Attributes of a flow pass, rendered as event payloads and span fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowSpanAttributes {
    /// The flow being run.
    pub flow: Option<Flow>,
    /// The message's log correlation id.
    pub log_correlation_id: String,
    /// When the attributes were captured, RFC 3339.
    #[serde(default)]
    pub timestamp: String,
    /// The WS-Addressing message id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// The resolved service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// The resolved operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// The unit that suspended, aborted or failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    /// Duration of the pass in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Error message if the pass failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlowSpanAttributes {
    /// Captures the attributes of `msg` on `flow`.
    #[must_use]
    pub fn for_message(msg: &MessageContext, flow: Flow) -> Self {
        Self {
            flow: Some(flow),
            log_correlation_id: msg.log_correlation_id().to_string(),
            timestamp: iso_timestamp(),
            message_id: msg.message_id(),
            service: msg.axis_service().map(|s| s.name().to_string()),
            operation: msg.axis_operation().map(|o| o.name().to_string()),
            ..Self::default()
        }
    }

    /// Names the unit the pass stopped at.
    #[must_use]
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// The event payload.
    #[must_use]
    pub fn to_event_data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// OpenTelemetry-style flat attributes.
    #[must_use]
    pub fn to_otel_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("soap.log_correlation_id".to_string(), self.log_correlation_id.clone());
        if let Some(flow) = self.flow {
            attrs.insert("soap.flow".to_string(), flow.to_string());
        }
        if let Some(ref v) = self.message_id {
            attrs.insert("soap.message_id".to_string(), v.clone());
        }
        if let Some(ref v) = self.service {
            attrs.insert("service.name".to_string(), v.clone());
        }
        if let Some(ref v) = self.operation {
            attrs.insert("soap.operation".to_string(), v.clone());
        }
        if let Some(ref v) = self.handler {
            attrs.insert("soap.handler".to_string(), v.clone());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("soap.duration_ms".to_string(), v.to_string());
        }
        if let Some(ref v) = self.error {
            attrs.insert("soap.error".to_string(), v.clone());
        }
        attrs
    }
}

/// Measures a flow pass.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
}

impl SpanTimer {
    /// Starts timing.
    #[must_use]
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    /// Elapsed milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_from_message() {
        let msg = MessageContext::new();
        msg.set_message_id("urn:uuid:1");

        let attrs = FlowSpanAttributes::for_message(&msg, Flow::In)
            .with_handler("pause")
            .with_duration_ms(1.5);
        let otel = attrs.to_otel_attributes();

        assert_eq!(otel.get("soap.flow"), Some(&"in".to_string()));
        assert_eq!(otel.get("soap.message_id"), Some(&"urn:uuid:1".to_string()));
        assert_eq!(otel.get("soap.handler"), Some(&"pause".to_string()));
        assert!(!otel.contains_key("service.name"));
    }

    #[test]
    fn test_event_data_skips_missing_fields() {
        let msg = MessageContext::new();
        let data = FlowSpanAttributes::for_message(&msg, Flow::Out)
            .with_error("boom")
            .to_event_data();

        assert_eq!(data["flow"], "out");
        assert_eq!(data["error"], "boom");
        assert!(data.get("service").is_none());
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.elapsed_ms() >= 5.0);
    }
}
