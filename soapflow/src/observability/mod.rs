//! Observability utilities.
//!
//! - [`init_tracing`] installs the process-wide `tracing` subscriber
//! - [`FlowSpanAttributes`] and [`SpanTimer`] describe one pass of a message
//!   through a flow; the engine attaches them to its lifecycle events

mod spans;
mod subscriber;

pub use spans::{FlowSpanAttributes, SpanTimer};
pub use subscriber::init_tracing;
