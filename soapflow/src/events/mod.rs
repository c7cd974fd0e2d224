//! Engine lifecycle events.
//!
//! Sinks are owned by the configuration context rather than installed
//! globally, so several engines can run in one process with separate sinks.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the engine.
pub mod event_types {
    /// A receive or send flow began.
    pub const FLOW_STARTED: &str = "flow.started";
    /// A handler suspended the message.
    pub const FLOW_SUSPENDED: &str = "flow.suspended";
    /// A suspended message was resumed.
    pub const FLOW_RESUMED: &str = "flow.resumed";
    /// A handler aborted the flow.
    pub const FLOW_ABORTED: &str = "flow.aborted";
    /// A flow ran to the end.
    pub const FLOW_COMPLETED: &str = "flow.completed";
    /// A flow stopped on an error.
    pub const FLOW_FAILED: &str = "flow.failed";
    /// A message read from a stream was re-attached to the engine.
    pub const MESSAGE_ACTIVATED: &str = "message.activated";
    /// An operation context received every message its pattern requires.
    pub const OPERATION_COMPLETED: &str = "operation.completed";
}
