//! Messages and their per-message state.
//!
//! This module provides:
//! - A structural SOAP envelope model with shared attachments
//! - Addressing options
//! - The [`ExecutionTracker`] cursor over a message's handler chain
//! - [`MessageContext`], the unit of work flowing through the engine

mod envelope;
mod listener;
mod message_context;
mod options;
mod tracker;

pub use envelope::{
    Attachment, Attachments, BodyElement, SharedEnvelope, SoapEnvelope, SoapHeaderBlock,
    ACTOR_NEXT, ROLE_NEXT, ROLE_ULTIMATE_RECEIVER,
};
pub use listener::MessageContextListener;
#[cfg(test)]
pub use listener::MockMessageContextListener;
pub use message_context::{property_names, MessageContext, MessageFlags};
pub use options::{
    EndpointReference, Options, RelatesTo, ANONYMOUS_ADDRESS, NONE_ADDRESS, RELATIONSHIP_REPLY,
};
pub use tracker::{flatten_handlers, ExecutionTracker};
