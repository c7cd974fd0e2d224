//! Handler execution.
//!
//! This module provides:
//! - The [`Handler`] trait and opt-in [`SelfManagedDataManager`] persistence
//! - [`Phase`], a named handler group with pre/post conditions
//! - Dispatch of inbound messages to services and operations
//! - Message receivers and the transport sender seam
//! - [`AxisEngine`], which drives the execution cursor

mod axis_engine;
mod dispatch;
#[cfg(test)]
mod engine_tests;
mod handler;
mod phase;
mod receiver;
mod transport;

pub use axis_engine::AxisEngine;
pub use dispatch::{ActionDispatcher, DispatchPhaseCheck};
pub use handler::{Handler, SelfManagedDataManager};
pub use phase::{Phase, PhaseCondition};
pub use receiver::{
    create_fault_message_context, create_out_message_context, InOnlyFnReceiver, InOutFnReceiver,
    MessageReceiver,
};
pub use transport::TransportSender;
