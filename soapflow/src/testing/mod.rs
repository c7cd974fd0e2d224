//! Test support for code built on soapflow.
//!
//! This module provides:
//! - Handlers that record, suspend, fail or keep self-managed data
//! - A transport sender that records what it was asked to send
//! - [`EngineFixture`], a deployed echo service with its contexts

mod fixtures;
mod mocks;

pub use fixtures::{EngineFixture, ECHO_ACTION, ECHO_ENDPOINT, NOTIFY_ACTION, QUERY_ACTION};
pub use mocks::{
    FailingHandler, Journal, RecordingHandler, RecordingSender, StatefulHandler, SuspendingHandler,
};
