//! # Soapflow
//!
//! The message-processing kernel of a SOAP web-services engine.
//!
//! Soapflow provides:
//!
//! - **Context hierarchy**: configuration, service group, service and
//!   operation contexts with hierarchical property lookup
//! - **Handler/phase engine**: inbound and outbound flows driven by a
//!   resumable execution cursor
//! - **Message exchange patterns**: operation contexts that correlate
//!   requests, responses and faults
//! - **Suspend/resume**: messages externalized to a versioned byte stream and
//!   re-activated against a live engine, possibly in another process
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use soapflow::prelude::*;
//!
//! let axis = Arc::new(AxisConfiguration::with_default_phases());
//! axis.add_service(AxisService::new("Echo").with_operation(echo_operation))?;
//! let config = ConfigurationContext::new(axis, EngineConfig::default());
//!
//! let engine = AxisEngine::new(config.clone());
//! if engine.receive(&msg).await? == InvocationResponse::Suspend {
//!     store.save(&Continuation::capture(&msg)?).await?;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod core;
pub mod description;
pub mod engine;
pub mod errors;
pub mod events;
pub mod message;
pub mod observability;
pub mod persistence;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::context::{
        ConfigurationContext, Context, OperationContext, ServiceContext, ServiceGroupContext,
        SessionContext,
    };
    pub use crate::core::{Flow, InvocationResponse, Mep, MessageLabel, QName, SoapVersion};
    pub use crate::description::{
        AxisConfiguration, AxisOperation, AxisService, ModuleDescription, ServiceScope,
        TransportInDescription, TransportOutDescription,
    };
    pub use crate::engine::{AxisEngine, Handler, MessageReceiver, Phase, TransportSender};
    pub use crate::errors::{SoapFault, SoapflowError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::message::{EndpointReference, MessageContext, Options, SoapEnvelope};
    pub use crate::persistence::{Continuation, ContinuationStore, InMemoryContinuationStore};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
