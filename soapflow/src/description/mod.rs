//! The deployed description tree.
//!
//! Descriptions are static, shared configuration: services, operations,
//! modules and transports. Runtime contexts and messages point at them but
//! never own them, and persisted messages refer to them by name only.

mod configuration;
mod module;
mod operation;
mod service;
mod transport;

pub use configuration::{global_phases, AxisConfiguration};
pub use module::{HandlerRule, ModuleDescription};
pub use operation::{operation_phases, AxisMessage, AxisOperation};
pub use service::{AxisService, AxisServiceGroup, ServiceScope};
pub use transport::{TransportInDescription, TransportOutDescription};
