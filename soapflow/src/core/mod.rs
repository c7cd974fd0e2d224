//! Core domain vocabulary for soapflow.
//!
//! This module contains the small value types used throughout the engine:
//! - Qualified names
//! - Flow directions and message labels
//! - Message exchange patterns
//! - Handler invocation responses
//! - SOAP versions and fault-code vocabularies

mod flow;
mod mep;
mod qname;
mod soap;

pub use flow::{Flow, InvocationResponse, MessageLabel};
pub use mep::{Mep, MepSlots};
pub use qname::QName;
pub use soap::{SoapVersion, SOAP11_ENVELOPE_NAMESPACE, SOAP12_ENVELOPE_NAMESPACE};
