//! The runtime context hierarchy.
//!
//! This module provides:
//! - Thread-safe property and parameter bags
//! - The shared [`Context`] capability with hierarchical property lookup
//! - The configuration → service group → service → operation tree
//! - Session contexts
//!
//! Parent links are [`ContextId`] handles into the arena owned by the
//! [`ConfigurationContext`].

mod bags;
mod configuration;
#[cfg(test)]
mod context_tests;
mod node;
mod operation;
mod service;
mod service_group;
mod session;

pub use bags::{Parameter, ParameterObserver, ParameterStore, PropertyBag};
pub use configuration::ConfigurationContext;
pub use node::{Context, ContextCore, ContextId, ContextRef, PropertyDifference};
pub use operation::OperationContext;
pub use service::ServiceContext;
pub use service_group::ServiceGroupContext;
pub use session::{SessionContext, SessionSnapshot};

pub(crate) use node::lookup_in_chain;
