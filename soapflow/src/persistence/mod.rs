//! Suspending messages to bytes and resuming them later.
//!
//! This module provides:
//! - A big-endian object stream ([`ObjectWriter`], [`ObjectReader`])
//! - Surrogates for handlers and descriptions ([`MetaDataEntry`])
//! - [`MessageContext::write_external`](crate::message::MessageContext::write_external),
//!   [`MessageContext::read_external`](crate::message::MessageContext::read_external)
//!   and [`MessageContext::activate`](crate::message::MessageContext::activate)
//! - Continuations and the stores that hold them

mod activate;
mod continuation;
mod externalize;
mod metadata;
mod operation_state;
mod store;
mod stream;

pub use continuation::Continuation;
pub use externalize::{MESSAGE_CONTEXT_SUID, REVISION};
pub use metadata::{
    class_names, entries_for, read_entry, read_entry_list, read_optional_entry, resolve_entry,
    write_entry, write_entry_list, write_optional_entry, MetaDataEntry, SelfManagedDataHolder,
    LAST_ENTRY,
};
pub use operation_state::OPERATION_CONTEXT_SUID;
pub use store::{ContinuationStore, FileContinuationStore, InMemoryContinuationStore};
pub use stream::{ObjectReader, ObjectWriter};

pub(crate) use externalize::PendingActivation;
