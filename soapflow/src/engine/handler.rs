//! The processing-unit trait.

use super::Phase;
use crate::core::InvocationResponse;
use crate::errors::SoapflowError;
use crate::message::MessageContext;
use async_trait::async_trait;
use std::fmt::Debug;

/// A unit of work in a message's execution chain.
///
/// Handlers are shared between messages; per-message state belongs on the
/// [`MessageContext`], either as properties or as self-managed data.
#[async_trait]
pub trait Handler: Send + Sync + Debug {
    /// Returns the qualified name of the handler.
    fn name(&self) -> &str;

    /// Returns the handler's type name, used to re-resolve it after a
    /// message is read back from a stream.
    fn class_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Processes the message.
    async fn invoke(&self, msg: &MessageContext) -> Result<InvocationResponse, SoapflowError>;

    /// Called in reverse execution order once the flow is over.
    async fn flow_complete(&self, _msg: &MessageContext) {}

    /// Returns the handler as a phase, if it is one.
    fn as_phase(&self) -> Option<&Phase> {
        None
    }

    /// Returns the handler's self-managed data hooks, if it has any.
    fn self_managed_data(&self) -> Option<&dyn SelfManagedDataManager> {
        None
    }
}

/// Opt-in persistence of a handler's auxiliary per-message state.
///
/// Implementations usually keep that state in the message's self-managed
/// data map under their own class name.
pub trait SelfManagedDataManager: Send + Sync {
    /// Serializes this handler's state for `msg`. `None` means nothing to save.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the state cannot be encoded.
    fn serialize_self_managed_data(&self, msg: &MessageContext) -> Result<Option<Vec<u8>>, SoapflowError>;

    /// Restores state previously produced by
    /// [`SelfManagedDataManager::serialize_self_managed_data`].
    ///
    /// # Errors
    ///
    /// Returns a serialization error if `data` cannot be decoded.
    fn deserialize_self_managed_data(&self, data: &[u8], msg: &MessageContext) -> Result<(), SoapflowError>;

    /// Re-creates transient state for a unit that saved nothing.
    fn restore_transient_data(&self, _msg: &MessageContext) {}
}
