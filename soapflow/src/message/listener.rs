//! Service-side observers of message attachment.

use super::MessageContext;
use crate::errors::SoapflowError;

/// Observes messages as they are bound to a service.
///
/// Failures are logged by the caller and never undo the attachment.
#[cfg_attr(test, mockall::automock)]
pub trait MessageContextListener: Send + Sync {
    /// Called after an envelope is attached to a message bound to the service.
    fn attach_envelope(&self, msg: &MessageContext) -> Result<(), SoapflowError>;

    /// Called after a service context is attached to a message.
    fn attach_service_context(&self, msg: &MessageContext) -> Result<(), SoapflowError>;
}
