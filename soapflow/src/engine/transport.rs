//! The outbound transport seam.

use crate::core::InvocationResponse;
use crate::errors::SoapflowError;
use crate::message::MessageContext;
use async_trait::async_trait;

/// Writes a message that completed the outbound flow.
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Sends the message.
    async fn invoke(&self, msg: &MessageContext) -> Result<InvocationResponse, SoapflowError>;

    /// Releases per-message transport resources.
    async fn cleanup(&self, _msg: &MessageContext) {}
}
