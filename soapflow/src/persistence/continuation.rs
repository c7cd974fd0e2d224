//! Portable handles to suspended messages.

use super::{ObjectReader, ObjectWriter};
use crate::context::{ConfigurationContext, Context};
use crate::core::Flow;
use crate::errors::SoapflowError;
use crate::message::MessageContext;
use crate::utils::{millis_to_timestamp, now_millis, Timestamp};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use std::sync::Arc;

const TOKEN_VERSION: i32 = 1;

/// A suspended message captured for later resumption.
///
/// Holds the externalized message together with the cursor it was paused
/// at, so stores can list and inspect continuations without activating them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    log_correlation_id: String,
    message_id: Option<String>,
    flow: Flow,
    handler_index: i32,
    phase_index: i32,
    captured_at: i64,
    state: Bytes,
}

impl Continuation {
    /// Captures `msg`, normally right after a handler suspended it.
    ///
    /// # Errors
    ///
    /// Fails if the message cannot be externalized.
    pub fn capture(msg: &MessageContext) -> Result<Self, SoapflowError> {
        let state = msg.write_external()?;
        Ok(Self {
            log_correlation_id: msg.log_correlation_id().to_string(),
            message_id: msg.message_id(),
            flow: msg.flow(),
            handler_index: msg.current_handler_index(),
            phase_index: msg.current_phase_index(),
            captured_at: now_millis(),
            state,
        })
    }

    /// The captured message's log correlation id; stores key on it.
    #[must_use]
    pub fn log_correlation_id(&self) -> &str {
        &self.log_correlation_id
    }

    /// The captured message's id.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// The flow the message was in.
    #[must_use]
    pub fn flow(&self) -> Flow {
        self.flow
    }

    /// The top-level cursor at capture time.
    #[must_use]
    pub fn handler_index(&self) -> i32 {
        self.handler_index
    }

    /// The in-phase cursor at capture time.
    #[must_use]
    pub fn phase_index(&self) -> i32 {
        self.phase_index
    }

    /// When the continuation was captured.
    #[must_use]
    pub fn captured_at(&self) -> Option<Timestamp> {
        millis_to_timestamp(self.captured_at)
    }

    /// The externalized message.
    #[must_use]
    pub fn state(&self) -> &Bytes {
        &self.state
    }

    /// Reads the message back and activates it against `config`.
    ///
    /// # Errors
    ///
    /// Fails if the stream cannot be read or activation fails.
    pub fn restore(&self, config: &Arc<ConfigurationContext>) -> Result<Arc<MessageContext>, SoapflowError> {
        let msg = MessageContext::read_external(self.state.clone())?;
        msg.activate(config)?;
        msg.touch();
        Ok(msg)
    }

    /// Encodes the continuation as a base64 token.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the captured state is too large to frame.
    pub fn encode(&self) -> Result<String, SoapflowError> {
        let mut writer = ObjectWriter::new();
        writer.write_i32(TOKEN_VERSION);
        writer.write_utf(&self.log_correlation_id)?;
        writer.write_optional_utf(self.message_id.as_deref())?;
        writer.write_i32(self.flow.code());
        writer.write_i32(self.handler_index);
        writer.write_i32(self.phase_index);
        writer.write_i64(self.captured_at);
        writer.write_blob(&self.state)?;
        Ok(STANDARD.encode(writer.into_bytes()))
    }

    /// Decodes a token produced by [`Continuation::encode`].
    ///
    /// # Errors
    ///
    /// Returns `Serialization` for malformed tokens.
    pub fn decode(token: &str) -> Result<Self, SoapflowError> {
        let raw = STANDARD
            .decode(token.trim())
            .map_err(|e| SoapflowError::serialization(format!("invalid continuation token: {e}")))?;
        let mut reader = ObjectReader::new(raw);
        let version = reader.read_i32()?;
        if version != TOKEN_VERSION {
            return Err(SoapflowError::serialization(format!(
                "unsupported continuation token version {version}"
            )));
        }
        let log_correlation_id = reader.read_utf()?;
        let message_id = reader.read_optional_utf()?;
        let flow_code = reader.read_i32()?;
        let flow = Flow::from_code(flow_code)
            .ok_or_else(|| SoapflowError::serialization(format!("unknown flow code {flow_code}")))?;
        Ok(Self {
            log_correlation_id,
            message_id,
            flow,
            handler_index: reader.read_i32()?,
            phase_index: reader.read_i32()?,
            captured_at: reader.read_i64()?,
            state: reader.read_blob()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_token_survives_encoding() {
        let continuation = Continuation {
            log_correlation_id: "abc".into(),
            message_id: Some("urn:uuid:1".into()),
            flow: Flow::In,
            handler_index: 3,
            phase_index: 1,
            captured_at: 1_700_000_000_000,
            state: Bytes::from_static(b"state"),
        };

        let decoded = Continuation::decode(&continuation.encode().unwrap()).unwrap();
        assert_eq!(decoded, continuation);
        assert_eq!(decoded.captured_at().unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_garbage_token_rejected() {
        let err = Continuation::decode("not base64!").unwrap_err();
        assert!(matches!(err, SoapflowError::Serialization(_)));
    }

    #[test]
    fn test_token_version_checked() {
        let mut writer = ObjectWriter::new();
        writer.write_i32(99);
        let token = STANDARD.encode(writer.into_bytes());

        let err = Continuation::decode(&token).unwrap_err();
        assert!(err.to_string().contains("version 99"));
    }
}
