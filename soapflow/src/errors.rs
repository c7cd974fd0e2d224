//! Error types for the soapflow engine.
//!
//! The taxonomy separates configuration-consistency faults, protocol (SOAP)
//! faults, exchange-pattern violations, stream-format faults and activation
//! misses so that callers can tell fatal conditions from recoverable ones.

use crate::core::{QName, SoapVersion};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for soapflow operations.
#[derive(Debug, Error)]
pub enum SoapflowError {
    /// Parent/child context links do not agree.
    #[error("{0}")]
    ContextConsistency(#[from] ContextConsistencyError),

    /// A SOAP fault to be returned to the caller.
    #[error("{0}")]
    Fault(#[from] SoapFault),

    /// An envelope with an unrecognized namespace was rejected.
    #[error("Unsupported SOAP version: envelope namespace '{namespace}'")]
    UnsupportedSoapVersion {
        /// The offending namespace URI.
        namespace: String,
    },

    /// A message was added to an exchange that cannot accept it.
    #[error("{0}")]
    MepViolation(#[from] MepViolationError),

    /// A continuing message could not be correlated with its exchange.
    #[error("{0}")]
    Correlation(#[from] CorrelationError),

    /// A persisted stream carries an unknown format identifier.
    #[error("Unsupported serialization version: suid={suid}, revision={revision}")]
    UnsupportedSerializationVersion {
        /// The stream's serial version identifier.
        suid: i64,
        /// The stream's revision identifier.
        revision: i32,
    },

    /// Self-managed data has no live owner after activation.
    #[error("{0}")]
    HandlerNotFound(#[from] HandlerNotFoundError),

    /// A locked parameter was modified.
    #[error("{0}")]
    ParameterLocked(#[from] ParameterLockedError),

    /// The service or operation for a message could not be resolved.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SoapflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl SoapflowError {
    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Returns true for errors that must stop all further processing of the message.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ContextConsistency(_)
                | Self::UnsupportedSerializationVersion { .. }
                | Self::HandlerNotFound(_)
                | Self::MepViolation(_)
        )
    }

    /// Renders the error as a SOAP fault in the given version's vocabulary.
    #[must_use]
    pub fn to_soap_fault(&self, version: SoapVersion) -> SoapFault {
        match self {
            Self::Fault(fault) => fault.clone(),
            Self::UnsupportedSoapVersion { namespace } => SoapFault::version_mismatch(namespace),
            Self::Dispatch(msg) | Self::Correlation(CorrelationError { message: msg, .. }) => {
                SoapFault::sender(version, msg.clone())
            }
            other => SoapFault::receiver(version, other.to_string()),
        }
    }
}

/// A SOAP fault.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("SOAP fault {code}: {reason}")]
pub struct SoapFault {
    /// The fault code.
    pub code: QName,
    /// Human-readable reason.
    pub reason: String,
    /// The QName of the header that caused the fault, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<QName>,
    /// Optional fault detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl SoapFault {
    /// Creates a new fault.
    #[must_use]
    pub fn new(code: QName, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            header: None,
            detail: None,
        }
    }

    /// A `MustUnderstand` fault naming the offending header.
    #[must_use]
    pub fn must_understand(version: SoapVersion, header: QName) -> Self {
        let reason = format!("Must Understand check failed for header {header}");
        Self {
            code: version.must_understand_code(),
            reason,
            header: Some(header),
            detail: None,
        }
    }

    /// A `VersionMismatch` fault for an unknown envelope namespace.
    ///
    /// SOAP 1.2 nodes report version mismatches in the 1.2 vocabulary.
    #[must_use]
    pub fn version_mismatch(namespace: &str) -> Self {
        Self::new(
            SoapVersion::Soap12.version_mismatch_code(),
            format!("Unsupported envelope namespace '{namespace}'"),
        )
    }

    /// A fault blaming the sender.
    #[must_use]
    pub fn sender(version: SoapVersion, reason: impl Into<String>) -> Self {
        Self::new(version.sender_code(), reason)
    }

    /// A fault blaming the receiver.
    #[must_use]
    pub fn receiver(version: SoapVersion, reason: impl Into<String>) -> Self {
        Self::new(version.receiver_code(), reason)
    }

    /// Sets the fault detail.
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code.to_string()));
        map.insert("reason".to_string(), serde_json::json!(self.reason));
        if let Some(ref header) = self.header {
            map.insert("header".to_string(), serde_json::json!(header.to_string()));
        }
        if let Some(ref detail) = self.detail {
            map.insert("detail".to_string(), detail.clone());
        }
        map
    }
}

/// Raised when a context assignment would break the parent chain.
#[derive(Debug, Clone, Error)]
#[error("Context consistency error: {message}")]
pub struct ContextConsistencyError {
    /// What did not match.
    pub message: String,
}

impl ContextConsistencyError {
    /// Creates a new consistency error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Raised when a message is added to an exchange that cannot take it.
#[derive(Debug, Clone, Error)]
#[error("Invalid message context for operation '{operation}': {message}")]
pub struct MepViolationError {
    /// The operation name.
    pub operation: String,
    /// The label the message was added under.
    pub label: String,
    /// Additional message.
    pub message: String,
}

impl MepViolationError {
    /// The exchange already holds every message it can take.
    #[must_use]
    pub fn completed(operation: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            label: label.into(),
            message: "MEP already completed".to_string(),
        }
    }

    /// The pattern has no slot for the label.
    #[must_use]
    pub fn unsupported_label(operation: impl Into<String>, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            operation: operation.into(),
            message: format!("no '{label}' message in this exchange pattern"),
            label,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!("MepViolation"));
        map.insert("operation".to_string(), serde_json::json!(self.operation));
        map.insert("label".to_string(), serde_json::json!(self.label));
        map.insert("message".to_string(), serde_json::json!(self.message));
        map
    }
}

/// Raised when a `RelatesTo` value matches no registered exchange.
#[derive(Debug, Clone, Error)]
#[error("Cannot correlate message: {message}")]
pub struct CorrelationError {
    /// The relationship value that failed to resolve.
    pub relates_to: String,
    /// Additional message.
    pub message: String,
}

impl CorrelationError {
    /// Creates a correlation error for an unknown relationship.
    #[must_use]
    pub fn unknown(relates_to: impl Into<String>) -> Self {
        let relates_to = relates_to.into();
        Self {
            message: format!("no operation context registered for '{relates_to}'"),
            relates_to,
        }
    }
}

/// Raised when staged self-managed data has no live owner.
#[derive(Debug, Clone, Error)]
#[error("Handler not found: class '{class_name}' with name '{qualified_name}'")]
pub struct HandlerNotFoundError {
    /// The owner's class name.
    pub class_name: String,
    /// The owner's qualified name.
    pub qualified_name: String,
}

impl HandlerNotFoundError {
    /// Creates a new handler-not-found error.
    #[must_use]
    pub fn new(class_name: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            qualified_name: qualified_name.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!("HandlerNotFound"));
        map.insert("class_name".to_string(), serde_json::json!(self.class_name));
        map.insert(
            "qualified_name".to_string(),
            serde_json::json!(self.qualified_name),
        );
        map
    }
}

/// Raised when a locked parameter would be overridden or removed.
#[derive(Debug, Clone, Error)]
#[error("Parameter '{name}' is locked{}", lock_suffix(.by_parent))]
pub struct ParameterLockedError {
    /// The parameter name.
    pub name: String,
    /// Whether the lock was inherited.
    pub by_parent: bool,
}

fn lock_suffix(by_parent: &bool) -> &'static str {
    if *by_parent {
        " by a parent"
    } else {
        ""
    }
}

impl ParameterLockedError {
    /// Creates a new locked-parameter error.
    #[must_use]
    pub fn new(name: impl Into<String>, by_parent: bool) -> Self {
        Self {
            name: name.into(),
            by_parent,
        }
    }
}
