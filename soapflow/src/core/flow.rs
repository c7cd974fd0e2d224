//! Flow directions, message labels and invocation responses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The direction a message travels through the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// Inbound, normal processing.
    #[default]
    In,
    /// Outbound, normal processing.
    Out,
    /// Inbound fault.
    InFault,
    /// Outbound fault.
    OutFault,
}

impl Flow {
    /// Numeric code used in the persisted stream.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::In => 1,
            Self::Out => 2,
            Self::InFault => 3,
            Self::OutFault => 4,
        }
    }

    /// Decodes a persisted flow code.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::In),
            2 => Some(Self::Out),
            3 => Some(Self::InFault),
            4 => Some(Self::OutFault),
            _ => None,
        }
    }

    /// Returns true for the two inbound flows.
    #[must_use]
    pub fn is_inbound(self) -> bool {
        matches!(self, Self::In | Self::InFault)
    }

    /// Returns true for the two fault flows.
    #[must_use]
    pub fn is_fault(self) -> bool {
        matches!(self, Self::InFault | Self::OutFault)
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "in"),
            Self::Out => write!(f, "out"),
            Self::InFault => write!(f, "in_fault"),
            Self::OutFault => write!(f, "out_fault"),
        }
    }
}

/// The slot a message occupies in an operation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageLabel {
    /// The inbound message of the exchange.
    In,
    /// The outbound message of the exchange.
    Out,
    /// The fault message of the exchange.
    Fault,
}

impl MessageLabel {
    /// Returns the WSDL label value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "In",
            Self::Out => "Out",
            Self::Fault => "Fault",
        }
    }

    /// Parses a WSDL label value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "In" => Some(Self::In),
            "Out" => Some(Self::Out),
            "Fault" => Some(Self::Fault),
            _ => None,
        }
    }
}

impl fmt::Display for MessageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler tells the engine after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InvocationResponse {
    /// Keep walking the execution chain.
    #[default]
    Continue,
    /// Stop here; the message is paused and will be resumed later.
    Suspend,
    /// Stop here and unwind; no further units run.
    Abort,
}

impl fmt::Display for InvocationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Suspend => write!(f, "suspend"),
            Self::Abort => write!(f, "abort"),
        }
    }
}
