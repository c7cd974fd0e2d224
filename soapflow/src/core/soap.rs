//! SOAP envelope versions and their fault-code vocabularies.

use super::QName;
use serde::{Deserialize, Serialize};

/// SOAP 1.1 envelope namespace.
pub const SOAP11_ENVELOPE_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// SOAP 1.2 envelope namespace.
pub const SOAP12_ENVELOPE_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-envelope";

/// The SOAP version of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SoapVersion {
    /// SOAP 1.1.
    Soap11,
    /// SOAP 1.2.
    #[default]
    Soap12,
}

impl SoapVersion {
    /// Detects the version from an envelope namespace URI.
    #[must_use]
    pub fn from_namespace(namespace: &str) -> Option<Self> {
        match namespace {
            SOAP11_ENVELOPE_NAMESPACE => Some(Self::Soap11),
            SOAP12_ENVELOPE_NAMESPACE => Some(Self::Soap12),
            _ => None,
        }
    }

    /// Returns the envelope namespace URI.
    #[must_use]
    pub fn namespace(self) -> &'static str {
        match self {
            Self::Soap11 => SOAP11_ENVELOPE_NAMESPACE,
            Self::Soap12 => SOAP12_ENVELOPE_NAMESPACE,
        }
    }

    /// The `MustUnderstand` fault code.
    #[must_use]
    pub fn must_understand_code(self) -> QName {
        QName::new(self.namespace(), "MustUnderstand")
    }

    /// The `VersionMismatch` fault code.
    #[must_use]
    pub fn version_mismatch_code(self) -> QName {
        QName::new(self.namespace(), "VersionMismatch")
    }

    /// The fault code blaming the sender (`Client` in 1.1, `Sender` in 1.2).
    #[must_use]
    pub fn sender_code(self) -> QName {
        match self {
            Self::Soap11 => QName::new(self.namespace(), "Client"),
            Self::Soap12 => QName::new(self.namespace(), "Sender"),
        }
    }

    /// The fault code blaming the receiver (`Server` in 1.1, `Receiver` in 1.2).
    #[must_use]
    pub fn receiver_code(self) -> QName {
        match self {
            Self::Soap11 => QName::new(self.namespace(), "Server"),
            Self::Soap12 => QName::new(self.namespace(), "Receiver"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soap_version_detection() {
        assert_eq!(
            SoapVersion::from_namespace(SOAP11_ENVELOPE_NAMESPACE),
            Some(SoapVersion::Soap11)
        );
        assert_eq!(
            SoapVersion::from_namespace(SOAP12_ENVELOPE_NAMESPACE),
            Some(SoapVersion::Soap12)
        );
        assert_eq!(SoapVersion::from_namespace("urn:nope"), None);
    }

    #[test]
    fn test_fault_code_vocabulary() {
        assert_eq!(SoapVersion::Soap11.sender_code().local_part, "Client");
        assert_eq!(SoapVersion::Soap12.sender_code().local_part, "Sender");
        assert_eq!(SoapVersion::Soap11.receiver_code().local_part, "Server");
        assert_eq!(
            SoapVersion::Soap12.must_understand_code().namespace_uri,
            SOAP12_ENVELOPE_NAMESPACE
        );
    }
}
