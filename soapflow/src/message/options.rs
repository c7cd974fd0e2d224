//! Message-scoped addressing and options.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The WS-Addressing anonymous address.
pub const ANONYMOUS_ADDRESS: &str = "http://www.w3.org/2005/08/addressing/anonymous";
/// The WS-Addressing none address.
pub const NONE_ADDRESS: &str = "http://www.w3.org/2005/08/addressing/none";
/// The default relationship type of `RelatesTo`.
pub const RELATIONSHIP_REPLY: &str = "http://www.w3.org/2005/08/addressing/reply";

/// A WS-Addressing endpoint reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointReference {
    /// The endpoint address.
    pub address: String,
    /// Reference parameters echoed back to the endpoint.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub reference_parameters: HashMap<String, String>,
}

impl EndpointReference {
    /// Creates a reference to `address`.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            reference_parameters: HashMap::new(),
        }
    }

    /// The anonymous endpoint.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_ADDRESS)
    }

    /// Adds a reference parameter.
    #[must_use]
    pub fn with_reference_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.reference_parameters.insert(name.into(), value.into());
        self
    }

    /// Returns true for the anonymous address.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.address == ANONYMOUS_ADDRESS
    }

    /// The last path segment of the address, ignoring query and fragment.
    #[must_use]
    pub fn last_path_segment(&self) -> Option<&str> {
        let path = self
            .address
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');
        path.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

/// A WS-Addressing relationship to an earlier message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatesTo {
    /// The related message id.
    pub value: String,
    /// The relationship type URI.
    #[serde(default = "default_relationship")]
    pub relationship_type: String,
}

fn default_relationship() -> String {
    RELATIONSHIP_REPLY.to_string()
}

impl RelatesTo {
    /// A reply relationship to `message_id`.
    #[must_use]
    pub fn reply(message_id: impl Into<String>) -> Self {
        Self {
            value: message_id.into(),
            relationship_type: default_relationship(),
        }
    }

    /// Returns true for the reply relationship.
    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.relationship_type == RELATIONSHIP_REPLY
    }
}

/// Per-message addressing and option properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<EndpointReference>,
    /// Source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<EndpointReference>,
    /// Where replies go.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<EndpointReference>,
    /// Where faults go.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_to: Option<EndpointReference>,
    /// The message id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// The WS-Addressing action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// The SOAP action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soap_action: Option<String>,
    /// Relationships to earlier messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relates_to: Vec<RelatesTo>,
    /// Name of the transport to send on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_out: Option<String>,
    /// Free-form option properties.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, serde_json::Value>,
}

impl Options {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the destination.
    #[must_use]
    pub fn with_to(mut self, to: EndpointReference) -> Self {
        self.to = Some(to);
        self
    }

    /// Sets the reply destination.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: EndpointReference) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    /// Sets the message id.
    #[must_use]
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Sets the WS-Addressing action.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Sets the SOAP action.
    #[must_use]
    pub fn with_soap_action(mut self, action: impl Into<String>) -> Self {
        self.soap_action = Some(action.into());
        self
    }

    /// Adds a relationship.
    #[must_use]
    pub fn with_relates_to(mut self, relates_to: RelatesTo) -> Self {
        self.relates_to.push(relates_to);
        self
    }

    /// Sets an option property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// The reply relationship, falling back to the first relationship.
    #[must_use]
    pub fn reply_relationship(&self) -> Option<&RelatesTo> {
        self.relates_to
            .iter()
            .find(|r| r.is_reply())
            .or_else(|| self.relates_to.first())
    }

    /// Reads an option property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    /// The action used for dispatch: WS-Addressing first, then SOAP action.
    #[must_use]
    pub fn dispatch_action(&self) -> Option<&str> {
        self.action
            .as_deref()
            .filter(|a| !a.is_empty())
            .or_else(|| self.soap_action.as_deref().filter(|a| !a.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_path_segment() {
        let epr = EndpointReference::new("http://host:8080/axis2/services/Echo?wsdl");
        assert_eq!(epr.last_path_segment(), Some("Echo"));
        assert_eq!(
            EndpointReference::new("http://host/services/Echo/").last_path_segment(),
            Some("Echo")
        );
        assert_eq!(EndpointReference::new("").last_path_segment(), None);
    }

    #[test]
    fn test_reply_relationship_preferred() {
        let options = Options::new()
            .with_relates_to(RelatesTo {
                value: "urn:a".into(),
                relationship_type: "urn:custom".into(),
            })
            .with_relates_to(RelatesTo::reply("urn:b"));
        assert_eq!(options.reply_relationship().unwrap().value, "urn:b");
    }

    #[test]
    fn test_dispatch_action_fallback() {
        let options = Options::new().with_action("").with_soap_action("urn:echo");
        assert_eq!(options.dispatch_action(), Some("urn:echo"));
    }
}
