//! A structural model of SOAP envelopes and attachments.
//!
//! Envelopes are not parsed from XML here; transports build them directly.

use crate::core::{QName, SoapVersion};
use crate::errors::SoapFault;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// SOAP 1.2 role for the next node on the path.
pub const ROLE_NEXT: &str = "http://www.w3.org/2003/05/soap-envelope/role/next";
/// SOAP 1.2 role for the final receiver.
pub const ROLE_ULTIMATE_RECEIVER: &str = "http://www.w3.org/2003/05/soap-envelope/role/ultimateReceiver";
/// SOAP 1.1 actor for the next node on the path.
pub const ACTOR_NEXT: &str = "http://schemas.xmlsoap.org/soap/actor/next";

/// One header block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoapHeaderBlock {
    /// The header element name.
    pub name: QName,
    /// The targeted role (`actor` in SOAP 1.1). `None` targets the ultimate receiver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Whether the targeted node must process the header.
    #[serde(default)]
    pub must_understand: bool,
    /// Set by the handler that processed the header.
    #[serde(default)]
    pub processed: bool,
    /// The header content.
    #[serde(default)]
    pub content: serde_json::Value,
}

impl SoapHeaderBlock {
    /// Creates an optional header with no role.
    #[must_use]
    pub fn new(name: impl Into<QName>, content: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            role: None,
            must_understand: false,
            processed: false,
            content,
        }
    }

    /// Marks the header mustUnderstand.
    #[must_use]
    pub fn must_understand(mut self) -> Self {
        self.must_understand = true;
        self
    }

    /// Targets the header at a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Returns true if this node, acting in `extra_roles`, is targeted.
    #[must_use]
    pub fn targets_us(&self, extra_roles: &[String]) -> bool {
        match self.role.as_deref() {
            None | Some("") => true,
            Some(ROLE_NEXT | ROLE_ULTIMATE_RECEIVER | ACTOR_NEXT) => true,
            Some(role) => extra_roles.iter().any(|r| r == role),
        }
    }
}

/// One child element of the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyElement {
    /// The element name.
    pub name: QName,
    /// The element content.
    #[serde(default)]
    pub content: serde_json::Value,
}

/// A SOAP envelope: namespace, header blocks, body elements and an
/// optional fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoapEnvelope {
    namespace_uri: String,
    #[serde(default)]
    headers: Vec<SoapHeaderBlock>,
    #[serde(default)]
    body: Vec<BodyElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fault: Option<SoapFault>,
}

impl SoapEnvelope {
    /// Creates an empty envelope of `version`.
    #[must_use]
    pub fn new(version: SoapVersion) -> Self {
        Self::with_namespace(version.namespace())
    }

    /// Creates an empty envelope with an arbitrary namespace.
    #[must_use]
    pub fn with_namespace(namespace_uri: impl Into<String>) -> Self {
        Self {
            namespace_uri: namespace_uri.into(),
            headers: Vec::new(),
            body: Vec::new(),
            fault: None,
        }
    }

    /// Adds a header block.
    #[must_use]
    pub fn with_header(mut self, header: SoapHeaderBlock) -> Self {
        self.headers.push(header);
        self
    }

    /// Adds a body element.
    #[must_use]
    pub fn with_body_element(mut self, name: impl Into<QName>, content: serde_json::Value) -> Self {
        self.body.push(BodyElement {
            name: name.into(),
            content,
        });
        self
    }

    /// The envelope namespace URI.
    #[must_use]
    pub fn namespace_uri(&self) -> &str {
        &self.namespace_uri
    }

    /// The SOAP version implied by the namespace.
    #[must_use]
    pub fn version(&self) -> Option<SoapVersion> {
        SoapVersion::from_namespace(&self.namespace_uri)
    }

    /// The header blocks.
    #[must_use]
    pub fn headers(&self) -> &[SoapHeaderBlock] {
        &self.headers
    }

    /// Mutable access to the header blocks.
    pub fn headers_mut(&mut self) -> &mut Vec<SoapHeaderBlock> {
        &mut self.headers
    }

    /// Marks every header named `name` as processed. Returns how many matched.
    pub fn mark_processed(&mut self, name: &QName) -> usize {
        let mut count = 0;
        for header in self.headers.iter_mut().filter(|h| &h.name == name) {
            header.processed = true;
            count += 1;
        }
        count
    }

    /// The body elements.
    #[must_use]
    pub fn body(&self) -> &[BodyElement] {
        &self.body
    }

    /// The name of the first body element, used for dispatch.
    #[must_use]
    pub fn first_body_element(&self) -> Option<&QName> {
        self.body.first().map(|e| &e.name)
    }

    /// Sets the body fault.
    pub fn set_fault(&mut self, fault: SoapFault) {
        self.fault = Some(fault);
    }

    /// The body fault, if any.
    #[must_use]
    pub fn fault(&self) -> Option<&SoapFault> {
        self.fault.as_ref()
    }

    /// Returns true if the body carries a fault.
    #[must_use]
    pub fn has_fault(&self) -> bool {
        self.fault.is_some()
    }
}

/// A shared, mutable envelope.
pub type SharedEnvelope = Arc<RwLock<SoapEnvelope>>;

/// One binary attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// MIME content type.
    pub content_type: String,
    /// The payload.
    pub data: Bytes,
}

/// Binary attachments keyed by content id. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct Attachments {
    parts: Arc<RwLock<BTreeMap<String, Attachment>>>,
}

impl Attachments {
    /// Creates an empty attachment map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an attachment.
    pub fn add(&self, content_id: impl Into<String>, content_type: impl Into<String>, data: impl Into<Bytes>) {
        self.parts.write().insert(
            content_id.into(),
            Attachment {
                content_type: content_type.into(),
                data: data.into(),
            },
        );
    }

    /// Looks an attachment up.
    #[must_use]
    pub fn get(&self, content_id: &str) -> Option<Attachment> {
        self.parts.read().get(content_id).cloned()
    }

    /// Removes an attachment.
    pub fn remove(&self, content_id: &str) -> Option<Attachment> {
        self.parts.write().remove(content_id)
    }

    /// The content ids, sorted.
    #[must_use]
    pub fn content_ids(&self) -> Vec<String> {
        self.parts.read().keys().cloned().collect()
    }

    /// Every attachment, sorted by content id.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Attachment)> {
        self.parts
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of attachments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.read().len()
    }

    /// Returns true if there are no attachments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.read().is_empty()
    }

    /// Returns true if both handles share storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.parts, &other.parts)
    }
}
