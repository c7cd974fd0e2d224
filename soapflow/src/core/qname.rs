//! Qualified names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An XML qualified name: a namespace URI plus a local part.
///
/// The string form follows the `{namespace}local` convention; a name
/// without a namespace renders as just its local part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    /// The namespace URI (empty for no namespace).
    #[serde(default)]
    pub namespace_uri: String,
    /// The local part.
    pub local_part: String,
}

impl QName {
    /// Creates a namespaced qualified name.
    #[must_use]
    pub fn new(namespace_uri: impl Into<String>, local_part: impl Into<String>) -> Self {
        Self {
            namespace_uri: namespace_uri.into(),
            local_part: local_part.into(),
        }
    }

    /// Creates a qualified name with no namespace.
    #[must_use]
    pub fn local(local_part: impl Into<String>) -> Self {
        Self::new(String::new(), local_part)
    }

    /// Returns true if the name has a namespace URI.
    #[must_use]
    pub fn has_namespace(&self) -> bool {
        !self.namespace_uri.is_empty()
    }

    /// Parses the `{namespace}local` form. Input without braces is a local name.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if let Some(rest) = s.strip_prefix('{') {
            if let Some((ns, local)) = rest.split_once('}') {
                return Self::new(ns, local);
            }
        }
        Self::local(s)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_uri.is_empty() {
            write!(f, "{}", self.local_part)
        } else {
            write!(f, "{{{}}}{}", self.namespace_uri, self.local_part)
        }
    }
}

impl FromStr for QName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for QName {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let name = QName::new("urn:example", "echo");
        assert_eq!(name.to_string(), "{urn:example}echo");
        assert_eq!(QName::parse("{urn:example}echo"), name);
    }

    #[test]
    fn test_local_name() {
        let name = QName::parse("echo");
        assert!(!name.has_namespace());
        assert_eq!(name.to_string(), "echo");
    }

    #[test]
    fn test_unterminated_brace_is_local() {
        let name = QName::parse("{broken");
        assert_eq!(name.local_part, "{broken");
    }
}
