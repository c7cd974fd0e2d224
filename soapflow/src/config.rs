//! Engine configuration.

use crate::errors::SoapflowError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Idle time after which a request-scoped service group context is
    /// removed by `cleanup_service_group_contexts`.
    #[serde(default = "default_service_group_timeout_ms")]
    pub service_group_timeout_ms: i64,
    /// Extra SOAP roles this node acts in when checking mustUnderstand headers.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Message persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_service_group_timeout_ms() -> i64 {
    30_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service_group_timeout_ms: default_service_group_timeout_ms(),
            roles: Vec::new(),
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service group idle timeout.
    #[must_use]
    pub fn with_service_group_timeout(mut self, timeout: Duration) -> Self {
        self.service_group_timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Adds a SOAP role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Forces the attachment-aware envelope encoding when persisting.
    #[must_use]
    pub fn with_optimized_envelopes(mut self, enabled: bool) -> Self {
        self.persistence.optimize_envelope = enabled;
        self
    }

    /// Sets the logging settings.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// The service group idle timeout.
    #[must_use]
    pub fn service_group_timeout(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.service_group_timeout_ms).unwrap_or(0))
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SoapflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SoapflowError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// Message persistence settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Always write envelopes with the attachment-aware encoding.
    #[serde(default)]
    pub optimize_envelope: bool,
}

/// Logging settings for [`init_tracing`](crate::observability::init_tracing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Sets the filter directives.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Switches to JSON output.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}
