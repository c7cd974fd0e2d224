//! `tracing-subscriber` installation.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `config.filter`.
///
/// Returns false if a global subscriber was already installed, which makes
/// repeated calls harmless.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected_quietly() {
        let config = LoggingConfig::default().with_filter("soapflow=debug");
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config.with_json(true)));
    }
}
