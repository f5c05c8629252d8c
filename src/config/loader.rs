//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;
use crate::adapters::protocols::Protocol;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated (unsupported protocol included —
///   protocol selection fails here, at construction time, never lazily)
pub fn load_config(path: &str) -> Result<AppConfig> {
    let path = Path::new(path);

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: AppConfig =
        toml::from_str(&content).with_context(|| "Failed to parse config.toml")?;

    validate_config(&config)?;

    info!(
        name = %config.gateway.name,
        protocol = %config.venue.protocol,
        endpoint = %config.venue.endpoint,
        symbols = config.gateway.symbols.len(),
        "Configuration loaded successfully"
    );

    Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
    // Venue validation
    Protocol::from_str(&config.venue.protocol)
        .with_context(|| "Unsupported venue protocol")?;
    anyhow::ensure!(
        !config.venue.endpoint.is_empty(),
        "Venue endpoint must not be empty"
    );

    // Connector validation
    anyhow::ensure!(
        config.connector.poll_interval_ms > 0,
        "poll_interval_ms must be positive, got {}",
        config.connector.poll_interval_ms
    );
    anyhow::ensure!(
        config.connector.poll_timeout_ms > 0,
        "poll_timeout_ms must be positive, got {}",
        config.connector.poll_timeout_ms
    );
    anyhow::ensure!(
        config.connector.queue_capacity > 0,
        "queue_capacity must be positive"
    );
    anyhow::ensure!(
        config.connector.connect_timeout_ms > 0,
        "connect_timeout_ms must be positive"
    );

    // Symbol validation
    for symbol in &config.gateway.symbols {
        anyhow::ensure!(
            !symbol.trim().is_empty(),
            "Subscribed symbols must not be blank"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("valid toml")
    }

    const MINIMAL: &str = r#"
        [gateway]
        name = "gw-test"
        symbols = ["AAPL", "GOOG"]

        [venue]
        protocol = "websocket"
        endpoint = "wss://venue.example/stream"
    "#;

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_config("nonexistent.toml");
        assert!(result.is_err());
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = parse(MINIMAL);
        assert_eq!(config.gateway.log_level, "info");
        assert_eq!(config.connector.poll_interval_ms, 10);
        assert_eq!(config.connector.queue_capacity, 1024);
        assert!(config.health.enabled);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn unsupported_protocol_fails_validation() {
        let mut config = parse(MINIMAL);
        config.venue.protocol = "carrier-pigeon".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn zero_poll_interval_fails_validation() {
        let mut config = parse(MINIMAL);
        config.connector.poll_interval_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn blank_symbol_fails_validation() {
        let mut config = parse(MINIMAL);
        config.gateway.symbols.push("  ".to_string());
        assert!(validate_config(&config).is_err());
    }
}
