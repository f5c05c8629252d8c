//! Configuration Module - TOML-based Gateway Configuration
//!
//! Loads and validates configuration from `config.toml`. Venue
//! endpoints, protocol selection and connector tuning are externalized
//! here - credentials come from environment variables, never from the
//! file.

pub mod loader;

use serde::Deserialize;

/// Top-level gateway configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before anything connects.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Gateway identity and logging.
    pub gateway: GatewayConfig,
    /// Venue endpoint and protocol selection.
    pub venue: VenueConfig,
    /// Connector worker tuning.
    #[serde(default)]
    pub connector: ConnectorConfig,
    /// Health endpoint configuration.
    #[serde(default)]
    pub health: HealthConfig,
}

/// Gateway identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Human-readable gateway name.
    pub name: String,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Symbols subscribed at startup.
    #[serde(default)]
    pub symbols: Vec<String>,
}

/// Venue link configuration.
///
/// `protocol` must name a supported adapter ("fix" or "websocket");
/// anything else is refused at construction time.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// Wire protocol: "fix" or "websocket".
    pub protocol: String,
    /// Venue endpoint: `host:port` for FIX, a ws:// or wss:// URL for
    /// WebSocket.
    pub endpoint: String,
    /// FIX SenderCompID (ignored by the WebSocket adapter).
    #[serde(default = "default_sender_comp_id")]
    pub sender_comp_id: String,
    /// FIX TargetCompID (ignored by the WebSocket adapter).
    #[serde(default = "default_target_comp_id")]
    pub target_comp_id: String,
}

/// Connector worker tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorConfig {
    /// Worker loop pause between iterations (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Per-poll adapter timeout (milliseconds).
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
    /// Capacity of the outbound and inbound queues.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Overall `connect()` timeout (milliseconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            poll_timeout_ms: default_poll_timeout(),
            queue_capacity: default_queue_capacity(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

/// Health endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Enable the /live + /ready HTTP server.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Bind address for the health server.
    #[serde(default = "default_health_addr")]
    pub bind_address: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind_address: default_health_addr(),
        }
    }
}

// Default value functions for serde

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sender_comp_id() -> String {
    "GATEWAY".to_string()
}

fn default_target_comp_id() -> String {
    "VENUE".to_string()
}

fn default_poll_interval() -> u64 {
    10
}

fn default_poll_timeout() -> u64 {
    5
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_health_addr() -> String {
    "0.0.0.0:9090".to_string()
}
