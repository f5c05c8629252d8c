//! Protocol Adapter Variants — Selection at Construction Time
//!
//! Concrete `ProtocolAdapter` implementations and the factory that picks
//! one from configuration. An unsupported protocol name is a
//! configuration error raised here, before anything connects — never a
//! lazy failure inside the worker.

pub mod fix;
pub mod websocket;

use std::str::FromStr;

use thiserror::Error;

pub use fix::FixAdapter;
pub use websocket::WebSocketAdapter;

use crate::config::VenueConfig;
use crate::ports::protocol::ProtocolAdapter;

/// Fatal construction-time configuration faults.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported protocol '{0}' (expected \"fix\" or \"websocket\")")]
    UnsupportedProtocol(String),
}

/// Supported wire protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Fix,
    WebSocket,
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fix" => Ok(Self::Fix),
            "websocket" | "ws" => Ok(Self::WebSocket),
            other => Err(ConfigError::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// Build the adapter named by the venue configuration.
pub fn build_adapter(
    venue: &VenueConfig,
) -> Result<Box<dyn ProtocolAdapter>, ConfigError> {
    match venue.protocol.parse::<Protocol>()? {
        Protocol::Fix => Ok(Box::new(FixAdapter::new(
            &venue.endpoint,
            &venue.sender_comp_id,
            &venue.target_comp_id,
        ))),
        Protocol::WebSocket => Ok(Box::new(WebSocketAdapter::new(&venue.endpoint))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn venue(protocol: &str) -> VenueConfig {
        VenueConfig {
            protocol: protocol.to_string(),
            endpoint: "venue.example:9898".to_string(),
            sender_comp_id: "GW".to_string(),
            target_comp_id: "VENUE".to_string(),
        }
    }

    #[test]
    fn protocol_names_parse_case_insensitively() {
        assert_eq!("FIX".parse::<Protocol>().unwrap(), Protocol::Fix);
        assert_eq!("websocket".parse::<Protocol>().unwrap(), Protocol::WebSocket);
        assert_eq!("ws".parse::<Protocol>().unwrap(), Protocol::WebSocket);
    }

    #[test]
    fn unsupported_protocol_is_a_construction_error() {
        let err = build_adapter(&venue("smtp")).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedProtocol(name) if name == "smtp"));
    }

    #[test]
    fn supported_protocols_build() {
        assert!(build_adapter(&venue("fix")).is_ok());
        assert!(build_adapter(&venue("websocket")).is_ok());
    }
}
