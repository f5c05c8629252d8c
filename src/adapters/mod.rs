//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the `ProtocolAdapter` port with concrete transports
//! (TCP for the FIX-style session, tungstenite for the WebSocket
//! session) plus the construction-time protocol factory.

pub mod protocols;

pub use protocols::{ConfigError, Protocol, build_adapter};
