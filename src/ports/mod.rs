//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interface the gateway core requires from the outside
//! world. Adapters implement it; the Connector drives it.
//!
//! Port categories:
//! - `ProtocolAdapter`: one wire protocol (FIX-style or WebSocket-style)
//!   to one venue, with its credential and error vocabulary

pub mod protocol;

pub use protocol::{
    ConnectError, DisconnectError, PollError, ProtocolAdapter, SendError,
    VenueCredentials,
};
