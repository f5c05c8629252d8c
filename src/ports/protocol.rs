//! Protocol Adapter Port — One Wire Protocol Behind One Trait
//!
//! Defines the trait the Connector drives: connect, disconnect, send a
//! serialized order, and poll for inbound market data / order status.
//!
//! Key design decisions:
//! - Poll calls are bounded-blocking with a caller-supplied timeout, so
//!   the worker loop always regains control within one poll interval.
//! - Every method is invoked only from the Connector's single worker
//!   task, so implementations carry no internal locking.
//! - No retry logic lives here; retry policy belongs to whoever calls
//!   `Connector::connect`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;

use crate::domain::events::{MarketDataTick, OutboundCommand, StatusUpdate};

/// Venue credentials loaded from environment variables.
///
/// Required env vars: VENUE_API_KEY, VENUE_API_SECRET.
/// These MUST be set in `.env` (never committed to git).
#[derive(Debug, Clone)]
pub struct VenueCredentials {
    /// API key from VENUE_API_KEY.
    pub api_key: String,
    /// API secret from VENUE_API_SECRET (never logged).
    pub api_secret: String,
}

impl VenueCredentials {
    /// Load credentials from environment variables.
    ///
    /// A key that is empty or contains whitespace is a configuration
    /// error reported here, not a lazy connect failure later.
    pub fn from_env() -> Result<Self> {
        let api_key =
            std::env::var("VENUE_API_KEY").context("VENUE_API_KEY not set")?;
        let api_secret =
            std::env::var("VENUE_API_SECRET").context("VENUE_API_SECRET not set")?;

        let creds = Self { api_key, api_secret };
        creds.validate()?;
        Ok(creds)
    }

    /// Reject malformed credentials before any connect attempt.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.api_key.trim().is_empty(),
            "VENUE_API_KEY must not be empty"
        );
        anyhow::ensure!(
            !self.api_key.chars().any(char::is_whitespace),
            "VENUE_API_KEY must not contain whitespace"
        );
        anyhow::ensure!(
            !self.api_secret.trim().is_empty(),
            "VENUE_API_SECRET must not be empty"
        );
        Ok(())
    }
}

/// Failure to establish a protocol session.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("venue rejected logon: {0}")]
    LogonRejected(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Failure to tear a session down cleanly.
#[derive(Debug, Error)]
pub enum DisconnectError {
    #[error("transport failure during teardown: {0}")]
    Transport(String),
}

/// Failure to deliver an outbound command on an established session.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("no active session")]
    NoSession,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("encoding failure: {0}")]
    Encoding(String),
}

/// Failure while polling the inbound side. Treated by the worker as a
/// fatal session error (the link is torn down and re-established by a
/// fresh `connect`).
#[derive(Debug, Error)]
pub enum PollError {
    #[error("no active session")]
    NoSession,

    #[error("transport failure: {0}")]
    Transport(String),
}

/// One wire protocol to one venue.
///
/// Implementors own the transport and the message grammar; the rest of
/// the gateway only ever sees typed commands and events. Selected at
/// Connector construction — an unsupported protocol name never gets as
/// far as this trait.
#[async_trait]
pub trait ProtocolAdapter: Send {
    /// Perform the protocol handshake.
    async fn connect(
        &mut self,
        credentials: &VenueCredentials,
    ) -> Result<(), ConnectError>;

    /// Tear the session down. Safe to call without a live session.
    async fn disconnect(&mut self) -> Result<(), DisconnectError>;

    /// Deliver one outbound order command.
    async fn send_order(&mut self, command: &OutboundCommand)
        -> Result<(), SendError>;

    /// Announce interest in market data for a symbol.
    async fn subscribe(&mut self, symbol: &str) -> Result<(), SendError>;

    /// Pull the next market-data tick, waiting at most `timeout`.
    async fn poll_market_data(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<MarketDataTick>, PollError>;

    /// Pull the next order-status update, waiting at most `timeout`.
    async fn poll_order_status(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<StatusUpdate>, PollError>;
}

impl std::fmt::Debug for dyn ProtocolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ProtocolAdapter")
    }
}
