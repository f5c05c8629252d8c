//! Queue Payloads — Outbound Commands and Inbound Events
//!
//! The types that cross the Connector's queues. Outbound commands flow
//! caller → worker → adapter; inbound events flow adapter → worker →
//! consumer. Both directions are strict FIFO, and commands for the same
//! order never reorder because they share a single outbound queue.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::{OrderId, Side};

/// A queued order action destined for the protocol adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundCommand {
    /// Send a new order to the venue.
    Submit {
        id: OrderId,
        symbol: String,
        side: Side,
        price: Decimal,
        qty: u64,
    },
    /// Cancel the working remainder of an order.
    Cancel { id: OrderId },
    /// Replace price and quantity of a pending order.
    Modify { id: OrderId, price: Decimal, qty: u64 },
}

impl OutboundCommand {
    /// The order this command acts on. Used to attribute delivery
    /// failures back to a registry entry.
    pub fn order_id(&self) -> OrderId {
        match self {
            Self::Submit { id, .. } | Self::Cancel { id } | Self::Modify { id, .. } => *id,
        }
    }
}

/// Order state as reported by the venue, before the registry maps it
/// onto the local lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VenueStatus {
    /// Order accepted and working; no fill yet.
    Acknowledged,
    /// Some quantity executed.
    PartiallyFilled,
    /// Fully executed.
    Filled,
    /// Canceled (by us or by the venue).
    Canceled,
    /// Rejected by the venue, or delivery to the venue failed.
    Rejected,
}

/// An order-status event pulled from the adapter's inbound side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// The order the update refers to.
    pub order_id: OrderId,
    /// Venue-reported status.
    pub status: VenueStatus,
    /// Newly executed quantity carried by this event (not cumulative).
    pub filled_delta: u64,
    /// Free-form venue reason, populated on rejections.
    pub reason: Option<String>,
}

impl StatusUpdate {
    /// Synthesize the rejection event the Connector worker pushes when
    /// the adapter fails to deliver a command.
    pub fn delivery_failure(command: &OutboundCommand, reason: String) -> Self {
        Self {
            order_id: command.order_id(),
            status: VenueStatus::Rejected,
            filled_delta: 0,
            reason: Some(reason),
        }
    }
}

/// A market-data tick pulled from the adapter's inbound side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataTick {
    /// Instrument symbol.
    pub symbol: String,
    /// Best bid, if the venue published one.
    pub bid: Option<Decimal>,
    /// Best ask, if the venue published one.
    pub ask: Option<Decimal>,
    /// Last traded price.
    pub last: Option<Decimal>,
    /// Venue timestamp in Unix milliseconds.
    pub timestamp_ms: u64,
}
