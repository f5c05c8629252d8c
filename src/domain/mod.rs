//! Domain layer - Order lifecycle and queue payloads.
//!
//! Pure business types for the gateway: the order entity with its status
//! machine, and the command/event types that cross the Connector queues.
//! No I/O or external dependencies here (hexagonal inner ring); every
//! transition rule is testable in isolation.

pub mod events;
pub mod order;

// Re-export core types for convenience
pub use events::{MarketDataTick, OutboundCommand, StatusUpdate, VenueStatus};
pub use order::{Order, OrderError, OrderId, OrderStatus, Side};
