//! Use Cases Layer - Gateway Orchestration
//!
//! The two orchestrators that make up the gateway core:
//! - `Connector`: connection lifecycle, worker task, queue fan-out
//! - `OrderManager`: order registry, id allocation, legal transitions

pub mod connector;
pub mod order_manager;

pub use connector::{Connector, ConnectorError, ConnectorState};
pub use order_manager::OrderManager;
