//! Order Manager — Authoritative Order Registry
//!
//! Sole authority over order identity and status: allocates ids,
//! enforces legal lifecycle transitions, and drives orders through the
//! Connector. All mutation happens under one coarse registry lock;
//! the lock is never held while talking to the Connector, so the
//! manager cannot deadlock against the worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::domain::events::{OutboundCommand, StatusUpdate, VenueStatus};
use crate::domain::order::{Order, OrderError, OrderId, OrderStatus, Side};
use crate::usecases::connector::Connector;

/// Owns the canonical order records. Callers only ever get copies.
pub struct OrderManager {
    connector: Arc<Connector>,
    orders: Mutex<HashMap<OrderId, Order>>,
    next_id: AtomicU64,
}

impl OrderManager {
    /// Create a manager driving orders through the given connector.
    pub fn new(connector: Arc<Connector>) -> Self {
        Self {
            connector,
            orders: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// The registry stays consistent even across a poisoning panic:
    /// every transition is validated before any field is touched.
    fn registry(&self) -> MutexGuard<'_, HashMap<OrderId, Order>> {
        self.orders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a new order and submit it to the venue.
    ///
    /// The order is always recorded, even when submission is refused:
    /// a refused submission transitions it straight to REJECTED so the
    /// caller can look the outcome up by id.
    pub fn create_order(
        &self,
        symbol: &str,
        price: Decimal,
        qty: u64,
        side: Side,
    ) -> OrderId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let order = Order::new(id, symbol, side, price, qty);
        let command = OutboundCommand::Submit {
            id,
            symbol: symbol.to_string(),
            side,
            price,
            qty,
        };

        {
            let mut registry = self.registry();
            log_order("CREATE", &order);
            registry.insert(id, order);
        }

        // Registry lock released before touching the connector.
        if let Err(e) = self.connector.submit_order(command) {
            warn!(order_id = id, error = %e, "submission refused, recording rejection");
            let mut registry = self.registry();
            if let Some(order) = registry.get_mut(&id) {
                let _ = order.apply_venue_status(VenueStatus::Rejected, 0);
                log_order("REJECT", order);
            }
        }

        id
    }

    /// Cancel the working remainder of an order.
    ///
    /// Legal only from PENDING and PARTIALLY_FILLED; terminal orders are
    /// left untouched and the refusal is reported to the caller.
    pub fn cancel_order(&self, id: OrderId) -> Result<(), OrderError> {
        let result = {
            let mut registry = self.registry();
            match registry.get_mut(&id) {
                None => Err(OrderError::NotFound(id)),
                Some(order) => order.cancel().map(|()| log_order("CANCEL", order)),
            }
        };

        match result {
            Ok(()) => {
                if let Err(e) =
                    self.connector.submit_order(OutboundCommand::Cancel { id })
                {
                    warn!(order_id = id, error = %e, "cancel command not delivered");
                }
                Ok(())
            }
            Err(e) => {
                warn!(order_id = id, error = %e, "cancel refused");
                Err(e)
            }
        }
    }

    /// Replace price and quantity of a pending order, keeping its id.
    ///
    /// Disallowed once any fill exists — reconciling fill history
    /// against a resized order is the venue's job, not ours.
    pub fn modify_order(
        &self,
        id: OrderId,
        new_price: Decimal,
        new_qty: u64,
    ) -> Result<(), OrderError> {
        let result = {
            let mut registry = self.registry();
            match registry.get_mut(&id) {
                None => Err(OrderError::NotFound(id)),
                Some(order) => order
                    .modify(new_price, new_qty)
                    .map(|()| log_order("MODIFY", order)),
            }
        };

        match result {
            Ok(()) => {
                let command = OutboundCommand::Modify {
                    id,
                    price: new_price,
                    qty: new_qty,
                };
                if let Err(e) = self.connector.submit_order(command) {
                    warn!(order_id = id, error = %e, "modify command not delivered");
                }
                Ok(())
            }
            Err(e) => {
                warn!(order_id = id, error = %e, "modify refused");
                Err(e)
            }
        }
    }

    /// Apply one venue status event — the only externally-driven
    /// mutation path. Returns the resulting status on success.
    pub fn apply_status_update(
        &self,
        update: &StatusUpdate,
    ) -> Result<OrderStatus, OrderError> {
        let mut registry = self.registry();
        let Some(order) = registry.get_mut(&update.order_id) else {
            warn!(order_id = update.order_id, "status update for unknown order");
            return Err(OrderError::NotFound(update.order_id));
        };

        match order.apply_venue_status(update.status, update.filled_delta) {
            Ok(()) => {
                log_order("UPDATE", order);
                Ok(order.status)
            }
            Err(e @ OrderError::FillOverflow { .. }) => {
                // Venue/protocol inconsistency the registry cannot repair.
                error!(order_id = order.id, error = %e, "fill exceeds requested quantity");
                Err(e)
            }
            Err(e) => {
                warn!(order_id = order.id, error = %e, "status update ignored");
                Err(e)
            }
        }
    }

    /// Drain the connector's inbound status queue and apply each event.
    /// Returns the number of updates applied.
    pub fn process_status_updates(&self) -> usize {
        let mut applied = 0;
        while let Some(update) = self.connector.next_order_status() {
            if self.apply_status_update(&update).is_ok() {
                applied += 1;
            }
        }
        applied
    }

    /// Orders still working at the venue (PENDING ∪ PARTIALLY_FILLED).
    pub fn active_orders(&self) -> Vec<Order> {
        self.registry()
            .values()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect()
    }

    /// Fully executed orders.
    pub fn filled_orders(&self) -> Vec<Order> {
        self.registry()
            .values()
            .filter(|o| o.status == OrderStatus::Filled)
            .cloned()
            .collect()
    }

    /// Whether an order exists and is still working.
    pub fn is_active(&self, id: OrderId) -> bool {
        self.registry()
            .get(&id)
            .is_some_and(|o| o.status.is_active())
    }

    /// Copy of one order record, if it exists.
    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.registry().get(&id).cloned()
    }

    /// Cancel every active order (graceful-shutdown path). Returns the
    /// number of orders canceled.
    pub fn cancel_all(&self) -> usize {
        let active: Vec<OrderId> = self
            .registry()
            .values()
            .filter(|o| o.status.is_active())
            .map(|o| o.id)
            .collect();

        let mut canceled = 0;
        for id in active {
            if self.cancel_order(id).is_ok() {
                canceled += 1;
            }
        }
        info!(canceled, "active orders canceled");
        canceled
    }

    /// Emit one summary line per order through the logger.
    pub fn log_summary(&self) {
        let registry = self.registry();
        info!(orders = registry.len(), "order summary");
        for order in registry.values() {
            log_order("SUMMARY", order);
        }
    }
}

/// One structured line per order lifecycle event.
fn log_order(action: &str, order: &Order) {
    info!(
        action,
        order_id = order.id,
        symbol = %order.symbol,
        side = %order.side,
        price = %order.limit_price,
        qty = order.requested_qty,
        filled_qty = order.filled_qty,
        status = %order.status,
        created_at = %order.created_at,
        "order event"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rust_decimal_macros::dec;

    use crate::config::ConnectorConfig;
    use crate::domain::events::MarketDataTick;
    use crate::ports::protocol::{
        ConnectError, DisconnectError, PollError, ProtocolAdapter, SendError,
        VenueCredentials,
    };

    /// Adapter that never connects — the manager under test only ever
    /// sees a DISCONNECTED connector.
    struct DownAdapter;

    #[async_trait::async_trait]
    impl ProtocolAdapter for DownAdapter {
        async fn connect(
            &mut self,
            _credentials: &VenueCredentials,
        ) -> Result<(), ConnectError> {
            Err(ConnectError::Transport("down".to_string()))
        }

        async fn disconnect(&mut self) -> Result<(), DisconnectError> {
            Ok(())
        }

        async fn send_order(
            &mut self,
            _command: &OutboundCommand,
        ) -> Result<(), SendError> {
            Err(SendError::NoSession)
        }

        async fn subscribe(&mut self, _symbol: &str) -> Result<(), SendError> {
            Err(SendError::NoSession)
        }

        async fn poll_market_data(
            &mut self,
            _timeout: Duration,
        ) -> Result<Option<MarketDataTick>, PollError> {
            Err(PollError::NoSession)
        }

        async fn poll_order_status(
            &mut self,
            _timeout: Duration,
        ) -> Result<Option<StatusUpdate>, PollError> {
            Err(PollError::NoSession)
        }
    }

    fn manager() -> OrderManager {
        let connector = Arc::new(Connector::new(
            Box::new(DownAdapter),
            VenueCredentials {
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
            },
            &ConnectorConfig::default(),
        ));
        OrderManager::new(connector)
    }

    #[tokio::test]
    async fn ids_are_sequential_starting_at_one() {
        let m = manager();
        let first = m.create_order("AAPL", dec!(150.5), 100, Side::Buy);
        let second = m.create_order("GOOG", dec!(2725.0), 50, Side::Sell);
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn create_while_disconnected_records_rejection() {
        let m = manager();
        let id = m.create_order("AAPL", dec!(150.5), 100, Side::Buy);

        let order = m.order(id).expect("order recorded");
        assert_eq!(order.status, OrderStatus::Rejected);
        assert!(!m.is_active(id));
        assert!(m.active_orders().is_empty());
    }

    #[tokio::test]
    async fn cancel_unknown_order_reports_not_found() {
        let m = manager();
        assert_eq!(m.cancel_order(99), Err(OrderError::NotFound(99)));
    }

    #[tokio::test]
    async fn modify_unknown_order_reports_not_found() {
        let m = manager();
        assert_eq!(m.modify_order(99, dec!(1), 1), Err(OrderError::NotFound(99)));
    }

    #[tokio::test]
    async fn cancel_of_rejected_order_is_refused_and_mutates_nothing() {
        let m = manager();
        let id = m.create_order("AAPL", dec!(150.5), 100, Side::Buy);
        // Rejected at create time (disconnected).
        let err = m.cancel_order(id).unwrap_err();
        assert_eq!(
            err,
            OrderError::NotCancelable {
                id,
                status: OrderStatus::Rejected
            }
        );
        assert_eq!(m.order(id).unwrap().status, OrderStatus::Rejected);
    }

    #[tokio::test]
    async fn status_update_for_unknown_order_reports_not_found() {
        let m = manager();
        let update = StatusUpdate {
            order_id: 7,
            status: VenueStatus::Filled,
            filled_delta: 100,
            reason: None,
        };
        assert_eq!(m.apply_status_update(&update), Err(OrderError::NotFound(7)));
    }
}
