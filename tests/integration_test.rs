//! Integration Tests - End-to-end Gateway Component Testing
//!
//! Tests the interaction between the order manager, the connector worker
//! and a mocked protocol adapter. Uses mockall for trait mocking and
//! tokio::test for async tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockall::mock;
use mockall::predicate::*;
use rust_decimal_macros::dec;

use venue_gateway::config::ConnectorConfig;
use venue_gateway::domain::events::{StatusUpdate, VenueStatus};
use venue_gateway::domain::order::{OrderError, OrderStatus, Side};
use venue_gateway::ports::protocol::{ConnectError, SendError, VenueCredentials};
use venue_gateway::usecases::{Connector, ConnectorError, ConnectorState, OrderManager};

// ---- Mock Definitions ----

mock! {
    pub Adapter {}

    #[async_trait::async_trait]
    impl venue_gateway::ports::protocol::ProtocolAdapter for Adapter {
        async fn connect(
            &mut self,
            credentials: &venue_gateway::ports::protocol::VenueCredentials,
        ) -> Result<(), venue_gateway::ports::protocol::ConnectError>;

        async fn disconnect(
            &mut self,
        ) -> Result<(), venue_gateway::ports::protocol::DisconnectError>;

        async fn send_order(
            &mut self,
            command: &venue_gateway::domain::events::OutboundCommand,
        ) -> Result<(), venue_gateway::ports::protocol::SendError>;

        async fn subscribe(
            &mut self,
            symbol: &str,
        ) -> Result<(), venue_gateway::ports::protocol::SendError>;

        async fn poll_market_data(
            &mut self,
            timeout: Duration,
        ) -> Result<
            Option<venue_gateway::domain::events::MarketDataTick>,
            venue_gateway::ports::protocol::PollError,
        >;

        async fn poll_order_status(
            &mut self,
            timeout: Duration,
        ) -> Result<
            Option<venue_gateway::domain::events::StatusUpdate>,
            venue_gateway::ports::protocol::PollError,
        >;
    }
}

// ---- Test Helpers ----

type UpdateQueue = Arc<Mutex<VecDeque<StatusUpdate>>>;

fn credentials() -> VenueCredentials {
    VenueCredentials {
        api_key: "test-key".to_string(),
        api_secret: "test-secret".to_string(),
    }
}

/// A mock adapter that connects, accepts everything, and serves status
/// updates from a shared queue the test can feed.
fn online_adapter(updates: UpdateQueue) -> MockAdapter {
    let mut mock = MockAdapter::new();
    mock.expect_connect().returning(|_| Ok(()));
    mock.expect_disconnect().returning(|| Ok(()));
    mock.expect_send_order().returning(|_| Ok(()));
    mock.expect_subscribe().returning(|_| Ok(()));
    mock.expect_poll_market_data().returning(|_| Ok(None));
    mock.expect_poll_order_status()
        .returning(move |_| Ok(updates.lock().unwrap().pop_front()));
    mock
}

fn connector(mock: MockAdapter) -> Arc<Connector> {
    Arc::new(Connector::new(
        Box::new(mock),
        credentials(),
        &ConnectorConfig::default(),
    ))
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Drive the manager's update pump until `check` passes or 2s elapse.
async fn pump_until(manager: &OrderManager, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        manager.process_status_updates();
        if check() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within 2s"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ---- Integration Tests ----

#[tokio::test]
async fn test_connect_disconnect_lifecycle() {
    let c = connector(online_adapter(Arc::default()));

    assert_eq!(c.state(), ConnectorState::Disconnected);
    c.connect(CONNECT_TIMEOUT).await.unwrap();
    assert_eq!(c.state(), ConnectorState::Connected);

    c.disconnect().await;
    assert_eq!(c.state(), ConnectorState::Disconnected);

    // The instance stays reusable for a fresh session.
    c.connect(CONNECT_TIMEOUT).await.unwrap();
    assert_eq!(c.state(), ConnectorState::Connected);
    c.disconnect().await;
}

#[tokio::test]
async fn test_rejected_logon_surfaces_to_caller() {
    let mut mock = MockAdapter::new();
    mock.expect_connect().returning(|_| {
        Err(ConnectError::LogonRejected("bad comp id".to_string()))
    });

    let c = connector(mock);
    let err = c.connect(CONNECT_TIMEOUT).await.unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::Connect(ConnectError::LogonRejected(_))
    ));
    assert_eq!(c.state(), ConnectorState::Disconnected);
}

#[tokio::test]
async fn test_concurrent_connect_establishes_one_session() {
    let mut mock = MockAdapter::new();
    // The handshake must run exactly once; the losing caller observes
    // the already-connected state as a no-op.
    mock.expect_connect().times(1).returning(|_| Ok(()));
    mock.expect_disconnect().returning(|| Ok(()));
    mock.expect_poll_market_data().returning(|_| Ok(None));
    mock.expect_poll_order_status().returning(|_| Ok(None));

    let c = connector(mock);
    let (first, second) =
        tokio::join!(c.connect(CONNECT_TIMEOUT), c.connect(CONNECT_TIMEOUT));
    first.unwrap();
    second.unwrap();
    assert_eq!(c.state(), ConnectorState::Connected);
    c.disconnect().await;
}

#[tokio::test]
async fn test_order_fill_lifecycle() {
    let updates: UpdateQueue = Arc::default();
    let c = connector(online_adapter(Arc::clone(&updates)));
    c.connect(CONNECT_TIMEOUT).await.unwrap();

    let manager = OrderManager::new(Arc::clone(&c));
    let id = manager.create_order("AAPL", dec!(150.5), 100, Side::Buy);
    assert_eq!(manager.order(id).unwrap().status, OrderStatus::Pending);

    // Venue acknowledges, then fills in two executions.
    {
        let mut q = updates.lock().unwrap();
        q.push_back(StatusUpdate {
            order_id: id,
            status: VenueStatus::Acknowledged,
            filled_delta: 0,
            reason: None,
        });
        q.push_back(StatusUpdate {
            order_id: id,
            status: VenueStatus::PartiallyFilled,
            filled_delta: 40,
            reason: None,
        });
        q.push_back(StatusUpdate {
            order_id: id,
            status: VenueStatus::Filled,
            filled_delta: 60,
            reason: None,
        });
    }

    pump_until(&manager, || {
        manager.order(id).is_some_and(|o| o.status == OrderStatus::Filled)
    })
    .await;

    let order = manager.order(id).unwrap();
    assert_eq!(order.filled_qty, 100);
    assert_eq!(order.remaining_qty(), 0);
    assert!(manager.active_orders().is_empty());
    assert_eq!(manager.filled_orders().len(), 1);

    c.disconnect().await;
}

#[tokio::test]
async fn test_double_cancel_refused_without_corruption() {
    let c = connector(online_adapter(Arc::default()));
    c.connect(CONNECT_TIMEOUT).await.unwrap();

    let manager = OrderManager::new(Arc::clone(&c));
    let id = manager.create_order("GOOG", dec!(2725.0), 50, Side::Sell);

    manager.cancel_order(id).unwrap();
    assert_eq!(manager.order(id).unwrap().status, OrderStatus::Canceled);

    // Second cancel of the same order is refused.
    let err = manager.cancel_order(id).unwrap_err();
    assert_eq!(
        err,
        OrderError::NotCancelable {
            id,
            status: OrderStatus::Canceled
        }
    );
    assert_eq!(manager.order(id).unwrap().status, OrderStatus::Canceled);

    c.disconnect().await;
}

#[tokio::test]
async fn test_delivery_failure_becomes_rejection_event() {
    let mut mock = MockAdapter::new();
    mock.expect_connect().returning(|_| Ok(()));
    mock.expect_disconnect().returning(|| Ok(()));
    mock.expect_poll_market_data().returning(|_| Ok(None));
    mock.expect_poll_order_status().returning(|_| Ok(None));
    // Every delivery attempt fails at the wire.
    mock.expect_send_order()
        .returning(|_| Err(SendError::Transport("link reset".to_string())));

    let c = connector(mock);
    c.connect(CONNECT_TIMEOUT).await.unwrap();

    let manager = OrderManager::new(Arc::clone(&c));
    let id = manager.create_order("AAPL", dec!(150.5), 100, Side::Buy);

    // The failure travels back through the status queue, not as an
    // error from create_order.
    pump_until(&manager, || {
        manager.order(id).is_some_and(|o| o.status == OrderStatus::Rejected)
    })
    .await;
    assert!(!manager.is_active(id));

    c.disconnect().await;
}

#[tokio::test]
async fn test_subscriptions_reannounced_per_session() {
    let mut mock = MockAdapter::new();
    mock.expect_connect().times(2).returning(|_| Ok(()));
    mock.expect_disconnect().returning(|| Ok(()));
    mock.expect_poll_market_data().returning(|_| Ok(None));
    mock.expect_poll_order_status().returning(|_| Ok(None));
    // One recorded symbol, announced once per fresh session.
    mock.expect_subscribe()
        .with(eq("AAPL"))
        .times(2)
        .returning(|_| Ok(()));

    let c = connector(mock);
    c.subscribe("AAPL").unwrap();

    c.connect(CONNECT_TIMEOUT).await.unwrap();
    c.disconnect().await;
    c.connect(CONNECT_TIMEOUT).await.unwrap();
    c.disconnect().await;
}

#[tokio::test]
async fn test_create_while_disconnected_records_rejection() {
    let c = connector(MockAdapter::new());
    let manager = OrderManager::new(Arc::clone(&c));

    let id = manager.create_order("AAPL", dec!(150.5), 100, Side::Buy);
    let order = manager.order(id).unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
    assert!(manager.active_orders().is_empty());
}

#[tokio::test]
async fn test_full_outbound_queue_records_rejection() {
    // Single-slot outbound queue and a long worker pause, so a queued
    // command stays queued for the duration of the test.
    let config = ConnectorConfig {
        poll_interval_ms: 2_000,
        poll_timeout_ms: 1,
        queue_capacity: 1,
        connect_timeout_ms: 2_000,
    };
    let c = Arc::new(Connector::new(
        Box::new(online_adapter(Arc::default())),
        credentials(),
        &config,
    ));
    c.connect(CONNECT_TIMEOUT).await.unwrap();

    // Let the worker finish its first iteration and enter the pause.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let manager = OrderManager::new(Arc::clone(&c));
    let queued = manager.create_order("AAPL", dec!(150.5), 100, Side::Buy);
    let overflow = manager.create_order("MSFT", dec!(410.0), 25, Side::Buy);

    // The first submission occupies the only queue slot; the second is
    // refused with QueueFull and reconciled through the registry.
    assert!(manager.is_active(queued));
    assert_eq!(manager.order(overflow).unwrap().status, OrderStatus::Rejected);
    assert!(!manager.is_active(overflow));

    c.disconnect().await;
}

#[tokio::test]
async fn test_graceful_shutdown_cancels_working_orders() {
    let c = connector(online_adapter(Arc::default()));
    c.connect(CONNECT_TIMEOUT).await.unwrap();

    let manager = OrderManager::new(Arc::clone(&c));
    let a = manager.create_order("AAPL", dec!(150.5), 100, Side::Buy);
    let b = manager.create_order("MSFT", dec!(410.0), 25, Side::Buy);

    let canceled = manager.cancel_all();
    assert_eq!(canceled, 2);
    assert_eq!(manager.order(a).unwrap().status, OrderStatus::Canceled);
    assert_eq!(manager.order(b).unwrap().status, OrderStatus::Canceled);
    assert!(manager.active_orders().is_empty());

    c.disconnect().await;
}
