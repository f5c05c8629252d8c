//! Connector — Connection Lifecycle and Queue Fan-Out
//!
//! Owns one `ProtocolAdapter`, the connection state machine and the
//! thread-safe queues between caller tasks and the single worker task.
//!
//! State machine:
//!
//! ```text
//! DISCONNECTED --connect()--> CONNECTING --handshake ok--> CONNECTED
//! CONNECTING   --handshake fails--> DISCONNECTED (error to caller)
//! CONNECTED    --disconnect() or fatal I/O--> DISCONNECTING --> DISCONNECTED
//! ```
//!
//! Concurrency discipline:
//! - Exactly one worker task per live session. `connect` and `disconnect`
//!   serialize on the worker slot, so concurrent calls cannot race a
//!   second worker into existence.
//! - The caller of `connect` blocks on a one-shot rendezvous until the
//!   worker reports the handshake outcome; it never observes CONNECTING
//!   as a final state.
//! - The worker checks the stop flag every iteration, so `disconnect`
//!   completes within one poll interval.
//! - Adapter failures inside the worker become inbound REJECTED events,
//!   never errors crossing the task boundary.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConnectorConfig;
use crate::domain::events::{MarketDataTick, OutboundCommand, StatusUpdate};
use crate::ports::protocol::{
    ConnectError, PollError, ProtocolAdapter, VenueCredentials,
};

/// Connection lifecycle of the venue link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl std::fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Disconnecting => write!(f, "DISCONNECTING"),
        }
    }
}

/// Failures surfaced by Connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("not connected")]
    NotConnected,

    #[error("outbound queue full")]
    QueueFull,

    #[error("connection worker exited before reporting an outcome")]
    WorkerGone,
}

/// Everything the worker task needs, cloned out of the Connector so the
/// task owns its handles outright.
struct WorkerContext {
    adapter: Arc<Mutex<Box<dyn ProtocolAdapter>>>,
    credentials: VenueCredentials,
    outbound_rx: Arc<Mutex<mpsc::Receiver<OutboundCommand>>>,
    subs_rx: Arc<Mutex<mpsc::Receiver<String>>>,
    subscriptions: Arc<StdMutex<Vec<String>>>,
    market_data_tx: mpsc::Sender<MarketDataTick>,
    status_tx: mpsc::Sender<StatusUpdate>,
    stop: Arc<AtomicBool>,
    state: Arc<StdMutex<ConnectorState>>,
    poll_interval: Duration,
    poll_timeout: Duration,
}

/// Single-venue link: one adapter, one worker, three queues.
pub struct Connector {
    adapter: Arc<Mutex<Box<dyn ProtocolAdapter>>>,
    credentials: VenueCredentials,
    state: Arc<StdMutex<ConnectorState>>,
    stop: Arc<AtomicBool>,
    /// Lifecycle lock: holder is the only task allowed to start or stop
    /// the worker. Also serializes concurrent `connect` calls.
    worker: Mutex<Option<JoinHandle<()>>>,
    outbound_tx: mpsc::Sender<OutboundCommand>,
    outbound_rx: Arc<Mutex<mpsc::Receiver<OutboundCommand>>>,
    subs_tx: mpsc::Sender<String>,
    subs_rx: Arc<Mutex<mpsc::Receiver<String>>>,
    subscriptions: Arc<StdMutex<Vec<String>>>,
    market_data_tx: mpsc::Sender<MarketDataTick>,
    market_data_rx: StdMutex<mpsc::Receiver<MarketDataTick>>,
    status_tx: mpsc::Sender<StatusUpdate>,
    status_rx: StdMutex<mpsc::Receiver<StatusUpdate>>,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl Connector {
    /// Create a connector around an already-built adapter.
    ///
    /// Protocol selection happened upstream in the adapter factory;
    /// by the time a Connector exists the configuration is known-good.
    pub fn new(
        adapter: Box<dyn ProtocolAdapter>,
        credentials: VenueCredentials,
        config: &ConnectorConfig,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (subs_tx, subs_rx) = mpsc::channel(64);
        let (market_data_tx, market_data_rx) = mpsc::channel(capacity);
        let (status_tx, status_rx) = mpsc::channel(capacity);

        Self {
            adapter: Arc::new(Mutex::new(adapter)),
            credentials,
            state: Arc::new(StdMutex::new(ConnectorState::Disconnected)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            subs_tx,
            subs_rx: Arc::new(Mutex::new(subs_rx)),
            subscriptions: Arc::new(StdMutex::new(Vec::new())),
            market_data_tx,
            market_data_rx: StdMutex::new(market_data_rx),
            status_tx,
            status_rx: StdMutex::new(status_rx),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectorState {
        self.state
            .lock()
            .map_or(ConnectorState::Disconnected, |s| *s)
    }

    fn set_state(&self, next: ConnectorState) {
        set_state(&self.state, next);
    }

    /// Establish the venue link, blocking until the worker reports
    /// CONNECTED or the handshake fails.
    ///
    /// Idempotent: a call while already connected is a no-op. On expiry
    /// of `timeout` the half-started worker is stopped and a timeout
    /// error returned — the caller never sees a dangling CONNECTING.
    pub async fn connect(&self, timeout: Duration) -> Result<(), ConnectorError> {
        let mut worker_slot = self.worker.lock().await;

        if self.state() == ConnectorState::Connected {
            debug!("connect is a no-op, already connected");
            return Ok(());
        }
        // Reap a worker left behind by a fatal session error.
        if let Some(stale) = worker_slot.take() {
            let _ = stale.await;
        }

        self.set_state(ConnectorState::Connecting);
        self.stop.store(false, Ordering::Relaxed);

        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(run_worker(self.worker_context(), ready_tx));

        match tokio::time::timeout(timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => {
                self.set_state(ConnectorState::Connected);
                *worker_slot = Some(handle);
                info!(state = %ConnectorState::Connected, "venue link established");
                Ok(())
            }
            Ok(Ok(Err(e))) => {
                let _ = handle.await;
                self.set_state(ConnectorState::Disconnected);
                Err(ConnectorError::Connect(e))
            }
            Ok(Err(_)) => {
                handle.abort();
                let _ = handle.await;
                self.set_state(ConnectorState::Disconnected);
                Err(ConnectorError::WorkerGone)
            }
            Err(_) => {
                warn!(?timeout, "connect attempt timed out, aborting worker");
                self.stop.store(true, Ordering::Relaxed);
                handle.abort();
                let _ = handle.await;
                self.set_state(ConnectorState::Disconnected);
                Err(ConnectorError::Timeout(timeout))
            }
        }
    }

    /// Stop the worker and tear the link down. Safe to call when already
    /// disconnected; the instance is reusable for a fresh `connect`.
    pub async fn disconnect(&self) {
        let mut worker_slot = self.worker.lock().await;
        let Some(handle) = worker_slot.take() else {
            debug!("disconnect is a no-op, no worker running");
            return;
        };

        self.set_state(ConnectorState::Disconnecting);
        self.stop.store(true, Ordering::Relaxed);
        if let Err(e) = handle.await {
            warn!(error = %e, "worker join failed");
        }
        self.set_state(ConnectorState::Disconnected);
        info!(state = %ConnectorState::Disconnected, "venue link closed");
    }

    /// Enqueue an outbound command for the worker.
    ///
    /// The state check is point-in-time: a disconnect racing in after
    /// acceptance surfaces later as a delivery-failure rejection on the
    /// status queue, not as a submission error here.
    pub fn submit_order(&self, command: OutboundCommand) -> Result<(), ConnectorError> {
        if self.state() != ConnectorState::Connected {
            return Err(ConnectorError::NotConnected);
        }
        self.outbound_tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => ConnectorError::QueueFull,
            TrySendError::Closed(_) => ConnectorError::NotConnected,
        })
    }

    /// Record interest in a symbol's market data.
    ///
    /// The subscription is remembered for the life of the connector and
    /// re-announced on every fresh session, so a reconnect keeps the
    /// same data flowing.
    pub fn subscribe(&self, symbol: &str) -> Result<(), ConnectorError> {
        if let Ok(mut subs) = self.subscriptions.lock() {
            if !subs.iter().any(|s| s == symbol) {
                subs.push(symbol.to_string());
            }
        }
        if self.state() == ConnectorState::Connected {
            self.subs_tx
                .try_send(symbol.to_string())
                .map_err(|e| match e {
                    TrySendError::Full(_) => ConnectorError::QueueFull,
                    TrySendError::Closed(_) => ConnectorError::NotConnected,
                })?;
        }
        Ok(())
    }

    /// Non-blocking dequeue from the inbound market-data queue.
    pub fn next_market_data(&self) -> Option<MarketDataTick> {
        let Ok(mut rx) = self.market_data_rx.lock() else {
            return None;
        };
        rx.try_recv().ok()
    }

    /// Non-blocking dequeue from the inbound order-status queue.
    pub fn next_order_status(&self) -> Option<StatusUpdate> {
        let Ok(mut rx) = self.status_rx.lock() else {
            return None;
        };
        rx.try_recv().ok()
    }

    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            adapter: Arc::clone(&self.adapter),
            credentials: self.credentials.clone(),
            outbound_rx: Arc::clone(&self.outbound_rx),
            subs_rx: Arc::clone(&self.subs_rx),
            subscriptions: Arc::clone(&self.subscriptions),
            market_data_tx: self.market_data_tx.clone(),
            status_tx: self.status_tx.clone(),
            stop: Arc::clone(&self.stop),
            state: Arc::clone(&self.state),
            poll_interval: self.poll_interval,
            poll_timeout: self.poll_timeout,
        }
    }
}

fn set_state(state: &StdMutex<ConnectorState>, next: ConnectorState) {
    if let Ok(mut s) = state.lock() {
        *s = next;
    }
}

/// The per-session worker: handshake, rendezvous, then the drain/poll
/// loop until the stop flag or a fatal session error.
///
/// Holds the adapter lock for the whole session, which is what makes
/// "the adapter is only ever driven by one task" true by construction.
async fn run_worker(
    ctx: WorkerContext,
    ready_tx: oneshot::Sender<Result<(), ConnectError>>,
) {
    let mut adapter = ctx.adapter.lock().await;

    match adapter.connect(&ctx.credentials).await {
        Ok(()) => {
            // Exactly one outcome reaches the waiter; if it gave up
            // (timeout) the send fails and the stop flag ends us below.
            let _ = ready_tx.send(Ok(()));
        }
        Err(e) => {
            warn!(error = %e, "protocol handshake failed");
            set_state(&ctx.state, ConnectorState::Disconnected);
            let _ = ready_tx.send(Err(e));
            return;
        }
    }

    // Fresh session: re-announce every recorded subscription.
    let symbols: Vec<String> = ctx
        .subscriptions
        .lock()
        .map(|s| s.clone())
        .unwrap_or_default();
    for symbol in &symbols {
        if let Err(e) = adapter.subscribe(symbol).await {
            warn!(%symbol, error = %e, "subscription announce failed");
        }
    }

    let mut outbound = ctx.outbound_rx.lock().await;
    let mut subs = ctx.subs_rx.lock().await;
    let mut session_error: Option<PollError> = None;

    while !ctx.stop.load(Ordering::Relaxed) {
        // Subscriptions added while connected.
        while let Ok(symbol) = subs.try_recv() {
            if let Err(e) = adapter.subscribe(&symbol).await {
                warn!(%symbol, error = %e, "subscription announce failed");
            }
        }

        // Forward at most one command per iteration, FIFO preserved.
        if let Ok(command) = outbound.try_recv() {
            if let Err(e) = adapter.send_order(&command).await {
                warn!(
                    order_id = command.order_id(),
                    error = %e,
                    "command delivery failed, synthesizing rejection"
                );
                let update = StatusUpdate::delivery_failure(&command, e.to_string());
                if ctx.status_tx.try_send(update).is_err() {
                    warn!("status queue full, rejection event dropped");
                }
            }
        }

        match adapter.poll_market_data(ctx.poll_timeout).await {
            Ok(Some(tick)) => {
                if ctx.market_data_tx.try_send(tick).is_err() {
                    debug!("market data queue full, tick dropped");
                }
            }
            Ok(None) => {}
            Err(e) => {
                session_error = Some(e);
                break;
            }
        }

        match adapter.poll_order_status(ctx.poll_timeout).await {
            Ok(Some(update)) => {
                if ctx.status_tx.try_send(update).is_err() {
                    warn!("status queue full, update dropped");
                }
            }
            Ok(None) => {}
            Err(e) => {
                session_error = Some(e);
                break;
            }
        }

        tokio::time::sleep(ctx.poll_interval).await;
    }

    if let Some(e) = session_error {
        error!(error = %e, "fatal session error, tearing link down");
    }
    set_state(&ctx.state, ConnectorState::Disconnecting);
    if let Err(e) = adapter.disconnect().await {
        warn!(error = %e, "protocol teardown failed");
    }
    set_state(&ctx.state, ConnectorState::Disconnected);
}
