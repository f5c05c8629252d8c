//! Venue Gateway — Entry Point
//!
//! Initializes configuration, logging, the venue connection and the
//! order manager. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate (protocol selection fails here)
//! 2. Init tracing (JSON structured logging)
//! 3. Load venue credentials from env vars (VENUE_API_KEY, VENUE_API_SECRET)
//! 4. Build the protocol adapter (FIX or WebSocket) from config
//! 5. Create Connector + OrderManager
//! 6. Record market-data subscriptions, then connect
//! 7. Spawn health server on :9090 (/live + /ready)
//! 8. Spawn event pump (status updates + market data fan-in)
//! 9. Wait for SIGINT → graceful shutdown (cancel→drain→disconnect)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

mod adapters;
mod config;
mod domain;
mod ports;
mod usecases;

use adapters::protocols::build_adapter;
use ports::protocol::VenueCredentials;
use usecases::{Connector, OrderManager};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.gateway.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.gateway.name,
        version = env!("CARGO_PKG_VERSION"),
        protocol = %config.venue.protocol,
        endpoint = %config.venue.endpoint,
        "Starting venue gateway"
    );

    // ── 3. Shutdown signal channels ─────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let (health_tx, health_rx) = watch::channel(true);

    // ── 4. Credentials from env, adapter from config ────────
    let credentials = VenueCredentials::from_env()
        .context("Failed to load venue credentials from env")?;
    let adapter = build_adapter(&config.venue)
        .context("Failed to build protocol adapter")?;

    // ── 5. Connector + order manager ────────────────────────
    let connector = Arc::new(Connector::new(
        adapter,
        credentials,
        &config.connector,
    ));
    let manager = Arc::new(OrderManager::new(Arc::clone(&connector)));

    // ── 6. Subscriptions first, so the fresh session announces
    //       them, then connect ───────────────────────────────
    for symbol in &config.gateway.symbols {
        if let Err(e) = connector.subscribe(symbol) {
            warn!(%symbol, error = %e, "subscription not recorded");
        }
    }

    let connect_timeout = Duration::from_millis(config.connector.connect_timeout_ms);
    connector
        .connect(connect_timeout)
        .await
        .context("Failed to establish venue link")?;

    // ── 7. Health server on :9090 ───────────────────────────
    let health_handle = config.health.enabled.then(|| {
        tokio::spawn(serve_health(health_rx, config.health.bind_address.clone()))
    });

    // ── 8. Event pump: drain inbound queues continuously ────
    let pump_shutdown = shutdown_tx.subscribe();
    let pump_manager = Arc::clone(&manager);
    let pump_connector = Arc::clone(&connector);
    let pump_interval = Duration::from_millis(config.connector.poll_interval_ms);
    let pump_handle = tokio::spawn(run_event_pump(
        pump_manager,
        pump_connector,
        pump_interval,
        pump_shutdown,
    ));

    info!("Gateway is running");

    // ── 9. Wait for SIGINT ──────────────────────────────────
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("SIGINT received, initiating graceful shutdown");
        }
    }

    // ── Graceful shutdown (cancel→drain→disconnect) ─────────

    // 1. Readiness probe → 503, stop the pump
    let _ = health_tx.send(false);
    let _ = shutdown_tx.send(());

    // 2. Cancel all working orders
    let canceled = manager.cancel_all();
    info!(canceled, "Working orders canceled");

    // 3. Let the pump apply any final venue responses
    let _ = tokio::time::timeout(Duration::from_secs(5), pump_handle).await;
    manager.process_status_updates();

    // 4. Tear the venue link down
    connector.disconnect().await;

    // 5. Final per-order summary, stop health server
    manager.log_summary();
    if let Some(handle) = health_handle {
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Pump inbound events from the connector queues into the gateway.
///
/// Status updates mutate the order registry through the manager;
/// market data is logged at debug level for downstream consumers to
/// replace with their own sink.
async fn run_event_pump(
    manager: Arc<OrderManager>,
    connector: Arc<Connector>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!("Event pump received shutdown signal");
                break;
            }
            () = tokio::time::sleep(interval) => {
                manager.process_status_updates();
                while let Some(tick) = connector.next_market_data() {
                    debug!(
                        symbol = %tick.symbol,
                        bid = ?tick.bid,
                        ask = ?tick.ask,
                        last = ?tick.last,
                        "market data tick"
                    );
                }
            }
        }
    }
}

/// Serve health endpoints.
///
/// - `/live`  — Liveness probe: 200 if process is running
/// - `/ready` — Readiness probe: 503 during graceful shutdown
async fn serve_health(health_rx: watch::Receiver<bool>, addr: String) -> Result<()> {
    use axum::{extract::State, http::StatusCode, routing::get, Router};

    let app = Router::new()
        .route("/live", get(|| async { StatusCode::OK }))
        .route(
            "/ready",
            get(
                move |State(rx): State<watch::Receiver<bool>>| async move {
                    if *rx.borrow() {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                },
            ),
        )
        .with_state(health_rx);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Health server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
