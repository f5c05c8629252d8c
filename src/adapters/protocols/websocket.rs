//! WebSocket-Style Protocol Adapter — JSON Frames over tungstenite
//!
//! Speaks a JSON message protocol to the venue over a single WebSocket:
//! an auth message on connect carrying the credentials, order commands
//! outbound, ticks and order-status events inbound, a close frame on
//! disconnect. The JSON grammar is owned by this adapter alone.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::domain::events::{MarketDataTick, OutboundCommand, StatusUpdate, VenueStatus};
use crate::domain::order::{OrderId, Side};
use crate::ports::protocol::{
    ConnectError, DisconnectError, PollError, ProtocolAdapter, SendError,
    VenueCredentials,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the venue's auth response.
const AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound JSON messages.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WsRequest<'a> {
    Auth {
        api_key: &'a str,
        api_secret: &'a str,
    },
    Subscribe {
        symbol: &'a str,
    },
    SubmitOrder {
        id: OrderId,
        symbol: &'a str,
        side: Side,
        price: Decimal,
        qty: u64,
    },
    CancelOrder {
        id: OrderId,
    },
    ModifyOrder {
        id: OrderId,
        price: Decimal,
        qty: u64,
    },
}

/// Inbound JSON messages.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsEvent {
    AuthResult {
        success: bool,
        #[serde(default)]
        reason: Option<String>,
    },
    Tick {
        symbol: String,
        #[serde(default)]
        bid: Option<Decimal>,
        #[serde(default)]
        ask: Option<Decimal>,
        #[serde(default)]
        last: Option<Decimal>,
        #[serde(default)]
        timestamp_ms: u64,
    },
    OrderStatus {
        order_id: OrderId,
        status: String,
        #[serde(default)]
        filled_delta: u64,
        #[serde(default)]
        reason: Option<String>,
    },
}

/// WebSocket adapter over tokio-tungstenite.
pub struct WebSocketAdapter {
    url: String,
    stream: Option<WsStream>,
    pending_md: VecDeque<MarketDataTick>,
    pending_status: VecDeque<StatusUpdate>,
}

impl WebSocketAdapter {
    /// Create an adapter for a `ws://` or `wss://` endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream: None,
            pending_md: VecDeque::new(),
            pending_status: VecDeque::new(),
        }
    }

    async fn send_json(&mut self, request: &WsRequest<'_>) -> Result<(), SendError> {
        let text = serde_json::to_string(request)
            .map_err(|e| SendError::Encoding(e.to_string()))?;
        let stream = self.stream.as_mut().ok_or(SendError::NoSession)?;
        stream
            .send(Message::Text(text))
            .await
            .map_err(|e| SendError::Transport(e.to_string()))
    }

    /// Read the next decodable event, waiting at most `timeout`.
    ///
    /// Pings are answered by tungstenite itself; undecodable text frames
    /// are skipped rather than tearing the session down.
    async fn read_event(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<WsEvent>, PollError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let stream = self.stream.as_mut().ok_or(PollError::NoSession)?;
            match tokio::time::timeout(remaining, stream.next()).await {
                Err(_) => return Ok(None),
                Ok(Some(Ok(Message::Text(text)))) => {
                    match serde_json::from_str::<WsEvent>(&text) {
                        Ok(event) => return Ok(Some(event)),
                        Err(e) => debug!(error = %e, "undecodable message skipped"),
                    }
                }
                Ok(Some(Ok(Message::Ping(data)))) => {
                    // Pong is queued automatically by tungstenite.
                    trace!(len = data.len(), "ping received");
                }
                Ok(Some(Ok(Message::Close(_)))) => {
                    return Err(PollError::Transport(
                        "venue closed the connection".to_string(),
                    ));
                }
                Ok(Some(Ok(_))) => {}
                Ok(Some(Err(e))) => {
                    return Err(PollError::Transport(e.to_string()));
                }
                Ok(None) => {
                    return Err(PollError::Transport("stream ended".to_string()));
                }
            }
        }
    }

    /// Route one event into the matching pending queue.
    fn buffer_event(&mut self, event: WsEvent) {
        match event {
            WsEvent::Tick {
                symbol,
                bid,
                ask,
                last,
                timestamp_ms,
            } => self.pending_md.push_back(MarketDataTick {
                symbol,
                bid,
                ask,
                last,
                timestamp_ms,
            }),
            WsEvent::OrderStatus {
                order_id,
                status,
                filled_delta,
                reason,
            } => match parse_status(&status) {
                Some(status) => self.pending_status.push_back(StatusUpdate {
                    order_id,
                    status,
                    filled_delta,
                    reason,
                }),
                None => debug!(order_id, status, "unknown order status skipped"),
            },
            WsEvent::AuthResult { .. } => {
                debug!("late auth result ignored");
            }
        }
    }
}

#[async_trait]
impl ProtocolAdapter for WebSocketAdapter {
    async fn connect(
        &mut self,
        credentials: &VenueCredentials,
    ) -> Result<(), ConnectError> {
        let (stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))?;
        self.stream = Some(stream);

        self.send_json(&WsRequest::Auth {
            api_key: &credentials.api_key,
            api_secret: &credentials.api_secret,
        })
        .await
        .map_err(|e| ConnectError::Transport(e.to_string()))?;

        // The session is live only once the venue confirms the auth.
        let deadline = Instant::now() + AUTH_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ConnectError::Transport(
                    "no auth response from venue".to_string(),
                ));
            }
            let event = self
                .read_event(remaining)
                .await
                .map_err(|e| ConnectError::Transport(e.to_string()))?;
            match event {
                Some(WsEvent::AuthResult { success: true, .. }) => {
                    debug!(url = %self.url, "WebSocket session authenticated");
                    return Ok(());
                }
                Some(WsEvent::AuthResult {
                    success: false,
                    reason,
                }) => {
                    return Err(ConnectError::InvalidCredentials(
                        reason.unwrap_or_else(|| "auth refused".to_string()),
                    ));
                }
                // Data arriving before the auth ack is kept, not dropped.
                Some(other) => self.buffer_event(other),
                None => {}
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), DisconnectError> {
        if let Some(mut stream) = self.stream.take() {
            // Best-effort close handshake.
            let _ = stream.close(None).await;
        }
        Ok(())
    }

    async fn send_order(
        &mut self,
        command: &OutboundCommand,
    ) -> Result<(), SendError> {
        let request = match command {
            OutboundCommand::Submit {
                id,
                symbol,
                side,
                price,
                qty,
            } => WsRequest::SubmitOrder {
                id: *id,
                symbol,
                side: *side,
                price: *price,
                qty: *qty,
            },
            OutboundCommand::Cancel { id } => WsRequest::CancelOrder { id: *id },
            OutboundCommand::Modify { id, price, qty } => WsRequest::ModifyOrder {
                id: *id,
                price: *price,
                qty: *qty,
            },
        };
        self.send_json(&request).await
    }

    async fn subscribe(&mut self, symbol: &str) -> Result<(), SendError> {
        self.send_json(&WsRequest::Subscribe { symbol }).await
    }

    async fn poll_market_data(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<MarketDataTick>, PollError> {
        if let Some(tick) = self.pending_md.pop_front() {
            return Ok(Some(tick));
        }
        if let Some(event) = self.read_event(timeout).await? {
            self.buffer_event(event);
        }
        Ok(self.pending_md.pop_front())
    }

    async fn poll_order_status(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<StatusUpdate>, PollError> {
        if let Some(update) = self.pending_status.pop_front() {
            return Ok(Some(update));
        }
        if let Some(event) = self.read_event(timeout).await? {
            self.buffer_event(event);
        }
        Ok(self.pending_status.pop_front())
    }
}

fn parse_status(status: &str) -> Option<VenueStatus> {
    match status {
        "acknowledged" => Some(VenueStatus::Acknowledged),
        "partially_filled" => Some(VenueStatus::PartiallyFilled),
        "filled" => Some(VenueStatus::Filled),
        "canceled" => Some(VenueStatus::Canceled),
        "rejected" => Some(VenueStatus::Rejected),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn submit_order_serializes_with_op_tag() {
        let request = WsRequest::SubmitOrder {
            id: 1,
            symbol: "AAPL",
            side: Side::Buy,
            price: dec!(150.5),
            qty: 100,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""op":"submit_order""#));
        assert!(json.contains(r#""symbol":"AAPL""#));
        assert!(json.contains(r#""price":"150.5""#));
    }

    #[test]
    fn order_status_event_deserializes() {
        let json = r#"{"type":"order_status","order_id":7,"status":"partially_filled","filled_delta":40}"#;
        let event: WsEvent = serde_json::from_str(json).unwrap();
        let WsEvent::OrderStatus {
            order_id,
            status,
            filled_delta,
            reason,
        } = event
        else {
            panic!("expected order status");
        };
        assert_eq!(order_id, 7);
        assert_eq!(parse_status(&status), Some(VenueStatus::PartiallyFilled));
        assert_eq!(filled_delta, 40);
        assert!(reason.is_none());
    }

    #[test]
    fn tick_event_tolerates_missing_sides() {
        let json = r#"{"type":"tick","symbol":"AAPL","last":"150.40","timestamp_ms":1700000000000}"#;
        let event: WsEvent = serde_json::from_str(json).unwrap();
        let WsEvent::Tick { bid, ask, last, .. } = event else {
            panic!("expected tick");
        };
        assert!(bid.is_none());
        assert!(ask.is_none());
        assert_eq!(last, Some(dec!(150.40)));
    }

    #[test]
    fn unknown_status_string_maps_to_none() {
        assert_eq!(parse_status("resting"), None);
    }

    #[test]
    fn buffered_events_drain_in_fifo_order() {
        let mut adapter = WebSocketAdapter::new("ws://venue/stream");
        for id in 1..=3 {
            adapter.buffer_event(WsEvent::OrderStatus {
                order_id: id,
                status: "filled".to_string(),
                filled_delta: 0,
                reason: None,
            });
        }
        let drained: Vec<_> = adapter
            .pending_status
            .drain(..)
            .map(|u| u.order_id)
            .collect();
        assert_eq!(drained, vec![1, 2, 3]);
    }
}
