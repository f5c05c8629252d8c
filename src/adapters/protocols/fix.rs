//! FIX-Style Protocol Adapter — Tag=Value Session over TCP
//!
//! Speaks a minimal FIX-flavoured session to the venue: logon (35=A)
//! carrying the credentials, new-order-single / cancel / replace
//! (35=D/F/G) outbound, execution reports (35=8) and market-data
//! snapshots (35=W) inbound, logout (35=5) on teardown.
//!
//! Framing is standard tag=value with SOH separators, a 9= body length
//! and a 10= modulo-256 checksum. The exact exchange dialect is owned by
//! this adapter alone; nothing outside ever sees a raw frame.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::domain::events::{MarketDataTick, OutboundCommand, StatusUpdate, VenueStatus};
use crate::domain::order::Side;
use crate::ports::protocol::{
    ConnectError, DisconnectError, PollError, ProtocolAdapter, SendError,
    VenueCredentials,
};

const SOH: u8 = 0x01;
const BEGIN_STRING: &str = "FIX.4.4";

/// How long to wait for the venue's logon response.
const LOGON_TIMEOUT: Duration = Duration::from_secs(5);

/// Anything decoded off the wire.
enum Inbound {
    Tick(MarketDataTick),
    Status(StatusUpdate),
    Session, // heartbeats, logon echoes — consumed silently
}

/// FIX-style adapter over a plain TCP stream.
pub struct FixAdapter {
    endpoint: String,
    sender_comp_id: String,
    target_comp_id: String,
    reader: Option<OwnedReadHalf>,
    writer: Option<OwnedWriteHalf>,
    /// Unparsed bytes read off the socket so far.
    buf: Vec<u8>,
    /// Outbound message sequence number, reset per session.
    seq_num: u64,
    pending_md: VecDeque<MarketDataTick>,
    pending_status: VecDeque<StatusUpdate>,
}

impl FixAdapter {
    /// Create an adapter for `host:port` with the given comp ids.
    pub fn new(
        endpoint: impl Into<String>,
        sender_comp_id: impl Into<String>,
        target_comp_id: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            sender_comp_id: sender_comp_id.into(),
            target_comp_id: target_comp_id.into(),
            reader: None,
            writer: None,
            buf: Vec::new(),
            seq_num: 0,
            pending_md: VecDeque::new(),
            pending_status: VecDeque::new(),
        }
    }

    /// Serialize one message: header, body, trailing checksum.
    fn encode(&mut self, msg_type: &str, fields: &[(u32, String)]) -> Vec<u8> {
        self.seq_num += 1;
        let mut body = format!(
            "35={msg_type}\x0149={}\x0156={}\x0134={}\x01",
            self.sender_comp_id, self.target_comp_id, self.seq_num
        );
        for (tag, value) in fields {
            body.push_str(&format!("{tag}={value}\x01"));
        }
        let mut msg = format!("8={BEGIN_STRING}\x019={}\x01{body}", body.len());
        let checksum: u32 = msg.bytes().map(u32::from).sum::<u32>() % 256;
        msg.push_str(&format!("10={checksum:03}\x01"));
        msg.into_bytes()
    }

    async fn write_frame(
        &mut self,
        msg_type: &str,
        fields: &[(u32, String)],
    ) -> Result<(), SendError> {
        let frame = self.encode(msg_type, fields);
        let writer = self.writer.as_mut().ok_or(SendError::NoSession)?;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))
    }

    /// Pop one complete frame from the buffer, if present.
    ///
    /// A frame ends one SOH after the 3-digit 10= checksum field.
    fn extract_frame(&mut self) -> Option<Vec<u8>> {
        let marker = b"\x0110=";
        let pos = self.buf.windows(marker.len()).position(|w| w == marker)?;
        let end = pos + marker.len() + 4; // 3 checksum digits + SOH
        if self.buf.len() < end {
            return None;
        }
        Some(self.buf.drain(..end).collect())
    }

    /// Read until one complete frame is available or `timeout` elapses.
    async fn read_frame(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, PollError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.extract_frame() {
                return Ok(Some(frame));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let reader = self.reader.as_mut().ok_or(PollError::NoSession)?;
            let mut chunk = [0u8; 4096];
            match tokio::time::timeout(remaining, reader.read(&mut chunk)).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    return Err(PollError::Transport(
                        "connection closed by venue".to_string(),
                    ));
                }
                Ok(Ok(n)) => self.buf.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(PollError::Transport(e.to_string())),
            }
        }
    }

    /// Read and classify inbound frames until one lands in the requested
    /// queue or the timeout elapses.
    async fn poll_inbound(&mut self, timeout: Duration) -> Result<(), PollError> {
        if let Some(frame) = self.read_frame(timeout).await? {
            match decode_frame(&frame) {
                Some(Inbound::Tick(tick)) => self.pending_md.push_back(tick),
                Some(Inbound::Status(update)) => self.pending_status.push_back(update),
                Some(Inbound::Session) => trace!("session-level frame consumed"),
                None => debug!(len = frame.len(), "undecodable frame skipped"),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProtocolAdapter for FixAdapter {
    async fn connect(
        &mut self,
        credentials: &VenueCredentials,
    ) -> Result<(), ConnectError> {
        let stream = TcpStream::connect(&self.endpoint)
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))?;
        let (reader, writer) = stream.into_split();
        self.reader = Some(reader);
        self.writer = Some(writer);
        self.buf.clear();
        self.seq_num = 0;

        // Logon: credentials in Username/Password, no encryption layer.
        let logon_fields = vec![
            (98, "0".to_string()),
            (108, "30".to_string()),
            (553, credentials.api_key.clone()),
            (554, credentials.api_secret.clone()),
        ];
        self.write_frame("A", &logon_fields)
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))?;

        // The venue must answer the logon before the session is live.
        let deadline = Instant::now() + LOGON_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ConnectError::Transport(
                    "no logon response from venue".to_string(),
                ));
            }
            let frame = self
                .read_frame(remaining)
                .await
                .map_err(|e| ConnectError::Transport(e.to_string()))?;
            let Some(frame) = frame else { continue };
            let fields = parse_fields(&frame);
            match field(&fields, 35).unwrap_or_default() {
                "A" => {
                    debug!(endpoint = %self.endpoint, "FIX logon acknowledged");
                    return Ok(());
                }
                "5" | "3" => {
                    let text = field(&fields, 58).unwrap_or("logon refused");
                    return Err(ConnectError::LogonRejected(text.to_string()));
                }
                other => trace!(msg_type = other, "frame before logon ack skipped"),
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), DisconnectError> {
        if self.writer.is_some() {
            // Best-effort logout; the socket is going away regardless.
            if let Err(e) = self.write_frame("5", &[]).await {
                warn!(error = %e, "logout frame not delivered");
            }
            if let Some(mut writer) = self.writer.take() {
                let _ = writer.shutdown().await;
            }
        }
        self.reader = None;
        self.buf.clear();
        Ok(())
    }

    async fn send_order(
        &mut self,
        command: &OutboundCommand,
    ) -> Result<(), SendError> {
        match command {
            OutboundCommand::Submit {
                id,
                symbol,
                side,
                price,
                qty,
            } => {
                let fields = vec![
                    (11, id.to_string()),
                    (55, symbol.clone()),
                    (54, fix_side(*side).to_string()),
                    (44, price.to_string()),
                    (38, qty.to_string()),
                    (40, "2".to_string()), // limit
                ];
                self.write_frame("D", &fields).await
            }
            OutboundCommand::Cancel { id } => {
                let fields = vec![(41, id.to_string()), (11, id.to_string())];
                self.write_frame("F", &fields).await
            }
            OutboundCommand::Modify { id, price, qty } => {
                let fields = vec![
                    (41, id.to_string()),
                    (11, id.to_string()),
                    (44, price.to_string()),
                    (38, qty.to_string()),
                ];
                self.write_frame("G", &fields).await
            }
        }
    }

    async fn subscribe(&mut self, symbol: &str) -> Result<(), SendError> {
        let fields = vec![
            (262, symbol.to_string()),
            (263, "1".to_string()),
            (55, symbol.to_string()),
        ];
        self.write_frame("V", &fields).await
    }

    async fn poll_market_data(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<MarketDataTick>, PollError> {
        if let Some(tick) = self.pending_md.pop_front() {
            return Ok(Some(tick));
        }
        self.poll_inbound(timeout).await?;
        Ok(self.pending_md.pop_front())
    }

    async fn poll_order_status(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<StatusUpdate>, PollError> {
        if let Some(update) = self.pending_status.pop_front() {
            return Ok(Some(update));
        }
        self.poll_inbound(timeout).await?;
        Ok(self.pending_status.pop_front())
    }
}

fn fix_side(side: Side) -> char {
    match side {
        Side::Buy => '1',
        Side::Sell => '2',
    }
}

/// Split a frame into (tag, value) pairs, dropping anything malformed.
fn parse_fields(frame: &[u8]) -> Vec<(u32, String)> {
    let text = String::from_utf8_lossy(frame);
    text.split(SOH as char)
        .filter_map(|pair| {
            let (tag, value) = pair.split_once('=')?;
            Some((tag.parse().ok()?, value.to_string()))
        })
        .collect()
}

fn field<'a>(fields: &'a [(u32, String)], tag: u32) -> Option<&'a str> {
    fields
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, v)| v.as_str())
}

/// Map an execution-report status char onto the venue vocabulary.
fn venue_status(code: &str) -> Option<VenueStatus> {
    match code {
        "0" => Some(VenueStatus::Acknowledged),
        "1" => Some(VenueStatus::PartiallyFilled),
        "2" => Some(VenueStatus::Filled),
        "4" => Some(VenueStatus::Canceled),
        "8" => Some(VenueStatus::Rejected),
        _ => None,
    }
}

fn decode_frame(frame: &[u8]) -> Option<Inbound> {
    let fields = parse_fields(frame);
    match field(&fields, 35)? {
        // Market data snapshot
        "W" => Some(Inbound::Tick(MarketDataTick {
            symbol: field(&fields, 55)?.to_string(),
            bid: field(&fields, 132).and_then(|v| v.parse::<Decimal>().ok()),
            ask: field(&fields, 133).and_then(|v| v.parse::<Decimal>().ok()),
            last: field(&fields, 31).and_then(|v| v.parse::<Decimal>().ok()),
            timestamp_ms: field(&fields, 52)
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        })),
        // Execution report
        "8" => {
            let status = venue_status(field(&fields, 39)?)?;
            Some(Inbound::Status(StatusUpdate {
                order_id: field(&fields, 11).and_then(|v| v.parse().ok())?,
                status,
                filled_delta: field(&fields, 32)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_default(),
                reason: field(&fields, 58).map(str::to_string),
            }))
        }
        // Heartbeats, test requests, logon echoes
        "0" | "1" | "A" => Some(Inbound::Session),
        _ => None,
    }
}
