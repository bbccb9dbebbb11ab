//! Socket.IO v4 client over a raw WebSocket.
//!
//! Only what the chat screen needs is implemented: the Engine.IO open/ping
//! handshake, the default namespace connect with a token auth payload, and
//! plain `42[...]` events without acknowledgements. A dropped transport is
//! reopened with capped backoff; a server-side namespace disconnect or a
//! refused connect is final.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::transport::{LinkDriver, OutboundEvent, RealtimeConnector, TransportEvent, TransportLink};
use super::ChatMessage;
use crate::api::normalize_base_url;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(5);
const RECONNECT_ATTEMPTS: u32 = 10;

// Inbound event names.
const EV_RECEIVE_MESSAGE: &str = "receive_message";
const EV_USER_TYPING: &str = "user_typing";
const EV_ERROR_MESSAGE: &str = "error_message";

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// One decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Frame {
    /// Engine.IO handshake; the client answers with a namespace connect.
    Open,
    /// Engine.IO close.
    Close,
    /// Engine.IO ping; answered with a pong.
    Ping,
    /// Namespace connect acknowledged.
    Connected,
    /// Server-side namespace disconnect.
    Disconnected,
    ConnectError(String),
    Event { name: String, data: Value },
    Ignored,
}

pub(crate) fn decode_frame(raw: &str) -> Frame {
    match raw.as_bytes().first() {
        Some(b'0') => Frame::Open,
        Some(b'1') => Frame::Close,
        Some(b'2') => Frame::Ping,
        Some(b'4') => decode_packet(raw.get(1..).unwrap_or_default()),
        _ => Frame::Ignored,
    }
}

fn decode_packet(packet: &str) -> Frame {
    let Some(kind) = packet.as_bytes().first().copied() else {
        return Frame::Ignored;
    };
    let mut body = packet.get(1..).unwrap_or_default();
    if body.starts_with('/') {
        body = body.split_once(',').map(|(_, rest)| rest).unwrap_or_default();
    }

    match kind {
        b'0' => Frame::Connected,
        b'1' => Frame::Disconnected,
        b'2' => {
            let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
            let Ok(Value::Array(mut parts)) = serde_json::from_str::<Value>(body) else {
                return Frame::Ignored;
            };
            if parts.is_empty() {
                return Frame::Ignored;
            }
            let data = if parts.len() > 1 { parts.remove(1) } else { Value::Null };
            match parts.remove(0) {
                Value::String(name) => Frame::Event { name, data },
                _ => Frame::Ignored,
            }
        }
        b'4' => {
            let message = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| body.to_string());
            Frame::ConnectError(message)
        }
        _ => Frame::Ignored,
    }
}

pub(crate) fn connect_packet(token: &str) -> String {
    format!("40{}", serde_json::json!({ "token": token }))
}

pub(crate) fn encode_event(event: &OutboundEvent) -> String {
    format!("42{}", serde_json::json!([event.name(), event.payload()]))
}

/// Map a server event onto the transport vocabulary.
pub(crate) fn inbound_event(name: &str, data: Value) -> Option<TransportEvent> {
    match name {
        EV_RECEIVE_MESSAGE => match serde_json::from_value::<ChatMessage>(data) {
            Ok(message) => Some(TransportEvent::MessageReceived(message)),
            Err(e) => {
                warn!(error = %e, "Dropping malformed chat message");
                None
            }
        },
        EV_USER_TYPING => {
            let is_typing = data
                .get("isTyping")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Some(TransportEvent::Typing { is_typing })
        }
        EV_ERROR_MESSAGE => {
            let message = match &data {
                Value::String(s) => s.clone(),
                other => other
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("chat server error")
                    .to_string(),
            };
            Some(TransportEvent::ServerError(message))
        }
        other => {
            debug!(event = other, "Ignoring unhandled socket event");
            None
        }
    }
}

/// `https://host` → `wss://host/socket.io/?EIO=4&transport=websocket`.
pub fn websocket_url(base: &str) -> String {
    let base = normalize_base_url(base);
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base
    };
    format!("{base}{SOCKET_IO_PATH}")
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    url: String,
}

impl SocketIoConnector {
    pub fn new(config: &ClientConfig) -> Self {
        Self::from_base_url(config.socket_url())
    }

    pub fn from_base_url(base: &str) -> Self {
        Self {
            url: websocket_url(base),
        }
    }
}

#[async_trait]
impl RealtimeConnector for SocketIoConnector {
    async fn open(&self, token: &str) -> ClientResult<TransportLink> {
        if token.trim().is_empty() {
            return Err(ClientError::Auth("socket requires a token".into()));
        }
        let (link, driver) = TransportLink::pair();
        let task = tokio::spawn(drive(
            self.url.clone(),
            Zeroizing::new(token.to_string()),
            driver,
        ));
        Ok(link.with_driver(task))
    }

    fn description(&self) -> String {
        self.url.clone()
    }
}

/// Why one socket connection ended.
#[derive(Debug, PartialEq, Eq)]
enum SocketEnd {
    /// Shutdown, the session side is gone, or the server refused the client.
    Stop,
    /// The transport dropped; `joined` tells whether the namespace was up.
    Lost { joined: bool },
}

/// `base * 2^(attempt-1)`, capped at [`RECONNECT_MAX_DELAY`].
pub(crate) fn reconnect_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    RECONNECT_BASE_DELAY
        .saturating_mul(1u32 << exp)
        .min(RECONNECT_MAX_DELAY)
}

/// Owns the socket for one link, reconnecting after transport drops until
/// shutdown or until the retry budget runs out.
async fn drive(url: String, token: Zeroizing<String>, mut driver: LinkDriver) {
    let mut attempt = 0u32;
    loop {
        match run_socket(&url, &token, &mut driver).await {
            SocketEnd::Stop => return,
            SocketEnd::Lost { joined: true } => attempt = 1,
            SocketEnd::Lost { joined: false } => attempt += 1,
        }
        if attempt > RECONNECT_ATTEMPTS {
            warn!(url = %url, attempts = RECONNECT_ATTEMPTS, "Socket reconnection abandoned");
            return;
        }

        let delay = reconnect_delay(attempt);
        info!(url = %url, attempt, delay_ms = delay.as_millis() as u64, "Socket reconnecting");
        tokio::select! {
            _ = driver.shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn lost(driver: &LinkDriver, reason: String, joined: bool) -> SocketEnd {
    if driver.report(TransportEvent::Disconnected { reason }) {
        SocketEnd::Lost { joined }
    } else {
        SocketEnd::Stop
    }
}

async fn run_socket(url: &str, token: &str, driver: &mut LinkDriver) -> SocketEnd {
    let connected = tokio::select! {
        _ = driver.shutdown.cancelled() => return SocketEnd::Stop,
        res = connect_async(url) => res,
    };
    let ws = match connected {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!(url = %url, error = %e, "Socket connect failed");
            if !driver.report(TransportEvent::ConnectError(e.to_string())) {
                return SocketEnd::Stop;
            }
            return SocketEnd::Lost { joined: false };
        }
    };
    info!(url = %url, "Socket opened");

    let (mut sink, mut stream) = ws.split();
    let mut joined = false;

    loop {
        tokio::select! {
            biased;

            _ = driver.shutdown.cancelled() => {
                if joined {
                    let _ = sink.send(Message::Text("41".into())).await;
                }
                let _ = sink.send(Message::Close(None)).await;
                debug!("Socket closed by client");
                return SocketEnd::Stop;
            }

            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        return lost(driver, "transport close".into(), joined);
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return lost(driver, e.to_string(), joined),
                };

                let reply = match decode_frame(text.as_str()) {
                    Frame::Open => Some(connect_packet(token)),
                    Frame::Ping => Some("3".to_string()),
                    Frame::Close => return lost(driver, "server close".into(), joined),
                    Frame::Connected => {
                        joined = true;
                        if !driver.report(TransportEvent::Connected) {
                            return SocketEnd::Stop;
                        }
                        None
                    }
                    Frame::Disconnected => {
                        driver.report(TransportEvent::Disconnected { reason: "io server disconnect".into() });
                        return SocketEnd::Stop;
                    }
                    Frame::ConnectError(message) => {
                        driver.report(TransportEvent::ConnectError(message));
                        return SocketEnd::Stop;
                    }
                    Frame::Event { name, data } => {
                        if let Some(event) = inbound_event(&name, data) {
                            driver.report(event);
                        }
                        None
                    }
                    Frame::Ignored => None,
                };

                if let Some(reply) = reply {
                    if let Err(e) = sink.send(Message::Text(reply.into())).await {
                        return lost(driver, e.to_string(), joined);
                    }
                }
            }

            outbound = driver.outbound.recv(), if joined => {
                let Some(event) = outbound else {
                    let _ = sink.send(Message::Text("41".into())).await;
                    let _ = sink.send(Message::Close(None)).await;
                    return SocketEnd::Stop;
                };
                debug!(event = event.name(), "Socket emit");
                if let Err(e) = sink.send(Message::Text(encode_event(&event).into())).await {
                    return lost(driver, e.to_string(), joined);
                }
            }
        }
    }
}
