//! Realtime transport abstraction for chat.
//!
//! A [`RealtimeConnector`] opens [`TransportLink`]s. A link is a pair of
//! channels plus a shutdown token: the chat session reads [`TransportEvent`]s
//! and writes [`OutboundEvent`]s, while the connector's driver task owns the
//! actual socket. Cancelling the token closes the socket.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ChatMessage;
use crate::error::ClientResult;

/// How long `close` waits for the driver task to flush its goodbye frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Transport state
// ---------------------------------------------------------------------------

/// Connection state as seen by the chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Inbound events surfaced by a link.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: String },
    ConnectError(String),
    MessageReceived(ChatMessage),
    Typing { is_typing: bool },
    ServerError(String),
}

/// Outbound emissions, named after the wire events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    JoinChat {
        conversation_id: String,
    },
    SendMessage {
        conversation_id: String,
        text: String,
        sender_name: String,
    },
    TypingStart {
        conversation_id: String,
    },
    TypingStop {
        conversation_id: String,
    },
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinChat { .. } => "join_chat",
            Self::SendMessage { .. } => "send_message",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::JoinChat { conversation_id } => Value::String(conversation_id.clone()),
            Self::SendMessage {
                conversation_id,
                text,
                sender_name,
            } => serde_json::json!({
                "conversationId": conversation_id,
                "message": text,
                "senderName": sender_name,
            }),
            Self::TypingStart { conversation_id } | Self::TypingStop { conversation_id } => {
                serde_json::json!({ "conversationId": conversation_id })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// Session-side half of an open transport.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<OutboundEvent>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
    pub shutdown: CancellationToken,
    driver: Option<JoinHandle<()>>,
}

/// Connector-side half: what the socket task reads from and writes to.
#[derive(Debug)]
pub struct LinkDriver {
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub outbound: mpsc::UnboundedReceiver<OutboundEvent>,
    pub shutdown: CancellationToken,
}

impl LinkDriver {
    /// Report an event; returns `false` once the session side is gone.
    pub fn report(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

impl TransportLink {
    /// Create both halves of a link.
    pub fn pair() -> (Self, LinkDriver) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        (
            Self {
                outbound: out_tx,
                inbound: event_rx,
                shutdown: shutdown.clone(),
                driver: None,
            },
            LinkDriver {
                events: event_tx,
                outbound: out_rx,
                shutdown,
            },
        )
    }

    /// Attach the task that owns the socket so `close` can wait for it.
    pub fn with_driver(mut self, driver: JoinHandle<()>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Split into the pieces the chat session keeps.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<OutboundEvent>,
        mpsc::UnboundedReceiver<TransportEvent>,
        CancellationToken,
        Option<JoinHandle<()>>,
    ) {
        (self.outbound, self.inbound, self.shutdown, self.driver)
    }
}

/// Signal shutdown and wait (bounded) for the driver task to exit.
pub(crate) async fn close_driver(shutdown: &CancellationToken, driver: Option<JoinHandle<()>>) {
    shutdown.cancel();
    let Some(mut handle) = driver else {
        return;
    };
    match tokio::time::timeout(CLOSE_GRACE, &mut handle).await {
        Ok(Ok(())) => debug!("Realtime driver stopped"),
        Ok(Err(e)) if e.is_cancelled() => {}
        Ok(Err(e)) => warn!(error = %e, "Realtime driver panicked"),
        Err(_) => {
            warn!("Realtime driver did not stop in time, aborting");
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Connector trait
// ---------------------------------------------------------------------------

/// Opens realtime links for the chat session.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    /// Open a link authenticated with `token`.
    ///
    /// Returns as soon as the link exists; `Connected` or `ConnectError`
    /// arrives later on the inbound channel.
    async fn open(&self, token: &str) -> ClientResult<TransportLink>;

    /// Human-readable description of the connection target.
    fn description(&self) -> String;
}
