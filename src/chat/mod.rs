//! Real-time support chat.
//!
//! A [`ChatSession`] is bound to one mounted chat screen: it resolves the
//! conversation, loads history, holds a single realtime link, and keeps the
//! message feed and the remote typing flag. The feed only ever changes in
//! response to transport events, so ordering is whatever the server delivers.

mod feed;
mod session;
pub mod socketio;
pub mod transport;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;
use crate::session::Session;

pub use feed::MessageFeed;
pub use session::ChatSession;
pub use socketio::SocketIoConnector;
pub use transport::{OutboundEvent, RealtimeConnector, TransportEvent, TransportLink, TransportState};

/// Who wrote a message. The backend sends `"User"` for the customer and
/// `"Admin"` for support staff; anything other than `"User"` is support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SenderKind {
    User,
    Support,
}

impl From<String> for SenderKind {
    fn from(raw: String) -> Self {
        if raw.trim().eq_ignore_ascii_case("user") {
            Self::User
        } else {
            Self::Support
        }
    }
}

impl From<SenderKind> for String {
    fn from(kind: SenderKind) -> Self {
        match kind {
            SenderKind::User => "User".to_string(),
            SenderKind::Support => "Admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub conversation_id: String,
    #[serde(rename = "senderType")]
    pub sender: SenderKind,
    #[serde(default)]
    pub sender_name: String,
    #[serde(rename = "message", alias = "text")]
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn is_from_user(&self) -> bool {
        self.sender == SenderKind::User
    }
}

/// A support conversation; the id never changes once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub owner_token: String,
}

/// Request/response calls that bootstrap a chat screen.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Resolve (or create) the caller's conversation id.
    async fn initialize_chat(&self, session: &Session) -> ClientResult<String>;

    /// Prior messages, newest first. "No history yet" is an empty list.
    async fn chat_history(
        &self,
        session: &Session,
        conversation_id: &str,
    ) -> ClientResult<Vec<ChatMessage>>;
}

#[cfg(test)]
pub(crate) fn test_message(id: &str, sender: SenderKind, text: &str) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        conversation_id: "conv-1".to_string(),
        sender,
        sender_name: match sender {
            SenderKind::User => "Sari".to_string(),
            SenderKind::Support => "Admin".to_string(),
        },
        text: text.to_string(),
        timestamp: Utc::now(),
    }
}
