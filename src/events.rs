//! UI event channel.
//!
//! The host shell owns screens and navigation; this crate pushes state changes
//! and notices to it over an unbounded channel. Emission never blocks and a
//! closed receiver (screen already gone) is silently ignored.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::chat::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A dismissible alert shown by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    Notice(Notice),

    // -- chat --
    ChatOnline { online: bool },
    ChatMessageReceived { message: ChatMessage },
    ChatTyping { is_typing: bool },

    // -- checkout --
    /// Cash order accepted; host shows the confirmation screen.
    OrderConfirmed { order_id: String },
    PaymentPageOpened { order_id: String, url: String },
    PaymentPageClosed { order_id: String },
    /// Non-cash payment reached `Succeeded`; host shows the confirmation screen.
    PaymentSucceeded { order_id: String },
    PaymentFailed { order_id: String },
    PaymentTimedOut { order_id: String },
}

/// Sending half of the UI event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }

    pub fn notice(&self, notice: Notice) {
        self.emit(UiEvent::Notice(notice));
    }
}
