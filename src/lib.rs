//! Nativrik client core.
//!
//! Rust side of the mobile ordering app: support chat over a realtime
//! socket, and checkout with non-cash payment through an embedded gateway
//! page. Screens live in the host shell; this crate exposes typed entry
//! points and pushes [`UiEvent`]s back over a channel.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

pub mod api;
pub mod auth;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod payments;
pub mod session;

pub use api::ApiClient;
pub use chat::{ChatMessage, ChatSession, SenderKind, SocketIoConnector};
pub use config::{ClientConfig, PaymentConfig};
pub use error::{ClientError, ClientResult, ValidationIssue};
pub use events::{EventSink, Notice, NoticeLevel, UiEvent};
pub use payments::{
    compute_total, validate_checkout, BrowserSurface, CustomerForm, NavigationDecision, Order,
    OrderMethod, OrderStatus, PaymentMethod, PaymentOrchestrator, SystemOpener,
};
pub use session::{Session, UserProfile};

/// Wires the production backends together for a host shell.
pub struct NativrikClient {
    config: ClientConfig,
    api: Arc<ApiClient>,
    events: EventSink,
}

impl NativrikClient {
    /// Build the client and the UI event receiver the host listens on.
    pub fn new(config: ClientConfig) -> ClientResult<(Self, UnboundedReceiver<UiEvent>)> {
        let api = Arc::new(ApiClient::new(&config)?);
        let (events, rx) = EventSink::channel();
        info!(
            api = %api.base_url(),
            socket = %config.socket_url(),
            "Client configured"
        );
        Ok((
            Self {
                config,
                api,
                events,
            },
            rx,
        ))
    }

    pub fn from_env() -> ClientResult<(Self, UnboundedReceiver<UiEvent>)> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// REST calls: sign-in, catalog and cart.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// A chat session for one mounted chat screen.
    pub fn chat_session(&self, session: Session) -> ChatSession {
        ChatSession::new(
            self.api.clone(),
            Arc::new(SocketIoConnector::new(&self.config)),
            session,
            self.events.clone(),
        )
    }

    /// Checkout coordinator for one order screen.
    pub fn payment_orchestrator(&self, browser: Arc<dyn BrowserSurface>) -> PaymentOrchestrator {
        PaymentOrchestrator::new(
            self.api.clone(),
            browser,
            Arc::new(SystemOpener),
            self.config.payment.clone(),
            self.events.clone(),
        )
    }
}
