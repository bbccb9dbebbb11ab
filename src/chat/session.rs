use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::transport::{close_driver, OutboundEvent, RealtimeConnector, TransportEvent, TransportState};
use super::{ChatBackend, ChatMessage, Conversation, MessageFeed};
use crate::error::{ClientError, ClientResult};
use crate::events::{EventSink, Notice, UiEvent};
use crate::session::Session;

#[derive(Debug)]
struct ChatState {
    conversation: Option<Conversation>,
    feed: MessageFeed,
    remote_typing: bool,
    transport: TransportState,
    /// Whether the local composer currently holds text (last boundary sent).
    composing: bool,
    /// Bumped for every link; events tagged with an older value are stale.
    generation: u64,
    torn_down: bool,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            conversation: None,
            feed: MessageFeed::new(),
            remote_typing: false,
            transport: TransportState::Disconnected,
            composing: false,
            generation: 0,
            torn_down: false,
        }
    }
}

struct ActiveLink {
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    shutdown: CancellationToken,
    pump: JoinHandle<()>,
    driver: Option<JoinHandle<()>>,
}

/// One mounted chat screen.
///
/// Owns at most one realtime link. `connect` replaces any link it already
/// holds, and `teardown` (or dropping the session) releases it. Once torn
/// down, late transport events are ignored.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    connector: Arc<dyn RealtimeConnector>,
    session: Session,
    events: EventSink,
    state: Arc<Mutex<ChatState>>,
    link: Option<ActiveLink>,
}

impl ChatSession {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        connector: Arc<dyn RealtimeConnector>,
        session: Session,
        events: EventSink,
    ) -> Self {
        Self {
            backend,
            connector,
            session,
            events,
            state: Arc::new(Mutex::new(ChatState::default())),
            link: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Screen-mount sequence: resolve the conversation, load history, connect.
    ///
    /// A failed history load is reported as a notice; the link still opens.
    pub async fn mount(&mut self) -> ClientResult<String> {
        let conversation_id = self.initialize().await?;
        if let Err(e) = self.fetch_history(&conversation_id).await {
            warn!(conversation_id = %conversation_id, error = %e, "Chat history unavailable");
            self.events.notice(e.notice());
        }
        self.connect(&conversation_id).await?;
        Ok(conversation_id)
    }

    /// Resolve the caller's conversation id.
    pub async fn initialize(&mut self) -> ClientResult<String> {
        let token = self.session.require_user_and_token()?.to_string();
        let id = self.backend.initialize_chat(&self.session).await?;

        let mut state = self.lock();
        if let Some(existing) = &state.conversation {
            if existing.id != id {
                warn!(
                    existing = %existing.id,
                    resolved = %id,
                    "Conversation already bound; keeping the first id"
                );
                return Ok(existing.id.clone());
            }
        } else {
            state.conversation = Some(Conversation {
                id: id.clone(),
                owner_token: token,
            });
        }
        info!(conversation_id = %id, "Chat conversation resolved");
        Ok(id)
    }

    /// Load prior messages into the feed. Returns how many were loaded.
    pub async fn fetch_history(&self, conversation_id: &str) -> ClientResult<usize> {
        let history = self
            .backend
            .chat_history(&self.session, conversation_id)
            .await?;
        let loaded = self.lock().feed.load_history(history);
        debug!(conversation_id, loaded, "Chat history loaded");
        Ok(loaded)
    }

    /// Open the realtime link for `conversation_id`, closing any link this
    /// session already holds.
    pub async fn connect(&mut self, conversation_id: &str) -> ClientResult<()> {
        if self.lock().torn_down {
            return Err(ClientError::Transport("chat session is closed".into()));
        }
        self.close_link().await;

        let token = self.session.require_token()?.to_string();
        let generation = {
            let mut state = self.lock();
            if state.conversation.is_none() {
                state.conversation = Some(Conversation {
                    id: conversation_id.to_string(),
                    owner_token: token.clone(),
                });
            }
            state.generation += 1;
            state.transport = TransportState::Connecting;
            state.composing = false;
            state.generation
        };

        info!(endpoint = %self.connector.description(), generation, "Opening chat link");
        let link = match self.connector.open(&token).await {
            Ok(link) => link,
            Err(e) => {
                self.lock().transport = TransportState::Error;
                warn!(error = %e, "Chat link could not be opened");
                self.events.notice(e.notice());
                return Err(e);
            }
        };

        let (outbound, inbound, shutdown, driver) = link.into_parts();
        let pump = tokio::spawn(pump(
            generation,
            inbound,
            outbound.clone(),
            shutdown.clone(),
            Arc::clone(&self.state),
            self.events.clone(),
        ));
        self.link = Some(ActiveLink {
            outbound,
            shutdown,
            pump,
            driver,
        });
        Ok(())
    }

    /// Release the link. Nothing mutates the session afterwards.
    pub async fn teardown(&mut self) {
        {
            let mut state = self.lock();
            state.torn_down = true;
            state.transport = TransportState::Disconnected;
        }
        self.close_link().await;
        debug!("Chat session torn down");
    }

    async fn close_link(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        link.shutdown.cancel();
        if let Err(e) = link.pump.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Chat pump ended abnormally");
            }
        }
        close_driver(&link.shutdown, link.driver).await;
    }

    // -----------------------------------------------------------------------
    // Composer
    // -----------------------------------------------------------------------

    /// Emit a message. Returns `false` when nothing was sent: blank text, no
    /// live connection, or no conversation yet. The feed is not touched; the
    /// message shows up once the server echoes it.
    pub fn send_message(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let Some(link) = &self.link else {
            return false;
        };

        let mut state = self.lock();
        if state.transport != TransportState::Connected {
            return false;
        }
        let Some(conversation_id) = state.conversation.as_ref().map(|c| c.id.clone()) else {
            return false;
        };

        let sent = link
            .outbound
            .send(OutboundEvent::SendMessage {
                conversation_id: conversation_id.clone(),
                text: text.to_string(),
                sender_name: self.session.display_name().to_string(),
            })
            .is_ok();
        if !sent {
            return false;
        }

        // The composer is cleared after a send.
        if state.composing {
            state.composing = false;
            let _ = link.outbound.send(OutboundEvent::TypingStop { conversation_id });
        }
        true
    }

    /// Report the composer contents. Typing start/stop is emitted only when
    /// the text crosses the empty/non-empty boundary.
    pub fn input_changed(&self, text: &str) {
        let has_text = !text.trim().is_empty();
        let Some(link) = &self.link else {
            return;
        };

        let mut state = self.lock();
        if state.transport != TransportState::Connected || state.composing == has_text {
            return;
        }
        let Some(conversation_id) = state.conversation.as_ref().map(|c| c.id.clone()) else {
            return;
        };

        let event = if has_text {
            OutboundEvent::TypingStart { conversation_id }
        } else {
            OutboundEvent::TypingStop { conversation_id }
        };
        if link.outbound.send(event).is_ok() {
            state.composing = has_text;
        }
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    /// Feed in display order, most recent first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().feed.to_vec()
    }

    pub fn is_remote_typing(&self) -> bool {
        self.lock().remote_typing
    }

    pub fn is_online(&self) -> bool {
        self.lock().transport == TransportState::Connected
    }

    pub fn transport_state(&self) -> TransportState {
        self.lock().transport
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.lock().conversation.as_ref().map(|c| c.id.clone())
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.torn_down = true;
        }
        if let Some(link) = self.link.take() {
            link.shutdown.cancel();
            link.pump.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound pump
// ---------------------------------------------------------------------------

async fn pump(
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    shutdown: CancellationToken,
    state: Arc<Mutex<ChatState>>,
    events: EventSink,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = inbound.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        apply_event(
            &mut state.lock().unwrap_or_else(|e| e.into_inner()),
            generation,
            event,
            &outbound,
            &events,
        );
    }
    debug!(generation, "Chat pump stopped");
}

fn apply_event(
    state: &mut ChatState,
    generation: u64,
    event: TransportEvent,
    outbound: &mpsc::UnboundedSender<OutboundEvent>,
    events: &EventSink,
) {
    if state.torn_down || state.generation != generation {
        debug!(generation, "Dropping event from stale chat link");
        return;
    }

    match event {
        TransportEvent::Connected => {
            state.transport = TransportState::Connected;
            if let Some(conversation) = &state.conversation {
                let _ = outbound.send(OutboundEvent::JoinChat {
                    conversation_id: conversation.id.clone(),
                });
                info!(conversation_id = %conversation.id, "Chat connected, joined conversation");
            }
            events.emit(UiEvent::ChatOnline { online: true });
        }
        TransportEvent::Disconnected { reason } => {
            state.transport = TransportState::Disconnected;
            state.composing = false;
            warn!(reason = %reason, "Chat disconnected");
            events.emit(UiEvent::ChatOnline { online: false });
            events.notice(Notice::warning(
                "Chat disconnected",
                "Connection to support was lost",
            ));
        }
        TransportEvent::ConnectError(message) => {
            state.transport = TransportState::Error;
            state.composing = false;
            warn!(error = %message, "Chat connect error");
            events.emit(UiEvent::ChatOnline { online: false });
            events.notice(Notice::warning(
                "Connection failed",
                "Could not connect to the chat server",
            ));
        }
        TransportEvent::MessageReceived(message) => {
            if state.feed.push(message.clone()) {
                events.emit(UiEvent::ChatMessageReceived { message });
            } else {
                debug!(message_id = %message.id, "Duplicate chat message dropped");
            }
        }
        TransportEvent::Typing { is_typing } => {
            state.remote_typing = is_typing;
            events.emit(UiEvent::ChatTyping { is_typing });
        }
        TransportEvent::ServerError(message) => {
            warn!(error = %message, "Chat server error");
            events.notice(Notice::error("Chat error", message));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::chat::transport::{LinkDriver, TransportLink};
    use crate::chat::{test_message, SenderKind};
    use crate::session::UserProfile;

    struct FakeBackend {
        conversation_id: String,
        history: ClientResult<Vec<ChatMessage>>,
        init_calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatBackend for FakeBackend {
        async fn initialize_chat(&self, _session: &Session) -> ClientResult<String> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.conversation_id.clone())
        }

        async fn chat_history(
            &self,
            _session: &Session,
            _conversation_id: &str,
        ) -> ClientResult<Vec<ChatMessage>> {
            match &self.history {
                Ok(history) => Ok(history.clone()),
                Err(e) => Err(ClientError::Transport(e.to_string())),
            }
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        drivers: Mutex<Vec<LinkDriver>>,
    }

    impl FakeConnector {
        fn take_driver(&self) -> LinkDriver {
            self.drivers
                .lock()
                .expect("drivers lock")
                .pop()
                .expect("a link was opened")
        }

        fn opened(&self) -> usize {
            self.drivers.lock().expect("drivers lock").len()
        }
    }

    #[async_trait]
    impl RealtimeConnector for FakeConnector {
        async fn open(&self, _token: &str) -> ClientResult<TransportLink> {
            let (link, driver) = TransportLink::pair();
            self.drivers.lock().expect("drivers lock").push(driver);
            Ok(link)
        }

        fn description(&self) -> String {
            "fake".into()
        }
    }

    fn user_session(name: &str) -> Session {
        Session::new(
            UserProfile {
                id: "u1".into(),
                name: name.into(),
                email: None,
            },
            "tok-123",
        )
    }

    fn build(
        history: Vec<ChatMessage>,
        session: Session,
    ) -> (ChatSession, Arc<FakeBackend>, Arc<FakeConnector>, UnboundedReceiver<UiEvent>) {
        build_with(Ok(history), session)
    }

    fn build_with(
        history: ClientResult<Vec<ChatMessage>>,
        session: Session,
    ) -> (ChatSession, Arc<FakeBackend>, Arc<FakeConnector>, UnboundedReceiver<UiEvent>) {
        let backend = Arc::new(FakeBackend {
            conversation_id: "conv-1".into(),
            history,
            init_calls: AtomicUsize::new(0),
        });
        let connector = Arc::new(FakeConnector::default());
        let (sink, rx) = EventSink::channel();
        let chat = ChatSession::new(backend.clone(), connector.clone(), session, sink);
        (chat, backend, connector, rx)
    }

    /// Mount, then complete the handshake; returns the live driver.
    async fn mounted(
        chat: &mut ChatSession,
        connector: &FakeConnector,
        ui: &mut UnboundedReceiver<UiEvent>,
    ) -> LinkDriver {
        chat.mount().await.expect("mount");
        let mut driver = connector.take_driver();
        assert!(driver.report(TransportEvent::Connected));
        assert_eq!(ui.recv().await, Some(UiEvent::ChatOnline { online: true }));
        assert_eq!(
            driver.outbound.recv().await,
            Some(OutboundEvent::JoinChat {
                conversation_id: "conv-1".into()
            })
        );
        driver
    }

    #[tokio::test]
    async fn test_mount_loads_history_and_joins() {
        let history = vec![
            test_message("h2", SenderKind::Support, "newer"),
            test_message("h1", SenderKind::User, "older"),
        ];
        let (mut chat, backend, connector, mut ui) = build(history, user_session("Sari"));

        let _driver = mounted(&mut chat, &connector, &mut ui).await;

        assert_eq!(backend.init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(chat.conversation_id().as_deref(), Some("conv-1"));
        assert!(chat.is_online());
        let ids: Vec<_> = chat.messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["h2", "h1"]);
    }

    #[tokio::test]
    async fn test_history_failure_still_connects() {
        let (mut chat, _backend, connector, mut ui) = build_with(
            Err(ClientError::Transport("history endpoint unreachable".into())),
            user_session("Sari"),
        );

        let id = chat.mount().await.expect("mount");
        assert_eq!(id, "conv-1");
        assert_eq!(connector.opened(), 1);
        assert!(matches!(ui.recv().await, Some(UiEvent::Notice(_))));
        assert!(chat.messages().is_empty());

        let driver = connector.take_driver();
        driver.report(TransportEvent::Connected);
        assert_eq!(ui.recv().await, Some(UiEvent::ChatOnline { online: true }));
        assert!(chat.is_online());
    }

    #[tokio::test]
    async fn test_initialize_requires_user_name() {
        let (mut chat, backend, _connector, _ui) = build(vec![], user_session("  "));
        let err = chat.initialize().await.expect_err("blank name");
        assert!(matches!(err, ClientError::Auth(_)));
        assert_eq!(backend.init_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_requires_connection_and_waits_for_echo() {
        let (mut chat, _backend, connector, mut ui) = build(vec![], user_session("Sari"));

        chat.mount().await.expect("mount");
        // Link open but not yet connected.
        assert!(!chat.send_message("halo"));

        let mut driver = connector.take_driver();
        driver.report(TransportEvent::Connected);
        ui.recv().await;
        driver.outbound.recv().await;

        assert!(!chat.send_message("   "));
        assert!(chat.send_message("  halo  "));
        assert_eq!(
            driver.outbound.recv().await,
            Some(OutboundEvent::SendMessage {
                conversation_id: "conv-1".into(),
                text: "halo".into(),
                sender_name: "Sari".into(),
            })
        );
        assert!(chat.messages().is_empty());

        let echo = test_message("m1", SenderKind::User, "halo");
        driver.report(TransportEvent::MessageReceived(echo.clone()));
        assert_eq!(
            ui.recv().await,
            Some(UiEvent::ChatMessageReceived { message: echo.clone() })
        );
        driver.report(TransportEvent::MessageReceived(echo));
        driver.report(TransportEvent::MessageReceived(test_message(
            "m2",
            SenderKind::Support,
            "Baik",
        )));
        ui.recv().await;

        let ids: Vec<_> = chat.messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["m2", "m1"]);
    }

    #[tokio::test]
    async fn test_typing_emits_only_on_boundary() {
        let (mut chat, _backend, connector, mut ui) = build(vec![], user_session("Sari"));
        let mut driver = mounted(&mut chat, &connector, &mut ui).await;

        for text in ["h", "ha", "hal", "halo"] {
            chat.input_changed(text);
        }
        chat.input_changed("");
        chat.input_changed("   ");

        let start = OutboundEvent::TypingStart {
            conversation_id: "conv-1".into(),
        };
        let stop = OutboundEvent::TypingStop {
            conversation_id: "conv-1".into(),
        };
        assert_eq!(driver.outbound.recv().await, Some(start.clone()));
        assert_eq!(driver.outbound.recv().await, Some(stop.clone()));
        assert!(driver.outbound.try_recv().is_err());

        // Sending clears the composer.
        chat.input_changed("ok");
        assert!(chat.send_message("ok"));
        assert_eq!(driver.outbound.recv().await, Some(start));
        assert!(matches!(
            driver.outbound.recv().await,
            Some(OutboundEvent::SendMessage { .. })
        ));
        assert_eq!(driver.outbound.recv().await, Some(stop));
    }

    #[tokio::test]
    async fn test_remote_typing_follows_signal() {
        let (mut chat, _backend, connector, mut ui) = build(vec![], user_session("Sari"));
        let driver = mounted(&mut chat, &connector, &mut ui).await;

        driver.report(TransportEvent::Typing { is_typing: true });
        assert_eq!(ui.recv().await, Some(UiEvent::ChatTyping { is_typing: true }));
        assert!(chat.is_remote_typing());

        driver.report(TransportEvent::Typing { is_typing: false });
        assert_eq!(ui.recv().await, Some(UiEvent::ChatTyping { is_typing: false }));
        assert!(!chat.is_remote_typing());
    }

    #[tokio::test]
    async fn test_disconnect_goes_offline_with_notice() {
        let (mut chat, _backend, connector, mut ui) = build(vec![], user_session("Sari"));
        let driver = mounted(&mut chat, &connector, &mut ui).await;

        driver.report(TransportEvent::Disconnected {
            reason: "transport close".into(),
        });
        assert_eq!(ui.recv().await, Some(UiEvent::ChatOnline { online: false }));
        assert!(matches!(ui.recv().await, Some(UiEvent::Notice(_))));
        assert!(!chat.is_online());
        assert!(!chat.send_message("halo"));
    }

    #[tokio::test]
    async fn test_link_recovery_rejoins_conversation() {
        let (mut chat, _backend, connector, mut ui) = build(vec![], user_session("Sari"));
        let mut driver = mounted(&mut chat, &connector, &mut ui).await;

        driver.report(TransportEvent::Disconnected {
            reason: "transport close".into(),
        });
        assert_eq!(ui.recv().await, Some(UiEvent::ChatOnline { online: false }));
        ui.recv().await;

        driver.report(TransportEvent::Connected);
        assert_eq!(ui.recv().await, Some(UiEvent::ChatOnline { online: true }));
        assert_eq!(
            driver.outbound.recv().await,
            Some(OutboundEvent::JoinChat {
                conversation_id: "conv-1".into()
            })
        );
        assert!(chat.is_online());
        assert!(chat.send_message("halo lagi"));
    }

    #[tokio::test]
    async fn test_reconnect_replaces_previous_link() {
        let (mut chat, _backend, connector, mut ui) = build(vec![], user_session("Sari"));
        let first = mounted(&mut chat, &connector, &mut ui).await;

        chat.connect("conv-1").await.expect("reconnect");
        assert_eq!(connector.opened(), 1);
        assert!(first.shutdown.is_cancelled());
        assert!(!first.report(TransportEvent::Typing { is_typing: true }));

        let second = connector.take_driver();
        assert!(!second.shutdown.is_cancelled());
        second.report(TransportEvent::Connected);
        assert_eq!(ui.recv().await, Some(UiEvent::ChatOnline { online: true }));
        assert!(!chat.is_remote_typing());
    }

    #[tokio::test]
    async fn test_teardown_releases_link_and_freezes_state() {
        let (mut chat, _backend, connector, mut ui) = build(vec![], user_session("Sari"));
        let driver = mounted(&mut chat, &connector, &mut ui).await;

        chat.teardown().await;
        assert!(driver.shutdown.is_cancelled());
        assert!(!driver.report(TransportEvent::MessageReceived(test_message(
            "late",
            SenderKind::Support,
            "too late"
        ))));
        assert!(chat.messages().is_empty());
        assert!(!chat.is_online());
        assert!(chat.connect("conv-1").await.is_err());
    }

    #[tokio::test]
    async fn test_drop_cancels_link() {
        let (mut chat, _backend, connector, mut ui) = build(vec![], user_session("Sari"));
        let driver = mounted(&mut chat, &connector, &mut ui).await;
        drop(chat);
        assert!(driver.shutdown.is_cancelled());
    }
}
