//! Chat session client.
//!
//! [`ChatSession`] owns one transport connection and is the single source of
//! truth for connection state. All operations are serialized through an
//! actor task: commands from the handles, transport events, and typing-timer
//! ticks are processed one at a time, so a `disconnect` can never interleave
//! with an in-flight `connect` callback or a timer firing.
//!
//! The UI collaborator consumes [`ChatEvent`]s via [`ChatSession::recv`] and
//! drives the session through [`SessionHandle`].

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::error::ChatClientError;
use crate::proto::{self, ChatMessage, TypingSignal};
use crate::routing::{self, ConversationMode, Identity};
use crate::transport::{self, TransportEvent, TransportHandle};
use crate::typing::{TypingDebouncer, TypingTick, EXPIRY_TIMEOUT, IDLE_TIMEOUT};

/// Connection lifecycle of a session.
///
/// Transitions happen only inside the session actor. `Failed` is terminal
/// for the instance; construct a new session to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Failed,
}

/// Events delivered to the UI collaborator, in transport delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Connection state changed.
    StateChanged(ConnectionState),
    /// A decoded inbound chat envelope. No reordering or buffering is
    /// applied; ordering is inherited from the transport.
    Message(ChatMessage),
    /// The displayed peer-typing indicator changed.
    TypingChanged(bool),
    /// The transport or broker failed unrecoverably. Emitted once, before
    /// the [`ConnectionState::Failed`] transition, with the failure reason.
    Error(String),
}

/// Immutable session parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Websocket endpoint of the chat broker.
    pub endpoint: String,
    /// Local user identity, sent in every outbound envelope.
    pub user: Identity,
    /// Conversation context, fixed for the session lifetime.
    pub mode: ConversationMode,
}

impl SessionConfig {
    pub fn new(endpoint: impl Into<String>, user: Identity, mode: ConversationMode) -> Self {
        let endpoint = endpoint.into();
        Self {
            endpoint: endpoint.trim().to_string(),
            user,
            mode,
        }
    }

    fn validate(&self) -> Result<(), ChatClientError> {
        if self.endpoint.is_empty() {
            return Err(ChatClientError::InvalidConfiguration(
                "endpoint must not be empty".to_string(),
            ));
        }
        if !self.endpoint.starts_with("ws://") && !self.endpoint.starts_with("wss://") {
            return Err(ChatClientError::InvalidConfiguration(format!(
                "endpoint must be a websocket url: {}",
                self.endpoint
            )));
        }
        if self.user.display_name.trim().is_empty() {
            return Err(ChatClientError::InvalidConfiguration(
                "user display name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    SendMessage(String),
    TextChanged,
}

/// Owning half of a session: consumes events, exposes handles.
#[derive(Debug)]
pub struct ChatSession {
    handle: SessionHandle,
    event_rx: mpsc::UnboundedReceiver<ChatEvent>,
}

impl ChatSession {
    /// Validates the configuration and spawns the session actor.
    ///
    /// Must be called within a tokio runtime. The session starts
    /// [`ConnectionState::Disconnected`]; call [`SessionHandle::connect`] to
    /// dial.
    pub fn new(config: SessionConfig) -> Result<Self, ChatClientError> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (typing, tick_rx) = TypingDebouncer::new(IDLE_TIMEOUT, EXPIRY_TIMEOUT);

        let worker = SessionWorker {
            endpoint: config.endpoint,
            user: config.user,
            mode: config.mode,
            state: ConnectionState::Disconnected,
            state_tx,
            event_tx,
            transport: None,
            transport_rx: None,
            subscriptions: Vec::new(),
            typing,
        };
        tokio::spawn(worker.run(command_rx, tick_rx));

        Ok(Self {
            handle: SessionHandle {
                command_tx,
                state_rx,
            },
            event_rx,
        })
    }

    /// Returns a cloneable handle for driving the session.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Receives the next session event. Returns `None` once the actor has
    /// stopped.
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        self.event_rx.recv().await
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// See [`SessionHandle::connect`].
    pub fn connect(&self) -> Result<(), ChatClientError> {
        self.handle.connect()
    }

    /// See [`SessionHandle::disconnect`].
    pub fn disconnect(&self) -> Result<(), ChatClientError> {
        self.handle.disconnect()
    }

    /// See [`SessionHandle::send_message`].
    pub fn send_message(&self, content: &str) -> Result<(), ChatClientError> {
        self.handle.send_message(content)
    }

    /// See [`SessionHandle::text_changed`].
    pub fn text_changed(&self, content: &str) -> Result<(), ChatClientError> {
        self.handle.text_changed(content)
    }
}

/// Cloneable command handle for a [`ChatSession`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SessionHandle {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Asks the session to open its transport.
    ///
    /// No-op while already connecting or connected, and after a terminal
    /// failure. Completion is observed via [`ChatEvent::StateChanged`].
    pub fn connect(&self) -> Result<(), ChatClientError> {
        self.command(Command::Connect)
    }

    /// Asks the session to tear down subscriptions and close its transport.
    ///
    /// Idempotent; safe to call in any state, including from an event
    /// handler.
    pub fn disconnect(&self) -> Result<(), ChatClientError> {
        self.command(Command::Disconnect)
    }

    /// Sends a chat message to the destination of the active conversation
    /// mode.
    ///
    /// There is no local echo: the sender sees its own message once the
    /// broker re-delivers it on a subscribed destination.
    pub fn send_message(&self, content: &str) -> Result<(), ChatClientError> {
        if content.trim().is_empty() {
            return Err(ChatClientError::EmptyMessage);
        }
        if self.state() != ConnectionState::Connected {
            return Err(ChatClientError::NotConnected);
        }
        self.command(Command::SendMessage(content.to_string()))
    }

    /// Reports a local text-change event for typing-indicator debouncing.
    ///
    /// Only meaningful in private mode while connected; otherwise ignored.
    /// The content itself is not transmitted; only the timing of changes
    /// drives the debouncer.
    pub fn text_changed(&self, _content: &str) -> Result<(), ChatClientError> {
        self.command(Command::TextChanged)
    }

    fn command(&self, command: Command) -> Result<(), ChatClientError> {
        self.command_tx
            .send(command)
            .map_err(|_| ChatClientError::CommandQueueClosed)
    }
}

struct SessionWorker {
    endpoint: String,
    user: Identity,
    mode: ConversationMode,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: mpsc::UnboundedSender<ChatEvent>,
    transport: Option<TransportHandle>,
    transport_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    subscriptions: Vec<String>,
    typing: TypingDebouncer,
}

impl SessionWorker {
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        mut tick_rx: mpsc::UnboundedReceiver<TypingTick>,
    ) {
        loop {
            tokio::select! {
                maybe_command = command_rx.recv() => {
                    match maybe_command {
                        Some(command) => self.handle_command(command),
                        None => {
                            // All handles dropped: tear down and stop.
                            self.teardown();
                            return;
                        }
                    }
                }
                maybe_tick = tick_rx.recv() => {
                    if let Some(tick) = maybe_tick {
                        self.handle_tick(tick);
                    }
                }
                event = next_transport_event(&mut self.transport_rx) => {
                    self.handle_transport_event(event);
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.handle_connect(),
            Command::Disconnect => self.handle_disconnect(),
            Command::SendMessage(content) => self.handle_send_message(content),
            Command::TextChanged => self.handle_text_changed(),
        }
    }

    fn handle_connect(&mut self) {
        match self.state {
            ConnectionState::Disconnected => {
                self.transition(ConnectionState::Connecting);
                let (handle, event_rx) = transport::open(self.endpoint.clone());
                self.transport = Some(handle);
                self.transport_rx = Some(event_rx);
            }
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!(event = "connect_ignored", state = ?self.state);
            }
            ConnectionState::Disconnecting => {
                debug!(event = "connect_ignored_while_disconnecting");
            }
            ConnectionState::Failed => {
                warn!(event = "connect_after_failure", "session failed; construct a new one");
            }
        }
    }

    fn handle_disconnect(&mut self) {
        match self.state {
            ConnectionState::Connected => {
                self.clear_typing();
                let subscriptions = std::mem::take(&mut self.subscriptions);
                if let Some(transport) = &self.transport {
                    for destination in subscriptions {
                        transport.unsubscribe(destination);
                    }
                }
                self.transition(ConnectionState::Disconnecting);
                if let Some(mut transport) = self.transport.take() {
                    transport.close();
                }
            }
            ConnectionState::Connecting => {
                self.clear_typing();
                self.transition(ConnectionState::Disconnecting);
                if let Some(mut transport) = self.transport.take() {
                    transport.close();
                }
            }
            ConnectionState::Disconnected
            | ConnectionState::Disconnecting
            | ConnectionState::Failed => {
                debug!(event = "disconnect_ignored", state = ?self.state);
            }
        }
    }

    fn handle_send_message(&mut self, content: String) {
        if self.state != ConnectionState::Connected {
            // The handle already reported NotConnected; a command that raced
            // a state change is dropped here.
            debug!(event = "send_dropped", state = ?self.state);
            return;
        }
        let route = routing::outbound_route(&self.mode);
        let envelope = ChatMessage {
            kind: None,
            sender_id: self.user.id,
            sender_name: self.user.display_name.clone(),
            receiver_id: route.receiver_id,
            project_id: route.project_id,
            content: Some(content),
            timestamp: None,
        };
        self.publish_envelope(route.destination, &envelope);
    }

    fn handle_text_changed(&mut self) {
        if self.state != ConnectionState::Connected || !routing::emits_typing_signals(&self.mode) {
            return;
        }
        if self.typing.note_local_activity() {
            self.send_typing_signal(true);
        }
    }

    fn handle_tick(&mut self, tick: TypingTick) {
        match tick {
            TypingTick::IdleElapsed(generation) => {
                if self.typing.idle_elapsed(generation)
                    && self.state == ConnectionState::Connected
                {
                    self.send_typing_signal(false);
                }
            }
            TypingTick::ExpiryElapsed(generation) => {
                if let Some(displayed) = self.typing.expiry_elapsed(generation) {
                    self.emit(ChatEvent::TypingChanged(displayed));
                }
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Established => {
                if self.state != ConnectionState::Connecting {
                    debug!(event = "established_ignored", state = ?self.state);
                    return;
                }
                self.transition(ConnectionState::Connected);

                let subscriptions = routing::inbound_destinations(&self.mode, self.user.id);
                if let Some(transport) = &self.transport {
                    for destination in &subscriptions {
                        transport.subscribe(destination.clone());
                    }
                }
                self.subscriptions = subscriptions;

                let join = ChatMessage {
                    kind: None,
                    sender_id: self.user.id,
                    sender_name: self.user.display_name.clone(),
                    receiver_id: None,
                    project_id: None,
                    content: None,
                    timestamp: None,
                };
                self.publish_envelope(proto::DEST_ADD_USER, &join);
            }
            TransportEvent::Frame { destination, body } => {
                self.handle_frame(&destination, &body);
            }
            TransportEvent::Error(err) => {
                self.drop_transport();
                match self.state {
                    ConnectionState::Connecting | ConnectionState::Connected => {
                        warn!(event = "transport_failed", error = %err);
                        self.clear_typing();
                        self.subscriptions.clear();
                        self.emit(ChatEvent::Error(err.to_string()));
                        self.transition(ConnectionState::Failed);
                    }
                    ConnectionState::Disconnecting => {
                        debug!(event = "transport_error_during_disconnect", error = %err);
                        self.transition(ConnectionState::Disconnected);
                    }
                    ConnectionState::Disconnected | ConnectionState::Failed => {}
                }
            }
            TransportEvent::Closed => {
                self.drop_transport();
                match self.state {
                    ConnectionState::Disconnecting => {
                        self.transition(ConnectionState::Disconnected);
                    }
                    ConnectionState::Connecting | ConnectionState::Connected => {
                        // Broker closed the socket underneath us.
                        warn!(event = "transport_closed_unexpectedly");
                        self.clear_typing();
                        self.subscriptions.clear();
                        self.transition(ConnectionState::Failed);
                    }
                    ConnectionState::Disconnected | ConnectionState::Failed => {}
                }
            }
        }
    }

    fn handle_frame(&mut self, destination: &str, body: &str) {
        if let Err(err) = self.apply_frame(destination, body) {
            // Single bad envelope: log and keep the session alive.
            warn!(event = "inbound_frame_dropped", destination, error = %err);
        }
    }

    fn apply_frame(&mut self, destination: &str, body: &str) -> Result<(), ChatClientError> {
        if destination == proto::typing_inbox(self.user.id) {
            let signal = TypingSignal::from_text(body)?;
            if let Some(displayed) = self.typing.observe_peer_signal(signal.is_typing) {
                self.emit(ChatEvent::TypingChanged(displayed));
            }
            return Ok(());
        }
        let message = ChatMessage::from_text(body)?;
        self.emit(ChatEvent::Message(message));
        Ok(())
    }

    fn send_typing_signal(&mut self, is_typing: bool) {
        let Some(peer) = self.mode.peer() else {
            return;
        };
        let signal = TypingSignal {
            user_id: self.user.id,
            user_name: self.user.display_name.clone(),
            receiver_id: peer.id,
            is_typing,
        };
        match signal.to_text() {
            Ok(body) => {
                if let Some(transport) = &self.transport {
                    transport.publish(proto::DEST_SEND_TYPING, body);
                }
            }
            Err(err) => warn!(event = "typing_encode_failed", error = %err),
        }
    }

    fn publish_envelope(&mut self, destination: &str, envelope: &ChatMessage) {
        match envelope.to_text() {
            Ok(body) => {
                if let Some(transport) = &self.transport {
                    transport.publish(destination.to_string(), body);
                }
            }
            Err(err) => warn!(event = "envelope_encode_failed", destination, error = %err),
        }
    }

    fn clear_typing(&mut self) {
        if let Some(displayed) = self.typing.reset() {
            self.emit(ChatEvent::TypingChanged(displayed));
        }
    }

    fn drop_transport(&mut self) {
        self.transport = None;
        self.transport_rx = None;
    }

    fn transition(&mut self, state: ConnectionState) {
        debug!(event = "connection_state", from = ?self.state, to = ?state);
        self.state = state;
        let _ = self.state_tx.send(state);
        self.emit(ChatEvent::StateChanged(state));
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.event_tx.send(event);
    }

    fn teardown(&mut self) {
        self.typing.reset();
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.transport_rx = None;
    }
}

async fn next_transport_event(
    transport_rx: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> TransportEvent {
    match transport_rx {
        Some(rx) => match rx.recv().await {
            Some(event) => event,
            // Worker ended without a final event; treat as a close.
            None => TransportEvent::Closed,
        },
        None => std::future::pending().await,
    }
}
