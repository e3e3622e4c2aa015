//! Connection manager: owns the coordination channel and keeps it alive.
//!
//! [`ConnectionManager`] is a cheap, cloneable handle. The actual work runs in
//! a background tokio task (the *actor*) that owns:
//!
//! * the [`ConnectionFsm`] (and with it the reconnect attempt counter),
//! * the single live transport (write half; the read half runs in its own
//!   task and reports back through the actor's event queue),
//! * the reconnect timer.
//!
//! ```text
//! connect() / disconnect() / send()  ──Command──▶  actor  ◀──ActorEvent── open task
//!                                                    │     ◀──ActorEvent── reader task
//!                                                    │     ◀──ActorEvent── retry timer
//!                                                    ▼
//!                        handlers, status watch, Session.connection
//! ```
//!
//! Every transport gets a generation number. Events carrying an older
//! generation belong to a transport that has already been replaced or closed
//! and are dropped.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ConnectionConfig;
use crate::session::SessionHandle;

use super::protocol::{InboundMessage, OutboundMessage};
use super::state::{ConnectionEvent, ConnectionFsm, ConnectionState, Effect};
use super::transport::{Connector, Link, LinkReader, LinkWriter, TransportError};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

pub type StateHandler = Box<dyn Fn(ConnectionState) + Send + Sync>;
pub type MessageHandler = Box<dyn Fn(InboundMessage) + Send + Sync>;
pub type ErrorHandler = Box<dyn Fn(&TransportError) + Send + Sync>;

/// Subscriber callbacks. All of them run on the manager's task.
#[derive(Default)]
pub struct ConnectionHandlers {
    pub on_state_change: Option<StateHandler>,
    pub on_message: Option<MessageHandler>,
    pub on_error: Option<ErrorHandler>,
}

/// Snapshot of the manager's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub attempts: u32,
    pub max_attempts: u32,
}

/// Why a [`ConnectionManager::send`] did not deliver its message.
#[derive(Debug, Error, PartialEq)]
pub enum SendError {
    #[error("not connected (state: {0})")]
    NotConnected(ConnectionState),

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("connection manager has shut down")]
    ManagerStopped,
}

// ---------------------------------------------------------------------------
// ConnectionManager (handle)
// ---------------------------------------------------------------------------

enum Command {
    Connect,
    Disconnect,
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    SetHandlers(ConnectionHandlers),
}

/// Handle to the connection actor.
///
/// Dropping every clone of the handle shuts the actor down and closes the
/// transport.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
}

impl ConnectionManager {
    /// Spawn the actor on the current tokio runtime. The manager starts in
    /// `Disconnected`; call [`connect`](Self::connect) to open the channel.
    pub fn spawn(
        config: &ConnectionConfig,
        connector: Arc<dyn Connector>,
        session: SessionHandle,
    ) -> Self {
        let fsm = ConnectionFsm::new(config.max_reconnect_attempts);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus {
            state: fsm.state(),
            attempts: fsm.attempts(),
            max_attempts: fsm.max_attempts(),
        });
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let actor = Actor {
            url: config.url.clone(),
            retry_interval: config.reconnect_interval(),
            connect_timeout: config.connect_timeout(),
            ping_on_open: config.ping_on_open,
            fsm,
            connector,
            session,
            handlers: ConnectionHandlers::default(),
            status: status_tx,
            events: events_tx,
            generation: 0,
            writer: None,
            open_task: None,
            reader_task: None,
            retry_task: None,
            retry_epoch: 0,
        };
        tokio::spawn(actor.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            status: status_rx,
        }
    }

    /// Request a connection. No-op while `Connecting` or `Connected`; from
    /// `Failed` it starts over with a fresh attempt counter.
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Cancel any pending reconnect, close the transport and settle in
    /// `Disconnected` with the attempt counter reset.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Replace the subscriber callbacks.
    pub fn set_handlers(&self, handlers: ConnectionHandlers) {
        let _ = self.commands.send(Command::SetHandlers(handlers));
    }

    /// Deliver `message` over the live channel.
    ///
    /// Fails immediately with [`SendError::NotConnected`] unless the channel
    /// is `Connected`; nothing is queued for later.
    pub async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        let state = self.state();
        if !state.is_connected() {
            return Err(SendError::NotConnected(state));
        }
        let text = message
            .to_json()
            .map_err(|e| SendError::Encode(e.to_string()))?;

        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send { text, reply })
            .map_err(|_| SendError::ManagerStopped)?;
        response.await.map_err(|_| SendError::ManagerStopped)?
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch channel that follows every status change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

enum ActorEvent {
    OpenFinished {
        generation: u64,
        result: Result<Link, TransportError>,
    },
    Frame {
        generation: u64,
        text: String,
    },
    LinkError {
        generation: u64,
        error: TransportError,
    },
    LinkClosed {
        generation: u64,
    },
    RetryDue {
        epoch: u64,
    },
}

struct Actor {
    url: String,
    retry_interval: Duration,
    connect_timeout: Duration,
    ping_on_open: bool,
    fsm: ConnectionFsm,
    connector: Arc<dyn Connector>,
    session: SessionHandle,
    handlers: ConnectionHandlers,
    status: watch::Sender<ConnectionStatus>,
    events: mpsc::UnboundedSender<ActorEvent>,
    /// Generation of the current transport; bumped on every open and close.
    generation: u64,
    writer: Option<Box<dyn LinkWriter>>,
    open_task: Option<JoinHandle<()>>,
    reader_task: Option<JoinHandle<()>>,
    retry_task: Option<JoinHandle<()>>,
    retry_epoch: u64,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<ActorEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                Some(event) = events.recv() => self.on_event(event).await,
            }
        }

        log::info!("connection: all handles dropped, manager shutting down");
        self.cancel_retry();
        self.close_transport().await;
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.apply(ConnectionEvent::ConnectRequested).await,
            Command::Disconnect => self.apply(ConnectionEvent::DisconnectRequested).await,
            Command::SetHandlers(handlers) => self.handlers = handlers,
            Command::Send { text, reply } => {
                let result = self.write(text).await;
                let _ = reply.send(result);
            }
        }
    }

    async fn on_event(&mut self, event: ActorEvent) {
        match event {
            ActorEvent::OpenFinished { generation, result } => {
                if generation != self.generation {
                    if let Ok(mut link) = result {
                        link.writer.close().await;
                    }
                    return;
                }
                self.open_task = None;
                match result {
                    Ok(link) => {
                        log::info!("connection: transport open ({})", self.url);
                        self.writer = Some(link.writer);
                        self.reader_task = Some(spawn_reader(
                            generation,
                            link.reader,
                            self.events.clone(),
                        ));
                        self.apply(ConnectionEvent::TransportOpened).await;
                    }
                    Err(error) => {
                        log::warn!("connection: {error}");
                        self.report_error(&error);
                        self.apply(ConnectionEvent::TransportError).await;
                    }
                }
            }
            ActorEvent::Frame { generation, text } => {
                if generation == self.generation {
                    self.dispatch_frame(&text);
                }
            }
            ActorEvent::LinkError { generation, error } => {
                if generation == self.generation {
                    log::warn!("connection: {error}");
                    self.report_error(&error);
                    self.apply(ConnectionEvent::TransportError).await;
                }
            }
            ActorEvent::LinkClosed { generation } => {
                if generation == self.generation {
                    log::info!("connection: closed by remote");
                    self.apply(ConnectionEvent::TransportClosed).await;
                }
            }
            ActorEvent::RetryDue { epoch } => {
                if epoch == self.retry_epoch && self.retry_task.take().is_some() {
                    log::info!(
                        "connection: reconnect attempt {}/{}",
                        self.fsm.attempts(),
                        self.fsm.max_attempts()
                    );
                    self.apply(ConnectionEvent::RetryTimerFired).await;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // State machine glue
    // -----------------------------------------------------------------------

    async fn apply(&mut self, event: ConnectionEvent) {
        for effect in self.fsm.handle(event) {
            match effect {
                Effect::OpenTransport => self.open_transport().await,
                Effect::CloseTransport => self.close_transport().await,
                Effect::ScheduleRetry => self.schedule_retry(),
                Effect::CancelRetry => self.cancel_retry(),
                Effect::Notify(state) => self.notify(state).await,
            }
        }
        self.publish_status();
    }

    async fn notify(&mut self, state: ConnectionState) {
        self.session.set_connection_state(state);
        self.publish_status();
        if let Some(handler) = &self.handlers.on_state_change {
            handler(state);
        }
        if state == ConnectionState::Connected && self.ping_on_open {
            if let Ok(ping) = OutboundMessage::Ping.to_json() {
                if let Err(e) = self.write(ping).await {
                    log::debug!("connection: ping on open not delivered: {e}");
                }
            }
        }
    }

    fn publish_status(&self) {
        let next = ConnectionStatus {
            state: self.fsm.state(),
            attempts: self.fsm.attempts(),
            max_attempts: self.fsm.max_attempts(),
        };
        self.status.send_if_modified(|current| {
            let changed = *current != next;
            *current = next;
            changed
        });
    }

    fn report_error(&self, error: &TransportError) {
        if let Some(handler) = &self.handlers.on_error {
            handler(error);
        }
    }

    fn dispatch_frame(&self, text: &str) {
        match InboundMessage::parse(text) {
            Ok(InboundMessage::Unknown) => {
                log::warn!("connection: ignoring message of unknown type: {text}");
            }
            Ok(message) => {
                log::debug!("connection: inbound {message:?}");
                if let Some(handler) = &self.handlers.on_message {
                    handler(message);
                }
            }
            Err(e) => log::warn!("connection: ignoring undecodable frame ({e}): {text}"),
        }
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    async fn open_transport(&mut self) {
        // Never hold two transports at once.
        self.close_transport().await;

        self.generation += 1;
        let generation = self.generation;
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let events = self.events.clone();
        let limit = self.connect_timeout;

        log::debug!("connection: opening {url} (generation {generation})");
        self.open_task = Some(tokio::spawn(async move {
            // A stalled handshake must still end the attempt.
            let result = match tokio::time::timeout(limit, connector.open(&url)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Open(format!(
                    "handshake not finished within {}ms",
                    limit.as_millis()
                ))),
            };
            let _ = events.send(ActorEvent::OpenFinished { generation, result });
        }));
    }

    async fn close_transport(&mut self) {
        if let Some(task) = self.open_task.take() {
            task.abort();
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            writer.close().await;
        }
        self.generation += 1;
    }

    async fn write(&mut self, text: String) -> Result<(), SendError> {
        let state = self.fsm.state();
        let Some(writer) = self.writer.as_mut().filter(|_| state.is_connected()) else {
            return Err(SendError::NotConnected(state));
        };
        match writer.send_text(text).await {
            Ok(()) => Ok(()),
            Err(error) => {
                // Handled on the next loop turn like any other link failure.
                let _ = self.events.send(ActorEvent::LinkError {
                    generation: self.generation,
                    error: error.clone(),
                });
                Err(SendError::Transport(error))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reconnect timer
    // -----------------------------------------------------------------------

    fn schedule_retry(&mut self) {
        self.cancel_retry();
        let epoch = self.retry_epoch;
        let delay = self.retry_interval;
        let events = self.events.clone();
        self.retry_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(ActorEvent::RetryDue { epoch });
        }));
    }

    fn cancel_retry(&mut self) {
        if let Some(task) = self.retry_task.take() {
            task.abort();
        }
        self.retry_epoch += 1;
    }
}

fn spawn_reader(
    generation: u64,
    mut reader: Box<dyn LinkReader>,
    events: mpsc::UnboundedSender<ActorEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match reader.next_text().await {
                Some(Ok(text)) => ActorEvent::Frame { generation, text },
                Some(Err(error)) => {
                    let _ = events.send(ActorEvent::LinkError { generation, error });
                    break;
                }
                None => {
                    let _ = events.send(ActorEvent::LinkClosed { generation });
                    break;
                }
            };
            if events.send(event).is_err() {
                break;
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::transport::mock::{MockConnector, MockRemote, Script};
    use tokio::time::Instant;

    fn config(max_attempts: u32) -> ConnectionConfig {
        ConnectionConfig {
            url: "ws://test/ws".into(),
            reconnect_interval_ms: 3_000,
            max_reconnect_attempts: max_attempts,
            connect_timeout_ms: 10_000,
            ping_on_open: true,
        }
    }

    struct Harness {
        manager: ConnectionManager,
        connector: Arc<MockConnector>,
        remotes: mpsc::UnboundedReceiver<MockRemote>,
        states: mpsc::UnboundedReceiver<ConnectionState>,
        messages: mpsc::UnboundedReceiver<InboundMessage>,
        errors: mpsc::UnboundedReceiver<TransportError>,
        session: SessionHandle,
    }

    fn harness(script: Vec<Script>, fallback_accept: bool, max_attempts: u32) -> Harness {
        let (connector, remotes) = MockConnector::new(script, fallback_accept);
        let session = SessionHandle::new();
        let manager = ConnectionManager::spawn(
            &config(max_attempts),
            connector.clone(),
            session.clone(),
        );

        let (state_tx, states) = mpsc::unbounded_channel();
        let (message_tx, messages) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();
        manager.set_handlers(ConnectionHandlers {
            on_state_change: Some(Box::new(move |s| {
                let _ = state_tx.send(s);
            })),
            on_message: Some(Box::new(move |m| {
                let _ = message_tx.send(m);
            })),
            on_error: Some(Box::new(move |e| {
                let _ = error_tx.send(e.clone());
            })),
        });

        Harness {
            manager,
            connector,
            remotes,
            states,
            messages,
            errors,
            session,
        }
    }

    async fn wait_for(states: &mut mpsc::UnboundedReceiver<ConnectionState>, want: ConnectionState) {
        while let Some(state) = states.recv().await {
            if state == want {
                return;
            }
        }
        panic!("state stream ended before {want}");
    }

    #[tokio::test(start_paused = true)]
    async fn send_while_disconnected_fails_without_side_effects() {
        let h = harness(vec![], true, 5);
        let before = h.session.snapshot();

        let result = h.manager.send(&OutboundMessage::user_message("hi")).await;

        assert_eq!(
            result,
            Err(SendError::NotConnected(ConnectionState::Disconnected))
        );
        assert_eq!(h.connector.opens(), 0);
        let after = h.session.snapshot();
        assert_eq!(before.connection, after.connection);
        assert_eq!(before.history.len(), after.history.len());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_pings_and_delivers_messages() {
        let mut h = harness(vec![Script::Accept], false, 5);

        h.manager.connect();
        wait_for(&mut h.states, ConnectionState::Connecting).await;
        wait_for(&mut h.states, ConnectionState::Connected).await;
        assert_eq!(h.session.connection_state(), ConnectionState::Connected);

        let mut remote = h.remotes.recv().await.unwrap();
        assert_eq!(remote.from_client.recv().await.unwrap(), r#"{"type":"ping"}"#);

        h.manager
            .send(&OutboundMessage::user_message("Hello"))
            .await
            .unwrap();
        let frame = remote.from_client.recv().await.unwrap();
        assert!(frame.contains(r#""type":"user_message""#));
        assert!(frame.contains(r#""text":"Hello""#));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent() {
        let mut h = harness(vec![Script::Accept], false, 5);

        h.manager.connect();
        h.manager.connect();
        wait_for(&mut h.states, ConnectionState::Connected).await;
        h.manager.connect();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(h.connector.opens(), 1);
        assert_eq!(h.manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_messages_reach_handler_and_unknown_types_are_skipped() {
        let mut h = harness(vec![Script::Accept], false, 5);
        h.manager.connect();
        wait_for(&mut h.states, ConnectionState::Connected).await;
        let remote = h.remotes.recv().await.unwrap();

        remote.push(r#"{"type":"pong","message":"ok"}"#);
        remote.push("not json");
        remote.push(r#"{"type":"processing_status","processing":true,"progress":0.5}"#);

        let message = h.messages.recv().await.unwrap();
        assert_eq!(
            message,
            InboundMessage::ProcessingStatus {
                processing: true,
                progress: Some(0.5)
            }
        );
        assert_eq!(h.manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_within_interval_then_fails_after_max_attempts() {
        // First open succeeds, every later open is refused.
        let mut h = harness(vec![Script::Accept], false, 5);
        h.manager.connect();
        wait_for(&mut h.states, ConnectionState::Connected).await;
        let remote = h.remotes.recv().await.unwrap();

        let closed_at = Instant::now();
        remote.close();
        wait_for(&mut h.states, ConnectionState::Disconnected).await;
        wait_for(&mut h.states, ConnectionState::Connecting).await;
        assert!(closed_at.elapsed() <= Duration::from_millis(3_100));

        wait_for(&mut h.states, ConnectionState::Failed).await;
        assert_eq!(h.connector.opens(), 1 + 5);
        let status = h.manager.status();
        assert_eq!(status.state, ConnectionState::Failed);
        assert_eq!(status.attempts, 5);
        assert!(h.errors.recv().await.is_some());

        // No further automatic attempts.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.connector.opens(), 6);
        assert_eq!(h.session.connection_state(), ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_after_failed_starts_over() {
        let mut h = harness(vec![Script::Refuse, Script::Accept], false, 0);
        h.manager.connect();
        wait_for(&mut h.states, ConnectionState::Failed).await;

        h.manager.connect();
        wait_for(&mut h.states, ConnectionState::Connected).await;
        assert_eq!(h.manager.status().attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let mut h = harness(vec![Script::Accept], true, 5);
        h.manager.connect();
        wait_for(&mut h.states, ConnectionState::Connected).await;
        let remote = h.remotes.recv().await.unwrap();

        remote.close();
        wait_for(&mut h.states, ConnectionState::Disconnected).await;
        h.manager.disconnect();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.connector.opens(), 1);
        let status = h.manager.status();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert_eq!(status.attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_reconnect_resets_counter() {
        let mut h = harness(vec![Script::Accept, Script::Refuse, Script::Accept], false, 5);
        h.manager.connect();
        wait_for(&mut h.states, ConnectionState::Connected).await;
        h.remotes.recv().await.unwrap().close();

        wait_for(&mut h.states, ConnectionState::Connected).await;
        assert_eq!(h.connector.opens(), 3);
        assert_eq!(h.manager.status().attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_handshake_times_out_and_retries() {
        let mut h = harness(vec![Script::Hang, Script::Accept], false, 5);
        let started = Instant::now();

        h.manager.connect();
        wait_for(&mut h.states, ConnectionState::Connecting).await;
        wait_for(&mut h.states, ConnectionState::Disconnected).await;
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(matches!(h.errors.recv().await, Some(TransportError::Open(_))));

        wait_for(&mut h.states, ConnectionState::Connected).await;
        assert_eq!(h.connector.opens(), 2);
        assert_eq!(h.manager.status().attempts, 0);
    }
}
