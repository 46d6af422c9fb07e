//! Live channel connection manager.
//!
//! [`ConnectionManager::spawn`] starts a driver task that owns the socket,
//! the retry timer and the [`ConnectionMachine`]. The driver turns socket,
//! timer, session and command wake-ups into machine events and executes the
//! returned actions. Consumers talk to it through the handle: commands go in
//! over an mpsc channel, status comes out on a `watch`, application events
//! on a `broadcast`.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::frames::{ClientFrame, LiveMessage, ServerFrame};
use super::machine::{Action, ConnectionMachine, ConnectionStatus, Event, Phase, CLOSE_NORMAL};
use crate::auth::{SessionContext, SessionState};
use crate::config::ClientConfig;
use crate::traits::{ChannelConnector, ChannelSocket, OutboundFrame, WsError};

/// Buffered live events per subscriber before the slowest one lags.
const EVENT_CAPACITY: usize = 256;

enum Command {
    Connect,
    Disconnect { code: u16, reason: String },
    Send { text: String, ack: oneshot::Sender<bool> },
}

/// Handle to the live channel.
///
/// Dropping the handle closes the channel and stops the driver.
#[derive(Debug)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    events: broadcast::Sender<LiveMessage>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Connect => f.write_str("Connect"),
            Command::Disconnect { code, .. } => write!(f, "Disconnect({})", code),
            Command::Send { .. } => f.write_str("Send"),
        }
    }
}

impl ConnectionManager {
    /// Start the driver. If the session is already authenticated the channel
    /// starts connecting right away; otherwise it waits for login.
    pub fn spawn(
        config: &ClientConfig,
        connector: Arc<dyn ChannelConnector>,
        session: SessionContext,
    ) -> Self {
        let machine = ConnectionMachine::new(config.reconnect.clone());
        Self::spawn_with_machine(config.ws_url.clone(), machine, connector, session)
    }

    /// Start the driver around a prebuilt machine.
    pub fn spawn_with_machine(
        url: String,
        machine: ConnectionMachine,
        connector: Arc<dyn ChannelConnector>,
        session: SessionContext,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(machine.status());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let session_rx = session.subscribe();
        let driver = Driver {
            url,
            connector,
            was_authenticated: session.is_authenticated(),
            session_id: session.session_id(),
            session,
            session_rx,
            machine,
            socket: None,
            opening: None,
            retry_at: None,
            commands: commands_rx,
            status: status_tx,
            events: events_tx.clone(),
        };
        let task = tokio::spawn(driver.run());

        Self {
            commands: commands_tx,
            status: status_rx,
            events: events_tx,
            task,
        }
    }

    /// Open the channel if it is not already open or opening.
    ///
    /// No-op without an authenticated session.
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Close the channel with a normal closure. No automatic reconnection
    /// follows until [`connect`](Self::connect) or a new login.
    pub fn disconnect(&self) {
        self.disconnect_with(CLOSE_NORMAL, "client disconnect");
    }

    pub fn disconnect_with(&self, code: u16, reason: impl Into<String>) {
        let _ = self.commands.send(Command::Disconnect {
            code,
            reason: reason.into(),
        });
    }

    /// Send a JSON message over the live channel.
    ///
    /// Returns true only if the channel was live and the frame was written.
    /// Nothing is queued for later.
    pub async fn send(&self, message: &Value) -> bool {
        let (ack, result) = oneshot::channel();
        let command = Command::Send {
            text: ClientFrame::Message(message.clone()).encode(),
            ack,
        };
        if self.commands.send(command).is_err() {
            return false;
        }
        result.await.unwrap_or(false)
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.status.borrow().reconnect_attempts
    }

    /// Observe status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Receive live application events.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveMessage> {
        self.events.subscribe()
    }

    /// Close the channel and wait for the driver to finish.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            warn!(error = %e, "live channel driver ended abnormally");
        }
    }
}

/// What woke the driver.
enum Wake {
    Command(Option<Command>),
    Session,
    Opened(Result<ChannelSocket, WsError>),
    Frame(Option<Result<String, WsError>>),
    RetryDue,
}

struct Driver {
    url: String,
    connector: Arc<dyn ChannelConnector>,
    session: SessionContext,
    session_rx: watch::Receiver<SessionState>,
    was_authenticated: bool,
    session_id: u64,
    machine: ConnectionMachine,
    socket: Option<ChannelSocket>,
    opening: Option<BoxFuture<'static, Result<ChannelSocket, WsError>>>,
    retry_at: Option<Instant>,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<LiveMessage>,
}

impl Driver {
    async fn run(mut self) {
        if self.was_authenticated {
            self.dispatch(Event::SessionAuthenticated).await;
        }

        loop {
            let wake = tokio::select! {
                command = self.commands.recv() => Wake::Command(command),
                Ok(()) = self.session_rx.changed() => Wake::Session,
                opened = wait_open(&mut self.opening), if self.opening.is_some() => Wake::Opened(opened),
                frame = next_frame(&mut self.socket), if self.socket.is_some() => Wake::Frame(frame),
                _ = wait_until(self.retry_at), if self.retry_at.is_some() => Wake::RetryDue,
            };

            match wake {
                Wake::Command(None) => {
                    debug!("live channel handle dropped, shutting down");
                    self.dispatch(Event::DisconnectRequested {
                        code: CLOSE_NORMAL,
                        reason: "client shutdown".to_string(),
                    })
                    .await;
                    break;
                }
                Wake::Command(Some(Command::Connect)) => {
                    self.dispatch(Event::ConnectRequested).await;
                }
                Wake::Command(Some(Command::Disconnect { code, reason })) => {
                    self.dispatch(Event::DisconnectRequested { code, reason }).await;
                }
                Wake::Command(Some(Command::Send { text, ack })) => {
                    let sent = self.transmit(text).await;
                    let _ = ack.send(sent);
                }
                Wake::Session => self.on_session_changed().await,
                Wake::Opened(Ok(socket)) => {
                    self.opening = None;
                    self.socket = Some(socket);
                    self.dispatch(Event::SocketOpened).await;
                }
                Wake::Opened(Err(e)) => {
                    self.opening = None;
                    warn!(error = %e, url = %self.url, "live channel failed to open");
                    self.dispatch(Event::SocketClosed).await;
                }
                Wake::Frame(Some(Ok(text))) => {
                    self.dispatch(Event::FrameReceived(ServerFrame::parse(&text)))
                        .await;
                }
                Wake::Frame(Some(Err(e))) => {
                    info!(error = %e, "live channel dropped");
                    self.dispatch(Event::SocketClosed).await;
                }
                Wake::Frame(None) => {
                    info!("live channel closed by server");
                    self.dispatch(Event::SocketClosed).await;
                }
                Wake::RetryDue => {
                    self.retry_at = None;
                    self.dispatch(Event::RetryTimerFired).await;
                }
            }
        }
    }

    /// React to the latest session state.
    ///
    /// Intermediate states may have been coalesced by the watch channel, so
    /// a changed session id means the old session ended even if the flag
    /// reads authenticated again.
    async fn on_session_changed(&mut self) {
        let (authenticated, session_id) = {
            let state = self.session_rx.borrow_and_update();
            (state.is_authenticated, state.session_id)
        };
        let switched = session_id != self.session_id;
        self.session_id = session_id;

        if self.was_authenticated && (switched || !authenticated) {
            self.was_authenticated = false;
            self.dispatch(Event::SessionEnded).await;
        }
        if authenticated && !self.was_authenticated {
            self.was_authenticated = true;
            self.dispatch(Event::SessionAuthenticated).await;
        }
    }

    /// Feed an event (and any follow-ups) through the machine.
    async fn dispatch(&mut self, event: Event) {
        let before = self.machine.phase();
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            for action in self.machine.handle(event) {
                if let Some(follow_up) = self.execute(action).await {
                    pending.push_back(follow_up);
                }
            }
        }
        if before != Phase::Live && self.machine.phase() == Phase::Live {
            info!("live channel authenticated");
        }
        self.publish_status();
    }

    async fn execute(&mut self, action: Action) -> Option<Event> {
        match action {
            Action::OpenSocket => {
                self.socket = None;
                let connector = Arc::clone(&self.connector);
                let url = self.url.clone();
                debug!(url = %url, attempt = self.machine.reconnect_attempts(), "opening live channel");
                self.opening = Some(Box::pin(async move { connector.open(&url).await }));
                None
            }
            Action::SendAuth => match self.session.access_token() {
                Some(token) => self.write(ClientFrame::Auth { token }.encode()).await,
                None => {
                    warn!("no credential for live channel authentication");
                    self.was_authenticated = false;
                    Some(Event::SessionEnded)
                }
            },
            Action::SendPong => self.write(ClientFrame::Pong.encode()).await,
            Action::Deliver(message) => {
                // no subscribers is fine
                let _ = self.events.send(message);
                None
            }
            Action::ReportMalformed { error, raw_len } => {
                warn!(error = %error, raw_len, "malformed live frame");
                None
            }
            Action::ArmRetry(delay) => {
                info!(
                    delay_ms = delay.as_millis() as u64,
                    attempt = self.machine.reconnect_attempts(),
                    "live channel lost, reconnecting after backoff"
                );
                self.retry_at = Some(Instant::now() + delay);
                None
            }
            Action::CancelRetry => {
                self.retry_at = None;
                None
            }
            Action::CloseSocket { code, reason } => {
                self.opening = None;
                if let Some(mut socket) = self.socket.take() {
                    info!(code, reason = %reason, "closing live channel");
                    if let Err(e) = socket.sink.send(OutboundFrame::Close { code, reason }).await {
                        debug!(error = %e, "close frame not delivered");
                    }
                }
                None
            }
            Action::ReleaseSocket => {
                self.opening = None;
                self.socket = None;
                None
            }
        }
    }

    /// Write a text frame to the current socket. A failed write is a closure.
    async fn write(&mut self, text: String) -> Option<Event> {
        let Some(socket) = self.socket.as_mut() else {
            return Some(Event::SocketClosed);
        };
        match socket.sink.send(OutboundFrame::Text(text)).await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "live channel write failed");
                Some(Event::SocketClosed)
            }
        }
    }

    async fn transmit(&mut self, text: String) -> bool {
        if !self.machine.status().is_connected {
            debug!(phase = %self.machine.phase(), "send refused, channel not live");
            return false;
        }
        match self.write(text).await {
            None => true,
            Some(event) => {
                self.dispatch(event).await;
                false
            }
        }
    }

    fn publish_status(&self) {
        let status = self.machine.status();
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}

async fn wait_open(
    opening: &mut Option<BoxFuture<'static, Result<ChannelSocket, WsError>>>,
) -> Result<ChannelSocket, WsError> {
    match opening {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(socket: &mut Option<ChannelSocket>) -> Option<Result<String, WsError>> {
    match socket {
        Some(socket) => socket.stream.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockConnector;
    use crate::auth::Credential;
    use serde_json::json;
    use std::time::Duration;

    fn config() -> ClientConfig {
        ClientConfig::default().with_ws_url("ws://mock/ws")
    }

    async fn wait_for_phase(manager: &ConnectionManager, phase: Phase) {
        let mut status = manager.watch_status();
        tokio::time::timeout(Duration::from_secs(60), async {
            while status.borrow_and_update().phase != phase {
                status.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_authenticates_then_goes_live() {
        let (connector, mut peers) = MockConnector::new();
        let session = SessionContext::authenticated(Credential::new("tok"));
        let manager = ConnectionManager::spawn(&config(), Arc::new(connector), session);

        let mut peer = peers.recv().await.unwrap();
        assert_eq!(peer.url(), "ws://mock/ws");
        assert_eq!(peer.next_json().await.unwrap(), json!({ "token": "tok" }));
        assert!(!manager.is_connected());

        peer.ack();
        wait_for_phase(&manager, Phase::Live).await;
        assert!(manager.is_connected());
        assert_eq!(manager.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthenticated_session_stays_idle() {
        let (connector, mut peers) = MockConnector::new();
        let manager =
            ConnectionManager::spawn(&config(), Arc::new(connector), SessionContext::new());

        manager.connect();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(peers.try_recv().is_err());
        assert_eq!(manager.status().phase, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_live_channel() {
        let (connector, mut peers) = MockConnector::new();
        let session = SessionContext::authenticated(Credential::new("tok"));
        let manager = ConnectionManager::spawn(&config(), Arc::new(connector), session);

        let mut peer = peers.recv().await.unwrap();
        peer.next_json().await.unwrap();
        assert!(!manager.send(&json!({ "type": "mark_read" })).await);

        peer.ack();
        wait_for_phase(&manager, Phase::Live).await;
        assert!(manager.send(&json!({ "type": "mark_read" })).await);
        assert_eq!(peer.next_json().await.unwrap(), json!({ "type": "mark_read" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_socket() {
        let (connector, mut peers) = MockConnector::new();
        let session = SessionContext::authenticated(Credential::new("tok"));
        let manager = ConnectionManager::spawn(&config(), Arc::new(connector), session);

        let mut peer = peers.recv().await.unwrap();
        peer.next_json().await.unwrap();
        peer.ack();
        wait_for_phase(&manager, Phase::Live).await;

        manager.shutdown().await;
        assert!(matches!(
            peer.next_frame().await,
            Some(OutboundFrame::Close { code: 1000, .. })
        ));
        assert!(peer.is_released());
    }
}
