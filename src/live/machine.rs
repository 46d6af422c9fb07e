//! Connection state machine for the live channel.
//!
//! [`ConnectionMachine::handle`] is a pure transition function: it takes an
//! [`Event`], updates the phase and counters, and returns the [`Action`]s the
//! driver must perform. It never touches a socket or a timer, so every
//! transition is testable without I/O.
//!
//! ```text
//!  Idle ──auth──▶ Connecting ──open──▶ Authenticating ──connected──▶ Live
//!                    ▲                        │                        │
//!                    │ timer                  └──────── close ─────────┤
//!                    │                                                 ▼
//!            ClosedPendingRetry ◀────────── close (not intentional) ───┘
//!                    │
//!                    └── ceiling reached ──▶ Exhausted
//!
//!  any ──disconnect / session ended──▶ ClosedIntentional
//! ```

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use super::backoff::ReconnectPolicy;
use super::frames::{LiveMessage, ServerFrame};

/// Lifecycle phase of the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    /// No authenticated session.
    #[default]
    Idle,
    /// Socket open in progress.
    Connecting,
    /// Auth frame sent, waiting for the server's `connected` acknowledgment.
    Authenticating,
    Live,
    /// Closed unexpectedly; retry timer armed.
    ClosedPendingRetry,
    /// Closed on purpose. No automatic reconnection.
    ClosedIntentional,
    /// Attempt ceiling reached. Waits for an explicit connect.
    Exhausted,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Connecting => "connecting",
            Phase::Authenticating => "authenticating",
            Phase::Live => "live",
            Phase::ClosedPendingRetry => "closed_pending_retry",
            Phase::ClosedIntentional => "closed_intentional",
            Phase::Exhausted => "exhausted",
        }
    }

    /// Phases that hold (or are acquiring) a socket.
    pub fn has_socket(&self) -> bool {
        matches!(self, Phase::Connecting | Phase::Authenticating | Phase::Live)
    }

    /// Phases from which only a fresh session or explicit connect proceeds.
    fn is_at_rest(&self) -> bool {
        matches!(self, Phase::Idle | Phase::ClosedIntentional | Phase::Exhausted)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub phase: Phase,
    pub is_connected: bool,
    pub is_connecting: bool,
    /// Consecutive unintentional closures since the last `Live`.
    pub reconnect_attempts: u32,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The session became authenticated.
    SessionAuthenticated,
    /// The session became unauthenticated.
    SessionEnded,
    ConnectRequested,
    DisconnectRequested { code: u16, reason: String },
    SocketOpened,
    FrameReceived(ServerFrame),
    /// The socket closed (or failed to open) without a local disconnect.
    SocketClosed,
    RetryTimerFired,
}

/// Side effects for the driver to perform, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    OpenSocket,
    SendAuth,
    SendPong,
    Deliver(LiveMessage),
    /// A frame failed to decode. Logged, never fatal.
    ReportMalformed { error: String, raw_len: usize },
    ArmRetry(Duration),
    CancelRetry,
    /// Send a close frame, then drop the socket.
    CloseSocket { code: u16, reason: String },
    /// Drop the socket handle without a close frame (peer already gone).
    ReleaseSocket,
}

/// Normal closure code.
pub const CLOSE_NORMAL: u16 = 1000;

/// The live channel's state machine.
#[derive(Debug)]
pub struct ConnectionMachine {
    phase: Phase,
    reconnect_attempts: u32,
    authenticated: bool,
    intentional_close: bool,
    withheld: Vec<LiveMessage>,
    policy: ReconnectPolicy,
    rng: StdRng,
}

impl ConnectionMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self::with_rng(policy, StdRng::from_os_rng())
    }

    /// Build with a fixed jitter source.
    pub fn with_rng(policy: ReconnectPolicy, rng: StdRng) -> Self {
        Self {
            phase: Phase::Idle,
            reconnect_attempts: 0,
            authenticated: false,
            intentional_close: false,
            withheld: Vec::new(),
            policy,
            rng,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Whether the last closure came from a local disconnect or session end.
    pub fn last_close_intentional(&self) -> bool {
        self.intentional_close
    }

    pub fn is_session_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            phase: self.phase,
            is_connected: self.phase == Phase::Live,
            is_connecting: matches!(self.phase, Phase::Connecting | Phase::Authenticating),
            reconnect_attempts: self.reconnect_attempts,
        }
    }

    /// Apply one event and return the resulting actions.
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        let before = self.phase;
        let actions = match event {
            Event::SessionAuthenticated => {
                self.authenticated = true;
                if self.phase.is_at_rest() {
                    self.begin_session()
                } else {
                    Vec::new()
                }
            }
            Event::SessionEnded => {
                self.authenticated = false;
                self.close_intentionally(CLOSE_NORMAL, "session ended".to_string())
            }
            Event::ConnectRequested => self.on_connect_requested(),
            Event::DisconnectRequested { code, reason } => self.close_intentionally(code, reason),
            Event::SocketOpened => self.on_socket_opened(),
            Event::FrameReceived(frame) => self.on_frame(frame),
            Event::SocketClosed => self.on_socket_closed(),
            Event::RetryTimerFired => self.on_retry_timer(),
        };
        if before != self.phase {
            debug!(from = %before, to = %self.phase, attempt = self.reconnect_attempts, "live phase changed");
        }
        actions
    }

    fn begin_session(&mut self) -> Vec<Action> {
        self.phase = Phase::Connecting;
        self.reconnect_attempts = 0;
        self.intentional_close = false;
        self.withheld.clear();
        vec![Action::OpenSocket]
    }

    fn close_intentionally(&mut self, code: u16, reason: String) -> Vec<Action> {
        self.phase = Phase::ClosedIntentional;
        self.intentional_close = true;
        self.withheld.clear();
        vec![Action::CancelRetry, Action::CloseSocket { code, reason }]
    }

    fn on_connect_requested(&mut self) -> Vec<Action> {
        if !self.authenticated {
            debug!("connect requested without an authenticated session");
            return Vec::new();
        }
        match self.phase {
            Phase::Idle | Phase::ClosedIntentional | Phase::Exhausted => self.begin_session(),
            Phase::ClosedPendingRetry => {
                self.phase = Phase::Connecting;
                self.intentional_close = false;
                vec![Action::CancelRetry, Action::OpenSocket]
            }
            // one socket per session
            Phase::Connecting | Phase::Authenticating | Phase::Live => Vec::new(),
        }
    }

    fn on_socket_opened(&mut self) -> Vec<Action> {
        if self.phase != Phase::Connecting {
            return vec![Action::CloseSocket {
                code: CLOSE_NORMAL,
                reason: "stale socket".to_string(),
            }];
        }
        self.phase = Phase::Authenticating;
        vec![Action::SendAuth]
    }

    fn on_frame(&mut self, frame: ServerFrame) -> Vec<Action> {
        match (self.phase, frame) {
            (Phase::Authenticating, ServerFrame::Connected(_)) => {
                self.phase = Phase::Live;
                self.reconnect_attempts = 0;
                self.withheld.drain(..).map(Action::Deliver).collect()
            }
            (Phase::Authenticating | Phase::Live, ServerFrame::Ping) => vec![Action::SendPong],
            (Phase::Authenticating, ServerFrame::Message(message)) => {
                self.withheld.push(message);
                Vec::new()
            }
            (Phase::Authenticating, ServerFrame::Malformed { raw, error }) => {
                let report = Action::ReportMalformed {
                    error,
                    raw_len: raw.len(),
                };
                self.withheld.push(LiveMessage::Raw(raw));
                vec![report]
            }
            (Phase::Live, ServerFrame::Message(message)) => vec![Action::Deliver(message)],
            (Phase::Live, ServerFrame::Malformed { raw, error }) => vec![
                Action::ReportMalformed {
                    error,
                    raw_len: raw.len(),
                },
                Action::Deliver(LiveMessage::Raw(raw)),
            ],
            (Phase::Live, ServerFrame::Connected(_)) => {
                debug!("duplicate connected acknowledgment ignored");
                Vec::new()
            }
            // frames from a socket that is no longer ours
            _ => Vec::new(),
        }
    }

    fn on_socket_closed(&mut self) -> Vec<Action> {
        if !self.phase.has_socket() {
            return Vec::new();
        }
        self.intentional_close = false;
        self.withheld.clear();

        if !self.policy.allows_retry(self.reconnect_attempts) {
            self.phase = Phase::Exhausted;
            return vec![Action::ReleaseSocket];
        }

        let delay = self.policy.delay_for(self.reconnect_attempts, &mut self.rng);
        self.reconnect_attempts += 1;
        self.phase = Phase::ClosedPendingRetry;
        vec![Action::ReleaseSocket, Action::ArmRetry(delay)]
    }

    fn on_retry_timer(&mut self) -> Vec<Action> {
        if self.phase != Phase::ClosedPendingRetry {
            return Vec::new();
        }
        if !self.authenticated {
            self.phase = Phase::ClosedIntentional;
            self.intentional_close = true;
            return Vec::new();
        }
        self.phase = Phase::Connecting;
        vec![Action::OpenSocket]
    }
}
