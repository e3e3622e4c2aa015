//! Connection state machine.
//!
//! [`ConnectionFsm`] is a pure transition table: it consumes
//! [`ConnectionEvent`]s and answers with the [`Effect`]s the manager must
//! carry out. It performs no I/O, which keeps the reconnect policy testable
//! without sockets or timers.
//!
//! ```text
//! state         event               next state     effects
//! ------------  ------------------  -------------  -----------------------------
//! Disconnected  ConnectRequested    Connecting     CancelRetry, OpenTransport
//! Failed        ConnectRequested    Connecting     OpenTransport (counter := 0)
//! Disconnected  RetryTimerFired     Connecting     OpenTransport
//! Connecting    TransportOpened     Connected      (counter := 0)
//! Connecting    TransportError/     Disconnected   CloseTransport, ScheduleRetry
//!               TransportClosed  or Failed         CloseTransport   (exhausted)
//! Connected     TransportError/     Disconnected   CloseTransport, ScheduleRetry
//!               TransportClosed     (then Failed when exhausted)
//! any           DisconnectRequested Disconnected   CancelRetry, CloseTransport (counter := 0)
//! ```
//!
//! Every scheduled retry increments the attempt counter. A retry is only
//! scheduled while `attempts < max_attempts`.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// State of the coordination channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Automatic reconnects are exhausted. Only an explicit `connect()`
    /// leaves this state.
    Failed,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Failed => "Failed",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Events and effects
// ---------------------------------------------------------------------------

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnectRequested,
    DisconnectRequested,
    RetryTimerFired,
    TransportOpened,
    TransportError,
    TransportClosed,
}

/// Work the manager has to perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Close the current transport (if any) and open a fresh one.
    OpenTransport,
    /// Close and forget the current transport.
    CloseTransport,
    /// Arm the reconnect timer.
    ScheduleRetry,
    /// Disarm a pending reconnect timer.
    CancelRetry,
    /// The state changed; subscribers must be told.
    Notify(ConnectionState),
}

// ---------------------------------------------------------------------------
// ConnectionFsm
// ---------------------------------------------------------------------------

/// Owner of [`ConnectionState`] and of the reconnect attempt counter.
#[derive(Debug, Clone)]
pub struct ConnectionFsm {
    state: ConnectionState,
    attempts: u32,
    max_attempts: u32,
}

impl ConnectionFsm {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Automatic reconnect attempts scheduled since the last successful
    /// connection or explicit request.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Apply `event` and return the effects to carry out, in order.
    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<Effect> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        let mut effects = Vec::new();

        match (self.state, event) {
            (S::Disconnected, E::ConnectRequested) => {
                self.attempts = 0;
                effects.push(Effect::CancelRetry);
                self.enter(S::Connecting, &mut effects);
                effects.push(Effect::OpenTransport);
            }
            (S::Failed, E::ConnectRequested) => {
                self.attempts = 0;
                self.enter(S::Connecting, &mut effects);
                effects.push(Effect::OpenTransport);
            }
            (S::Connecting | S::Connected, E::ConnectRequested) => {}

            (S::Disconnected, E::RetryTimerFired) => {
                self.enter(S::Connecting, &mut effects);
                effects.push(Effect::OpenTransport);
            }
            (_, E::RetryTimerFired) => {}

            (S::Connecting, E::TransportOpened) => {
                self.attempts = 0;
                self.enter(S::Connected, &mut effects);
            }
            // A transport that opened after we stopped waiting for it.
            (_, E::TransportOpened) => effects.push(Effect::CloseTransport),

            (S::Connecting, E::TransportError | E::TransportClosed) => {
                effects.push(Effect::CloseTransport);
                if self.retries_exhausted() {
                    self.enter(S::Failed, &mut effects);
                } else {
                    self.enter(S::Disconnected, &mut effects);
                    self.schedule_retry(&mut effects);
                }
            }
            (S::Connected, E::TransportError | E::TransportClosed) => {
                effects.push(Effect::CloseTransport);
                self.enter(S::Disconnected, &mut effects);
                if self.retries_exhausted() {
                    self.enter(S::Failed, &mut effects);
                } else {
                    self.schedule_retry(&mut effects);
                }
            }
            (S::Disconnected | S::Failed, E::TransportError | E::TransportClosed) => {}

            (_, E::DisconnectRequested) => {
                self.attempts = 0;
                effects.push(Effect::CancelRetry);
                effects.push(Effect::CloseTransport);
                self.enter(S::Disconnected, &mut effects);
            }
        }

        effects
    }

    fn retries_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    fn schedule_retry(&mut self, effects: &mut Vec<Effect>) {
        self.attempts += 1;
        effects.push(Effect::ScheduleRetry);
    }

    fn enter(&mut self, next: ConnectionState, effects: &mut Vec<Effect>) {
        if self.state != next {
            log::debug!("connection: {} → {}", self.state, next);
            self.state = next;
            effects.push(Effect::Notify(next));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
