//! Connection lifecycle state machine.
//!
//! [`Machine`] performs no I/O. Each [`Event`] is fed to exactly one transition function, which
//! records the side effects to perform as [`Action`]s. The connection driver executes those
//! actions (spawning sockets, arming timers, invoking callbacks) and feeds the outcomes back in
//! as new events.
//!
//! Sockets and timers are identified by ids handed out by the machine. An event whose id is no
//! longer current belongs to a socket or timer that was superseded and is ignored, which is
//! what makes late socket callbacks and stale reconnect timers harmless.

use std::time::{Duration, Instant};

use backoff::backoff::Backoff as _;

use super::backoff::ReconnectBudget;
use super::config::Config;
use super::error::WsError;
use super::network::NetworkSignal;
use crate::error::Error;

/// Close codes the reconnection policy distinguishes.
pub mod close_code {
    /// Normal closure; never retried
    pub const NORMAL: u16 = 1000;
    /// Closed without a close frame
    pub const NO_STATUS: u16 = 1005;
    /// Transport dropped without a closing handshake
    pub const ABNORMAL: u16 = 1006;
    /// Locally injected when the handshake exceeds the connect timeout
    pub const CONNECT_TIMEOUT: u16 = 4008;
}

/// Consumer-visible connection status.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
    /// No socket; a reconnect may be pending
    Closed,
    /// Handshake in flight
    Connecting,
    /// Handshake complete, frames flow both ways
    Open,
    /// The socket reported an error, or could not be created
    Error,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

pub(crate) type SocketId = u64;
pub(crate) type TimerId = u64;

/// Internal lifecycle phase. Several phases share a [`ConnectionStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Nothing live, nothing pending
    Idle,
    Connecting {
        socket: SocketId,
    },
    Open {
        socket: SocketId,
        since: Instant,
    },
    /// Socket errored; its close event is still to come
    Failed {
        socket: SocketId,
    },
    /// Closed with a reconnect timer armed
    Backoff {
        timer: TimerId,
    },
    /// Closed after the reconnect budget ran out
    Exhausted,
    /// The socket could not even be created
    Faulted,
}

impl Phase {
    pub(crate) const fn status(self) -> ConnectionStatus {
        match self {
            Self::Idle | Self::Backoff { .. } | Self::Exhausted => ConnectionStatus::Closed,
            Self::Connecting { .. } => ConnectionStatus::Connecting,
            Self::Open { .. } => ConnectionStatus::Open,
            Self::Failed { .. } | Self::Faulted => ConnectionStatus::Error,
        }
    }

    pub(crate) const fn socket(self) -> Option<SocketId> {
        match self {
            Self::Connecting { socket } | Self::Open { socket, .. } | Self::Failed { socket } => {
                Some(socket)
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum Event {
    Connect,
    Disconnect,
    Reconnect,
    Network(NetworkSignal),
    Opened {
        socket: SocketId,
    },
    Errored {
        socket: SocketId,
        error: Error,
    },
    Closed {
        socket: SocketId,
        code: u16,
        reason: String,
    },
    /// The socket could not be constructed at all
    Unavailable {
        socket: SocketId,
        error: Error,
    },
    ConnectTimedOut {
        socket: SocketId,
    },
    ReconnectDue {
        timer: TimerId,
    },
}

#[derive(Debug)]
pub(crate) enum Notification {
    Open,
    Close { code: u16, reason: String },
    Error(Error),
}

#[derive(Debug)]
pub(crate) enum Action {
    OpenSocket { socket: SocketId },
    /// Send a close frame on the live socket, then release it
    CloseSocket { code: u16, reason: &'static str },
    /// Release the live socket without a closing handshake
    DropSocket,
    ArmConnectTimeout { socket: SocketId },
    CancelConnectTimeout,
    StartHeartbeat,
    StopHeartbeat,
    ArmReconnect { timer: TimerId, delay: Duration },
    CancelReconnect,
    Status(ConnectionStatus),
    Notify(Notification),
}

#[derive(Debug)]
pub(crate) struct Machine {
    phase: Phase,
    budget: ReconnectBudget,
    next_id: u64,
    actions: Vec<Action>,
}

impl Machine {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            phase: Phase::Idle,
            budget: ReconnectBudget::new(config.reconnect_interval, config.reconnect_attempts),
            next_id: 0,
            actions: Vec::new(),
        }
    }

    pub(crate) const fn status(&self) -> ConnectionStatus {
        self.phase.status()
    }

    pub(crate) const fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) const fn attempts(&self) -> u32 {
        self.budget.attempts()
    }

    /// Apply one event and return the side effects it produced, in order.
    pub(crate) fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::Connect => self.connect(),
            Event::Disconnect => self.disconnect(),
            Event::Reconnect => self.reconnect(),
            Event::Network(NetworkSignal::Offline) => self.disconnect(),
            Event::Network(NetworkSignal::Online) => self.reconnect(),
            Event::Opened { socket } => self.opened(socket),
            Event::Errored { socket, error } => self.errored(socket, error),
            Event::Closed {
                socket,
                code,
                reason,
            } => self.closed(socket, code, reason),
            Event::Unavailable { socket, error } => self.unavailable(socket, error),
            Event::ConnectTimedOut { socket } => self.connect_timed_out(socket),
            Event::ReconnectDue { timer } => self.reconnect_due(timer),
        }

        std::mem::take(&mut self.actions)
    }

    fn connect(&mut self) {
        match self.phase {
            Phase::Open { .. } | Phase::Connecting { .. } => return,
            // The errored socket is about to close; supersede it
            Phase::Failed { .. } => self.push(Action::DropSocket),
            Phase::Backoff { .. } => self.push(Action::CancelReconnect),
            Phase::Idle | Phase::Exhausted | Phase::Faulted => {}
        }

        let socket = self.next_id();
        self.set_phase(Phase::Connecting { socket });
        self.push(Action::OpenSocket { socket });
        self.push(Action::ArmConnectTimeout { socket });
    }

    fn disconnect(&mut self) {
        let previous = self.phase;

        self.push(Action::CancelReconnect);
        self.push(Action::CancelConnectTimeout);
        self.push(Action::StopHeartbeat);
        self.budget.reset();

        match previous {
            Phase::Open { .. } | Phase::Failed { .. } => self.push(Action::CloseSocket {
                code: close_code::NORMAL,
                reason: "client disconnect",
            }),
            Phase::Connecting { .. } => self.push(Action::DropSocket),
            Phase::Idle | Phase::Backoff { .. } | Phase::Exhausted | Phase::Faulted => {}
        }

        self.set_phase(Phase::Idle);

        if matches!(previous, Phase::Open { .. } | Phase::Failed { .. }) {
            self.push(Action::Notify(Notification::Close {
                code: close_code::NORMAL,
                reason: "client disconnect".to_owned(),
            }));
        }
    }

    fn reconnect(&mut self) {
        self.budget.reset();
        self.disconnect();
        self.connect();
    }

    fn opened(&mut self, socket: SocketId) {
        if self.phase != (Phase::Connecting { socket }) {
            return;
        }

        self.push(Action::CancelConnectTimeout);
        self.budget.reset();
        self.set_phase(Phase::Open {
            socket,
            since: Instant::now(),
        });
        self.push(Action::StartHeartbeat);
        self.push(Action::Notify(Notification::Open));
    }

    fn errored(&mut self, socket: SocketId, error: Error) {
        if !matches!(self.phase, Phase::Connecting { .. } | Phase::Open { .. })
            || self.phase.socket() != Some(socket)
        {
            return;
        }

        self.push(Action::StopHeartbeat);
        self.push(Action::CancelConnectTimeout);
        self.set_phase(Phase::Failed { socket });
        // Reconnect scheduling is left to the close event that always follows
        self.push(Action::Notify(Notification::Error(error)));
    }

    fn closed(&mut self, socket: SocketId, code: u16, reason: String) {
        if self.phase.socket() != Some(socket) {
            return;
        }

        self.push(Action::StopHeartbeat);
        self.push(Action::CancelConnectTimeout);
        self.push(Action::DropSocket);
        self.after_close(code, reason);
    }

    fn after_close(&mut self, code: u16, reason: String) {
        if code == close_code::NORMAL {
            self.set_phase(Phase::Idle);
            self.push(Action::Notify(Notification::Close { code, reason }));
            return;
        }

        match self.budget.next_backoff() {
            Some(delay) => {
                let timer = self.next_id();
                self.set_phase(Phase::Backoff { timer });
                self.push(Action::Notify(Notification::Close { code, reason }));
                self.push(Action::ArmReconnect { timer, delay });
            }
            None => {
                self.set_phase(Phase::Exhausted);
                self.push(Action::Notify(Notification::Close { code, reason }));
                self.push(Action::Notify(Notification::Error(
                    WsError::ReconnectExhausted {
                        attempts: self.budget.attempts(),
                    }
                    .into(),
                )));
            }
        }
    }

    fn unavailable(&mut self, socket: SocketId, error: Error) {
        if self.phase != (Phase::Connecting { socket }) {
            return;
        }

        self.push(Action::CancelConnectTimeout);
        self.push(Action::DropSocket);
        self.set_phase(Phase::Faulted);
        self.push(Action::Notify(Notification::Error(error)));
    }

    fn connect_timed_out(&mut self, socket: SocketId) {
        if self.phase != (Phase::Connecting { socket }) {
            return;
        }

        // Abandon the half-open socket and take the abnormal-close path
        self.push(Action::DropSocket);
        self.after_close(close_code::CONNECT_TIMEOUT, WsError::ConnectTimeout.to_string());
    }

    fn reconnect_due(&mut self, timer: TimerId) {
        if self.phase != (Phase::Backoff { timer }) {
            return;
        }

        self.connect();
    }

    fn set_phase(&mut self, phase: Phase) {
        let before = self.phase.status();
        self.phase = phase;
        let after = phase.status();

        if before != after {
            self.push(Action::Status(after));
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn push(&mut self, action: Action) {
        self.actions.push(action);
    }
}
