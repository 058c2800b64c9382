//! Connection lifecycle and desynchronization detection.
//!
//! The manager does no I/O. A transport asks it whether to start a
//! connection attempt and reports opens and closes back; the manager keeps
//! at most one attempt in flight and counts disconnects of live sessions.
//! Too many disconnects within a window of reconnect intervals means the
//! client and server no longer agree on the document, and the manager
//! moves to a terminal state.

use tracing::{error, info};

use crate::config::ClientConfig;

/// Connection status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and no attempt in flight
    #[default]
    Disconnected,
    /// An attempt is in flight
    Connecting,
    /// Socket open
    Connected,
    /// Terminal: the session must be reloaded
    Desynchronized,
}

/// What a closed socket meant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// A connection attempt failed before opening.
    AttemptFailed,
    /// A live session was lost; reconnecting will be tried.
    Disconnected,
    /// A live session was lost once too often.
    Desynchronized,
}

/// Connection manager for one document session.
#[derive(Clone, Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    /// Disconnects of live sessions since the last window reset
    recent_failures: u32,
    /// Reconnect intervals since the last window reset
    ticks: u32,
    failure_threshold: u32,
    failure_window: u32,
    disposed: bool,
}

impl ConnectionManager {
    /// Create a manager using the thresholds from `config`.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            recent_failures: 0,
            ticks: 0,
            failure_threshold: config.failure_threshold.max(1),
            failure_window: config.failure_window.max(1),
            disposed: false,
        }
    }

    /// Get current connection status.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the socket is open.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Check if the session must be reloaded.
    pub fn is_desynchronized(&self) -> bool {
        self.state == ConnectionState::Desynchronized
    }

    /// Disconnects counted in the current window.
    pub fn recent_failures(&self) -> u32 {
        self.recent_failures
    }

    /// Start a connection attempt if none is in flight and none is open.
    pub fn begin_connect(&mut self) -> bool {
        if self.disposed || self.state != ConnectionState::Disconnected {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    /// One reconnect interval elapsed. Returns whether to start an attempt.
    ///
    /// Every `failure_window` intervals the failure count starts over.
    pub fn tick(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.ticks += 1;
        if self.ticks >= self.failure_window {
            self.ticks = 0;
            self.recent_failures = 0;
        }
        self.begin_connect()
    }

    /// The attempt in flight succeeded.
    pub fn on_open(&mut self) {
        if self.state == ConnectionState::Connecting {
            info!("Connected");
            self.state = ConnectionState::Connected;
        }
    }

    /// The socket closed, or the attempt in flight failed.
    pub fn on_close(&mut self) -> CloseOutcome {
        match self.state {
            ConnectionState::Connected => {
                self.recent_failures += 1;
                if self.recent_failures >= self.failure_threshold {
                    error!(
                        "Disconnected {} times in a short period, giving up",
                        self.recent_failures
                    );
                    self.state = ConnectionState::Desynchronized;
                    self.disposed = true;
                    CloseOutcome::Desynchronized
                } else {
                    info!("Disconnected");
                    self.state = ConnectionState::Disconnected;
                    CloseOutcome::Disconnected
                }
            }
            ConnectionState::Connecting => {
                self.state = ConnectionState::Disconnected;
                CloseOutcome::AttemptFailed
            }
            ConnectionState::Disconnected | ConnectionState::Desynchronized => {
                CloseOutcome::AttemptFailed
            }
        }
    }

    /// Stop all further attempts.
    pub fn dispose(&mut self) {
        self.disposed = true;
        if self.state != ConnectionState::Desynchronized {
            self.state = ConnectionState::Disconnected;
        }
    }
}
