use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use super::role::SessionRole;
use crate::session::UiSink;

/// Lifecycle of one session's socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    /// Transitions a live connection may take on its own.
    ///
    /// Local teardown (`StateCell::force_disconnected`) bypasses this table.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Error, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error)
                | (Connected, Disconnected)
                | (Connected, Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-owned holder of the current `ConnectionState`.
///
/// Outlives individual connections so observers (the orchestrator, the UI)
/// can subscribe once. Every applied transition is reported to the UI sink.
#[derive(Clone)]
pub struct StateCell {
    role: SessionRole,
    tx: Arc<watch::Sender<ConnectionState>>,
    sink: Arc<dyn UiSink>,
}

impl StateCell {
    pub fn new(role: SessionRole, sink: Arc<dyn UiSink>) -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            role,
            tx: Arc::new(tx),
            sink,
        }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Apply `next` if the lifecycle allows it. Returns whether it was applied.
    pub fn transition(&self, next: ConnectionState, message: &str) -> bool {
        let current = self.get();
        if !current.can_transition_to(next) {
            warn!(
                "{}: ignoring state change {} -> {} ({})",
                self.role, current, next, message
            );
            return false;
        }
        self.apply(next, message);
        true
    }

    /// Local teardown: lands in `Disconnected` from any state.
    pub fn force_disconnected(&self) {
        if self.get() != ConnectionState::Disconnected {
            self.apply(ConnectionState::Disconnected, "Disconnected");
        }
    }

    fn apply(&self, next: ConnectionState, message: &str) {
        info!("{}: {} ({})", self.role, next, message);
        self.tx.send_replace(next);
        self.sink.report_status(next, message);
    }
}
