//! Error types for session and connection lifecycle

use thiserror::Error;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Failures surfaced by `connect()` and the orchestrator.
///
/// Everything except `DeviceAcquisition` rejects a connect attempt.
/// `DeviceAcquisition` is reported to the UI and leaves the session connected.
/// The orchestrator adds `ConnectInProgress` (nothing was done) and
/// `ConnectCancelled` (the attempt was torn down).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("{role}: Connection timed out.")]
    ConnectionTimeout { role: String },

    #[error("{role}: Connection error: {message}")]
    Transport { role: String, message: String },

    #[error("{message}")]
    Rejected { role: String, message: String },

    #[error("{role}: Connection closed unexpectedly.")]
    UnexpectedClose { role: String },

    #[error("Audio device error: {0}")]
    DeviceAcquisition(String),

    /// `connect_all` called while another connect is still in flight
    #[error("A connect is already in progress.")]
    ConnectInProgress,

    /// The in-flight connect was abandoned by `disconnect_all`
    #[error("Connect cancelled.")]
    ConnectCancelled,
}

impl SessionError {
    /// Whether this error came from the handshake window (pre-`connected`).
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            SessionError::ConnectionTimeout { .. }
                | SessionError::Transport { .. }
                | SessionError::Rejected { .. }
                | SessionError::UnexpectedClose { .. }
        )
    }
}
