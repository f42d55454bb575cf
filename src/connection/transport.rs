use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SessionResult;

/// Frame queued for the socket writer
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
    Close { code: u16, reason: String },
}

/// Event produced by the socket reader
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Payload of a text or binary frame
    Message(Vec<u8>),
    /// Peer closed the socket
    Closed { code: Option<u16>, reason: String },
    /// Network or protocol failure; the socket is unusable afterwards
    Error(String),
}

/// Channel pair for one open socket
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens message-oriented sockets
///
/// Implementations:
/// - `WebSocketConnector`: secure WebSocket via tokio-tungstenite
/// - in-memory connectors for tests
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a socket to `endpoint`. The `role` label is used in error messages.
    async fn connect(&self, endpoint: &str, role: &str) -> SessionResult<TransportLink>;

    /// Connector name for logging
    fn name(&self) -> &str;
}
