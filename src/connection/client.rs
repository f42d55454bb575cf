use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::state::{ConnectionState, StateCell};
use super::transport::{Connector, OutboundFrame, TransportEvent};
use crate::error::{SessionError, SessionResult};
use crate::protocol::{ConnectRequest, InboundFrame, InboundMessage, OutboundMessage};

/// WebSocket close code for a deliberate, clean shutdown
pub const CLOSE_NORMAL: u16 = 1000;

/// Where and how long to wait when opening a connection
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub endpoint: String,
    pub handshake_timeout: Duration,
}

/// One socket's lifecycle: handshake, sends, close.
///
/// Cloning yields another handle to the same socket, so a session's worker
/// can stream frames while the session itself sends commands.
#[derive(Clone)]
pub struct Connection {
    state: StateCell,
    outbound: Option<mpsc::UnboundedSender<OutboundFrame>>,
}

impl Connection {
    pub fn new(state: StateCell) -> Self {
        Self {
            state,
            outbound: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Open the socket and run the handshake.
    ///
    /// Settles exactly once: with the inbound event stream after a successful
    /// `status`, or with the first failure (transport error, rejection,
    /// unexpected close, timeout). The timeout covers the whole attempt and is
    /// dropped as soon as the attempt settles.
    pub async fn open(
        &mut self,
        connector: &dyn Connector,
        settings: &ConnectionSettings,
        request: ConnectRequest,
    ) -> SessionResult<mpsc::UnboundedReceiver<TransportEvent>> {
        let role = self.state.role();
        self.state
            .transition(ConnectionState::Connecting, "Connecting...");

        let attempt = self.handshake(connector, settings, request);
        let result = match tokio::time::timeout(settings.handshake_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::ConnectionTimeout {
                role: role.to_string(),
            }),
        };

        match result {
            Ok(inbound) => {
                self.state.transition(ConnectionState::Connected, "Connected");
                Ok(inbound)
            }
            Err(err) => {
                let message = match &err {
                    SessionError::Rejected { message, .. } => format!("Failed: {}", message),
                    SessionError::Transport { .. } => format!("{}: Connection Error", role),
                    _ => format!("{}: Connection Failed", role),
                };
                warn!("{}: connect failed: {}", role, err);
                self.state.transition(ConnectionState::Error, &message);
                self.close(CLOSE_NORMAL, "Handshake failed");
                Err(err)
            }
        }
    }

    async fn handshake(
        &mut self,
        connector: &dyn Connector,
        settings: &ConnectionSettings,
        request: ConnectRequest,
    ) -> SessionResult<mpsc::UnboundedReceiver<TransportEvent>> {
        let role = self.state.role().to_string();
        let link = connector.connect(&settings.endpoint, &role).await?;
        self.outbound = Some(link.outbound);
        let mut inbound = link.inbound;

        self.send(&OutboundMessage::Connect(request));

        loop {
            match inbound.recv().await {
                Some(TransportEvent::Message(payload)) => match InboundFrame::classify(payload) {
                    InboundFrame::Message(InboundMessage::Status { success, message }) => {
                        if success {
                            info!("{}: handshake accepted", role);
                            return Ok(inbound);
                        }
                        return Err(SessionError::Rejected {
                            role,
                            message: message.unwrap_or_else(|| "Connection rejected".to_string()),
                        });
                    }
                    other => debug!("{}: ignoring frame before handshake: {:?}", role, other),
                },
                Some(TransportEvent::Error(message)) => {
                    return Err(SessionError::Transport { role, message });
                }
                Some(TransportEvent::Closed { .. }) | None => {
                    return Err(SessionError::UnexpectedClose { role });
                }
            }
        }
    }

    /// Serialize and queue a JSON command. Returns false if the socket is gone.
    pub fn send(&self, message: &OutboundMessage) -> bool {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize {} command: {}", message.kind(), e);
                return false;
            }
        };
        debug!("{}: sending {}", self.state.role(), message.kind());
        self.send_frame(OutboundFrame::Text(text))
    }

    /// Queue a raw binary frame. Returns false if the socket is gone.
    pub fn send_binary(&self, bytes: Vec<u8>) -> bool {
        self.send_frame(OutboundFrame::Binary(bytes))
    }

    fn send_frame(&self, frame: OutboundFrame) -> bool {
        match &self.outbound {
            Some(outbound) => outbound.send(frame).is_ok(),
            None => false,
        }
    }

    /// Ask the writer to close the socket and drop this handle's sender.
    pub fn close(&mut self, code: u16, reason: &str) {
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(OutboundFrame::Close {
                code,
                reason: reason.to_string(),
            });
        }
    }
}
