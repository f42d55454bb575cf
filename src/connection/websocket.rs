// WebSocket transport using tokio-tungstenite
//
// The socket is split into a writer task fed by an unbounded channel and a
// reader task that forwards every frame as a `TransportEvent`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::transport::{Connector, OutboundFrame, TransportEvent, TransportLink};
use crate::error::{SessionError, SessionResult};

#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str, role: &str) -> SessionResult<TransportLink> {
        info!("{}: opening socket to {}", role, endpoint);

        let (stream, _response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| SessionError::Transport {
                role: role.to_string(),
                message: e.to_string(),
            })?;

        let (mut write, mut read) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<TransportEvent>();

        let writer_role = role.to_string();
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let (message, closing) = match frame {
                    OutboundFrame::Text(text) => (Message::Text(text), false),
                    OutboundFrame::Binary(bytes) => (Message::Binary(bytes), false),
                    OutboundFrame::Close { code, reason } => (
                        Message::Close(Some(CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        })),
                        true,
                    ),
                };

                if let Err(e) = write.send(message).await {
                    warn!("{}: socket write failed: {}", writer_role, e);
                    break;
                }
                if closing {
                    break;
                }
            }
            debug!("{}: socket writer stopped", writer_role);
        });

        let reader_role = role.to_string();
        tokio::spawn(async move {
            let mut terminal_sent = false;

            while let Some(message) = read.next().await {
                let event = match message {
                    Ok(Message::Binary(bytes)) => TransportEvent::Message(bytes),
                    Ok(Message::Text(text)) => TransportEvent::Message(text.into_bytes()),
                    Ok(Message::Close(frame)) => {
                        terminal_sent = true;
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                            None => (None, String::new()),
                        };
                        TransportEvent::Closed { code, reason }
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        terminal_sent = true;
                        TransportEvent::Error(e.to_string())
                    }
                };

                let terminal = terminal_sent;
                if inbound_tx.send(event).is_err() || terminal {
                    break;
                }
            }

            if !terminal_sent {
                let _ = inbound_tx.send(TransportEvent::Closed {
                    code: None,
                    reason: String::new(),
                });
            }
            debug!("{}: socket reader stopped", reader_role);
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }

    fn name(&self) -> &str {
        "websocket"
    }
}
