// Inbound frame classification
//
// The service does not tag its frames. Every payload is first decoded as
// UTF-8 JSON; anything that fails to parse is an opaque audio payload.
// JSON that parses but is not a known event becomes `InboundMessage::Unknown`.

use tracing::debug;

use super::messages::InboundMessage;

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Message(InboundMessage),
    Audio(Vec<u8>),
}

impl InboundFrame {
    pub fn classify(payload: Vec<u8>) -> Self {
        let value: serde_json::Value = match serde_json::from_slice(&payload) {
            Ok(value) => value,
            Err(_) => return InboundFrame::Audio(payload),
        };

        match serde_json::from_value::<InboundMessage>(value) {
            Ok(message) => InboundFrame::Message(message),
            Err(e) => {
                debug!("Unrecognized JSON frame: {}", e);
                InboundFrame::Message(InboundMessage::Unknown)
            }
        }
    }
}
