use base64::Engine;
use serde::{Deserialize, Serialize};

/// Connect request sent as the first frame on every socket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub presentation_code: String,
    /// Omitted from the wire when `None`; capture sessions always set it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    pub language_code: String,
    /// Present only for capture sessions
    #[serde(flatten)]
    pub speaker: Option<SpeakerIdentity>,
}

/// Identity a capture session presents as a speaker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerIdentity {
    pub speaker_id: String,
    pub name: String,
    pub connection_code: String,
    /// Always serialized, as `null` when unset
    pub context: Option<serde_json::Value>,
}

/// JSON commands sent by the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    Connect(ConnectRequest),
    Start {
        #[serde(rename = "languageCode")]
        language_code: String,
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
    },
    Change {
        #[serde(rename = "languageCode")]
        language_code: String,
    },
    Voice {
        enabled: bool,
    },
}

impl OutboundMessage {
    /// Wire name of the command, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Connect(_) => "connect",
            OutboundMessage::Start { .. } => "start",
            OutboundMessage::Change { .. } => "change",
            OutboundMessage::Voice { .. } => "voice",
        }
    }
}

/// JSON events received from the service
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    Status {
        #[serde(default)]
        success: bool,
        #[serde(default)]
        message: Option<String>,
    },
    Speech {
        #[serde(rename = "synthesizedSpeech")]
        synthesized_speech: SynthesizedSpeech,
    },
    Phrase(TranscriptPayload),
    #[serde(rename = "result")]
    Translation(TranscriptPayload),
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Transcript-bearing fields of `phrase` and `result` events
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptPayload {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub translated_text: Option<String>,
}

impl TranscriptPayload {
    /// `text` when non-empty, otherwise `translatedText`
    pub fn display_text(&self) -> Option<&str> {
        [self.text.as_deref(), self.translated_text.as_deref()]
            .into_iter()
            .flatten()
            .find(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SynthesizedSpeech {
    pub data: SpeechData,
}

/// Audio clip bytes as the service encodes them
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SpeechData {
    /// Serialized byte buffer (`[82, 73, 70, 70, ...]`)
    Bytes(Vec<u8>),
    /// Base64 text
    Encoded(String),
}

impl SpeechData {
    pub fn into_bytes(self) -> Result<Vec<u8>, base64::DecodeError> {
        match self {
            SpeechData::Bytes(bytes) => Ok(bytes),
            SpeechData::Encoded(text) => base64::engine::general_purpose::STANDARD.decode(text),
        }
    }
}
