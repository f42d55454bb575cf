pub mod frame;
pub mod messages;

pub use frame::InboundFrame;
pub use messages::{
    ConnectRequest, InboundMessage, OutboundMessage, SpeakerIdentity, SpeechData,
    SynthesizedSpeech, TranscriptPayload,
};
