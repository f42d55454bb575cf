pub mod audio;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod session;

pub use audio::{
    AudioBlock, AudioInput, AudioInputConfig, AudioOutput, CpalInput, DecodedClip,
    PlaybackHandle, PlaybackOutcome, RodioOutput,
};
pub use config::Config;
pub use connection::{
    Connection, ConnectionSettings, ConnectionState, Connector, SessionRole, TransportEvent,
    TransportLink, WebSocketConnector,
};
pub use error::{SessionError, SessionResult};
pub use protocol::{InboundMessage, OutboundMessage};
pub use session::{
    CaptureOptions, CaptureSession, DuckingLevel, DuckingLink, PlaybackSession, Session,
    SessionConfig, SessionOrchestrator, SessionStats, TracingSink, UiSink,
};
