//! Translation session management
//!
//! This module provides the two session roles and the orchestrator that
//! runs them as a pair:
//! - `CaptureSession`: microphone to the service as PCM16, meter, mute
//! - `PlaybackSession`: synthesized speech from the service, played in order
//! - `DuckingLink`: lowers playback volume while the user speaks
//! - `SessionOrchestrator`: connects and disconnects both together

mod capture;
mod config;
mod ducking;
mod lifecycle;
mod orchestrator;
mod playback;
mod sink;
mod stats;

pub use capture::{CaptureOptions, CaptureSession};
pub use config::SessionConfig;
pub use ducking::{DuckingLevel, DuckingLink, DEFAULT_DUCKING_LEVEL};
pub use lifecycle::Session;
pub use orchestrator::{OrchestratorState, SessionOrchestrator};
pub use playback::{PlaybackItem, PlaybackSession};
pub use sink::{TracingSink, UiSink};
pub use stats::SessionStats;
