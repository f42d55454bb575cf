use anyhow::Result;

use super::clip::DecodedClip;

/// How a clip's playback ended
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    Finished,
    Failed(String),
}

/// Invoked exactly once when a started clip ends, fails, or is stopped
pub type PlaybackCallback = Box<dyn FnOnce(PlaybackOutcome) + Send + 'static>;

/// Control surface of one clip while it plays
pub trait PlaybackHandle: Send + Sync {
    /// Output gain in [0, 1]
    fn set_volume(&self, volume: f32);

    /// Stop immediately and release the output
    fn stop(&self);
}

/// Speaker output backend
///
/// `start` must not block on the clip's duration: it begins playback and
/// reports completion through `on_finish`.
pub trait AudioOutput: Send + Sync {
    /// Start playing `clip`, routed to `device` when given and available.
    fn start(
        &self,
        clip: DecodedClip,
        device: Option<String>,
        on_finish: PlaybackCallback,
    ) -> Result<Box<dyn PlaybackHandle>>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}
