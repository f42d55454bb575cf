use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::playback::PlaybackShared;

pub const DEFAULT_DUCKING_LEVEL: f32 = 0.30;

/// Playback volume while the local user speaks, adjustable at runtime
#[derive(Debug, Clone)]
pub struct DuckingLevel(Arc<AtomicU32>);

impl DuckingLevel {
    pub fn new(level: f32) -> Self {
        let cell = Self(Arc::new(AtomicU32::new(0)));
        cell.set(level);
        cell
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Set the level, clamped to [0, 1]
    pub fn set(&self, level: f32) {
        let level = if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            DEFAULT_DUCKING_LEVEL
        };
        self.0.store(level.to_bits(), Ordering::Relaxed);
    }
}

impl Default for DuckingLevel {
    fn default() -> Self {
        Self::new(DEFAULT_DUCKING_LEVEL)
    }
}

/// One-way link from the capture session's speaking detector to the
/// playback session's current clip.
///
/// Only the clip playing at notification time is affected; a signal arriving
/// while nothing plays is discarded.
#[derive(Clone)]
pub struct DuckingLink {
    target: Arc<PlaybackShared>,
    level: DuckingLevel,
}

impl DuckingLink {
    pub(crate) fn new(target: Arc<PlaybackShared>, level: DuckingLevel) -> Self {
        Self { target, level }
    }

    pub fn notify(&self, is_speaking: bool) {
        let volume = if is_speaking { self.level.get() } else { 1.0 };
        self.target.set_current_volume(volume);
    }

    pub fn level(&self) -> &DuckingLevel {
        &self.level
    }
}
