use anyhow::Result;
use tokio::sync::mpsc;

/// Fixed-size block of mono float samples in [-1, 1]
#[derive(Debug, Clone)]
pub struct AudioBlock {
    /// Mono samples at the configured capture rate
    pub samples: Vec<f32>,
    /// Milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for microphone capture
#[derive(Debug, Clone)]
pub struct AudioInputConfig {
    /// Rate the service expects (blocks are resampled to it)
    pub sample_rate: u32,
    /// Samples per delivered block
    pub block_size: usize,
    /// Bounded queue between the audio thread and the session worker
    pub queue_depth: usize,
}

impl Default for AudioInputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // service expects 16kHz mono PCM
            block_size: 2048,
            queue_depth: 32,
        }
    }
}

/// Microphone capture backend
///
/// Implementations:
/// - `CpalInput`: system audio devices via cpal
/// - scripted inputs in tests
#[async_trait::async_trait]
pub trait AudioInput: Send + Sync {
    /// Start capturing from `device` (system default when `None`).
    ///
    /// Returns a channel receiver that yields blocks in capture order.
    /// Starting while already capturing tears the old stream down first.
    async fn start(&mut self, device: Option<&str>) -> Result<mpsc::Receiver<AudioBlock>>;

    /// Stop capturing. Safe to call when idle.
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}
