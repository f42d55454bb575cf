// Speaker output using rodio
//
// Each clip gets its own playback thread: rodio's `OutputStream` must stay on
// the thread that opened it, and opening per clip is what lets every clip be
// routed to the output device it was queued with.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::clip::DecodedClip;
use super::output::{AudioOutput, PlaybackCallback, PlaybackHandle, PlaybackOutcome};

/// State shared between a handle and its playback thread.
///
/// Volume and stop requests may arrive before the thread has opened the
/// device; they are recorded here and applied once the sink exists.
#[derive(Default)]
struct SharedControl {
    sink: Mutex<Option<Arc<Sink>>>,
    volume: Mutex<Option<f32>>,
    stopped: AtomicBool,
}

struct RodioHandle {
    control: Arc<SharedControl>,
}

impl PlaybackHandle for RodioHandle {
    fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        if let Ok(mut pending) = self.control.volume.lock() {
            *pending = Some(volume);
        }
        if let Ok(sink) = self.control.sink.lock() {
            if let Some(sink) = sink.as_ref() {
                sink.set_volume(volume);
            }
        }
    }

    fn stop(&self) {
        self.control.stopped.store(true, Ordering::SeqCst);
        if let Ok(sink) = self.control.sink.lock() {
            if let Some(sink) = sink.as_ref() {
                sink.stop();
            }
        }
    }
}

/// rodio-backed speaker output
#[derive(Debug, Default, Clone)]
pub struct RodioOutput;

impl RodioOutput {
    pub fn new() -> Self {
        Self
    }

    /// Output device names, usable as device identifiers
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .context("no output devices available")?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

impl AudioOutput for RodioOutput {
    fn start(
        &self,
        clip: DecodedClip,
        device: Option<String>,
        on_finish: PlaybackCallback,
    ) -> Result<Box<dyn PlaybackHandle>> {
        let control = Arc::new(SharedControl::default());
        let thread_control = Arc::clone(&control);

        std::thread::Builder::new()
            .name("babelfish-playback".to_string())
            .spawn(move || {
                let outcome = match play_clip(clip, device.as_deref(), &thread_control) {
                    Ok(()) => PlaybackOutcome::Finished,
                    Err(e) => {
                        warn!("Playback failed: {:#}", e);
                        PlaybackOutcome::Failed(e.to_string())
                    }
                };
                on_finish(outcome);
            })
            .context("Failed to spawn playback thread")?;

        Ok(Box::new(RodioHandle { control }))
    }

    fn name(&self) -> &str {
        "rodio speaker"
    }
}

fn play_clip(clip: DecodedClip, device: Option<&str>, control: &SharedControl) -> Result<()> {
    if control.stopped.load(Ordering::SeqCst) {
        return Ok(());
    }

    let (_stream, handle) = open_output(device)?;
    let sink = Arc::new(Sink::try_new(&handle).context("Failed to create audio sink")?);

    if let Some(volume) = control.volume.lock().ok().and_then(|v| *v) {
        sink.set_volume(volume);
    }
    sink.append(SamplesBuffer::new(clip.channels, clip.sample_rate, clip.samples));

    {
        let mut slot = control
            .sink
            .lock()
            .map_err(|_| anyhow!("playback control lock poisoned"))?;
        *slot = Some(Arc::clone(&sink));
    }
    // A stop that raced the device opening
    if control.stopped.load(Ordering::SeqCst) {
        sink.stop();
    }

    sink.sleep_until_end();
    debug!("Clip playback ended");
    Ok(())
}

/// Open `device` when given, falling back to the default route
fn open_output(device: Option<&str>) -> Result<(OutputStream, OutputStreamHandle)> {
    if let Some(name) = device.filter(|n| !n.is_empty() && *n != "default") {
        match find_output_device(name) {
            Ok(device) => match OutputStream::try_from_device(&device) {
                Ok(pair) => {
                    info!("Routing playback to '{}'", name);
                    return Ok(pair);
                }
                Err(e) => warn!("Output device '{}' failed, using default: {}", name, e),
            },
            Err(e) => warn!("{}; using default output", e),
        }
    }

    OutputStream::try_default().context("No default output device available")
}

fn find_output_device(name: &str) -> Result<cpal::Device> {
    let host = cpal::default_host();
    let mut devices = host
        .output_devices()
        .context("no output devices available")?;
    devices
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| anyhow!("output device '{}' not found", name))
}
