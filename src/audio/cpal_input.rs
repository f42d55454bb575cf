// Microphone capture using cpal
//
// cpal streams are not `Send` on every platform, so each capture runs on a
// dedicated thread that owns the stream until it is told to stop. The audio
// callback only assembles blocks and hands them to a bounded channel.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::block::BlockAssembler;
use super::input::{AudioBlock, AudioInput, AudioInputConfig};

struct CaptureThread {
    stop_tx: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// cpal-backed microphone input
pub struct CpalInput {
    config: AudioInputConfig,
    capture: Option<CaptureThread>,
}

impl CpalInput {
    pub fn new(config: AudioInputConfig) -> Self {
        Self {
            config,
            capture: None,
        }
    }

    /// Input device names, usable as device identifiers
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

#[async_trait::async_trait]
impl AudioInput for CpalInput {
    async fn start(&mut self, device: Option<&str>) -> Result<mpsc::Receiver<AudioBlock>> {
        if self.capture.is_some() {
            self.stop().await?;
        }

        let (block_tx, block_rx) = mpsc::channel(self.config.queue_depth.max(1));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let config = self.config.clone();
        let device = device.map(str::to_owned);

        let handle = std::thread::Builder::new()
            .name("babelfish-capture".to_string())
            .spawn(move || match open_stream(&config, device.as_deref(), block_tx) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Hold the stream until stop() or the session goes away
                    let _ = stop_rx.recv();
                    if let Err(e) = stream.pause() {
                        debug!("Failed to pause input stream: {}", e);
                    }
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .context("Failed to spawn capture thread")?;

        ready_rx
            .await
            .map_err(|_| anyhow!("capture thread exited before the stream opened"))??;

        self.capture = Some(CaptureThread { stop_tx, handle });
        info!("Microphone capture started");

        Ok(block_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(capture) = self.capture.take() else {
            return Ok(());
        };

        let _ = capture.stop_tx.send(());
        tokio::task::spawn_blocking(move || capture.handle.join())
            .await
            .context("Failed to join capture thread")?
            .map_err(|_| anyhow!("capture thread panicked"))?;

        info!("Microphone capture stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

fn find_input_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    match name.filter(|n| !n.is_empty() && *n != "default") {
        Some(name) => {
            let mut devices = host.input_devices().context("no input devices available")?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow!("input device '{}' not found", name))
        }
        None => host
            .default_input_device()
            .context("no default input device available"),
    }
}

fn open_stream(
    config: &AudioInputConfig,
    device_name: Option<&str>,
    block_tx: mpsc::Sender<AudioBlock>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = find_input_device(&host, device_name)?;
    let default_config = device
        .default_input_config()
        .context("input device has no usable configuration")?;
    let format = default_config.sample_format();
    let stream_config: StreamConfig = default_config.into();

    info!(
        "Opening input '{}' ({:?}, {}Hz, {} channels) -> {}Hz mono blocks of {}",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        format,
        stream_config.sample_rate.0,
        stream_config.channels,
        config.sample_rate,
        config.block_size
    );

    let assembler = BlockAssembler::new(
        stream_config.sample_rate.0,
        stream_config.channels,
        config.sample_rate,
        config.block_size,
    );

    let stream = match format {
        SampleFormat::F32 => build_stream(&device, &stream_config, assembler, block_tx, |s: f32| s)?,
        SampleFormat::I16 => build_stream(&device, &stream_config, assembler, block_tx, |s: i16| {
            s as f32 / 32_768.0
        })?,
        SampleFormat::U16 => build_stream(&device, &stream_config, assembler, block_tx, |s: u16| {
            (s as f32 - 32_768.0) / 32_768.0
        })?,
        other => bail!("unsupported sample format: {:?}", other),
    };

    stream.play().context("Failed to start input stream")?;
    Ok(stream)
}

fn build_stream<T, F>(
    device: &cpal::Device,
    stream_config: &StreamConfig,
    mut assembler: BlockAssembler,
    block_tx: mpsc::Sender<AudioBlock>,
    to_f32: F,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    F: Fn(T) -> f32 + Send + 'static,
{
    let stream = device.build_input_stream(
        stream_config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data.iter().map(|&s| to_f32(s)).collect();
            for block in assembler.push(&samples) {
                // Never block the audio thread
                if let Err(e) = block_tx.try_send(block) {
                    debug!("Dropping audio block: {}", e);
                }
            }
        },
        |err| warn!("Audio stream error: {}", err),
        None,
    )?;
    Ok(stream)
}
