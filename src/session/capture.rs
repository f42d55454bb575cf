// Capture ("join") session
//
// Streams the microphone to the service as 16-bit PCM, drives the level
// meter, and tells the ducking link whether the user is speaking.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::ducking::DuckingLink;
use super::lifecycle::{next_event, route_event, Routed, Session, SessionCore};
use super::sink::UiSink;
use super::stats::{SessionStats, StatsCounters};
use crate::audio::{encode_pcm16, meter_fraction, rms, AudioBlock, AudioInput};
use crate::connection::{
    Connection, ConnectionSettings, ConnectionState, Connector, SessionRole, StateCell,
    TransportEvent,
};
use crate::error::{SessionError, SessionResult};
use crate::protocol::{ConnectRequest, OutboundMessage, SpeakerIdentity};

/// Speaker identity and signal thresholds for a capture session
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Sample rate announced in the `start` command
    pub sample_rate: u32,
    pub speaker_name: String,
    pub connection_code: String,
    /// Prefix of the generated speaker id
    pub speaker_prefix: String,
    /// RMS above which the user counts as speaking
    pub speaking_threshold: f32,
    /// Meter scale applied to RMS before clamping
    pub meter_gain: f32,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            speaker_name: "My Voice (Babelfish)".to_string(),
            connection_code: "wordly-babelfish-app".to_string(),
            speaker_prefix: "babelfish-join".to_string(),
            speaking_threshold: 0.02,
            meter_gain: 8.0,
        }
    }
}

/// Speaker-side session: microphone in, translation transcript out
pub struct CaptureSession {
    core: SessionCore,
    input: Box<dyn AudioInput>,
    options: CaptureOptions,
    ducking: Option<DuckingLink>,
    muted: Arc<AtomicBool>,
    level: Arc<AtomicU32>,
}

impl CaptureSession {
    pub fn new(
        connector: Arc<dyn Connector>,
        settings: ConnectionSettings,
        input: Box<dyn AudioInput>,
        options: CaptureOptions,
        sink: Arc<dyn UiSink>,
    ) -> Self {
        Self {
            core: SessionCore::new(SessionRole::Capture, connector, settings, sink),
            input,
            options,
            ducking: None,
            muted: Arc::new(AtomicBool::new(false)),
            level: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Duck another session's playback while the user speaks.
    ///
    /// Takes effect from the next connect.
    pub fn link_ducking(&mut self, link: DuckingLink) {
        self.ducking = Some(link);
    }

    /// Flip the mute flag and return the new value.
    ///
    /// Muting withholds audio from the socket only; the meter and speaking
    /// detection keep running.
    pub fn toggle_mute(&self) -> bool {
        let muted = !self.muted.fetch_xor(true, Ordering::SeqCst);
        self.core.sink.set_mute_indicator(muted);
        info!("Microphone {}", if muted { "muted" } else { "unmuted" });
        muted
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// RMS of the most recent block
    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }

    pub fn is_capturing(&self) -> bool {
        self.input.is_capturing()
    }

    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.core.subscribe()
    }

    fn connect_request(&self, config: &SessionConfig) -> ConnectRequest {
        ConnectRequest {
            presentation_code: config.session_id.clone(),
            // The join handshake always carries the key, empty when unset
            access_key: Some(config.passcode.clone().unwrap_or_default()),
            language_code: config.source_language.clone(),
            speaker: Some(SpeakerIdentity {
                speaker_id: format!("{}-{}", self.options.speaker_prefix, Uuid::new_v4()),
                name: self.options.speaker_name.clone(),
                connection_code: self.options.connection_code.clone(),
                context: None,
            }),
        }
    }

    /// Start the microphone. A device failure leaves the session connected
    /// without a capture pipeline.
    async fn start_capture(&mut self, device: Option<&str>) -> Option<mpsc::Receiver<AudioBlock>> {
        self.stop_capture().await;
        match self.input.start(device).await {
            Ok(blocks) => {
                info!("Capturing from {} ({})", self.input.name(), device.unwrap_or("default"));
                Some(blocks)
            }
            Err(e) => {
                warn!("{}", SessionError::DeviceAcquisition(format!("{:#}", e)));
                self.core
                    .sink
                    .append_transcript_line("Could not get microphone.", true);
                None
            }
        }
    }

    async fn stop_capture(&mut self) {
        if self.input.is_capturing() {
            if let Err(e) = self.input.stop().await {
                warn!("Failed to stop {}: {:#}", self.input.name(), e);
            }
        }
    }

    fn reset_meter(&self) {
        self.level.store(0f32.to_bits(), Ordering::Relaxed);
        self.core.sink.set_visualizer_level(0.0);
    }
}

#[async_trait]
impl Session for CaptureSession {
    fn role(&self) -> SessionRole {
        SessionRole::Capture
    }

    fn state(&self) -> ConnectionState {
        self.core.state.get()
    }

    async fn connect(&mut self, config: SessionConfig) -> SessionResult<()> {
        self.stop_capture().await;
        let request = self.connect_request(&config);
        let (connection, inbound) = self.core.open(request).await?;

        let commands = [
            OutboundMessage::Change {
                language_code: config.target_language.clone(),
            },
            OutboundMessage::Start {
                language_code: config.source_language.clone(),
                sample_rate: self.options.sample_rate,
            },
            OutboundMessage::Voice { enabled: true },
        ];
        for command in &commands {
            connection.send(command);
        }

        let blocks = self.start_capture(config.input_device_id.as_deref()).await;
        let worker = CaptureWorker {
            state: self.core.state.clone(),
            sink: Arc::clone(&self.core.sink),
            stats: Arc::clone(&self.core.stats),
            connection,
            ducking: self.ducking.clone(),
            muted: Arc::clone(&self.muted),
            level: Arc::clone(&self.level),
            threshold: self.options.speaking_threshold,
            meter_gain: self.options.meter_gain,
        };
        self.core.spawn_worker(worker.run(inbound, blocks));
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.stop_capture().await;
        self.core.disconnect().await;
        self.reset_meter();
    }

    fn stats(&self) -> SessionStats {
        self.core.snapshot()
    }
}

struct CaptureWorker {
    state: StateCell,
    sink: Arc<dyn UiSink>,
    stats: Arc<StatsCounters>,
    connection: Connection,
    ducking: Option<DuckingLink>,
    muted: Arc<AtomicBool>,
    level: Arc<AtomicU32>,
    threshold: f32,
    meter_gain: f32,
}

impl CaptureWorker {
    async fn run(
        self,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
        blocks: Option<mpsc::Receiver<AudioBlock>>,
    ) {
        let mut inbound = Some(inbound);
        let mut blocks = blocks;
        loop {
            tokio::select! {
                event = next_event(&mut inbound) => {
                    match route_event(event, &self.state, self.sink.as_ref(), &self.stats) {
                        Routed::Speech(_) | Routed::Audio(_) => {
                            debug!("{}: ignoring audio frame", self.state.role());
                        }
                        Routed::Ended => inbound = None,
                        Routed::Handled => {}
                    }
                }
                block = next_block(&mut blocks) => match block {
                    Some(block) => self.process_block(&block),
                    None => {
                        debug!("Capture channel closed");
                        blocks = None;
                    }
                },
            }
        }
    }

    fn process_block(&self, block: &AudioBlock) {
        let level = rms(&block.samples);
        self.level.store(level.to_bits(), Ordering::Relaxed);
        self.sink
            .set_visualizer_level(meter_fraction(level, self.meter_gain));

        // Speaking detection runs regardless of mute
        if let Some(ducking) = &self.ducking {
            ducking.notify(level > self.threshold);
        }

        if self.muted.load(Ordering::SeqCst) {
            StatsCounters::bump(&self.stats.frames_suppressed);
            return;
        }
        if self.state.get() == ConnectionState::Connected
            && self.connection.send_binary(encode_pcm16(&block.samples))
        {
            StatsCounters::bump(&self.stats.frames_sent);
        }
    }
}

async fn next_block(blocks: &mut Option<mpsc::Receiver<AudioBlock>>) -> Option<AudioBlock> {
    match blocks {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
