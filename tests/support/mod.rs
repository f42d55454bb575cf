// Test doubles shared by the integration tests
//
// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use babelfish::audio::{
    AudioBlock, AudioInput, AudioOutput, DecodedClip, PlaybackCallback, PlaybackHandle,
    PlaybackOutcome,
};
use babelfish::connection::{
    ConnectionSettings, ConnectionState, Connector, OutboundFrame, TransportEvent, TransportLink,
};
use babelfish::error::{SessionError, SessionResult};
use babelfish::session::{SessionConfig, UiSink};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const CAPTURE_ENDPOINT: &str = "wss://test.invalid/present";
pub const PLAYBACK_ENDPOINT: &str = "wss://test.invalid/attend";

pub fn capture_settings() -> ConnectionSettings {
    ConnectionSettings {
        endpoint: CAPTURE_ENDPOINT.to_string(),
        handshake_timeout: Duration::from_millis(10_000),
    }
}

pub fn playback_settings() -> ConnectionSettings {
    ConnectionSettings {
        endpoint: PLAYBACK_ENDPOINT.to_string(),
        handshake_timeout: Duration::from_millis(10_000),
    }
}

pub fn capture_config() -> SessionConfig {
    SessionConfig::new("ABCD-1234", "en", "es-MX")
}

pub fn playback_config() -> SessionConfig {
    SessionConfig::new("ABCD-1234", "es-MX", "en")
}

// ---------------------------------------------------------------------------
// Transport

/// Server end of one in-memory socket
pub struct ServerSide {
    pub endpoint: String,
    pub role: String,
    outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
}

impl ServerSide {
    /// Next frame the client wrote, or None once the client dropped the socket
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        tokio::time::timeout(Duration::from_secs(30), self.outbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Frame already written by the client, without waiting
    pub fn try_next_frame(&mut self) -> Option<OutboundFrame> {
        self.outbound.try_recv().ok()
    }

    /// Next JSON command, skipping binary audio frames
    pub async fn next_json(&mut self) -> Value {
        loop {
            match self.next_frame().await {
                Some(OutboundFrame::Text(text)) => {
                    return serde_json::from_str(&text).expect("client sent invalid JSON")
                }
                Some(OutboundFrame::Binary(_)) => continue,
                other => panic!("expected a JSON command, got {:?}", other),
            }
        }
    }

    /// Next binary frame, skipping JSON commands
    pub async fn next_binary(&mut self) -> Vec<u8> {
        loop {
            match self.next_frame().await {
                Some(OutboundFrame::Binary(bytes)) => return bytes,
                Some(OutboundFrame::Text(_)) => continue,
                other => panic!("expected an audio frame, got {:?}", other),
            }
        }
    }

    /// Read the connect request and accept it
    pub async fn accept(&mut self) -> Value {
        let request = self.next_json().await;
        assert_eq!(request["type"], "connect");
        self.reply(json!({ "type": "status", "success": true }));
        request
    }

    pub fn reply(&self, message: Value) {
        self.send_raw(message.to_string().into_bytes());
    }

    pub fn send_raw(&self, payload: Vec<u8>) {
        let _ = self.inbound.send(TransportEvent::Message(payload));
    }

    pub fn close(&self) {
        let _ = self.inbound.send(TransportEvent::Closed {
            code: Some(1000),
            reason: "server closing".to_string(),
        });
    }

    pub fn fail(&self, message: &str) {
        let _ = self.inbound.send(TransportEvent::Error(message.to_string()));
    }
}

/// Connector whose sockets are served by the test
pub struct MockConnector {
    servers: mpsc::UnboundedSender<ServerSide>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerSide>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            servers,
            refuse: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    /// Make every following connect fail at the transport level
    pub fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str, role: &str) -> SessionResult<TransportLink> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SessionError::Transport {
                role: role.to_string(),
                message: "connection refused".to_string(),
            });
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let server = ServerSide {
            endpoint: endpoint.to_string(),
            role: role.to_string(),
            outbound: outbound_rx,
            inbound: inbound_tx,
        };
        self.servers
            .send(server)
            .map_err(|_| SessionError::Transport {
                role: role.to_string(),
                message: "test server gone".to_string(),
            })?;

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub async fn next_server(servers: &mut mpsc::UnboundedReceiver<ServerSide>) -> ServerSide {
    servers.recv().await.expect("connector dropped")
}

/// Receive the capture and playback sockets, in whichever order they opened
pub async fn next_pair(
    servers: &mut mpsc::UnboundedReceiver<ServerSide>,
) -> (ServerSide, ServerSide) {
    let first = next_server(servers).await;
    let second = next_server(servers).await;
    if first.role == "join" {
        (first, second)
    } else {
        (second, first)
    }
}

// ---------------------------------------------------------------------------
// Audio input

#[derive(Default)]
struct InputShared {
    sender: Mutex<Option<mpsc::Sender<AudioBlock>>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    devices: Mutex<Vec<Option<String>>>,
}

/// Test-side control of a `MockInput`
#[derive(Clone)]
pub struct InputControl {
    shared: Arc<InputShared>,
}

impl InputControl {
    /// Deliver one block as if the microphone produced it
    pub async fn push(&self, samples: Vec<f32>) -> bool {
        let sender = self.shared.sender.lock().unwrap().clone();
        match sender {
            Some(tx) => tx
                .send(AudioBlock {
                    samples,
                    timestamp_ms: 0,
                })
                .await
                .is_ok(),
            None => false,
        }
    }

    pub fn starts(&self) -> usize {
        self.shared.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.shared.stops.load(Ordering::SeqCst)
    }

    pub fn devices(&self) -> Vec<Option<String>> {
        self.shared.devices.lock().unwrap().clone()
    }
}

pub struct MockInput {
    shared: Arc<InputShared>,
    fail: bool,
}

impl MockInput {
    pub fn new() -> (Self, InputControl) {
        Self::build(false)
    }

    /// An input whose device can never be opened
    pub fn unavailable() -> (Self, InputControl) {
        Self::build(true)
    }

    fn build(fail: bool) -> (Self, InputControl) {
        let shared = Arc::new(InputShared::default());
        let control = InputControl {
            shared: Arc::clone(&shared),
        };
        (Self { shared, fail }, control)
    }
}

#[async_trait]
impl AudioInput for MockInput {
    async fn start(&mut self, device: Option<&str>) -> Result<mpsc::Receiver<AudioBlock>> {
        self.shared
            .devices
            .lock()
            .unwrap()
            .push(device.map(str::to_owned));
        if self.fail {
            return Err(anyhow!("permission denied"));
        }
        let (tx, rx) = mpsc::channel(64);
        *self.shared.sender.lock().unwrap() = Some(tx);
        self.shared.starts.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if self.shared.sender.lock().unwrap().take().is_some() {
            self.shared.stops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.shared.sender.lock().unwrap().is_some()
    }

    fn name(&self) -> &str {
        "mock microphone"
    }
}

// ---------------------------------------------------------------------------
// Audio output

/// What the output saw of one started clip
#[derive(Debug, Clone, Default)]
pub struct ClipRecord {
    pub samples: usize,
    pub device: Option<String>,
    pub volumes: Vec<f32>,
    pub stopped: bool,
    pub finished: bool,
}

#[derive(Default)]
struct OutputState {
    clips: Vec<ClipRecord>,
    callbacks: Vec<Option<PlaybackCallback>>,
    active: usize,
    max_active: usize,
}

impl OutputState {
    /// Mark clip `index` as ended and hand back its callback
    fn end(&mut self, index: usize) -> Option<PlaybackCallback> {
        let callback = self.callbacks.get_mut(index)?.take()?;
        self.active -= 1;
        self.clips[index].finished = true;
        Some(callback)
    }
}

/// Output that plays nothing; the test decides when each clip ends
#[derive(Default)]
pub struct MockOutput {
    state: Arc<Mutex<OutputState>>,
}

impl MockOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn started(&self) -> usize {
        self.state.lock().unwrap().clips.len()
    }

    pub fn clip(&self, index: usize) -> ClipRecord {
        self.state.lock().unwrap().clips[index].clone()
    }

    pub fn max_active(&self) -> usize {
        self.state.lock().unwrap().max_active
    }

    /// Let clip `index` play to its natural end
    pub fn finish(&self, index: usize) {
        let callback = self.state.lock().unwrap().end(index);
        if let Some(callback) = callback {
            callback(PlaybackOutcome::Finished);
        }
    }
}

struct MockHandle {
    index: usize,
    state: Arc<Mutex<OutputState>>,
}

impl PlaybackHandle for MockHandle {
    fn set_volume(&self, volume: f32) {
        self.state.lock().unwrap().clips[self.index]
            .volumes
            .push(volume);
    }

    fn stop(&self) {
        let callback = {
            let mut state = self.state.lock().unwrap();
            state.clips[self.index].stopped = true;
            state.end(self.index)
        };
        // A stopped clip still reports its end, as a real device does
        if let Some(callback) = callback {
            callback(PlaybackOutcome::Finished);
        }
    }
}

impl AudioOutput for MockOutput {
    fn start(
        &self,
        clip: DecodedClip,
        device: Option<String>,
        on_finish: PlaybackCallback,
    ) -> Result<Box<dyn PlaybackHandle>> {
        let mut state = self.state.lock().unwrap();
        let index = state.clips.len();
        state.clips.push(ClipRecord {
            samples: clip.samples.len(),
            device,
            ..ClipRecord::default()
        });
        state.callbacks.push(Some(on_finish));
        state.active += 1;
        state.max_active = state.max_active.max(state.active);
        Ok(Box::new(MockHandle {
            index,
            state: Arc::clone(&self.state),
        }))
    }

    fn name(&self) -> &str {
        "mock speaker"
    }
}

// ---------------------------------------------------------------------------
// UI

#[derive(Default)]
pub struct RecordingSink {
    statuses: Mutex<Vec<(ConnectionState, String)>>,
    lines: Mutex<Vec<(String, bool)>>,
    levels: Mutex<Vec<f32>>,
    mute: Mutex<Vec<bool>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn statuses(&self) -> Vec<(ConnectionState, String)> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn status_messages(&self) -> Vec<String> {
        self.statuses().into_iter().map(|(_, m)| m).collect()
    }

    pub fn lines(&self) -> Vec<(String, bool)> {
        self.lines.lock().unwrap().clone()
    }

    pub fn levels(&self) -> Vec<f32> {
        self.levels.lock().unwrap().clone()
    }

    pub fn last_level(&self) -> Option<f32> {
        self.levels.lock().unwrap().last().copied()
    }

    pub fn mute_indicator(&self) -> Vec<bool> {
        self.mute.lock().unwrap().clone()
    }
}

impl UiSink for RecordingSink {
    fn report_status(&self, state: ConnectionState, message: &str) {
        self.statuses
            .lock()
            .unwrap()
            .push((state, message.to_string()));
    }

    fn append_transcript_line(&self, text: &str, is_error: bool) {
        self.lines
            .lock()
            .unwrap()
            .push((text.to_string(), is_error));
    }

    fn set_visualizer_level(&self, fraction: f32) {
        self.levels.lock().unwrap().push(fraction);
    }

    fn set_mute_indicator(&self, muted: bool) {
        self.mute.lock().unwrap().push(muted);
    }
}

// ---------------------------------------------------------------------------
// Misc

/// 16 kHz mono WAV clip of `samples` samples
pub fn wav_clip(samples: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..samples {
            writer.write_sample(((i % 64) as i16 - 32) * 256).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// `speech` message carrying `clip` as a JSON byte array
pub fn speech_message(clip: &[u8]) -> Value {
    json!({ "type": "speech", "synthesizedSpeech": { "data": clip } })
}

/// Poll `condition` until it holds, yielding to the runtime between checks
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not met in time");
}
