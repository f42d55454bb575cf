// Playback ("attend") session
//
// Receives synthesized speech and plays it strictly one clip at a time in
// arrival order. The queue and the current clip live in `PlaybackShared` so
// the ducking link can reach the clip that is playing right now.

use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::ducking::{DuckingLevel, DuckingLink};
use super::lifecycle::{next_event, route_event, Routed, Session, SessionCore};
use super::sink::UiSink;
use super::stats::{SessionStats, StatsCounters};
use crate::audio::{AudioOutput, DecodedClip, PlaybackCallback, PlaybackHandle, PlaybackOutcome};
use crate::connection::{
    Connection, ConnectionSettings, ConnectionState, Connector, SessionRole, StateCell,
    TransportEvent,
};
use crate::error::SessionResult;
use crate::protocol::{ConnectRequest, OutboundMessage};

/// One received clip waiting for its turn
#[derive(Debug, Clone)]
pub struct PlaybackItem {
    pub audio: Vec<u8>,
    /// Output route captured at enqueue time
    pub output_device_id: Option<String>,
}

#[derive(Debug)]
struct Completion {
    id: u64,
    outcome: PlaybackOutcome,
}

struct ActivePlayback {
    id: u64,
    /// None while the clip is still being decoded and started
    handle: Option<Box<dyn PlaybackHandle>>,
}

struct PlaybackQueue {
    items: VecDeque<PlaybackItem>,
    current: Option<ActivePlayback>,
    next_id: u64,
    audio_enabled: bool,
    output_device_id: Option<String>,
    completions: mpsc::UnboundedSender<Completion>,
}

/// Queue and current clip, shared by the session, its worker and the ducking link
pub(crate) struct PlaybackShared {
    queue: Mutex<PlaybackQueue>,
    output: Arc<dyn AudioOutput>,
    stats: Arc<StatsCounters>,
}

impl PlaybackShared {
    fn new(output: Arc<dyn AudioOutput>, stats: Arc<StatsCounters>) -> Self {
        // Replaced on every connect; until then completions have nowhere to go
        let (completions, _) = mpsc::unbounded_channel();
        Self {
            queue: Mutex::new(PlaybackQueue {
                items: VecDeque::new(),
                current: None,
                next_id: 0,
                audio_enabled: true,
                output_device_id: None,
                completions,
            }),
            output,
            stats,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackQueue> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, output_device_id: Option<String>) -> mpsc::UnboundedReceiver<Completion> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut queue = self.lock();
        queue.output_device_id = output_device_id;
        queue.completions = tx;
        rx
    }

    /// Append a clip unless incoming audio is disabled. Returns whether it was queued.
    fn enqueue(&self, audio: Vec<u8>) -> bool {
        let mut queue = self.lock();
        if !queue.audio_enabled {
            StatsCounters::bump(&self.stats.clips_dropped);
            debug!("Incoming audio disabled; dropping {} byte clip", audio.len());
            return false;
        }
        let output_device_id = queue.output_device_id.clone();
        queue.items.push_back(PlaybackItem {
            audio,
            output_device_id,
        });
        true
    }

    /// Claim the slot for the head of the queue when nothing is playing.
    ///
    /// Decoding and starting the clip happen on a separate task so a long
    /// clip never holds up the session's inbound events.
    fn process_queue(self: &Arc<Self>) {
        let (id, item, completions) = {
            let mut queue = self.lock();
            if queue.current.is_some() {
                return;
            }
            let Some(item) = queue.items.pop_front() else {
                return;
            };
            let id = queue.next_id;
            queue.next_id += 1;
            queue.current = Some(ActivePlayback { id, handle: None });
            (id, item, queue.completions.clone())
        };
        tokio::spawn(Arc::clone(self).start_clip(id, item, completions));
    }

    async fn start_clip(
        self: Arc<Self>,
        id: u64,
        item: PlaybackItem,
        completions: mpsc::UnboundedSender<Completion>,
    ) {
        let PlaybackItem {
            audio,
            output_device_id,
        } = item;
        let decoded = match tokio::task::spawn_blocking(move || DecodedClip::decode(audio)).await {
            Ok(decoded) => decoded,
            Err(e) => Err(anyhow!("clip decoder task failed: {}", e)),
        };

        if !self.is_current(id) {
            debug!("Clip {} cancelled before it started", id);
            return;
        }

        let finished = completions.clone();
        let on_finish: PlaybackCallback = Box::new(move |outcome| {
            let _ = finished.send(Completion { id, outcome });
        });
        let started =
            decoded.and_then(|clip| self.output.start(clip, output_device_id, on_finish));

        match started {
            Ok(handle) => {
                let mut queue = self.lock();
                match queue.current.as_mut() {
                    Some(active) if active.id == id => active.handle = Some(handle),
                    // Cancelled while starting
                    _ => handle.stop(),
                }
            }
            Err(e) => {
                warn!("Clip {} could not be played: {:#}", id, e);
                let _ = completions.send(Completion {
                    id,
                    outcome: PlaybackOutcome::Failed(e.to_string()),
                });
            }
        }
    }

    fn is_current(&self, id: u64) -> bool {
        matches!(self.lock().current.as_ref(), Some(active) if active.id == id)
    }

    /// Release the slot held by clip `id`. Stale ids are ignored.
    fn complete(&self, id: u64, outcome: &PlaybackOutcome) -> bool {
        let mut queue = self.lock();
        match queue.current.as_ref() {
            Some(active) if active.id == id => {
                queue.current = None;
                StatsCounters::bump(&self.stats.clips_played);
                if let PlaybackOutcome::Failed(reason) = outcome {
                    debug!("Clip {} ended with failure: {}", id, reason);
                }
                true
            }
            _ => false,
        }
    }

    /// Drop every queued clip and stop the current one
    fn stop_all(&self) {
        let current = {
            let mut queue = self.lock();
            queue.items.clear();
            queue.current.take()
        };
        if let Some(ActivePlayback {
            handle: Some(handle),
            ..
        }) = current
        {
            handle.stop();
        }
    }

    fn set_audio_enabled(&self, enabled: bool) {
        self.lock().audio_enabled = enabled;
    }

    fn audio_enabled(&self) -> bool {
        self.lock().audio_enabled
    }

    /// Adjust the clip playing right now, if any
    pub(crate) fn set_current_volume(&self, volume: f32) {
        let queue = self.lock();
        if let Some(ActivePlayback {
            handle: Some(handle),
            ..
        }) = queue.current.as_ref()
        {
            handle.set_volume(volume);
        }
    }

    fn is_playing(&self) -> bool {
        self.lock().current.is_some()
    }

    fn queue_len(&self) -> usize {
        self.lock().items.len()
    }
}

/// Listener-side session: translated speech in, speaker out
pub struct PlaybackSession {
    core: SessionCore,
    shared: Arc<PlaybackShared>,
}

impl PlaybackSession {
    pub fn new(
        connector: Arc<dyn Connector>,
        settings: ConnectionSettings,
        output: Arc<dyn AudioOutput>,
        sink: Arc<dyn UiSink>,
    ) -> Self {
        let core = SessionCore::new(SessionRole::Playback, connector, settings, sink);
        let shared = Arc::new(PlaybackShared::new(output, Arc::clone(&core.stats)));
        Self { core, shared }
    }

    /// Link for a capture session to duck this session's playback
    pub fn ducking_link(&self, level: DuckingLevel) -> DuckingLink {
        DuckingLink::new(Arc::clone(&self.shared), level)
    }

    /// Enable or disable incoming audio.
    ///
    /// Disabling drops everything queued and stops the current clip. The
    /// service is told when connected so it can stop synthesizing.
    pub fn toggle_audio(&self, enabled: bool) {
        self.shared.set_audio_enabled(enabled);
        if !enabled {
            self.shared.stop_all();
        }
        info!("Incoming audio {}", if enabled { "enabled" } else { "disabled" });

        if self.core.state.get() == ConnectionState::Connected {
            if let Some(connection) = self.core.connection() {
                connection.send(&OutboundMessage::Voice { enabled });
            }
        }
    }

    pub fn audio_enabled(&self) -> bool {
        self.shared.audio_enabled()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.is_playing()
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue_len()
    }

    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.core.subscribe()
    }

    fn connect_request(config: &SessionConfig) -> ConnectRequest {
        ConnectRequest {
            presentation_code: config.session_id.clone(),
            access_key: config.passcode().map(str::to_owned),
            language_code: config.target_language.clone(),
            speaker: None,
        }
    }
}

#[async_trait]
impl Session for PlaybackSession {
    fn role(&self) -> SessionRole {
        SessionRole::Playback
    }

    fn state(&self) -> ConnectionState {
        self.core.state.get()
    }

    async fn connect(&mut self, config: SessionConfig) -> SessionResult<()> {
        self.shared.stop_all();
        let request = Self::connect_request(&config);
        let (connection, inbound) = self.core.open(request).await?;

        connection.send(&OutboundMessage::Change {
            language_code: config.target_language.clone(),
        });
        connection.send(&OutboundMessage::Voice {
            enabled: self.shared.audio_enabled(),
        });

        let completions = self.shared.begin(config.output_device_id.clone());
        let worker = PlaybackWorker {
            state: self.core.state.clone(),
            sink: Arc::clone(&self.core.sink),
            stats: Arc::clone(&self.core.stats),
            shared: Arc::clone(&self.shared),
            _connection: connection,
        };
        self.core.spawn_worker(worker.run(inbound, completions));
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.shared.stop_all();
        self.core.disconnect().await;
    }

    fn stats(&self) -> SessionStats {
        self.core.snapshot()
    }
}

struct PlaybackWorker {
    state: StateCell,
    sink: Arc<dyn UiSink>,
    stats: Arc<StatsCounters>,
    shared: Arc<PlaybackShared>,
    // Keeps the socket's writer alive for as long as the worker runs
    _connection: Connection,
}

impl PlaybackWorker {
    async fn run(
        self,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        let mut inbound = Some(inbound);
        loop {
            tokio::select! {
                event = next_event(&mut inbound) => {
                    match route_event(event, &self.state, self.sink.as_ref(), &self.stats) {
                        Routed::Speech(speech) => match speech.data.into_bytes() {
                            Ok(bytes) => self.receive_clip(bytes),
                            Err(e) => warn!("Discarding undecodable speech payload: {}", e),
                        },
                        Routed::Audio(bytes) => self.receive_clip(bytes),
                        Routed::Ended => inbound = None,
                        Routed::Handled => {}
                    }
                }
                Some(done) = completions.recv() => {
                    if self.shared.complete(done.id, &done.outcome) {
                        // Let the finished clip's teardown settle before the next starts
                        tokio::task::yield_now().await;
                        self.shared.process_queue();
                    }
                }
            }
        }
    }

    fn receive_clip(&self, bytes: Vec<u8>) {
        if self.shared.enqueue(bytes) {
            self.shared.process_queue();
        }
    }
}
