// Lifecycle shared by capture and playback sessions
//
// Each session owns a `SessionCore`: the state cell observers subscribe to,
// the current `Connection`, and the single worker task that consumes the
// socket's inbound events (plus the role's own audio channel). All per-session
// event handling happens on that one worker, so ordering matches arrival.

use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::sink::UiSink;
use super::stats::{SessionStats, StatsCounters};
use crate::connection::{
    Connection, ConnectionSettings, ConnectionState, Connector, SessionRole, StateCell,
    TransportEvent, CLOSE_NORMAL,
};
use crate::error::SessionResult;
use crate::protocol::{ConnectRequest, InboundFrame, InboundMessage, SynthesizedSpeech};

/// Connection lifecycle common to both session roles
#[async_trait]
pub trait Session: Send {
    fn role(&self) -> SessionRole;

    fn state(&self) -> ConnectionState;

    /// Replace any previous connection with a fresh one and run the handshake.
    ///
    /// Settles once per call. On success the role's post-handshake commands
    /// have been sent and its pipeline is running.
    async fn connect(&mut self, config: SessionConfig) -> SessionResult<()>;

    /// Tear everything down and land in `Disconnected`. Idempotent.
    async fn disconnect(&mut self);

    fn stats(&self) -> SessionStats;
}

pub(crate) struct SessionCore {
    pub state: StateCell,
    pub sink: Arc<dyn UiSink>,
    pub stats: Arc<StatsCounters>,
    connector: Arc<dyn Connector>,
    settings: ConnectionSettings,
    connection: Option<Connection>,
    worker: Option<JoinHandle<()>>,
}

impl SessionCore {
    pub fn new(
        role: SessionRole,
        connector: Arc<dyn Connector>,
        settings: ConnectionSettings,
        sink: Arc<dyn UiSink>,
    ) -> Self {
        Self {
            state: StateCell::new(role, Arc::clone(&sink)),
            sink,
            stats: Arc::new(StatsCounters::default()),
            connector,
            settings,
            connection: None,
            worker: None,
        }
    }

    pub fn role(&self) -> SessionRole {
        self.state.role()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Open a brand-new connection, discarding the previous one
    pub async fn open(
        &mut self,
        request: ConnectRequest,
    ) -> SessionResult<(Connection, mpsc::UnboundedReceiver<TransportEvent>)> {
        self.teardown().await;
        if matches!(
            self.state.get(),
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            self.state.force_disconnected();
        }

        info!(
            "{}: connecting to {} via {}",
            self.role(),
            self.settings.endpoint,
            self.connector.name()
        );

        let mut connection = Connection::new(self.state.clone());
        let result = connection
            .open(self.connector.as_ref(), &self.settings, request)
            .await;
        self.connection = Some(connection.clone());

        let inbound = result?;
        self.stats.reset(Some(Utc::now()));
        Ok((connection, inbound))
    }

    pub fn spawn_worker<F>(&mut self, worker: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.worker = Some(tokio::spawn(worker));
    }

    /// Stop the worker and close the socket without touching the state
    async fn teardown(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
            let _ = worker.await;
        }
        if let Some(mut connection) = self.connection.take() {
            connection.close(CLOSE_NORMAL, "User disconnected");
        }
    }

    pub async fn disconnect(&mut self) {
        self.teardown().await;
        self.state.force_disconnected();
    }

    pub fn snapshot(&self) -> SessionStats {
        self.stats.snapshot(self.role().label(), self.state.get())
    }
}

/// What a worker must still do with an inbound event
pub(crate) enum Routed {
    Handled,
    Speech(SynthesizedSpeech),
    Audio(Vec<u8>),
    Ended,
}

/// Handle the events both roles treat identically.
///
/// Transcript and error events go straight to the UI; socket closure moves
/// the state machine. Audio-bearing frames are returned to the caller.
pub(crate) fn route_event(
    event: TransportEvent,
    state: &StateCell,
    sink: &dyn UiSink,
    stats: &StatsCounters,
) -> Routed {
    match event {
        TransportEvent::Message(payload) => match InboundFrame::classify(payload) {
            InboundFrame::Audio(bytes) => Routed::Audio(bytes),
            InboundFrame::Message(message) => match message {
                InboundMessage::Speech { synthesized_speech } => Routed::Speech(synthesized_speech),
                InboundMessage::Phrase(payload) | InboundMessage::Translation(payload) => {
                    if let Some(text) = payload.display_text() {
                        sink.append_transcript_line(text, false);
                        StatsCounters::bump(&stats.transcript_lines);
                    }
                    Routed::Handled
                }
                InboundMessage::Error { message } => {
                    let text = message.unwrap_or_else(|| "unknown error".to_string());
                    sink.append_transcript_line(&format!("Error: {}", text), true);
                    Routed::Handled
                }
                InboundMessage::Status { success, .. } => {
                    debug!("{}: status after handshake (success={})", state.role(), success);
                    Routed::Handled
                }
                InboundMessage::Unknown => Routed::Handled,
            },
        },
        TransportEvent::Closed { code, reason } => {
            info!(
                "{}: socket closed by peer (code={:?}, reason='{}')",
                state.role(),
                code,
                reason
            );
            state.transition(ConnectionState::Disconnected, "Disconnected");
            Routed::Ended
        }
        TransportEvent::Error(message) => {
            warn!("{}: transport error: {}", state.role(), message);
            state.transition(
                ConnectionState::Error,
                &format!("{}: Connection Error", state.role()),
            );
            Routed::Ended
        }
    }
}

/// Next inbound event, or pending forever once the socket is gone
pub(crate) async fn next_event(
    inbound: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> TransportEvent {
    match inbound {
        Some(rx) => rx.recv().await.unwrap_or(TransportEvent::Closed {
            code: None,
            reason: String::new(),
        }),
        None => std::future::pending().await,
    }
}
