// Coordinates the capture and playback sessions as one unit
//
// Both sessions connect concurrently. Either connects fully or the unit
// unwinds: a failure on one side disconnects whatever the other side managed
// to open, so the pair never stays half-connected.

use std::sync::{Mutex, MutexGuard};
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tracing::{info, warn};

use super::capture::CaptureSession;
use super::config::SessionConfig;
use super::ducking::DuckingLevel;
use super::lifecycle::Session;
use super::playback::PlaybackSession;
use super::stats::SessionStats;
use crate::connection::ConnectionState;
use crate::error::{SessionError, SessionResult};

/// Aggregate flags of the pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorState {
    pub is_connecting: bool,
    pub is_connected: bool,
}

pub struct SessionOrchestrator {
    capture: AsyncMutex<CaptureSession>,
    playback: AsyncMutex<PlaybackSession>,
    capture_state: watch::Receiver<ConnectionState>,
    playback_state: watch::Receiver<ConnectionState>,
    ducking_level: DuckingLevel,
    flags: Mutex<Flags>,
}

#[derive(Debug, Default)]
struct Flags {
    state: OrchestratorState,
    /// Cancels the connect in flight, if any
    cancel: Option<oneshot::Sender<()>>,
}

/// Clears `is_connecting` when `connect_all` ends, including when its
/// future is dropped before settling.
struct ConnectingGuard<'a> {
    flags: &'a Mutex<Flags>,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        let mut flags = lock_flags(self.flags);
        flags.state.is_connecting = false;
        flags.cancel = None;
    }
}

fn lock_flags(flags: &Mutex<Flags>) -> MutexGuard<'_, Flags> {
    flags.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionOrchestrator {
    /// Pair the sessions and link capture's speaking detector to playback volume
    pub fn new(
        mut capture: CaptureSession,
        playback: PlaybackSession,
        ducking_level: DuckingLevel,
    ) -> Self {
        capture.link_ducking(playback.ducking_link(ducking_level.clone()));
        Self {
            capture_state: capture.state_watch(),
            playback_state: playback.state_watch(),
            capture: AsyncMutex::new(capture),
            playback: AsyncMutex::new(playback),
            ducking_level,
            flags: Mutex::new(Flags::default()),
        }
    }

    fn flags(&self) -> MutexGuard<'_, Flags> {
        lock_flags(&self.flags)
    }

    /// Connect both sessions concurrently.
    ///
    /// A call made while another is in flight does nothing and returns
    /// `ConnectInProgress`. On failure every session that reached `Connected`
    /// is disconnected and the first error (capture first) is returned.
    /// `disconnect_all` aborts the attempt, which then returns
    /// `ConnectCancelled`. Dropping the future also clears `is_connecting`;
    /// the sessions are left for the next connect or disconnect to reset.
    pub async fn connect_all(
        &self,
        capture_config: SessionConfig,
        playback_config: SessionConfig,
    ) -> SessionResult<()> {
        let mut cancelled = {
            let mut flags = self.flags();
            if flags.state.is_connecting {
                info!("Connect already in progress; ignoring request");
                return Err(SessionError::ConnectInProgress);
            }
            let (tx, rx) = oneshot::channel();
            flags.state.is_connecting = true;
            flags.state.is_connected = false;
            flags.cancel = Some(tx);
            rx
        };
        let guard = ConnectingGuard { flags: &self.flags };

        let mut capture = self.capture.lock().await;
        let mut playback = self.playback.lock().await;

        let settled = tokio::select! {
            biased;
            _ = &mut cancelled => None,
            results = async {
                tokio::join!(
                    capture.connect(capture_config),
                    playback.connect(playback_config)
                )
            } => Some(results),
        };

        let result = match settled {
            None => {
                info!("Connect cancelled; tearing both sessions down");
                capture.disconnect().await;
                playback.disconnect().await;
                Err(SessionError::ConnectCancelled)
            }
            Some((Ok(()), Ok(()))) => Ok(()),
            Some((capture_result, playback_result)) => {
                warn!("Connect failed; unwinding both sessions");
                if capture.state() == ConnectionState::Connected {
                    capture.disconnect().await;
                }
                if playback.state() == ConnectionState::Connected {
                    playback.disconnect().await;
                }
                capture_result.and(playback_result)
            }
        };

        self.flags().state.is_connected = result.is_ok();
        drop(guard);
        if result.is_ok() {
            info!("Both sessions connected");
        }
        result
    }

    /// Disconnect both sessions. Safe to call repeatedly and at any time; a
    /// connect in flight is cancelled rather than waited out.
    pub async fn disconnect_all(&self) {
        let cancel = self.flags().cancel.take();
        if let Some(cancel) = cancel {
            let _ = cancel.send(());
        }

        let mut capture = self.capture.lock().await;
        let mut playback = self.playback.lock().await;
        capture.disconnect().await;
        playback.disconnect().await;

        // `is_connecting` is owned by the connect's guard
        self.flags().state.is_connected = false;
        info!("All sessions disconnected");
    }

    pub fn is_connecting(&self) -> bool {
        self.flags().state.is_connecting
    }

    /// True only while both sessions are still connected
    pub fn is_connected(&self) -> bool {
        self.flags().state.is_connected
            && *self.capture_state.borrow() == ConnectionState::Connected
            && *self.playback_state.borrow() == ConnectionState::Connected
    }

    pub fn state(&self) -> OrchestratorState {
        OrchestratorState {
            is_connecting: self.is_connecting(),
            is_connected: self.is_connected(),
        }
    }

    pub fn capture_state(&self) -> ConnectionState {
        *self.capture_state.borrow()
    }

    pub fn playback_state(&self) -> ConnectionState {
        *self.playback_state.borrow()
    }

    pub async fn toggle_mute(&self) -> bool {
        self.capture.lock().await.toggle_mute()
    }

    pub async fn toggle_audio(&self, enabled: bool) {
        self.playback.lock().await.toggle_audio(enabled);
    }

    pub fn ducking_level(&self) -> &DuckingLevel {
        &self.ducking_level
    }

    pub async fn stats(&self) -> (SessionStats, SessionStats) {
        let capture = self.capture.lock().await.stats();
        let playback = self.playback.lock().await.stats();
        (capture, playback)
    }

    /// Direct access for callers that need more than the pair-level controls
    pub fn capture(&self) -> &AsyncMutex<CaptureSession> {
        &self.capture
    }

    pub fn playback(&self) -> &AsyncMutex<PlaybackSession> {
        &self.playback
    }
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("capture", &self.capture_state())
            .field("playback", &self.playback_state())
            .field("flags", &self.flags().state)
            .finish()
    }
}
