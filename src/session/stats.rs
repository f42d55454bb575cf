use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::connection::ConnectionState;

/// Snapshot of a session's activity since its last connect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Role label ("join" or "attend")
    pub role: String,

    /// Current connection state
    pub state: String,

    /// When the last successful handshake completed
    pub connected_at: Option<DateTime<Utc>>,

    /// PCM frames handed to the socket
    pub frames_sent: usize,

    /// Capture blocks withheld while muted
    pub frames_suppressed: usize,

    /// Clips that finished or failed playback
    pub clips_played: usize,

    /// Clips discarded because incoming audio was disabled
    pub clips_dropped: usize,

    /// Transcript lines forwarded to the UI
    pub transcript_lines: usize,
}

/// Live counters behind `SessionStats`
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub connected_at: Mutex<Option<DateTime<Utc>>>,
    pub frames_sent: AtomicUsize,
    pub frames_suppressed: AtomicUsize,
    pub clips_played: AtomicUsize,
    pub clips_dropped: AtomicUsize,
    pub transcript_lines: AtomicUsize,
}

impl StatsCounters {
    pub fn reset(&self, connected_at: Option<DateTime<Utc>>) {
        if let Ok(mut at) = self.connected_at.lock() {
            *at = connected_at;
        }
        self.frames_sent.store(0, Ordering::SeqCst);
        self.frames_suppressed.store(0, Ordering::SeqCst);
        self.clips_played.store(0, Ordering::SeqCst);
        self.clips_dropped.store(0, Ordering::SeqCst);
        self.transcript_lines.store(0, Ordering::SeqCst);
    }

    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self, role: &str, state: ConnectionState) -> SessionStats {
        SessionStats {
            role: role.to_string(),
            state: state.to_string(),
            connected_at: self.connected_at.lock().ok().and_then(|at| *at),
            frames_sent: self.frames_sent.load(Ordering::SeqCst),
            frames_suppressed: self.frames_suppressed.load(Ordering::SeqCst),
            clips_played: self.clips_played.load(Ordering::SeqCst),
            clips_dropped: self.clips_dropped.load(Ordering::SeqCst),
            transcript_lines: self.transcript_lines.load(Ordering::SeqCst),
        }
    }
}
