use tracing::{error, info, trace};

use crate::connection::ConnectionState;

/// Presentation hooks a session reports to
///
/// Implemented by whatever renders the session (status light, transcript
/// pane, level meter, mute button). Calls arrive from session workers and
/// must not block.
pub trait UiSink: Send + Sync {
    fn report_status(&self, state: ConnectionState, message: &str);

    fn append_transcript_line(&self, text: &str, is_error: bool);

    /// Meter fill in [0, 1]
    fn set_visualizer_level(&self, fraction: f32);

    fn set_mute_indicator(&self, muted: bool);
}

/// Renders session events as log lines
#[derive(Debug, Clone)]
pub struct TracingSink {
    label: String,
}

impl TracingSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl UiSink for TracingSink {
    fn report_status(&self, state: ConnectionState, message: &str) {
        match state {
            ConnectionState::Error => error!(session = %self.label, %state, "{}", message),
            _ => info!(session = %self.label, %state, "{}", message),
        }
    }

    fn append_transcript_line(&self, text: &str, is_error: bool) {
        if is_error {
            error!(session = %self.label, "{}", text);
        } else {
            info!(session = %self.label, "» {}", text);
        }
    }

    fn set_visualizer_level(&self, fraction: f32) {
        trace!(session = %self.label, level = fraction, "meter");
    }

    fn set_mute_indicator(&self, muted: bool) {
        info!(session = %self.label, muted, "Microphone {}", if muted { "muted" } else { "live" });
    }
}
