use std::fmt;

/// Which side of the duplex link a session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    /// Speaker: captures and streams the local voice
    Capture,
    /// Listener: receives and plays synthesized speech
    Playback,
}

impl SessionRole {
    /// Short name the service and status messages use ("join" / "attend")
    pub fn label(&self) -> &'static str {
        match self {
            SessionRole::Capture => "join",
            SessionRole::Playback => "attend",
        }
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
