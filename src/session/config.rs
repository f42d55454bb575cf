use serde::{Deserialize, Serialize};

/// Configuration for one session, fixed for the duration of a connect attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Presentation code of the remote session (e.g., "ABCD-1234")
    pub session_id: String,

    /// Access key, when the session is protected
    #[serde(default)]
    pub passcode: Option<String>,

    /// Language the speaker talks in
    pub source_language: String,

    /// Language the listener wants to hear
    pub target_language: String,

    /// Input device name; system default when absent
    #[serde(default)]
    pub input_device_id: Option<String>,

    /// Output device name; system default when absent
    #[serde(default)]
    pub output_device_id: Option<String>,
}

impl SessionConfig {
    pub fn new(
        session_id: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            passcode: None,
            source_language: source_language.into(),
            target_language: target_language.into(),
            input_device_id: None,
            output_device_id: None,
        }
    }

    pub fn with_passcode(mut self, passcode: impl Into<String>) -> Self {
        self.passcode = Some(passcode.into());
        self
    }

    /// Passcode with empty strings treated as absent
    pub fn passcode(&self) -> Option<&str> {
        self.passcode.as_deref().filter(|p| !p.is_empty())
    }
}
