use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::AudioInputConfig;
use crate::connection::ConnectionSettings;
use crate::session::{CaptureOptions, SessionConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub capture: SessionConfig,
    pub playback: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub capture_endpoint: String,
    pub playback_endpoint: String,
    pub handshake_timeout_ms: u64,
    pub connection_code: String,
    pub speaker_name: String,
    pub speaker_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    pub speaking_threshold: f32,
    pub ducking_level: f32,
    pub meter_gain: f32,
}

impl Config {
    /// Load `path` (extension optional, file optional) over built-in
    /// defaults, then apply `BABELFISH__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.capture_endpoint", "wss://dev-endpoint.wordly.ai/present")?
            .set_default("service.playback_endpoint", "wss://dev-endpoint.wordly.ai/attend")?
            .set_default("service.handshake_timeout_ms", 10_000i64)?
            .set_default("service.connection_code", "wordly-babelfish-app")?
            .set_default("service.speaker_name", "My Voice (Babelfish)")?
            .set_default("service.speaker_prefix", "babelfish-join")?
            .set_default("audio.sample_rate", 16_000i64)?
            .set_default("audio.block_size", 2048i64)?
            .set_default("audio.speaking_threshold", 0.02f64)?
            .set_default("audio.ducking_level", 0.30f64)?
            .set_default("audio.meter_gain", 8.0f64)?
            .set_default("capture.session_id", "")?
            .set_default("capture.source_language", "en")?
            .set_default("capture.target_language", "es-MX")?
            .set_default("playback.session_id", "")?
            .set_default("playback.source_language", "es-MX")?
            .set_default("playback.target_language", "en")?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("BABELFISH").separator("__"))
            .build()?;

        let mut cfg: Config = settings.try_deserialize()?;
        cfg.audio.ducking_level = cfg.audio.ducking_level.clamp(0.0, 1.0);
        Ok(cfg)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.service.handshake_timeout_ms)
    }

    pub fn capture_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            endpoint: self.service.capture_endpoint.clone(),
            handshake_timeout: self.handshake_timeout(),
        }
    }

    pub fn playback_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            endpoint: self.service.playback_endpoint.clone(),
            handshake_timeout: self.handshake_timeout(),
        }
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            sample_rate: self.audio.sample_rate,
            speaker_name: self.service.speaker_name.clone(),
            connection_code: self.service.connection_code.clone(),
            speaker_prefix: self.service.speaker_prefix.clone(),
            speaking_threshold: self.audio.speaking_threshold,
            meter_gain: self.audio.meter_gain,
        }
    }

    pub fn input_config(&self) -> AudioInputConfig {
        AudioInputConfig {
            sample_rate: self.audio.sample_rate,
            block_size: self.audio.block_size,
            ..AudioInputConfig::default()
        }
    }
}
