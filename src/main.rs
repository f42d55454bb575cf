// Babelfish: two-way live translation from the terminal
//
// Connects a capture session (your microphone, translated for the room) and a
// playback session (the room, translated and spoken to you), then takes
// single-letter commands on stdin until you quit.
//
// Usage: babelfish --session-id ABCD-1234 [--passcode secret] [--ducking-level 0.2]

use anyhow::{anyhow, Result};
use babelfish::{
    CaptureSession, Config, CpalInput, DuckingLevel, PlaybackSession, RodioOutput,
    SessionOrchestrator, TracingSink, WebSocketConnector,
};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "babelfish")]
#[command(about = "Duplex voice translation client")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/babelfish")]
    config: String,

    /// Presentation code for both sessions
    #[arg(short, long)]
    session_id: Option<String>,

    /// Access key for protected sessions
    #[arg(short, long)]
    passcode: Option<String>,

    /// Playback volume while you speak, 0.0 to 1.0
    #[arg(short, long)]
    ducking_level: Option<f32>,

    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("babelfish=info")),
        )
        .init();

    let args = Args::parse();

    if args.list_devices {
        info!("Input devices: {:?}", CpalInput::list_devices()?);
        info!("Output devices: {:?}", RodioOutput::list_devices()?);
        return Ok(());
    }

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("a TLS crypto provider is already installed"))?;

    let mut cfg = Config::load(&args.config)?;
    if let Some(session_id) = args.session_id {
        cfg.capture.session_id = session_id.clone();
        cfg.playback.session_id = session_id;
    }
    if let Some(passcode) = args.passcode {
        cfg.capture.passcode = Some(passcode.clone());
        cfg.playback.passcode = Some(passcode);
    }
    if let Some(level) = args.ducking_level {
        cfg.audio.ducking_level = level;
    }
    if cfg.capture.session_id.is_empty() || cfg.playback.session_id.is_empty() {
        return Err(anyhow!("no session id: pass --session-id or set it in {}", args.config));
    }

    info!("Babelfish v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Speaking {} -> {}, listening {} -> {}",
        cfg.capture.source_language,
        cfg.capture.target_language,
        cfg.playback.source_language,
        cfg.playback.target_language
    );

    let connector = Arc::new(WebSocketConnector::new());
    let capture = CaptureSession::new(
        connector.clone(),
        cfg.capture_settings(),
        Box::new(CpalInput::new(cfg.input_config())),
        cfg.capture_options(),
        Arc::new(TracingSink::new("join")),
    );
    let playback = PlaybackSession::new(
        connector,
        cfg.playback_settings(),
        Arc::new(RodioOutput::new()),
        Arc::new(TracingSink::new("attend")),
    );
    let orchestrator = SessionOrchestrator::new(
        capture,
        playback,
        DuckingLevel::new(cfg.audio.ducking_level),
    );

    tokio::select! {
        result = orchestrator.connect_all(cfg.capture.clone(), cfg.playback.clone()) => {
            if let Err(e) = result {
                error!("Could not connect: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted while connecting");
            orchestrator.disconnect_all().await;
            return Ok(());
        }
    }

    info!("Commands: m = toggle mute, a = toggle incoming audio, q = quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut audio_enabled = true;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "m" => {
                        orchestrator.toggle_mute().await;
                    }
                    "a" => {
                        audio_enabled = !audio_enabled;
                        orchestrator.toggle_audio(audio_enabled).await;
                    }
                    "q" => break,
                    "" => {}
                    other => warn!("Unknown command '{}'", other),
                }
                if !orchestrator.is_connected() {
                    warn!("A session dropped; type q to quit");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let (capture_stats, playback_stats) = orchestrator.stats().await;
    info!(
        "Sent {} frames ({} withheld while muted), played {} clips, {} transcript lines",
        capture_stats.frames_sent,
        capture_stats.frames_suppressed,
        playback_stats.clips_played,
        capture_stats.transcript_lines + playback_stats.transcript_lines
    );

    orchestrator.disconnect_all().await;
    Ok(())
}
