mod support;

use babelfish::connection::ConnectionState;
use babelfish::session::{
    CaptureOptions, CaptureSession, DuckingLevel, PlaybackSession, Session,
};
use serde_json::json;
use std::sync::Arc;
use support::{
    capture_config, capture_settings, next_server, playback_config, playback_settings,
    speech_message, wait_until, wav_clip, InputControl, MockConnector, MockInput, MockOutput,
    RecordingSink, ServerSide,
};
use tokio::sync::mpsc;

struct Harness {
    session: CaptureSession,
    server: ServerSide,
    mic: InputControl,
    sink: Arc<RecordingSink>,
    servers: mpsc::UnboundedReceiver<ServerSide>,
    connector: Arc<MockConnector>,
}

fn capture_session(
    connector: &Arc<MockConnector>,
    input: MockInput,
    sink: &Arc<RecordingSink>,
) -> CaptureSession {
    CaptureSession::new(
        connector.clone(),
        capture_settings(),
        Box::new(input),
        CaptureOptions::default(),
        sink.clone(),
    )
}

/// Connected capture session with the post-handshake commands consumed
async fn connected() -> Harness {
    let (connector, mut servers) = MockConnector::new();
    let (input, mic) = MockInput::new();
    let sink = RecordingSink::new();
    let mut session = capture_session(&connector, input, &sink);

    let (result, server) = tokio::join!(session.connect(capture_config()), async {
        let mut server = next_server(&mut servers).await;
        server.accept().await;
        for _ in 0..3 {
            server.next_json().await;
        }
        server
    });
    result.unwrap();

    Harness {
        session,
        server,
        mic,
        sink,
        servers,
        connector,
    }
}

fn tone(amplitude: f32) -> Vec<f32> {
    (0..2048)
        .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
        .collect()
}

#[tokio::test]
async fn test_connect_request_and_command_order() {
    let (connector, mut servers) = MockConnector::new();
    let (input, mic) = MockInput::new();
    let sink = RecordingSink::new();
    let mut session = capture_session(&connector, input, &sink);

    let (result, mut server) = tokio::join!(session.connect(capture_config()), async {
        let mut server = next_server(&mut servers).await;
        let connect = server.accept().await;
        assert_eq!(connect["presentationCode"], "ABCD-1234");
        assert_eq!(connect["languageCode"], "en");
        assert_eq!(connect["name"], "My Voice (Babelfish)");
        assert_eq!(connect["connectionCode"], "wordly-babelfish-app");
        assert_eq!(connect["context"], serde_json::Value::Null);
        assert!(connect["speakerId"]
            .as_str()
            .unwrap()
            .starts_with("babelfish-join-"));
        assert_eq!(connect["accessKey"], "");
        server
    });
    result.unwrap();

    assert_eq!(server.endpoint, support::CAPTURE_ENDPOINT);
    assert_eq!(
        server.next_json().await,
        json!({ "type": "change", "languageCode": "es-MX" })
    );
    assert_eq!(
        server.next_json().await,
        json!({ "type": "start", "languageCode": "en", "sampleRate": 16000 })
    );
    assert_eq!(
        server.next_json().await,
        json!({ "type": "voice", "enabled": true })
    );
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(mic.starts(), 1);
    assert_eq!(mic.devices(), vec![None]);
}

#[tokio::test]
async fn test_connect_request_carries_passcode() {
    let (connector, mut servers) = MockConnector::new();
    let (input, _mic) = MockInput::new();
    let sink = RecordingSink::new();
    let mut session = capture_session(&connector, input, &sink);

    let (result, _server) = tokio::join!(
        session.connect(capture_config().with_passcode("secret")),
        async {
            let mut server = next_server(&mut servers).await;
            let connect = server.accept().await;
            assert_eq!(connect["accessKey"], "secret");
            server
        }
    );
    result.unwrap();
}

#[tokio::test]
async fn test_reconnect_restarts_pipeline_with_new_speaker_id() {
    let Harness {
        mut session,
        mut servers,
        connector,
        mic,
        ..
    } = connected().await;

    let ((), ids) = tokio::join!(
        async {
            session.connect(capture_config()).await.unwrap();
            session.connect(capture_config()).await.unwrap();
        },
        async {
            let mut ids = Vec::new();
            for _ in 0..2 {
                let mut server = next_server(&mut servers).await;
                let connect = server.accept().await;
                ids.push(connect["speakerId"].as_str().unwrap().to_string());
            }
            ids
        }
    );

    assert_ne!(ids[0], ids[1]);
    assert_eq!(connector.attempts(), 3);
    // Each connect tears the previous pipeline down first
    assert_eq!(mic.stops(), 2);
    assert_eq!(mic.starts(), 3);
}

#[tokio::test]
async fn test_blocks_stream_as_pcm16() {
    let mut h = connected().await;

    h.mic.push(vec![0.5; 2048]).await;
    let frame = h.server.next_binary().await;

    assert_eq!(frame.len(), 4096);
    let first = i16::from_le_bytes([frame[0], frame[1]]);
    assert_eq!(first, 16384);
    assert_eq!(h.session.stats().frames_sent, 1);
}

#[tokio::test]
async fn test_meter_follows_level() {
    let h = connected().await;

    h.mic.push(tone(0.05)).await;
    wait_until(|| h.sink.levels().len() == 1).await;
    assert!((h.sink.last_level().unwrap() - 0.4).abs() < 1e-4);
    assert!((h.session.level() - 0.05).abs() < 1e-4);

    h.mic.push(tone(0.9)).await;
    wait_until(|| h.sink.levels().len() == 2).await;
    assert_eq!(h.sink.last_level(), Some(1.0));
}

#[tokio::test]
async fn test_muted_blocks_are_withheld() {
    let mut h = connected().await;

    assert!(h.session.toggle_mute());
    assert!(h.session.is_muted());
    assert_eq!(h.sink.mute_indicator(), vec![true]);

    h.mic.push(tone(0.3)).await;
    wait_until(|| h.session.stats().frames_suppressed == 1).await;
    // Meter keeps running while muted
    assert_eq!(h.sink.levels().len(), 1);

    assert!(!h.session.toggle_mute());
    h.mic.push(tone(0.3)).await;
    h.server.next_binary().await;

    assert_eq!(h.session.stats().frames_sent, 1);
    assert_eq!(h.server.try_next_frame(), None);
}

#[tokio::test]
async fn test_microphone_failure_keeps_session_connected() {
    let (connector, mut servers) = MockConnector::new();
    let (input, mic) = MockInput::unavailable();
    let sink = RecordingSink::new();
    let mut session = capture_session(&connector, input, &sink);
    let mut config = capture_config();
    config.input_device_id = Some("USB Mic".to_string());

    let (result, _server) = tokio::join!(session.connect(config), async {
        let mut server = next_server(&mut servers).await;
        server.accept().await;
        server
    });

    assert!(result.is_ok());
    assert_eq!(session.state(), ConnectionState::Connected);
    assert!(!session.is_capturing());
    assert_eq!(mic.devices(), vec![Some("USB Mic".to_string())]);
    assert_eq!(
        sink.lines(),
        vec![("Could not get microphone.".to_string(), true)]
    );
}

#[tokio::test]
async fn test_speech_frames_are_ignored_on_capture() {
    let h = connected().await;

    h.server.reply(speech_message(&wav_clip(10)));
    h.server.send_raw(vec![1, 2, 3]);
    h.server
        .reply(json!({ "type": "phrase", "text": "hola a todos" }));

    wait_until(|| h.sink.lines().len() == 1).await;
    assert_eq!(h.sink.lines()[0], ("hola a todos".to_string(), false));
    assert_eq!(h.session.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_disconnect_stops_microphone_and_resets_meter() {
    let mut h = connected().await;
    h.mic.push(tone(0.2)).await;
    wait_until(|| h.sink.levels().len() == 1).await;

    h.session.disconnect().await;

    assert_eq!(h.mic.stops(), 1);
    assert!(!h.session.is_capturing());
    assert_eq!(h.sink.last_level(), Some(0.0));
    assert_eq!(h.session.level(), 0.0);
    assert_eq!(h.session.state(), ConnectionState::Disconnected);
    assert!(!h.mic.push(tone(0.2)).await);
}

#[tokio::test]
async fn test_speaking_ducks_current_playback() {
    let (connector, mut servers) = MockConnector::new();
    let output = MockOutput::new();
    let mut playback = PlaybackSession::new(
        connector.clone(),
        playback_settings(),
        output.clone(),
        RecordingSink::new(),
    );
    let (input, mic) = MockInput::new();
    let mut capture = capture_session(&connector, input, &RecordingSink::new());
    let level = DuckingLevel::default();
    capture.link_ducking(playback.ducking_link(level.clone()));

    let (result, playback_server) = tokio::join!(playback.connect(playback_config()), async {
        let mut server = next_server(&mut servers).await;
        server.accept().await;
        server
    });
    result.unwrap();
    let (result, _capture_server) = tokio::join!(capture.connect(capture_config()), async {
        let mut server = next_server(&mut servers).await;
        server.accept().await;
        server
    });
    result.unwrap();

    // Nothing playing: the signal is discarded
    mic.push(tone(0.03)).await;
    wait_until(|| capture.level() > 0.0).await;

    playback_server.reply(speech_message(&wav_clip(100)));
    wait_until(|| output.started() == 1).await;

    mic.push(tone(0.03)).await;
    wait_until(|| output.clip(0).volumes.len() == 1).await;
    assert!((output.clip(0).volumes[0] - 0.30).abs() < 1e-6);

    mic.push(tone(0.001)).await;
    wait_until(|| output.clip(0).volumes.len() == 2).await;
    assert_eq!(output.clip(0).volumes[1], 1.0);

    // The dial applies from the next notification
    level.set(0.1);
    mic.push(tone(0.5)).await;
    wait_until(|| output.clip(0).volumes.len() == 3).await;
    assert!((output.clip(0).volumes[2] - 0.1).abs() < 1e-6);

    // Muting does not stop speaking detection
    capture.toggle_mute();
    mic.push(tone(0.001)).await;
    wait_until(|| output.clip(0).volumes.len() == 4).await;
    assert_eq!(output.clip(0).volumes[3], 1.0);
}
