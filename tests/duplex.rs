//! End-to-end session tests against a local WebSocket endpoint

use std::sync::atomic::Ordering;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use realtime_duplex::controller::Controller;
use realtime_duplex::net_link::WorkerExit;
use realtime_duplex::state_machine::SessionState;
use realtime_duplex::Config;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;

mod common;
use common::{DeviceProbe, delta_message, done_message, text_message};

/// What the fake endpoint saw from the client.
#[derive(Debug, Default)]
struct ServerLog {
    types: Vec<String>,
    closes: usize,
}

fn test_config(url: String, dir: &std::path::Path) -> Config {
    Config {
        ws_url: url,
        api_key: Some("sk-test".into()),
        chunk_size: 256,
        connect_timeout_ms: 2_000,
        join_timeout_ms: 1_000,
        recording_dir: dir.to_path_buf(),
        instructions: "Be brief.".into(),
        ..Config::default()
    }
}

/// Serve one session: three deltas and a done, then read until the client closes.
async fn serve_one(listener: TcpListener, replied: oneshot::Sender<()>) -> ServerLog {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    let mut log = ServerLog::default();

    // response.create comes first
    if let Some(Ok(Message::Text(t))) = ws.next().await {
        let v: serde_json::Value = serde_json::from_str(t.as_str()).unwrap();
        log.types.push(v["type"].as_str().unwrap_or_default().to_string());
    }

    ws.send(text_message(r#"{"type":"session.created"}"#)).await.unwrap();
    ws.send(delta_message(&[0x21u8; 4000])).await.unwrap();
    ws.send(delta_message(&[0x22u8; 4000])).await.unwrap();
    ws.send(delta_message(&[0x23u8; 2000])).await.unwrap();
    ws.send(done_message()).await.unwrap();
    let _ = replied.send(());

    while let Some(Ok(msg)) = ws.next().await {
        match msg {
            Message::Text(t) => {
                let v: serde_json::Value = serde_json::from_str(t.as_str()).unwrap();
                log.types.push(v["type"].as_str().unwrap_or_default().to_string());
            }
            Message::Close(_) => {
                log.closes += 1;
                break;
            }
            _ => {}
        }
    }
    log
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_session_plays_records_and_closes_once() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/v1/realtime", listener.local_addr().unwrap());
    let (replied_tx, replied_rx) = oneshot::channel();
    let server = tokio::spawn(serve_one(listener, replied_tx));

    let probe = DeviceProbe::default();
    let (open_capture, open_playback) = probe.openers();
    let config = test_config(url, dir.path());

    let shutdown = async move {
        let _ = replied_rx.await;
        // let playback drain the reply and the gate expire
        tokio::time::sleep(Duration::from_millis(1_200)).await;
    };
    let summary = Controller::new(config)
        .run(open_capture, open_playback, shutdown)
        .await
        .unwrap();

    assert_eq!(summary.final_state, SessionState::Closed);
    assert_eq!(summary.uplink, Some(WorkerExit::Shutdown));
    assert!(summary.downlink.is_some());

    let log = tokio::time::timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
    assert_eq!(log.types.first().map(String::as_str), Some("response.create"));
    assert_eq!(log.types.iter().filter(|t| *t == "response.create").count(), 1);
    assert!(log.types[1..].iter().all(|t| t == "input_audio_buffer.append"));
    assert_eq!(log.closes, 1);

    // reply audio reached the speaker in order
    let played = probe.played_audio();
    assert_eq!(played.len(), 10_000);
    assert!(played[..4000].iter().all(|b| *b == 0x21));
    assert!(played[8000..].iter().all(|b| *b == 0x23));

    // exactly one artifact holding the whole reply
    let reader = hound::WavReader::open(dir.path().join("response_0.wav")).unwrap();
    assert_eq!(reader.len() as usize * 2, 10_000);
    assert!(!dir.path().join("response_1.wav").exists());

    // devices released
    assert!(probe.capture_released.load(Ordering::SeqCst));
    assert!(probe.playback_released.load(Ordering::SeqCst));
    assert!(probe.capture_periods.load(Ordering::SeqCst) > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connect_failure_releases_devices() {
    let dir = tempfile::tempdir().unwrap();
    // grab a free port and close it again
    let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let config = test_config(format!("ws://{}/v1/realtime", addr), dir.path());

    let probe = DeviceProbe::default();
    let (open_capture, open_playback) = probe.openers();
    let result = Controller::new(config)
        .run(open_capture, open_playback, std::future::pending())
        .await;

    assert!(result.is_err());
    assert!(probe.capture_released.load(Ordering::SeqCst));
    assert!(probe.playback_released.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_credential_is_a_connect_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config("ws://127.0.0.1:9/v1/realtime".into(), dir.path());
    config.api_key = None;

    let probe = DeviceProbe::default();
    let (open_capture, open_playback) = probe.openers();
    let err = Controller::new(config)
        .run(open_capture, open_playback, std::future::pending())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("OPENAI_API_KEY"));
    assert!(probe.playback_released.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_hangup_ends_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/v1/realtime", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let _ = ws.next().await;
        ws.close(None).await.unwrap();
    });

    let probe = DeviceProbe::default();
    let (open_capture, open_playback) = probe.openers();
    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        Controller::new(test_config(url, dir.path())).run(
            open_capture,
            open_playback,
            std::future::pending(),
        ),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(summary.final_state, SessionState::Closed);
    assert!(matches!(
        summary.downlink,
        Some(WorkerExit::ConnectionClosed) | Some(WorkerExit::EndOfStream)
    ));
    server.await.unwrap();
}
