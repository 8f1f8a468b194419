//! Shared test utilities: in-memory devices and transports

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Sink;
use realtime_duplex::audio::{CaptureDevice, CaptureOpener, PlaybackDevice, PlaybackOpener};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

pub const PERIOD: Duration = Duration::from_millis(10);

/// Capture device that produces a constant tone every `PERIOD`.
pub struct MockCapture {
    pub periods: Arc<AtomicUsize>,
    pub released: Arc<AtomicBool>,
}

impl CaptureDevice for MockCapture {
    fn read_period(&mut self, pcm: &mut [u8]) -> anyhow::Result<usize> {
        std::thread::sleep(PERIOD);
        pcm.fill(0x11);
        self.periods.fetch_add(1, Ordering::SeqCst);
        Ok(pcm.len())
    }

    fn recover(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl Drop for MockCapture {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Playback device that records every period it is handed.
pub struct MockPlayback {
    pub written: Arc<Mutex<Vec<Vec<u8>>>>,
    pub released: Arc<AtomicBool>,
}

impl PlaybackDevice for MockPlayback {
    fn write_period(&mut self, pcm: &[u8]) -> anyhow::Result<()> {
        std::thread::sleep(PERIOD);
        self.written.lock().unwrap().push(pcm.to_vec());
        Ok(())
    }

    fn recover(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl Drop for MockPlayback {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Handles to observe the mock devices after a run.
#[derive(Clone, Default)]
pub struct DeviceProbe {
    pub capture_periods: Arc<AtomicUsize>,
    pub capture_released: Arc<AtomicBool>,
    pub written: Arc<Mutex<Vec<Vec<u8>>>>,
    pub playback_released: Arc<AtomicBool>,
}

impl DeviceProbe {
    pub fn openers(&self) -> (CaptureOpener, PlaybackOpener) {
        let capture = MockCapture {
            periods: self.capture_periods.clone(),
            released: self.capture_released.clone(),
        };
        let playback = MockPlayback {
            written: self.written.clone(),
            released: self.playback_released.clone(),
        };
        (
            Box::new(move || Ok(Box::new(capture) as Box<dyn CaptureDevice>)),
            Box::new(move || Ok(Box::new(playback) as Box<dyn PlaybackDevice>)),
        )
    }

    /// Concatenation of every non-silent byte written to the speaker.
    pub fn played_audio(&self) -> Vec<u8> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .copied()
            .filter(|b| *b != 0)
            .collect()
    }
}

/// Sink that records every message. `fail(n)` is asked before the n-th
/// send attempt and may return an error instead.
pub struct RecordingSink<F> {
    sent: Arc<Mutex<Vec<Message>>>,
    attempts: usize,
    fail: F,
}

impl<F> Sink<Message> for RecordingSink<F>
where
    F: FnMut(usize) -> Option<WsError> + Unpin,
{
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), WsError> {
        let this = self.get_mut();
        let n = this.attempts;
        this.attempts += 1;
        if let Some(err) = (this.fail)(n) {
            return Err(err);
        }
        this.sent.lock().unwrap().push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }
}

pub fn recording_sink<F>(sent: Arc<Mutex<Vec<Message>>>, fail: F) -> RecordingSink<F>
where
    F: FnMut(usize) -> Option<WsError> + Unpin,
{
    RecordingSink {
        sent,
        attempts: 0,
        fail,
    }
}

pub fn delta_message(pcm: &[u8]) -> Message {
    Message::Text(
        format!(
            r#"{{"type":"response.audio.delta","delta":"{}"}}"#,
            general_purpose::STANDARD.encode(pcm)
        )
        .into(),
    )
}

pub fn done_message() -> Message {
    Message::Text(r#"{"type":"response.audio.done"}"#.to_string().into())
}

pub fn text_message(text: &str) -> Message {
    Message::Text(text.to_string().into())
}

/// Type discriminators of the text messages in `sent`.
pub fn sent_types(sent: &[Message]) -> Vec<String> {
    sent.iter()
        .filter_map(|m| match m {
            Message::Text(t) => serde_json::from_str::<serde_json::Value>(t.as_str())
                .ok()
                .and_then(|v| v["type"].as_str().map(str::to_string)),
            _ => None,
        })
        .collect()
}

pub fn close_count(sent: &[Message]) -> usize {
    sent.iter().filter(|m| matches!(m, Message::Close(_))).count()
}
