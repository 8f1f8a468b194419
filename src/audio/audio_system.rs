//! The AudioSystem that owns the capture and playback threads.
//!
//! Uses std::thread (NOT tokio tasks) for real-time audio I/O to avoid
//! contention with async network tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::Result;

use super::capture::{CaptureDriver, capture_loop};
use super::device::{CaptureOpener, PlaybackOpener};
use super::playback::{PlaybackDriver, playback_loop};

/// Everything the two audio threads need.
pub struct AudioPipes {
    pub capture: CaptureDriver,
    pub playback: PlaybackDriver,
    /// Bytes per period, for both directions.
    pub frame_bytes: usize,
}

/// - Capture thread: device → `CaptureDriver` (mic gate) → frame queue
/// - Playback thread: playback buffer → `PlaybackDriver` → device
pub struct AudioSystem {
    running: Arc<AtomicBool>,
    capture_handle: Option<JoinHandle<()>>,
    playback_handle: Option<JoinHandle<()>>,
}

impl AudioSystem {
    /// Start both threads. Devices are opened on the thread that drives them.
    pub fn start(
        pipes: AudioPipes,
        open_capture: CaptureOpener,
        open_playback: PlaybackOpener,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let AudioPipes {
            capture,
            playback,
            frame_bytes,
        } = pipes;

        log::info!("AudioSystem starting, period {} bytes", frame_bytes);

        let capture_handle = {
            let running = running.clone();
            thread::Builder::new()
                .name("audio-capture".into())
                .spawn(move || {
                    let result = open_capture()
                        .and_then(|device| capture_loop(device, &capture, frame_bytes, &running));
                    if let Err(e) = result {
                        log::error!("Capture thread error: {:#}", e);
                    }
                })?
        };

        let playback_handle = {
            let running = running.clone();
            thread::Builder::new()
                .name("audio-playback".into())
                .spawn(move || {
                    let result = open_playback()
                        .and_then(|device| playback_loop(device, &playback, frame_bytes, &running));
                    if let Err(e) = result {
                        log::error!("Playback thread error: {:#}", e);
                    }
                })
        };
        let playback_handle = match playback_handle {
            Ok(h) => h,
            Err(e) => {
                running.store(false, Ordering::SeqCst);
                let _ = capture_handle.join();
                return Err(e.into());
            }
        };

        Ok(Self {
            running,
            capture_handle: Some(capture_handle),
            playback_handle: Some(playback_handle),
        })
    }

    /// True once either thread has exited on its own (device failure).
    pub fn has_stopped(&self) -> bool {
        let finished = |h: &Option<JoinHandle<()>>| h.as_ref().is_none_or(|h| h.is_finished());
        finished(&self.capture_handle) || finished(&self.playback_handle)
    }

    /// Signal threads to stop and wait for them to finish.
    ///
    /// Each thread notices within one period, after its blocking device call returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.capture_handle.take() {
            let _ = h.join();
        }
        if let Some(h) = self.playback_handle.take() {
            let _ = h.join();
        }
        log::info!("Audio streams stopped");
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        if self.capture_handle.is_some() || self.playback_handle.is_some() {
            self.stop();
        }
    }
}
