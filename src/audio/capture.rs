use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Result;

use super::device::CaptureDevice;
use super::frame_queue::{AudioFrame, FrameQueue};
use super::mic_gate::MicGate;

/// Per-period capture step: gate check, then copy into the frame queue.
#[derive(Debug, Clone)]
pub struct CaptureDriver {
    gate: Arc<MicGate>,
    queue: FrameQueue,
}

impl CaptureDriver {
    pub fn new(gate: Arc<MicGate>, queue: FrameQueue) -> Self {
        Self { gate, queue }
    }

    /// Handle one captured period. Returns true if it was queued.
    ///
    /// Runs on the capture deadline: no I/O, no blocking, one allocation.
    pub fn on_frame(&self, pcm: &[u8], now: Instant) -> bool {
        if !self.gate.admit(now) {
            return false;
        }
        self.queue.push(AudioFrame::copy_from(pcm))
    }
}

pub fn capture_loop(
    mut device: Box<dyn CaptureDevice>,
    driver: &CaptureDriver,
    frame_bytes: usize,
    running: &AtomicBool,
) -> Result<()> {
    let mut read_buf = vec![0u8; frame_bytes];

    log::info!("Capture started: frame={} bytes", frame_bytes);

    while running.load(Ordering::Relaxed) {
        match device.read_period(&mut read_buf) {
            Ok(0) => continue,
            Ok(n) => {
                driver.on_frame(&read_buf[..n], Instant::now());
            }
            Err(e) => {
                log::warn!("Capture error: {}, recovering...", e);
                if let Err(e2) = device.recover() {
                    log::error!("Failed to recover capture device: {}", e2);
                    break;
                }
            }
        }
    }

    log::info!("Capture stopped");
    Ok(())
}
