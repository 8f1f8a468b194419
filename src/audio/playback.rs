use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;

use super::device::PlaybackDevice;
use super::mic_gate::MicGate;
use super::playback_buffer::{Chunk, PlaybackBuffer};

/// Consecutive write failures tolerated before a chunk is dropped.
const MAX_WRITE_RETRIES: u32 = 3;

/// Per-period playback step.
#[derive(Debug, Clone)]
pub struct PlaybackDriver {
    buffer: Arc<PlaybackBuffer>,
    gate: Arc<MicGate>,
    reengage_delay: Duration,
}

impl PlaybackDriver {
    pub fn new(buffer: Arc<PlaybackBuffer>, gate: Arc<MicGate>, reengage_delay: Duration) -> Self {
        Self {
            buffer,
            gate,
            reengage_delay,
        }
    }

    /// Produce the next output chunk into `out`.
    ///
    /// A full chunk of real audio re-arms the mic gate. An underrun outputs
    /// what is left plus silence and leaves the gate to expire on its own.
    pub fn fill(&self, out: &mut [u8], now: Instant) -> Chunk {
        let chunk = self.buffer.take_chunk(out);
        if chunk == Chunk::Full {
            self.gate.reengage(now, self.reengage_delay);
        }
        chunk
    }
}

pub fn playback_loop(
    mut device: Box<dyn PlaybackDevice>,
    driver: &PlaybackDriver,
    frame_bytes: usize,
    running: &AtomicBool,
) -> Result<()> {
    let mut chunk = vec![0u8; frame_bytes];

    log::info!("Playback started: frame={} bytes", frame_bytes);

    while running.load(Ordering::Relaxed) {
        if let Chunk::Underrun { available } = driver.fill(&mut chunk, Instant::now()) {
            if available > 0 {
                log::debug!("Playback underrun, padded {} bytes with silence", frame_bytes - available);
            }
        }

        let mut retry_count = 0u32;
        while let Err(e) = device.write_period(&chunk) {
            log::warn!("Playback error: {}, recovering...", e);
            retry_count += 1;

            if let Err(e2) = device.recover() {
                log::error!("Failed to recover playback device: {}", e2);
                return Ok(());
            }

            // device cannot keep up; drop this chunk instead of spinning
            if retry_count >= MAX_WRITE_RETRIES {
                log::error!(
                    "Max recovery retries ({}) reached. Dropping {} bytes.",
                    retry_count,
                    chunk.len()
                );
                break;
            }
        }
    }

    log::info!("Playback stopped");
    Ok(())
}
