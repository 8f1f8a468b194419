//! Persists finished response segments as WAV files off the receive path.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tokio::sync::mpsc;

/// Decoded audio of one reply turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSegment {
    pub pcm: Vec<u8>,
}

/// Hand-off point used by the downlink receiver. `submit` never blocks.
#[derive(Debug, Clone)]
pub struct SegmentSink {
    tx: Option<mpsc::UnboundedSender<ResponseSegment>>,
}

impl SegmentSink {
    /// A sink that drops every segment (recording disabled).
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn submit(&self, segment: ResponseSegment) {
        match &self.tx {
            Some(tx) => {
                if tx.send(segment).is_err() {
                    log::warn!("Recorder is gone, response segment dropped");
                }
            }
            None => log::debug!("Recording disabled, {} bytes not saved", segment.pcm.len()),
        }
    }
}

/// Background writer thread. Names files `<prefix>_<n>.wav`, `n` from 0.
pub struct Recorder {
    handle: Option<JoinHandle<()>>,
}

impl Recorder {
    pub fn spawn(dir: PathBuf, prefix: String, sample_rate: u32) -> Result<(Self, SegmentSink)> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create recording dir {}", dir.display()))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<ResponseSegment>();
        let handle = thread::Builder::new()
            .name("segment-recorder".into())
            .spawn(move || {
                let mut counter = 0u64;
                while let Some(segment) = rx.blocking_recv() {
                    let path = dir.join(format!("{}_{}.wav", prefix, counter));
                    counter += 1;
                    match write_wav(&path, &segment.pcm, sample_rate) {
                        Ok(()) => log::info!("Saved {}", path.display()),
                        Err(e) => log::error!("Failed to save {}: {:#}", path.display(), e),
                    }
                }
            })?;

        Ok((
            Self {
                handle: Some(handle),
            },
            SegmentSink { tx: Some(tx) },
        ))
    }

    /// Wait for queued segments to be written. Every `SegmentSink` clone
    /// must have been dropped first, or this waits for them.
    pub fn finish(mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Write mono 16-bit PCM (little endian bytes) as a WAV file.
pub fn write_wav(path: &Path, pcm: &[u8], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for b in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([b[0], b[1]]))?;
    }
    writer.finalize()?;
    Ok(())
}
