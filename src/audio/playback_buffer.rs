//! Byte accumulator between the downlink receiver and the playback thread.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Result of pulling one chunk out of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// The whole chunk came from buffered audio.
    Full,
    /// Only `available` bytes were buffered; the rest is zero padding.
    Underrun { available: usize },
}

#[derive(Debug, Default)]
struct Inner {
    bytes: VecDeque<u8>,
    peak: usize,
}

#[derive(Debug, Default)]
pub struct PlaybackBuffer {
    inner: Mutex<Inner>,
}

impl PlaybackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    // The lock only ever guards byte copies, a poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append decoded audio at the back.
    pub fn append(&self, data: &[u8]) {
        let mut inner = self.lock();
        inner.bytes.extend(data);
        inner.peak = inner.peak.max(inner.bytes.len());
    }

    /// Fill `out` from the front of the buffer.
    ///
    /// With enough data exactly `out.len()` bytes are removed. Otherwise
    /// everything buffered is copied, the tail of `out` is zeroed and the
    /// buffer ends up empty.
    pub fn take_chunk(&self, out: &mut [u8]) -> Chunk {
        let mut inner = self.lock();
        let needed = out.len();
        let available = inner.bytes.len();
        let n = needed.min(available);

        for (dst, src) in out.iter_mut().zip(inner.bytes.drain(..n)) {
            *dst = src;
        }
        drop(inner);

        if n == needed {
            Chunk::Full
        } else {
            out[n..].fill(0);
            Chunk::Underrun { available: n }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest fill level seen since creation or the last `reset_peak`.
    pub fn peak_len(&self) -> usize {
        self.lock().peak
    }

    pub fn reset_peak(&self) {
        let mut inner = self.lock();
        inner.peak = inner.bytes.len();
    }

    pub fn clear(&self) {
        self.lock().bytes.clear();
    }
}
