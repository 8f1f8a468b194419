//! Device seam between the realtime loops and the sound hardware.

use anyhow::Result;

/// Blocking source of mono S16LE periods.
pub trait CaptureDevice: Send {
    /// Fill `pcm` with one period, blocking until the device has it.
    /// Returns the number of bytes written.
    fn read_period(&mut self, pcm: &mut [u8]) -> Result<usize>;

    /// Bring the stream back after an overrun or I/O error.
    fn recover(&mut self) -> Result<()>;
}

/// Blocking sink of mono S16LE periods.
pub trait PlaybackDevice: Send {
    /// Write one period, blocking while the device drains its queue.
    fn write_period(&mut self, pcm: &[u8]) -> Result<()>;

    fn recover(&mut self) -> Result<()>;
}

/// Opens a device on the thread that will drive it.
pub type CaptureOpener = Box<dyn FnOnce() -> Result<Box<dyn CaptureDevice>> + Send>;
pub type PlaybackOpener = Box<dyn FnOnce() -> Result<Box<dyn PlaybackDevice>> + Send>;

pub(crate) fn le_bytes_to_samples(pcm: &[u8], samples: &mut Vec<i16>) {
    samples.clear();
    samples.extend(
        pcm.chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]])),
    );
}

pub(crate) fn samples_to_le_bytes(samples: &[i16], pcm: &mut [u8]) -> usize {
    let mut n = 0;
    for (dst, s) in pcm.chunks_exact_mut(2).zip(samples) {
        dst.copy_from_slice(&s.to_le_bytes());
        n += 2;
    }
    n
}
