//! FIFO of captured frames between the capture thread and the uplink task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// One captured PCM frame (mono S16LE). Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame(Bytes);

impl AudioFrame {
    /// Copy out of a device buffer the driver will reuse.
    pub fn copy_from(pcm: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(pcm))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
enum Tx {
    Unbounded(mpsc::UnboundedSender<AudioFrame>),
    Bounded(mpsc::Sender<AudioFrame>),
}

#[derive(Debug)]
enum Rx {
    Unbounded(mpsc::UnboundedReceiver<AudioFrame>),
    Bounded(mpsc::Receiver<AudioFrame>),
}

/// Producer half. Cheap to clone; never blocks.
#[derive(Debug, Clone)]
pub struct FrameQueue {
    tx: Tx,
    dropped: Arc<AtomicU64>,
}

/// Consumer half, owned by the uplink sender.
#[derive(Debug)]
pub struct FrameReceiver {
    rx: Rx,
}

/// Create a frame queue. `capacity == 0` means unbounded.
pub fn frame_queue(capacity: usize) -> (FrameQueue, FrameReceiver) {
    let (tx, rx) = if capacity == 0 {
        let (tx, rx) = mpsc::unbounded_channel();
        (Tx::Unbounded(tx), Rx::Unbounded(rx))
    } else {
        let (tx, rx) = mpsc::channel(capacity);
        (Tx::Bounded(tx), Rx::Bounded(rx))
    };
    (
        FrameQueue {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        FrameReceiver { rx },
    )
}

impl FrameQueue {
    /// Enqueue a frame. Returns false when it was dropped: the queue is
    /// full (bounded mode drops the newest frame) or the consumer is gone.
    pub fn push(&self, frame: AudioFrame) -> bool {
        let queued = match &self.tx {
            Tx::Unbounded(tx) => tx.send(frame).is_ok(),
            Tx::Bounded(tx) => match tx.try_send(frame) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    log::debug!("Frame queue full, dropping frame");
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            },
        };
        if !queued {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queued
    }

    /// Frames rejected by `push` so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameReceiver {
    /// Wait for the next frame; `None` once every producer is dropped.
    pub async fn recv(&mut self) -> Option<AudioFrame> {
        match &mut self.rx {
            Rx::Unbounded(rx) => rx.recv().await,
            Rx::Bounded(rx) => rx.recv().await,
        }
    }

    pub fn try_recv(&mut self) -> Option<AudioFrame> {
        match &mut self.rx {
            Rx::Unbounded(rx) => rx.try_recv().ok(),
            Rx::Bounded(rx) => rx.try_recv().ok(),
        }
    }

    /// Discard whatever is still queued; used at shutdown.
    pub fn discard_pending(&mut self) -> usize {
        let mut n = 0;
        while self.try_recv().is_some() {
            n += 1;
        }
        n
    }
}
