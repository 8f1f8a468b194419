//! Half-duplex mic gate.
//!
//! The playback thread re-arms the gate every time it outputs real audio;
//! the capture thread drops frames until the deadline has passed.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Observability only; never consulted for the gating decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicState {
    Unknown,
    Active,
    Suppressed,
}

impl MicState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => MicState::Active,
            2 => MicState::Suppressed,
            _ => MicState::Unknown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            MicState::Unknown => 0,
            MicState::Active => 1,
            MicState::Suppressed => 2,
        }
    }
}

#[derive(Debug)]
pub struct MicGate {
    epoch: Instant,
    /// Deadline in microseconds since `epoch`.
    reengage_at: AtomicU64,
    state: AtomicU8,
}

impl MicGate {
    pub fn new() -> Self {
        Self::with_epoch(Instant::now())
    }

    /// Gate whose time origin is `epoch`. Instants before it count as `epoch`.
    pub fn with_epoch(epoch: Instant) -> Self {
        Self {
            epoch,
            reengage_at: AtomicU64::new(0),
            state: AtomicU8::new(MicState::Unknown.as_u8()),
        }
    }

    fn micros(&self, t: Instant) -> u64 {
        u64::try_from(t.saturating_duration_since(self.epoch).as_micros()).unwrap_or(u64::MAX)
    }

    /// True once `now` has reached the re-engage deadline.
    pub fn should_capture(&self, now: Instant) -> bool {
        self.micros(now) >= self.reengage_at.load(Ordering::Acquire)
    }

    /// Keep the mic closed until `now + delay`.
    pub fn reengage(&self, now: Instant, delay: Duration) {
        let delay = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX);
        self.reengage_at
            .store(self.micros(now).saturating_add(delay), Ordering::Release);
    }

    pub fn reengage_at(&self) -> Instant {
        self.epoch + Duration::from_micros(self.reengage_at.load(Ordering::Acquire))
    }

    pub fn state(&self) -> MicState {
        MicState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Gate decision plus active/suppressed transition logging.
    pub fn admit(&self, now: Instant) -> bool {
        let open = self.should_capture(now);
        let next = if open {
            MicState::Active
        } else {
            MicState::Suppressed
        };
        let prev = self.state.swap(next.as_u8(), Ordering::Relaxed);
        if prev != next.as_u8() {
            match next {
                MicState::Active => log::info!("Mic active"),
                _ => log::info!("Mic suppressed"),
            }
        }
        open
    }
}

impl Default for MicGate {
    fn default() -> Self {
        Self::new()
    }
}
