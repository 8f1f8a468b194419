//! audio - Mic gating, buffering, and the realtime capture/playback threads
//!
//! Raw mono S16LE end to end: frames captured from the device go through the
//! mic gate into the frame queue, decoded response audio is pulled from the
//! playback buffer one period at a time.

#[cfg(feature = "alsa")]
mod alsa_device;
mod audio_system;
pub mod capture;
pub mod device;
pub mod frame_queue;
pub mod mic_gate;
pub mod playback;
pub mod playback_buffer;

#[cfg(feature = "alsa")]
pub use alsa_device::{AlsaCapture, AlsaPlayback};
pub use audio_system::{AudioPipes, AudioSystem};
pub use capture::CaptureDriver;
pub use device::{CaptureDevice, CaptureOpener, PlaybackDevice, PlaybackOpener};
pub use frame_queue::{AudioFrame, FrameQueue, FrameReceiver, frame_queue};
pub use mic_gate::{MicGate, MicState};
pub use playback::PlaybackDriver;
pub use playback_buffer::{Chunk, PlaybackBuffer};
