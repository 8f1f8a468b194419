//! Full-duplex realtime voice client core.
//!
//! Microphone frames stream to a remote speech endpoint over one WebSocket
//! while the streamed reply is played back; the mic is gated off for as long
//! as reply audio is coming out of the speaker.

pub mod audio;
pub mod config;
pub mod controller;
pub mod downlink;
pub mod error;
pub mod net_link;
pub mod protocol;
pub mod recorder;
pub mod state_machine;

pub use config::Config;
pub use controller::{Controller, DuplexContext, RunSummary};
