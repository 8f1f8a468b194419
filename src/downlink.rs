use std::sync::Arc;

use crate::audio::PlaybackBuffer;
use crate::protocol::ServerEvent;
use crate::recorder::{ResponseSegment, SegmentSink};

/// What one inbound text message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Bytes appended to the playback buffer and the open segment.
    Audio(usize),
    /// Segment of this many bytes handed to the recorder.
    SegmentDone(usize),
    /// Known-but-unused or unknown event type.
    Ignored,
    Malformed,
}

/// Applies inbound events to the playback buffer and the segment accumulator.
pub struct DownlinkReceiver {
    playback: Arc<PlaybackBuffer>,
    segment: Vec<u8>,
    sink: SegmentSink,
}

impl DownlinkReceiver {
    pub fn new(playback: Arc<PlaybackBuffer>, sink: SegmentSink) -> Self {
        Self {
            playback,
            segment: Vec::new(),
            sink,
        }
    }

    /// Bytes accumulated for the response currently being streamed.
    pub fn pending_segment_len(&self) -> usize {
        self.segment.len()
    }

    pub fn handle_text(&mut self, text: &str) -> Handled {
        let event = match ServerEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Skipping malformed message: {}", e);
                return Handled::Malformed;
            }
        };

        match event {
            ServerEvent::AudioDelta(pcm) => {
                self.playback.append(&pcm);
                self.segment.extend_from_slice(&pcm);
                log::debug!(
                    "Received {} bytes, playback buffer {} bytes",
                    pcm.len(),
                    self.playback.len()
                );
                Handled::Audio(pcm.len())
            }
            ServerEvent::AudioDone => {
                let pcm = std::mem::take(&mut self.segment);
                let len = pcm.len();
                log::info!("AI finished speaking ({} bytes)", len);
                if len == 0 {
                    log::debug!("Empty response segment, nothing to save");
                } else {
                    self.sink.submit(ResponseSegment { pcm });
                }
                Handled::SegmentDone(len)
            }
            ServerEvent::Error(body) => {
                log::warn!(
                    "Server error event: code={} message={}",
                    body.code.as_deref().unwrap_or("-"),
                    body.message.as_deref().unwrap_or("-")
                );
                Handled::Ignored
            }
            ServerEvent::Other(kind) => {
                log::debug!("Received event: {}", kind);
                Handled::Ignored
            }
        }
    }
}
