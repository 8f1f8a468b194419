use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audio::{
    AudioPipes, AudioSystem, CaptureDriver, CaptureOpener, FrameQueue, FrameReceiver, MicGate,
    PlaybackBuffer, PlaybackDriver, PlaybackOpener, frame_queue,
};
use crate::config::Config;
use crate::downlink::DownlinkReceiver;
use crate::net_link::{NetLink, WorkerExit, run_downlink, run_uplink};
use crate::recorder::{Recorder, SegmentSink};
use crate::state_machine::{Session, SessionState};

/// How often the wait loop checks on the audio threads.
const WATCHDOG_INTERVAL: Duration = Duration::from_millis(100);

/// Shared state of one duplex session, handed explicitly to each component.
#[derive(Debug, Clone)]
pub struct DuplexContext {
    pub gate: Arc<MicGate>,
    pub playback: Arc<PlaybackBuffer>,
    pub frames: FrameQueue,
}

impl DuplexContext {
    pub fn new(config: &Config) -> (Self, FrameReceiver) {
        let (frames, frame_rx) = frame_queue(config.frame_queue_capacity);
        (
            Self {
                gate: Arc::new(MicGate::new()),
                playback: Arc::new(PlaybackBuffer::new()),
                frames,
            },
            frame_rx,
        )
    }

    pub fn audio_pipes(&self, config: &Config) -> AudioPipes {
        AudioPipes {
            capture: CaptureDriver::new(self.gate.clone(), self.frames.clone()),
            playback: PlaybackDriver::new(
                self.playback.clone(),
                self.gate.clone(),
                config.reengage_delay(),
            ),
            frame_bytes: config.frame_bytes(),
        }
    }
}

/// How the session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub final_state: SessionState,
    /// `None` when the worker had to be aborted after the join timeout.
    pub uplink: Option<WorkerExit>,
    pub downlink: Option<WorkerExit>,
}

pub struct Controller {
    config: Config,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run one session until `shutdown` resolves or a worker exits.
    ///
    /// Audio and the recorder are released on every path, including a
    /// failed connect.
    pub async fn run<F>(
        self,
        open_capture: CaptureOpener,
        open_playback: PlaybackOpener,
        shutdown: F,
    ) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        let config = &self.config;
        tokio::pin!(shutdown);

        let (recorder, sink) = if config.recording_enabled {
            let (recorder, sink) = Recorder::spawn(
                config.recording_dir.clone(),
                config.recording_prefix.clone(),
                config.sample_rate,
            )?;
            (Some(recorder), sink)
        } else {
            (None, SegmentSink::discard())
        };

        let (ctx, frame_rx) = DuplexContext::new(config);
        let mut audio = AudioSystem::start(ctx.audio_pipes(config), open_capture, open_playback)?;

        // 1. Connect
        let mut session = Session::new();
        let connected = tokio::select! {
            res = NetLink::connect_with_retry(config, &mut session) => Some(res),
            _ = &mut shutdown => None,
        };
        let (write, read) = match connected {
            Some(Ok(halves)) => halves,
            Some(Err(e)) => {
                log::error!("Failed to connect: {:#}", e);
                audio.stop();
                release_recorder(recorder, sink);
                return Err(e);
            }
            None => {
                log::info!("Shutdown requested while connecting");
                if session.state() != SessionState::Failed {
                    session.transition(SessionState::Failed)?;
                }
                audio.stop();
                release_recorder(recorder, sink);
                return Ok(RunSummary {
                    final_state: session.state(),
                    uplink: None,
                    downlink: None,
                });
            }
        };

        // 2. Start workers
        let cancel = CancellationToken::new();
        let mut uplink = tokio::spawn(run_uplink(write, frame_rx, cancel.clone()));
        let mut downlink = tokio::spawn(run_downlink(
            read,
            DownlinkReceiver::new(ctx.playback.clone(), sink.clone()),
            cancel.clone(),
        ));

        // 3. Wait for a stop reason
        let mut uplink_exit = None;
        let mut downlink_exit = None;
        let mut watchdog = tokio::time::interval(WATCHDOG_INTERVAL);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Gracefully shutting down...");
                    break;
                }
                res = &mut uplink => {
                    uplink_exit = Some(worker_exit("uplink", res));
                    break;
                }
                res = &mut downlink => {
                    downlink_exit = Some(worker_exit("downlink", res));
                    break;
                }
                _ = watchdog.tick() => {
                    if audio.has_stopped() {
                        log::error!("Audio thread exited, shutting down");
                        break;
                    }
                }
            }
        }

        // 4. Cooperative shutdown
        session.transition(SessionState::Closing)?;
        cancel.cancel();
        let timeout = config.join_timeout();
        if uplink_exit.is_none() {
            uplink_exit = join_worker("uplink", uplink, timeout).await;
        }
        if downlink_exit.is_none() {
            downlink_exit = join_worker("downlink", downlink, timeout).await;
        }
        session.transition(SessionState::Closed)?;

        release_recorder(recorder, sink);
        audio.stop();

        if ctx.frames.dropped() > 0 {
            log::info!("{} captured frames were dropped", ctx.frames.dropped());
        }
        log::info!("WebSocket closed and workers terminated");

        Ok(RunSummary {
            final_state: session.state(),
            uplink: uplink_exit,
            downlink: downlink_exit,
        })
    }
}

fn worker_exit(name: &str, res: Result<WorkerExit, tokio::task::JoinError>) -> WorkerExit {
    match res {
        Ok(exit) => {
            log::info!("{} worker exited: {:?}", name, exit);
            exit
        }
        Err(e) => {
            log::error!("{} worker panicked: {}", name, e);
            WorkerExit::ConnectionClosed
        }
    }
}

async fn join_worker(
    name: &str,
    mut handle: JoinHandle<WorkerExit>,
    timeout: Duration,
) -> Option<WorkerExit> {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(res) => Some(worker_exit(name, res)),
        Err(_) => {
            log::warn!("{} worker did not stop within {:?}, aborting", name, timeout);
            handle.abort();
            let _ = handle.await;
            None
        }
    }
}

fn release_recorder(recorder: Option<Recorder>, sink: SegmentSink) {
    drop(sink);
    if let Some(recorder) = recorder {
        recorder.finish();
    }
}
