use anyhow::{Context, anyhow, bail};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::audio::{AudioFrame, FrameReceiver};
use crate::config::Config;
use crate::downlink::DownlinkReceiver;
use crate::error::LinkError;
use crate::protocol::ClientEvent;
use crate::state_machine::{Session, SessionState};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WsStream, Message>;
pub type WsSource = SplitStream<WsStream>;

/// Back-to-back receive errors tolerated before the stream is treated as dead.
const MAX_CONSECUTIVE_RECV_ERRORS: u32 = 16;

/// Why a worker loop returned. The only failure signal crossing workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Shutdown was requested.
    Shutdown,
    /// The transport reported the connection closed.
    ConnectionClosed,
    /// The inbound stream ended, or the frame queue lost its producers.
    EndOfStream,
}

pub struct NetLink;

impl NetLink {
    /// Open the connection and send the initial `response.create`.
    pub async fn connect(config: &Config) -> anyhow::Result<(WsSink, WsSource)> {
        let request = build_request(config)?;

        log::info!("Connecting to {}...", config.ws_url);
        let (ws_stream, _) = tokio::time::timeout(config.connect_timeout(), connect_async(request))
            .await
            .map_err(|_| anyhow!("connect timed out after {:?}", config.connect_timeout()))??;
        log::info!("Connected to realtime endpoint");

        let (mut write, read) = ws_stream.split();
        send_response_create(&mut write, config)
            .await
            .context("Failed to send response.create")?;

        Ok((write, read))
    }

    /// `connect` plus the optional layered retry, driving `session` through
    /// Connecting -> Open, or leaving it in Failed.
    pub async fn connect_with_retry(
        config: &Config,
        session: &mut Session,
    ) -> anyhow::Result<(WsSink, WsSource)> {
        if config.api_key.is_none() {
            session.transition(SessionState::Failed)?;
            bail!("no credential in ${}", config.api_key_env);
        }

        // 重试机制，指数退避
        let mut retry_delay = 1;
        let mut attempt = 0;
        loop {
            match Self::connect(config).await {
                Ok(halves) => {
                    session.transition(SessionState::Open)?;
                    return Ok(halves);
                }
                Err(e) => {
                    session.transition(SessionState::Failed)?;
                    if attempt >= config.reconnect_attempts {
                        return Err(e);
                    }
                    attempt += 1;
                    log::warn!(
                        "Connection error: {:#}. Retrying in {}s ({}/{})...",
                        e,
                        retry_delay,
                        attempt,
                        config.reconnect_attempts
                    );
                    tokio::time::sleep(tokio::time::Duration::from_secs(retry_delay)).await;
                    retry_delay = std::cmp::min(retry_delay * 2, 60);
                    session.transition(SessionState::Connecting)?;
                }
            }
        }
    }
}

fn build_request(config: &Config) -> anyhow::Result<Request<()>> {
    let url = Url::parse(&config.ws_url).context("Invalid ws_url")?;
    let api_key = config
        .api_key
        .as_deref()
        .ok_or_else(|| anyhow!("no credential in ${}", config.api_key_env))?;

    let mut request = url.as_str().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {}", api_key))?,
    );
    if !config.beta_header.is_empty() {
        headers.insert("OpenAI-Beta", HeaderValue::from_str(&config.beta_header)?);
    }
    log::debug!("Upgrade request to {}", url.host_str().unwrap_or("?"));
    Ok(request)
}

/// Sent exactly once, right after the connection opens.
pub async fn send_response_create<S>(sink: &mut S, config: &Config) -> Result<(), LinkError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let json = ClientEvent::response_create(&config.modalities, &config.instructions).to_json()?;
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}

async fn send_frame<S>(sink: &mut S, frame: &AudioFrame) -> Result<(), LinkError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let json = ClientEvent::audio_append(frame.as_bytes()).to_json()?;
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}

/// Uplink sender: frame queue -> `input_audio_buffer.append` messages.
///
/// Transient send errors drop the frame and continue. On shutdown one close
/// frame is sent before returning.
pub async fn run_uplink<S>(
    mut sink: S,
    mut frames: FrameReceiver,
    cancel: CancellationToken,
) -> WorkerExit
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let exit = loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break WorkerExit::Shutdown,
            frame = frames.recv() => frame,
        };

        let Some(frame) = frame else {
            log::info!("Frame queue closed");
            break WorkerExit::EndOfStream;
        };

        match send_frame(&mut sink, &frame).await {
            Ok(()) => log::trace!("Sent {} bytes of audio", frame.len()),
            Err(e) if e.is_fatal() => {
                log::error!("WebSocket connection closed while sending");
                break WorkerExit::ConnectionClosed;
            }
            Err(e) => log::error!("Error sending mic audio: {}", e),
        }
    };

    if exit == WorkerExit::Shutdown {
        let pending = frames.discard_pending();
        if pending > 0 {
            log::info!("Discarded {} queued frames at shutdown", pending);
        }
        log::info!("Sending WebSocket close frame");
        let close = CloseFrame {
            code: CloseCode::Normal,
            reason: Utf8Bytes::from_static("client shutdown"),
        };
        if let Err(e) = sink.send(Message::Close(Some(close))).await {
            log::warn!("Failed to send close frame: {}", e);
        }
    }

    log::info!("Uplink sender exiting ({:?})", exit);
    exit
}

/// Downlink receiver: inbound messages -> playback buffer / segments.
///
/// Malformed and unknown messages are skipped. EOF, an empty message, a close
/// frame or a closed-connection error end the loop.
pub async fn run_downlink<S>(
    mut stream: S,
    mut receiver: DownlinkReceiver,
    cancel: CancellationToken,
) -> WorkerExit
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut consecutive_errors = 0u32;
    let exit = loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => break WorkerExit::Shutdown,
            msg = stream.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                consecutive_errors = 0;
                if text.is_empty() {
                    log::info!("Received empty message (possibly EOF or WebSocket closing)");
                    break WorkerExit::EndOfStream;
                }
                receiver.handle_text(text.as_str());
            }
            Some(Ok(Message::Binary(data))) => {
                consecutive_errors = 0;
                log::debug!("Ignoring {} bytes of binary data", data.len());
            }
            Some(Ok(Message::Close(frame))) => {
                log::info!("Server closed connection: {:?}", frame);
                break WorkerExit::ConnectionClosed;
            }
            Some(Ok(_)) => consecutive_errors = 0,
            Some(Err(e)) => match LinkError::from(e) {
                LinkError::Closed => {
                    log::error!("WebSocket connection closed");
                    break WorkerExit::ConnectionClosed;
                }
                other => {
                    consecutive_errors += 1;
                    log::error!("Error receiving audio: {}", other);
                    if consecutive_errors >= MAX_CONSECUTIVE_RECV_ERRORS {
                        log::error!("Too many receive errors, giving up on the connection");
                        break WorkerExit::ConnectionClosed;
                    }
                }
            },
            None => {
                log::info!("Inbound stream ended");
                break WorkerExit::EndOfStream;
            }
        }
    };

    log::info!("Downlink receiver exiting ({:?})", exit);
    exit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_credentials() {
        let config = Config {
            ws_url: "wss://example.com/v1/realtime?model=m".into(),
            api_key: Some("sk-abc".into()),
            ..Config::default()
        };
        let request = build_request(&config).unwrap();
        assert_eq!(request.uri().host(), Some("example.com"));
        assert_eq!(request.headers()["Authorization"], "Bearer sk-abc");
        assert_eq!(request.headers()["OpenAI-Beta"], "realtime=v1");
    }

    #[test]
    fn request_without_credential_fails() {
        let config = Config::default();
        assert!(build_request(&config).is_err());
    }

    #[tokio::test]
    async fn missing_credential_fails_without_dialing() {
        let config = Config::default();
        let mut session = Session::new();
        assert!(NetLink::connect_with_retry(&config, &mut session).await.is_err());
        assert_eq!(session.state(), SessionState::Failed);
    }
}
