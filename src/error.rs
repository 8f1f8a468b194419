//! Transport error classification shared by the uplink and downlink workers.

use std::io::ErrorKind;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::error::ProtocolError;

#[derive(Debug, Error)]
pub enum LinkError {
    /// The connection is gone; the owning worker must stop.
    #[error("connection closed")]
    Closed,

    /// One frame or message is lost, the worker keeps going.
    #[error("transient transport error: {0}")]
    Transient(#[source] WsError),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl LinkError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::Closed)
    }
}

impl From<WsError> for LinkError {
    fn from(err: WsError) -> Self {
        if is_connection_closed(&err) {
            LinkError::Closed
        } else {
            LinkError::Transient(err)
        }
    }
}

/// True when `err` means the peer or the socket is gone for good.
pub fn is_connection_closed(err: &WsError) -> bool {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Io(e) => matches!(
            e.kind(),
            ErrorKind::BrokenPipe
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::UnexpectedEof
        ),
        WsError::Protocol(
            ProtocolError::SendAfterClosing | ProtocolError::ResetWithoutClosingHandshake,
        ) => true,
        _ => false,
    }
}
