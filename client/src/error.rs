use thiserror::Error;

/// Errors surfaced by the client handle.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The socket is not open; the send was not attempted.
    #[error("socket is not connected")]
    NotConnected,

    /// The background driver has stopped (after `shutdown` or a panic).
    #[error("client has shut down")]
    ShutDown,

    /// Reported to additional `connect` callers waiting on the same attempt.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("socket handshake timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request rejected with status {0}")]
    Rejected(u16),

    #[error("protocol error: {0}")]
    Protocol(#[from] relay_protocol::ProtocolError),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
