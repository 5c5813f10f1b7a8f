//! Wire types shared by the relay server and its clients.
//!
//! The socket carries JSON text frames tagged by `type`; the push stream
//! carries SSE events whose name is the event tag and whose data is JSON.

pub mod model;
pub mod push;
pub mod signal;
pub mod socket;

pub use model::{ChannelInfo, ChannelKind, ChatMessage};
pub use push::PushEvent;
pub use signal::{SignalEnvelope, SignalKind};
pub use socket::{ClientFrame, ServerFrame};

/// Close codes used on the bidirectional socket.
pub mod close_code {
    /// Normal closure. Clients never reconnect after this code.
    pub const NORMAL: u16 = 1000;
    /// Liveness check failed on the server side.
    pub const GOING_AWAY: u16 = 1001;
    /// Observed locally when the transport drops without a close frame.
    pub const ABNORMAL: u16 = 1006;
    /// A newer connection for the same character replaced this one.
    pub const SUPERSEDED: u16 = 4000;
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unknown signal type `{0}`")]
    UnknownSignalKind(String),
    #[error("unknown channel type `{0}`")]
    UnknownChannelKind(String),
}
