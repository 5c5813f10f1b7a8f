use std::time::Duration;

use crate::reconnect::DEFAULT_RECONNECT_DELAY;

/// Default interval between heartbeat frames.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Default lifetime of a received typing indicator.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(5);

/// Default limit on the socket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_SEEN_CAPACITY: usize = 1024;

/// Settings for a [`RelayClient`](crate::RelayClient).
///
/// Only the server URL and the character id are required.
///
/// ```
/// use relay_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("http://127.0.0.1:3030", "char-1")
///     .with_reconnect_delay(Duration::from_secs(1))
///     .with_push_stream(false);
/// assert_eq!(config.ws_url(), "ws://127.0.0.1:3030/ws?characterId=char-1");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP base URL of the relay, e.g. `http://127.0.0.1:3030`.
    pub base_url: String,
    pub character_id: String,
    pub heartbeat_interval: Duration,
    /// Fixed delay before each reconnect attempt, for both transports.
    pub reconnect_delay: Duration,
    pub typing_timeout: Duration,
    /// A socket handshake not finished within this is a failed attempt.
    pub connect_timeout: Duration,
    /// Whether `connect` also opens the push stream.
    pub push_stream: bool,
    /// How many delivered message ids are remembered for deduplication.
    pub seen_capacity: usize,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, character_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            character_id: character_id.into(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            push_stream: true,
            seen_capacity: DEFAULT_SEEN_CAPACITY,
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_typing_timeout(mut self, timeout: Duration) -> Self {
        self.typing_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_push_stream(mut self, enabled: bool) -> Self {
        self.push_stream = enabled;
        self
    }

    pub fn ws_url(&self) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/ws?characterId={}", base, self.character_id)
    }

    pub fn events_url(&self) -> String {
        format!("{}/events?characterId={}", self.base_url, self.character_id)
    }

    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
