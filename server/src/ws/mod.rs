pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod registry;

use axum::extract::ws::{CloseFrame, Message};
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

pub use registry::PresenceRegistry;

/// Sender half of a connection's bounded outbound queue.
pub type ConnectionSender = mpsc::Sender<Message>;

/// One live socket session.
///
/// Cheap to clone: all clones share the same outbound queue, liveness flag and
/// channel membership. The registry owns the canonical handle; the socket
/// actor keeps its own clone for the lifetime of the socket.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    id: Uuid,
    character_id: String,
    sender: ConnectionSender,
    alive: AtomicBool,
    last_heartbeat: Mutex<DateTime<Utc>>,
    channels: DashSet<String>,
    terminate: Notify,
}

impl Connection {
    /// Create a connection and the receiver its writer task drains.
    pub fn new(character_id: &str, capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let connection = Self {
            inner: Arc::new(ConnectionInner {
                id: Uuid::new_v4(),
                character_id: character_id.to_string(),
                sender,
                alive: AtomicBool::new(true),
                last_heartbeat: Mutex::new(Utc::now()),
                channels: DashSet::new(),
                terminate: Notify::new(),
            }),
        };
        (connection, receiver)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn character_id(&self) -> &str {
        &self.inner.character_id
    }

    /// Queue a frame without waiting. A full or closed queue drops the frame.
    pub fn deliver(&self, msg: Message) -> bool {
        match self.inner.sender.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    character_id = %self.inner.character_id,
                    connection_id = %self.inner.id,
                    "Outbound queue full, dropping frame"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn send(&self, frame: &relay_protocol::ServerFrame) -> bool {
        match broadcast::encode(frame) {
            Some(msg) => self.deliver(msg),
            None => false,
        }
    }

    /// Queue a close frame and stop the reader loop of this connection.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.inner.sender.try_send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })));
        self.inner.terminate.notify_one();
    }

    /// Resolves once `close` has been called.
    pub async fn terminated(&self) {
        self.inner.terminate.notified().await
    }

    pub fn is_closed(&self) -> bool {
        self.inner.sender.is_closed()
    }

    /// Record inbound traffic from the peer.
    pub fn mark_alive(&self) {
        self.inner.alive.store(true, Ordering::SeqCst);
        if let Ok(mut last) = self.inner.last_heartbeat.lock() {
            *last = Utc::now();
        }
    }

    /// Clear the liveness flag, returning whether the peer was seen since
    /// the previous check.
    pub fn take_alive(&self) -> bool {
        self.inner.alive.swap(false, Ordering::SeqCst)
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    pub fn last_heartbeat(&self) -> DateTime<Utc> {
        self.inner
            .last_heartbeat
            .lock()
            .map(|last| *last)
            .unwrap_or_else(|_| Utc::now())
    }

    /// Add a channel to the membership set. Returns false if already joined.
    pub fn join_channel(&self, channel_id: &str) -> bool {
        self.inner.channels.insert(channel_id.to_string())
    }

    /// Remove a channel from the membership set. Returns false if not joined.
    pub fn leave_channel(&self, channel_id: &str) -> bool {
        self.inner.channels.remove(channel_id).is_some()
    }

    pub fn is_member(&self, channel_id: &str) -> bool {
        self.inner.channels.contains(channel_id)
    }

    pub fn channels(&self) -> Vec<String> {
        self.inner.channels.iter().map(|c| c.key().clone()).collect()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("character_id", &self.inner.character_id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_flag_is_consumed_by_checks() {
        let (conn, _rx) = Connection::new("A", 4);
        assert!(conn.take_alive());
        assert!(!conn.take_alive());
        conn.mark_alive();
        assert!(conn.take_alive());
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (conn, mut rx) = Connection::new("A", 1);
        assert!(conn.deliver(Message::Text("one".into())));
        assert!(!conn.deliver(Message::Text("two".into())));
        assert!(matches!(rx.try_recv(), Ok(Message::Text(t)) if t.as_str() == "one"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn membership_is_idempotent() {
        let (conn, _rx) = Connection::new("A", 4);
        assert!(conn.join_channel("c1"));
        assert!(!conn.join_channel("c1"));
        assert!(conn.is_member("c1"));
        assert!(conn.leave_channel("c1"));
        assert!(!conn.leave_channel("c1"));
        assert!(conn.channels().is_empty());
    }
}
