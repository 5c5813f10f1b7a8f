//! Bookkeeping for outgoing messages and duplicate suppression.

use chrono::{DateTime, Utc};
use relay_protocol::ChatMessage;
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// A message sent but not yet echoed back by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub client_token: String,
    pub channel_id: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Pending sends keyed by their idempotency token.
#[derive(Debug, Default)]
pub struct PendingSends {
    by_token: HashMap<String, PendingSend>,
}

impl PendingSends {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a send and return the token to attach to it.
    pub fn track(&mut self, channel_id: &str, content: &str) -> String {
        let client_token = Uuid::new_v4().to_string();
        self.by_token.insert(
            client_token.clone(),
            PendingSend {
                client_token: client_token.clone(),
                channel_id: channel_id.to_string(),
                content: content.to_string(),
                sent_at: Utc::now(),
            },
        );
        client_token
    }

    /// Drop a send that never reached the wire.
    pub fn forget(&mut self, client_token: &str) -> Option<PendingSend> {
        self.by_token.remove(client_token)
    }

    /// Match an incoming message against the pending set by its echoed token.
    pub fn resolve(&mut self, message: &ChatMessage) -> Option<PendingSend> {
        let token = message.client_token.as_deref()?;
        self.by_token.remove(token)
    }

    /// Remove every pending send, oldest first. Used when the socket closes
    /// and no echo can arrive any more.
    pub fn drain(&mut self) -> Vec<PendingSend> {
        let mut failed: Vec<_> = self.by_token.drain().map(|(_, p)| p).collect();
        failed.sort_by_key(|p| p.sent_at);
        failed
    }

    /// Pending sends, oldest first.
    pub fn snapshot(&self) -> Vec<PendingSend> {
        let mut pending: Vec<_> = self.by_token.values().cloned().collect();
        pending.sort_by_key(|p| p.sent_at);
        pending
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

/// Bounded memory of message ids already delivered to listeners. The same
/// message can arrive on both transports.
#[derive(Debug)]
pub struct SeenMessages {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SeenMessages {
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns true the first time an id is seen.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
