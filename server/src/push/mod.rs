//! Server-to-client push streams, one per character.

pub mod handler;
pub mod names;

use dashmap::DashMap;
use relay_protocol::PushEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

struct PushStream {
    id: Uuid,
    sender: mpsc::Sender<PushEvent>,
}

/// Character id -> open push stream.
///
/// Mirrors the socket registry: opening a second stream for a character
/// replaces the first, whose receiver then ends.
#[derive(Clone, Default)]
pub struct PushHub {
    streams: Arc<DashMap<String, PushStream>>,
}

/// An open stream. Dropping it unregisters the stream unless it has been
/// replaced in the meantime.
pub struct PushSubscription {
    pub receiver: mpsc::Receiver<PushEvent>,
    guard: StreamGuard,
}

impl PushSubscription {
    pub fn into_parts(self) -> (mpsc::Receiver<PushEvent>, StreamGuard) {
        (self.receiver, self.guard)
    }
}

pub struct StreamGuard {
    hub: PushHub,
    character_id: String,
    stream_id: Uuid,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self.hub.close_stream(&self.character_id, self.stream_id) {
            tracing::info!(character_id = %self.character_id, "Push stream closed");
        }
    }
}

impl PushHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a stream for a character, replacing any earlier one.
    pub fn open(&self, character_id: &str, capacity: usize) -> PushSubscription {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let stream_id = Uuid::new_v4();
        let replaced = self
            .streams
            .insert(character_id.to_string(), PushStream { id: stream_id, sender });

        if replaced.is_some() {
            tracing::info!(character_id = %character_id, "Push stream replaced");
        }

        PushSubscription {
            receiver,
            guard: StreamGuard {
                hub: self.clone(),
                character_id: character_id.to_string(),
                stream_id,
            },
        }
    }

    /// Queue an event on a character's stream without waiting.
    /// Returns false when no stream is open or its queue is full.
    pub fn send(&self, character_id: &str, event: PushEvent) -> bool {
        let Some(stream) = self.streams.get(character_id) else {
            return false;
        };
        match stream.sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    character_id = %character_id,
                    event = event.event_name(),
                    "Push queue full, dropping event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_open(&self, character_id: &str) -> bool {
        self.streams
            .get(character_id)
            .map(|stream| !stream.sender.is_closed())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    fn close_stream(&self, character_id: &str, stream_id: Uuid) -> bool {
        self.streams
            .remove_if(character_id, |_, stream| stream.id == stream_id)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_update(name: &str) -> PushEvent {
        PushEvent::NameUpdate {
            character_id: "A".into(),
            name: name.into(),
        }
    }

    #[tokio::test]
    async fn later_open_replaces_earlier() {
        let hub = PushHub::new();
        let mut first = hub.open("A", 8);
        let mut second = hub.open("A", 8);

        assert!(hub.send("A", name_update("Aldric")));
        assert_eq!(second.receiver.recv().await, Some(name_update("Aldric")));
        // The replaced stream's sender was dropped with its registry entry.
        assert_eq!(first.receiver.recv().await, None);
    }

    #[test]
    fn dropping_a_replaced_subscription_keeps_the_newer_one() {
        let hub = PushHub::new();
        let first = hub.open("A", 8);
        let _second = hub.open("A", 8);

        drop(first);
        assert!(hub.is_open("A"));
    }

    #[test]
    fn dropping_the_current_subscription_unregisters() {
        let hub = PushHub::new();
        let sub = hub.open("A", 8);
        assert_eq!(hub.len(), 1);
        drop(sub);
        assert!(hub.is_empty());
        assert!(!hub.send("A", name_update("Aldric")));
    }
}
