//! Typed listener fan-out.
//!
//! Listeners subscribe to one [`EventKind`] and receive every [`ClientEvent`]
//! of that kind. A panicking listener is logged and stays subscribed; the
//! other listeners still run.

use relay_protocol::{ChannelInfo, ChatMessage, SignalEnvelope};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::pending::PendingSend;
use crate::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    FriendRequest,
    Presence,
    Typing,
    ChannelUpdate,
    ConnectionStatus,
    Error,
    Signal,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::Message,
        EventKind::FriendRequest,
        EventKind::Presence,
        EventKind::Typing,
        EventKind::ChannelUpdate,
        EventKind::ConnectionStatus,
        EventKind::Error,
        EventKind::Signal,
    ];
}

/// Channel-related notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelUpdate {
    /// This client joined a channel.
    Joined { channel_id: String },
    /// This client left a channel.
    Left { channel_id: String },
    MemberJoined {
        channel_id: String,
        character_id: String,
    },
    MemberLeft {
        channel_id: String,
        character_id: String,
    },
    /// Channel list from the push-stream bootstrap.
    Channels(Vec<ChannelInfo>),
    /// Recent history from the push-stream bootstrap, oldest first.
    History {
        channel_id: String,
        messages: Vec<ChatMessage>,
    },
}

/// Everything the client reports to its listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Message(ChatMessage),
    FriendRequest {
        from_character_id: String,
        from_name: String,
    },
    FriendRequestSent {
        to_character_id: String,
    },
    Presence {
        character_id: String,
        is_online: bool,
    },
    NameUpdate {
        character_id: String,
        name: String,
    },
    Typing {
        character_id: String,
        channel_id: String,
        is_typing: bool,
    },
    ChannelUpdate(ChannelUpdate),
    ConnectionStatus(ConnectionState),
    Error(String),
    /// A message send that will never be echoed: the socket closed first.
    SendFailed(PendingSend),
    Signal(SignalEnvelope),
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::FriendRequest { .. } | Self::FriendRequestSent { .. } => {
                EventKind::FriendRequest
            }
            Self::Presence { .. } | Self::NameUpdate { .. } => EventKind::Presence,
            Self::Typing { .. } => EventKind::Typing,
            Self::ChannelUpdate(_) => EventKind::ChannelUpdate,
            Self::ConnectionStatus(_) => EventKind::ConnectionStatus,
            Self::Error(_) | Self::SendFailed(_) => EventKind::Error,
            Self::Signal(_) => EventKind::Signal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<Mutex<HashMap<EventKind, Vec<(ListenerId, Listener)>>>>,
    next_id: Arc<AtomicU64>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns whether the listener was subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        for listeners in inner.values_mut() {
            let before = listeners.len();
            listeners.retain(|(lid, _)| *lid != id);
            removed |= listeners.len() != before;
        }
        removed
    }

    /// Deliver an event to every listener of its kind. Returns how many
    /// listeners completed without panicking.
    pub fn emit(&self, event: &ClientEvent) -> usize {
        let kind = event.kind();
        // Snapshot so listeners may subscribe or unsubscribe while running.
        let listeners: Vec<Listener> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|l| l.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default();

        listeners
            .iter()
            .filter(|listener| {
                let outcome = catch_unwind(AssertUnwindSafe(|| listener(event)));
                if outcome.is_err() {
                    tracing::error!(kind = ?kind, "Listener panicked");
                }
                outcome.is_ok()
            })
            .count()
    }

    pub fn len(&self, kind: EventKind) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<_, _> = inner.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("Listeners").field("counts", &counts).finish()
    }
}
