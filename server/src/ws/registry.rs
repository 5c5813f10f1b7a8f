//! Presence registry: which characters currently hold a live socket.

use dashmap::DashMap;
use relay_protocol::close_code;
use std::sync::Arc;
use uuid::Uuid;

use super::Connection;

/// Character id -> active socket connection.
///
/// Constructed once per process and shared through `AppState`. At most one
/// connection is active per character; registering a newer one closes the
/// older one instead of merging them.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    connections: Arc<DashMap<String, Connection>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its character id.
    /// Returns the superseded connection, which has already been closed.
    pub fn register(&self, connection: Connection) -> Option<Connection> {
        let character_id = connection.character_id().to_string();
        let previous = self.connections.insert(character_id.clone(), connection);

        if let Some(old) = &previous {
            old.close(close_code::SUPERSEDED, "Superseded by a newer connection");
            tracing::info!(
                character_id = %character_id,
                connection_id = %old.id(),
                "Connection superseded"
            );
        }

        tracing::debug!(
            character_id = %character_id,
            online = self.connections.len(),
            "Connection registered"
        );
        previous
    }

    /// Remove whatever connection is registered for the character. Idempotent.
    pub fn unregister(&self, character_id: &str) -> Option<Connection> {
        let removed = self.connections.remove(character_id).map(|(_, conn)| conn);
        if removed.is_some() {
            tracing::debug!(character_id = %character_id, "Connection unregistered");
        }
        removed
    }

    /// Remove the registration only if it still belongs to `connection_id`.
    /// A superseded socket must not unregister its replacement.
    pub fn unregister_connection(&self, character_id: &str, connection_id: Uuid) -> bool {
        let removed = self
            .connections
            .remove_if(character_id, |_, conn| conn.id() == connection_id)
            .is_some();
        if removed {
            tracing::debug!(character_id = %character_id, "Connection unregistered");
        }
        removed
    }

    pub fn lookup(&self, character_id: &str) -> Option<Connection> {
        self.connections.get(character_id).map(|c| c.value().clone())
    }

    pub fn is_online(&self, character_id: &str) -> bool {
        self.connections.contains_key(character_id)
    }

    /// Snapshot of every registered connection.
    pub fn connections(&self) -> Vec<Connection> {
        self.connections.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
