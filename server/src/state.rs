use std::sync::Arc;

use crate::config::RelayConfig;
use crate::db::Store;
use crate::push::PushHub;
use crate::ws::PresenceRegistry;

/// Shared application state passed to all handlers via axum State extractor.
///
/// Built once per process; every component that needs a lookup gets it from
/// here rather than from a global.
#[derive(Clone)]
pub struct AppState {
    /// Persistence collaborator (SQLite)
    pub store: Store,
    /// Active socket connections per character
    pub registry: PresenceRegistry,
    /// Open push streams per character
    pub push: PushHub,
    /// Relay timers and bounds
    pub relay: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(store: Store, relay: RelayConfig) -> Self {
        Self {
            store,
            registry: PresenceRegistry::new(),
            push: PushHub::new(),
            relay: Arc::new(relay),
        }
    }
}
