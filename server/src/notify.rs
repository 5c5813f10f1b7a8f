//! Single-delivery notifications across the two transports.

use relay_protocol::{PushEvent, ServerFrame};

use crate::state::AppState;

/// Which transport carried a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Socket,
    PushStream,
    Unreachable,
}

/// Deliver a notification to one character exactly once: on its socket if it
/// has one, otherwise on its push stream. Dropped if neither is open.
pub fn notify(state: &AppState, character_id: &str, frame: &ServerFrame, event: PushEvent) -> Route {
    if let Some(conn) = state.registry.lookup(character_id) {
        if conn.send(frame) {
            return Route::Socket;
        }
    }
    if state.push.send(character_id, event) {
        return Route::PushStream;
    }
    Route::Unreachable
}
