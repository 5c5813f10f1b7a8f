//! Call-setup relay.
//!
//! Offers, answers and ICE candidates are forwarded verbatim to the target's
//! push stream. Nothing is queued: a target without an open stream simply
//! misses the envelope, and the endpoints are expected to retry the
//! negotiation themselves.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use relay_protocol::SignalEnvelope;
use serde_json::{json, Value};

use crate::push::PushHub;
use crate::state::AppState;

/// Forward an envelope to its target. Returns whether a stream accepted it.
pub fn relay(push: &PushHub, envelope: SignalEnvelope) -> bool {
    let kind = envelope.kind;
    let from = envelope.from.clone();
    let to = envelope.to.clone();

    let delivered = push.send(&to, envelope.into_push_event());
    tracing::debug!(
        kind = kind.as_str(),
        from = %from,
        to = %to,
        delivered,
        "Signaling envelope relayed"
    );
    delivered
}

/// POST /api/rtc/signal
/// Body: { "type": "offer"|"answer"|"ice_candidate", "from", "to", "offer"?, "answer"?, "candidate"? }
///
/// Rejected with 400 when a routing field is missing; otherwise always
/// acknowledged, whether or not the target was reachable.
pub async fn submit_signal(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            );
        }
    };

    let envelope = match SignalEnvelope::from_body(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(error = %e, "Signaling submission rejected");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };

    relay(&state.push, envelope);
    (StatusCode::OK, Json(json!({ "success": true })))
}
