use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures_util::StreamExt;
use relay_protocol::PushEvent;
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PushStreamQuery {
    #[serde(rename = "characterId")]
    pub character_id: Option<String>,
}

/// GET /events?characterId=...
///
/// Opens the character's push stream, emits the bootstrap snapshot, then
/// forwards notifications until the client goes away. Keep-alive comments are
/// interleaved at a fixed interval.
pub async fn open_push_stream(
    State(state): State<AppState>,
    Query(params): Query<PushStreamQuery>,
) -> Response {
    let character_id = match params.character_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => return (StatusCode::BAD_REQUEST, "characterId is required").into_response(),
    };

    let bootstrap = bootstrap_events(&state, &character_id).await;
    let subscription = state
        .push
        .open(&character_id, state.relay.outbound_queue_capacity);
    let (receiver, guard) = subscription.into_parts();

    tracing::info!(character_id = %character_id, "Push stream opened");

    let stream = futures_util::stream::iter(bootstrap)
        .chain(ReceiverStream::new(receiver))
        .map(move |event| {
            // The guard lives as long as the response body.
            let _guard = &guard;
            Ok::<_, Infallible>(to_sse_event(&event))
        });

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(state.relay.keepalive_interval())
                .text("keep-alive"),
        )
        .into_response()
}

/// Events sent as soon as a stream opens: `connected`, the channel list and
/// the tail of the world channel.
pub async fn bootstrap_events(state: &AppState, character_id: &str) -> Vec<PushEvent> {
    let mut events = vec![PushEvent::Connected {
        character_id: character_id.to_string(),
    }];

    let channels = match state.store.channels().await {
        Ok(channels) => channels,
        Err(e) => {
            tracing::warn!(error = %e, "Channel list unavailable for bootstrap");
            return events;
        }
    };

    let world = channels
        .iter()
        .find(|c| c.kind == relay_protocol::ChannelKind::World)
        .cloned();
    events.push(PushEvent::InitialChannels { channels });

    if let Some(world) = world {
        match state
            .store
            .recent_messages(&world.id, state.relay.bootstrap_message_limit)
            .await
        {
            Ok(messages) => events.push(PushEvent::InitialMessages {
                channel_id: world.id,
                messages,
            }),
            Err(e) => tracing::warn!(error = %e, "World history unavailable for bootstrap"),
        }
    }

    events
}

fn to_sse_event(event: &PushEvent) -> Event {
    match event.data() {
        Ok(data) => Event::default().event(event.event_name()).data(data),
        Err(e) => {
            tracing::error!(event = event.event_name(), error = %e, "Failed to encode push event");
            Event::default().comment("encoding error")
        }
    }
}
