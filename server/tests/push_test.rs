//! Integration tests for the push stream: bootstrap, keep-alive, replacement
//! and name updates.

mod common;

use common::{start_test_server, start_test_server_with, SseFrame, SseReader};
use relay_protocol::{ChannelKind, PushEvent};
use relay_server::config::RelayConfig;
use relay_server::db::models::NewMessage;
use serde_json::json;
use std::time::Duration;

const QUIET: Duration = Duration::from_millis(300);

fn new_message(channel_id: &str, content: &str) -> NewMessage {
    NewMessage {
        channel_id: channel_id.to_string(),
        sender_id: "char-a".into(),
        sender_name: "Alice".into(),
        content: content.to_string(),
        alliance_id: None,
        client_token: None,
    }
}

#[tokio::test]
async fn test_bootstrap_order_and_history() {
    let server = start_test_server_with(RelayConfig {
        bootstrap_message_limit: 2,
        ..RelayConfig::default()
    })
    .await;
    let world = server.world_channel_id().await;
    let store = server.store();
    store
        .create_channel("alliance", ChannelKind::Alliance, Some("g1"))
        .await
        .unwrap();
    for content in ["first", "second", "   ", "third"] {
        store.create_message(new_message(&world, content)).await.unwrap();
    }

    let mut reader = SseReader::open(&server, "char-a").await;

    assert_eq!(
        reader.expect_event().await,
        PushEvent::Connected {
            character_id: "char-a".into()
        }
    );

    match reader.expect_event().await {
        PushEvent::InitialChannels { channels } => {
            assert_eq!(channels.len(), 2);
            assert!(channels.iter().any(|c| c.kind == ChannelKind::World && c.id == world));
        }
        other => panic!("Expected initial_channels, got {:?}", other),
    }

    match reader.expect_event().await {
        PushEvent::InitialMessages {
            channel_id,
            messages,
        } => {
            assert_eq!(channel_id, world);
            let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
            assert_eq!(contents, vec!["second", "third"]);
        }
        other => panic!("Expected initial_messages, got {:?}", other),
    }

    assert!(reader.next_event(QUIET).await.is_none());
}

#[tokio::test]
async fn test_missing_character_id_rejected() {
    let server = start_test_server().await;

    let resp = reqwest::get(format!("{}/events", server.base_url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = reqwest::get(format!("{}/events?characterId=", server.base_url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert!(server.state.push.is_empty());
}

#[tokio::test]
async fn test_stream_headers() {
    let server = start_test_server().await;

    let resp = reqwest::get(format!("{}/events?characterId=char-a", server.base_url()))
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(content_type.starts_with("text/event-stream"));
}

#[tokio::test]
async fn test_keep_alive_comments() {
    let server = start_test_server_with(RelayConfig {
        keepalive_interval_secs: 1,
        ..RelayConfig::default()
    })
    .await;

    let mut reader = SseReader::open(&server, "char-a").await;
    reader.skip_bootstrap().await;

    let frame = reader.next_frame(Duration::from_secs(3)).await;
    assert_eq!(frame, Some(SseFrame::Comment("keep-alive".into())));
}

#[tokio::test]
async fn test_hub_events_reach_open_stream() {
    let server = start_test_server().await;
    let mut reader = SseReader::open(&server, "char-a").await;
    reader.skip_bootstrap().await;

    let event = PushEvent::CharacterStatus {
        character_id: "char-b".into(),
        is_online: true,
    };
    assert!(server.state.push.send("char-a", event.clone()));

    assert_eq!(reader.expect_event().await, event);
}

#[tokio::test]
async fn test_later_stream_replaces_earlier() {
    let server = start_test_server().await;

    let mut first = SseReader::open(&server, "char-a").await;
    first.skip_bootstrap().await;
    let mut second = SseReader::open(&server, "char-a").await;
    second.skip_bootstrap().await;

    // The replaced stream ends
    assert!(first.next_frame(Duration::from_secs(2)).await.is_none());
    assert_eq!(server.state.push.len(), 1);

    let event = PushEvent::NameUpdate {
        character_id: "char-a".into(),
        name: "Aldric".into(),
    };
    assert!(server.state.push.send("char-a", event.clone()));
    assert_eq!(second.expect_event().await, event);
}

#[tokio::test]
async fn test_closed_stream_unregisters() {
    let server = start_test_server_with(RelayConfig {
        keepalive_interval_secs: 1,
        ..RelayConfig::default()
    })
    .await;

    let mut reader = SseReader::open(&server, "char-a").await;
    reader.skip_bootstrap().await;
    assert!(server.state.push.is_open("char-a"));

    drop(reader);

    let mut closed = false;
    for _ in 0..50 {
        if !server.state.push.is_open("char-a") {
            closed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(closed, "Dropped stream should be unregistered");
}

#[tokio::test]
async fn test_name_update_pushed_to_self_and_friends() {
    let server = start_test_server().await;
    server.seed_character("char-a", "Alice").await;
    server.seed_character("char-b", "Bob").await;
    server.store().add_friendship("char-a", "char-b").await.unwrap();

    let mut a_push = SseReader::open(&server, "char-a").await;
    a_push.skip_bootstrap().await;
    let mut b_push = SseReader::open(&server, "char-b").await;
    b_push.skip_bootstrap().await;

    let resp = reqwest::Client::new()
        .put(format!("{}/api/characters/char-a/name", server.base_url()))
        .json(&json!({ "name": "  Aldric " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let expected = PushEvent::NameUpdate {
        character_id: "char-a".into(),
        name: "Aldric".into(),
    };
    assert_eq!(a_push.expect_event().await, expected);
    assert_eq!(b_push.expect_event().await, expected);

    let character = server.store().character("char-a").await.unwrap().unwrap();
    assert_eq!(character.name, "Aldric");
}

#[tokio::test]
async fn test_name_update_validation() {
    let server = start_test_server().await;
    server.seed_character("char-a", "Alice").await;
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("{}/api/characters/char-a/name", server.base_url()))
        .json(&json!({ "name": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .put(format!("{}/api/characters/char-a/name", server.base_url()))
        .json(&json!({ "name": "x".repeat(33) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .put(format!("{}/api/characters/char-nobody/name", server.base_url()))
        .json(&json!({ "name": "Ghost" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
