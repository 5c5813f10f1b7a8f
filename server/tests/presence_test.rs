//! Integration tests for presence broadcasting, friend requests and the
//! presence lookup endpoint.

mod common;

use common::{connect, start_test_server, wait_for_online, SseReader, TestServer, TestSocket};
use relay_protocol::{ClientFrame, PushEvent, ServerFrame};
use std::time::Duration;

const QUIET: Duration = Duration::from_millis(300);

async fn seed_friends(server: &TestServer) {
    server.seed_character("char-a", "Alice").await;
    server.seed_character("char-b", "Bob").await;
    server
        .store()
        .add_friendship("char-a", "char-b")
        .await
        .expect("Failed to seed friendship");
}

async fn expect_status(socket: &mut TestSocket, character_id: &str, is_online: bool) {
    assert_eq!(
        socket.expect_frame().await,
        ServerFrame::CharacterStatus {
            character_id: character_id.to_string(),
            is_online,
        }
    );
}

#[tokio::test]
async fn test_friend_sees_each_transition_once() {
    let server = start_test_server().await;
    seed_friends(&server).await;

    let mut b = connect(&server, "char-b").await;

    let a = connect(&server, "char-a").await;
    expect_status(&mut b, "char-a", true).await;
    b.expect_silence(QUIET).await;

    // Abrupt drop, no close handshake
    drop(a);
    expect_status(&mut b, "char-a", false).await;
    b.expect_silence(QUIET).await;

    let _a = connect(&server, "char-a").await;
    expect_status(&mut b, "char-a", true).await;
    b.expect_silence(QUIET).await;
}

#[tokio::test]
async fn test_presence_transitions_are_persisted() {
    let server = start_test_server().await;
    seed_friends(&server).await;

    let a = connect(&server, "char-a").await;
    wait_for_online(&server, "char-a", true).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let character = server.store().character("char-a").await.unwrap().unwrap();
    assert!(character.is_online);
    assert!(character.last_seen.is_some());

    a.close().await;
    wait_for_online(&server, "char-a", false).await;
    // The store write follows unregistration
    tokio::time::sleep(Duration::from_millis(200)).await;
    let character = server.store().character("char-a").await.unwrap().unwrap();
    assert!(!character.is_online);
}

#[tokio::test]
async fn test_supersession_never_reports_offline() {
    let server = start_test_server().await;
    seed_friends(&server).await;

    let mut b = connect(&server, "char-b").await;
    let _first = connect(&server, "char-a").await;
    expect_status(&mut b, "char-a", true).await;

    let _second = connect(&server, "char-a").await;

    let frames = b.drain(QUIET).await;
    assert!(
        !frames.contains(&ServerFrame::CharacterStatus {
            character_id: "char-a".into(),
            is_online: false,
        }),
        "Superseded socket must not announce offline: {:?}",
        frames
    );
    assert!(server.state.registry.is_online("char-a"));
}

#[tokio::test]
async fn test_offline_friend_gets_status_on_push_stream() {
    let server = start_test_server().await;
    seed_friends(&server).await;

    let mut b_push = SseReader::open(&server, "char-b").await;
    b_push.skip_bootstrap().await;

    let _a = connect(&server, "char-a").await;

    assert_eq!(
        b_push.expect_event().await,
        PushEvent::CharacterStatus {
            character_id: "char-a".into(),
            is_online: true,
        }
    );
}

#[tokio::test]
async fn test_socket_preferred_over_push_stream() {
    let server = start_test_server().await;
    seed_friends(&server).await;

    let mut b_push = SseReader::open(&server, "char-b").await;
    b_push.skip_bootstrap().await;
    let mut b = connect(&server, "char-b").await;

    let _a = connect(&server, "char-a").await;

    expect_status(&mut b, "char-a", true).await;
    assert!(
        b_push.next_event(QUIET).await.is_none(),
        "Status must be delivered exactly once"
    );
}

#[tokio::test]
async fn test_friend_request_delivered_to_online_target() {
    let server = start_test_server().await;
    server.seed_character("char-a", "Alice").await;
    server.seed_character("char-b", "Bob").await;

    let mut a = connect(&server, "char-a").await;
    let mut b = connect(&server, "char-b").await;

    a.send(&ClientFrame::FriendRequest {
        to_character_id: "char-b".into(),
    })
    .await;

    assert_eq!(
        a.expect_frame().await,
        ServerFrame::FriendRequestSent {
            to_character_id: "char-b".into()
        }
    );
    assert_eq!(
        b.expect_frame().await,
        ServerFrame::FriendRequest {
            from_character_id: "char-a".into(),
            from_name: "Alice".into(),
        }
    );
}

#[tokio::test]
async fn test_friend_request_falls_back_to_push_stream() {
    let server = start_test_server().await;
    server.seed_character("char-a", "Alice").await;
    server.seed_character("char-b", "Bob").await;

    let mut b_push = SseReader::open(&server, "char-b").await;
    b_push.skip_bootstrap().await;
    let mut a = connect(&server, "char-a").await;

    a.send(&ClientFrame::FriendRequest {
        to_character_id: "char-b".into(),
    })
    .await;

    assert!(matches!(
        a.expect_frame().await,
        ServerFrame::FriendRequestSent { .. }
    ));
    assert_eq!(
        b_push.expect_event().await,
        PushEvent::FriendRequest {
            from_character_id: "char-a".into(),
            from_name: "Alice".into(),
        }
    );
}

#[tokio::test]
async fn test_friend_request_to_self_or_unknown_dropped() {
    let server = start_test_server().await;
    server.seed_character("char-a", "Alice").await;
    let mut a = connect(&server, "char-a").await;

    a.send(&ClientFrame::FriendRequest {
        to_character_id: "char-a".into(),
    })
    .await;
    a.send(&ClientFrame::FriendRequest {
        to_character_id: "char-nobody".into(),
    })
    .await;

    a.expect_silence(QUIET).await;
}

#[tokio::test]
async fn test_presence_endpoint() {
    let server = start_test_server().await;
    seed_friends(&server).await;
    let client = reqwest::Client::new();

    let _a = connect(&server, "char-a").await;
    wait_for_online(&server, "char-a", true).await;

    let resp = client
        .get(format!("{}/api/presence/char-a", server.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["characterId"], "char-a");
    assert_eq!(body["isOnline"], true);
    assert!(body["lastSeen"].is_string());

    let resp = client
        .get(format!("{}/api/presence/char-b", server.base_url()))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["isOnline"], false);

    let resp = client
        .get(format!("{}/api/presence/char-nobody", server.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
