//! Integration tests for the call-setup relay endpoint.

mod common;

use common::{start_test_server, SseReader};
use relay_protocol::PushEvent;
use serde_json::{json, Value};
use std::time::Duration;

async fn post_signal(base_url: &str, body: &Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/rtc/signal", base_url))
        .json(body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body = resp.json().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_missing_routing_fields_rejected() {
    let server = start_test_server().await;
    let base = server.base_url();

    for body in [
        json!({ "from": "A", "to": "B", "offer": {} }),
        json!({ "type": "offer", "to": "B", "offer": {} }),
        json!({ "type": "offer", "from": "A", "offer": {} }),
        json!({ "type": "offer", "from": "", "to": "B" }),
        json!({ "type": "renegotiate", "from": "A", "to": "B" }),
    ] {
        let (status, response) = post_signal(&base, &body).await;
        assert_eq!(status, 400, "Body should be rejected: {}", body);
        assert!(response["error"].is_string());
    }
}

#[tokio::test]
async fn test_non_json_body_rejected() {
    let server = start_test_server().await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/rtc/signal", server.base_url()))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_offline_target_still_acknowledged() {
    let server = start_test_server().await;

    let (status, response) = post_signal(
        &server.base_url(),
        &json!({ "type": "offer", "from": "A", "to": "B", "offer": { "sdp": "v=0" } }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(response, json!({ "success": true }));
}

#[tokio::test]
async fn test_envelopes_relayed_verbatim_in_order() {
    let server = start_test_server().await;
    let mut target = SseReader::open(&server, "B").await;
    target.skip_bootstrap().await;

    let offer = json!({
        "type": "offer",
        "from": "A",
        "to": "B",
        "offer": { "type": "offer", "sdp": "v=0\r\no=- 1 1 IN IP4 0.0.0.0" },
        "extra": [1, 2, 3]
    });
    let candidate = json!({
        "type": "ice_candidate",
        "from": "A",
        "to": "B",
        "candidate": { "candidate": "candidate:1 1 udp 1 10.0.0.1 5000 typ host", "sdpMid": "0" }
    });

    assert_eq!(post_signal(&server.base_url(), &offer).await.0, 200);
    assert_eq!(post_signal(&server.base_url(), &candidate).await.0, 200);

    assert_eq!(target.expect_event().await, PushEvent::RtcOffer(offer));
    assert_eq!(target.expect_event().await, PushEvent::RtcIceCandidate(candidate));
    assert!(target.next_event(Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn test_answer_goes_only_to_target() {
    let server = start_test_server().await;
    let mut caller = SseReader::open(&server, "A").await;
    caller.skip_bootstrap().await;
    let mut bystander = SseReader::open(&server, "C").await;
    bystander.skip_bootstrap().await;

    let answer = json!({ "type": "answer", "from": "B", "to": "A", "answer": { "sdp": "v=0" } });
    assert_eq!(post_signal(&server.base_url(), &answer).await.0, 200);

    assert_eq!(caller.expect_event().await, PushEvent::RtcAnswer(answer));
    assert!(bystander
        .next_event(Duration::from_millis(300))
        .await
        .is_none());
}
