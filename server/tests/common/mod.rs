//! Shared helpers for the relay integration tests.
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use relay_protocol::{ClientFrame, PushEvent, ServerFrame};
use relay_server::channels::seed;
use relay_server::config::RelayConfig;
use relay_server::db::{self, Store};
use relay_server::state::AppState;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    _data_dir: tempfile::TempDir,
}

impl TestServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self, character_id: &str) -> String {
        format!("ws://{}/ws?characterId={}", self.addr, character_id)
    }

    pub fn store(&self) -> &Store {
        &self.state.store
    }

    pub async fn world_channel_id(&self) -> String {
        self.state
            .store
            .world_channel()
            .await
            .expect("Failed to read channels")
            .expect("World channel not seeded")
            .id
    }

    pub async fn seed_character(&self, id: &str, name: &str) {
        self.state
            .store
            .insert_character(id, name)
            .await
            .expect("Failed to seed character");
    }
}

/// Start the server on a random port with default relay settings.
pub async fn start_test_server() -> TestServer {
    start_test_server_with(RelayConfig::default()).await
}

/// Start the server on a random port.
pub async fn start_test_server_with(relay: RelayConfig) -> TestServer {
    let data_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = db::init_db(data_dir.path().to_str().unwrap()).expect("Failed to init DB");
    let store = Store::new(db);
    seed::seed_world_channel(&store)
        .await
        .expect("Failed to seed world channel");
    let state = AppState::new(store, relay);

    let app = relay_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        addr,
        state,
        _data_dir: data_dir,
    }
}

/// A test-side socket speaking the JSON frame protocol.
pub struct TestSocket {
    pub ws: WsStream,
}

impl TestSocket {
    pub async fn send(&mut self, frame: &ClientFrame) {
        let text = frame.to_text().expect("Failed to encode frame");
        self.ws
            .send(Message::Text(text.into()))
            .await
            .expect("Failed to send frame");
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .expect("Failed to send raw text");
    }

    /// Next server frame within the timeout, skipping control frames.
    pub async fn next_frame(&mut self, wait: Duration) -> Option<ServerFrame> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let msg = tokio::time::timeout_at(deadline, self.ws.next()).await.ok()??;
            match msg {
                Ok(Message::Text(text)) => {
                    return Some(ServerFrame::parse(text.as_str()).expect("Invalid server frame"));
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                _ => return None,
            }
        }
    }

    pub async fn expect_frame(&mut self) -> ServerFrame {
        self.next_frame(Duration::from_secs(2))
            .await
            .expect("Expected a frame within timeout")
    }

    /// Assert nothing arrives for a short while.
    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Some(frame) = self.next_frame(wait).await {
            panic!("Expected no frame, got {:?}", frame);
        }
    }

    /// Collect every frame that arrives within the window.
    pub async fn drain(&mut self, wait: Duration) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame(wait).await {
            frames.push(frame);
        }
        frames
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Connect a character and consume the `connected` frame.
pub async fn connect(server: &TestServer, character_id: &str) -> TestSocket {
    let (ws, _) = tokio_tungstenite::connect_async(server.ws_url(character_id))
        .await
        .expect("Failed to connect to socket");
    let mut socket = TestSocket { ws };

    match socket.expect_frame().await {
        ServerFrame::Connected { character_id: id } => assert_eq!(id, character_id),
        other => panic!("Expected connected frame, got {:?}", other),
    }
    socket
}

/// Wait until the registry reports the expected online state.
pub async fn wait_for_online(server: &TestServer, character_id: &str, online: bool) {
    for _ in 0..100 {
        if server.state.registry.is_online(character_id) == online {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} never became online={}", character_id, online);
}

/// One parsed SSE block.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Event(PushEvent),
    Comment(String),
}

/// Minimal reader for the push stream.
pub struct SseReader {
    response: reqwest::Response,
    buffer: String,
}

impl SseReader {
    pub async fn open(server: &TestServer, character_id: &str) -> Self {
        let response = reqwest::get(format!(
            "{}/events?characterId={}",
            server.base_url(),
            character_id
        ))
        .await
        .expect("Failed to open push stream");
        assert_eq!(response.status(), 200);
        Self {
            response,
            buffer: String::new(),
        }
    }

    pub async fn next_frame(&mut self, wait: Duration) -> Option<SseFrame> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                if let Some(frame) = parse_block(&block) {
                    return Some(frame);
                }
                continue;
            }
            let chunk = tokio::time::timeout_at(deadline, self.response.chunk())
                .await
                .ok()?
                .ok()??;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    /// Next event, skipping keep-alive comments.
    pub async fn next_event(&mut self, wait: Duration) -> Option<PushEvent> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.next_frame(remaining).await? {
                SseFrame::Event(event) => return Some(event),
                SseFrame::Comment(_) => continue,
            }
        }
    }

    pub async fn expect_event(&mut self) -> PushEvent {
        self.next_event(Duration::from_secs(2))
            .await
            .expect("Expected a push event within timeout")
    }

    /// Consume `connected`, `initial_channels` and `initial_messages`. The
    /// test server always seeds a world channel.
    pub async fn skip_bootstrap(&mut self) {
        assert!(matches!(self.expect_event().await, PushEvent::Connected { .. }));
        assert!(matches!(self.expect_event().await, PushEvent::InitialChannels { .. }));
        assert!(matches!(self.expect_event().await, PushEvent::InitialMessages { .. }));
    }
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data = Vec::new();
    let mut comment = None;

    for line in block.lines() {
        if let Some(rest) = line.strip_prefix(':') {
            comment = Some(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
    }

    match event {
        Some(name) => Some(SseFrame::Event(
            PushEvent::from_parts(&name, &data.join("\n")).expect("Invalid push event"),
        )),
        None => comment.map(SseFrame::Comment),
    }
}
