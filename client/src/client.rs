//! Client transport orchestrator.
//!
//! [`RelayClient`] is a thin handle over a background driver task. The driver
//! owns both transports, every timer and the joined-channel set; the handle
//! talks to it over an unbounded command channel, and timers and transport
//! readers feed the same channel. All listener callbacks run on the driver.

use relay_protocol::{ClientFrame, PushEvent, ServerFrame, SignalEnvelope, SignalKind};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::listeners::{ChannelUpdate, ClientEvent, EventKind, ListenerId, Listeners};
use crate::pending::{PendingSend, PendingSends, SeenMessages};
use crate::push;
use crate::reconnect::Reconnector;
use crate::socket::{self, WsSink, WsSource};
use crate::task::ScheduledTask;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle of the socket transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Errored,
}

pub(crate) enum Command {
    Connect(Option<oneshot::Sender<Result<()>>>),
    SocketOpened {
        generation: u64,
        result: Result<(WsSink, WsSource)>,
    },
    ConnectPush,
    Send(ClientFrame),
    Membership { channel_id: String, join: bool },
    Heartbeat,
    Frame { generation: u64, frame: ServerFrame },
    SocketClosed { generation: u64, code: Option<u16> },
    Push { generation: u64, event: PushEvent },
    PushClosed { generation: u64 },
    TypingExpired { key: TypingKey, seq: u64 },
    Shutdown(oneshot::Sender<()>),
}

/// (character id, channel id)
pub(crate) type TypingKey = (String, String);

struct Shared {
    status: Mutex<ConnectionState>,
    listeners: Listeners,
    pending: Mutex<PendingSends>,
}

impl Shared {
    fn status(&self) -> ConnectionState {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, next: ConnectionState) {
        let changed = {
            let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = *status != next;
            *status = next;
            changed
        };
        if changed {
            tracing::debug!(status = ?next, "Connection status changed");
            self.listeners.emit(&ClientEvent::ConnectionStatus(next));
        }
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, PendingSends> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a relay connection.
///
/// Must be created inside a tokio runtime. Dropping the handle stops the
/// driver without a close handshake; call [`RelayClient::shutdown`] for a
/// normal close.
pub struct RelayClient {
    config: Arc<ClientConfig>,
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    http: reqwest::Client,
    task: Option<JoinHandle<()>>,
}

impl RelayClient {
    pub fn new(config: ClientConfig) -> Self {
        let config = Arc::new(config);
        let (commands, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            status: Mutex::new(ConnectionState::Disconnected),
            listeners: Listeners::new(),
            pending: Mutex::new(PendingSends::new()),
        });
        let http = reqwest::Client::new();

        let driver = Driver {
            reconnect: Reconnector::new(config.reconnect_delay),
            push_reconnect: Reconnector::new(config.reconnect_delay),
            seen: SeenMessages::new(config.seen_capacity),
            config: config.clone(),
            shared: shared.clone(),
            http: http.clone(),
            commands: commands.clone(),
            socket: None,
            socket_reader: None,
            opening: None,
            connect_waiters: Vec::new(),
            socket_generation: 0,
            push_reader: None,
            push_generation: 0,
            heartbeat: ScheduledTask::idle(),
            typing: HashMap::new(),
            typing_seq: 0,
            joined: BTreeSet::new(),
        };
        let task = tokio::spawn(driver.run(rx));

        Self {
            config,
            commands,
            shared,
            http,
            task: Some(task),
        }
    }

    pub fn character_id(&self) -> &str {
        &self.config.character_id
    }

    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.subscribe(kind, listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.listeners.unsubscribe(id)
    }

    pub fn status(&self) -> ConnectionState {
        self.shared.status()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionState::Connected
    }

    /// Open the socket (and the push stream, if enabled). A failed attempt,
    /// including a handshake that outlasts `connect_timeout`, is reported
    /// here and retried in the background. The push stream does not wait
    /// for the socket.
    pub async fn connect(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.config.push_stream {
            self.command(Command::ConnectPush)?;
        }
        self.command(Command::Connect(Some(tx)))?;
        rx.await.map_err(|_| ClientError::ShutDown)?
    }

    /// Join a channel. The join is remembered and replayed after reconnects.
    pub fn join_channel(&self, channel_id: &str) -> Result<()> {
        self.ensure_connected()?;
        self.command(Command::Membership {
            channel_id: channel_id.to_string(),
            join: true,
        })
    }

    pub fn leave_channel(&self, channel_id: &str) -> Result<()> {
        self.ensure_connected()?;
        self.command(Command::Membership {
            channel_id: channel_id.to_string(),
            join: false,
        })
    }

    /// Send a chat message. Returns the idempotency token; the send stays in
    /// [`RelayClient::pending_sends`] until the server echoes it back, or is
    /// reported as [`ClientEvent::SendFailed`] if the socket closes first.
    pub fn send_message(&self, channel_id: &str, content: &str) -> Result<String> {
        self.ensure_connected()?;
        let client_token = self.shared.pending().track(channel_id, content);

        let frame = ClientFrame::Message {
            channel_id: channel_id.to_string(),
            content: content.to_string(),
            client_token: Some(client_token.clone()),
        };
        if let Err(e) = self.command(Command::Send(frame)) {
            self.shared.pending().forget(&client_token);
            return Err(e);
        }
        Ok(client_token)
    }

    pub fn send_typing(&self, channel_id: &str) -> Result<()> {
        self.ensure_connected()?;
        self.command(Command::Send(ClientFrame::Typing {
            channel_id: channel_id.to_string(),
        }))
    }

    pub fn send_friend_request(&self, to_character_id: &str) -> Result<()> {
        self.ensure_connected()?;
        self.command(Command::Send(ClientFrame::FriendRequest {
            to_character_id: to_character_id.to_string(),
        }))
    }

    pub fn pending_sends(&self) -> Vec<PendingSend> {
        self.shared.pending().snapshot()
    }

    /// Submit a call-setup envelope to the relay. Succeeds whether or not the
    /// target is reachable.
    pub async fn send_signal(&self, kind: SignalKind, to: &str, payload: Value) -> Result<()> {
        let envelope = SignalEnvelope::new(kind, &self.config.character_id, to, payload);
        let response = self
            .http
            .post(self.config.api_url("/api/rtc/signal"))
            .json(envelope.body())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }

    /// Change this character's display name.
    pub async fn rename(&self, name: &str) -> Result<()> {
        let path = format!("/api/characters/{}/name", self.config.character_id);
        let response = self
            .http
            .put(self.config.api_url(&path))
            .json(&json!({ "name": name }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }

    /// Cancel every timer and close both transports (socket with code 1000).
    pub async fn shutdown(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        tracing::debug!(character_id = %self.config.character_id, "Client shutdown requested");

        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, rx).await;
        }
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await.is_err() {
            tracing::warn!("Client driver did not stop in time, aborting");
            task.abort();
        }
        self.shared.set_status(ConnectionState::Disconnected);
    }

    fn command(&self, command: Command) -> Result<()> {
        if self.task.is_none() {
            return Err(ClientError::ShutDown);
        }
        self.commands
            .send(command)
            .map_err(|_| ClientError::ShutDown)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.task.is_none() || !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        Ok(())
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("character_id", &self.config.character_id)
            .field("status", &self.status())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// --- Driver ---

struct Driver {
    config: Arc<ClientConfig>,
    shared: Arc<Shared>,
    http: reqwest::Client,
    commands: mpsc::UnboundedSender<Command>,

    socket: Option<WsSink>,
    socket_reader: Option<JoinHandle<()>>,
    /// In-flight handshake; its outcome arrives as `Command::SocketOpened`.
    opening: Option<JoinHandle<()>>,
    connect_waiters: Vec<oneshot::Sender<Result<()>>>,
    /// Bumped whenever a socket is opened or abandoned; reports from older
    /// readers are ignored.
    socket_generation: u64,
    push_reader: Option<JoinHandle<()>>,
    push_generation: u64,

    heartbeat: ScheduledTask,
    reconnect: Reconnector,
    push_reconnect: Reconnector,
    typing: HashMap<TypingKey, (u64, ScheduledTask)>,
    typing_seq: u64,

    joined: BTreeSet<String>,
    seen: SeenMessages,
}

impl Driver {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Connect(reply) => self.connect_socket(reply),
                Command::SocketOpened { generation, result } => {
                    if generation == self.socket_generation && self.opening.is_some() {
                        self.opening = None;
                        self.on_socket_opened(result).await;
                    }
                }
                Command::ConnectPush => self.connect_push(),
                Command::Send(frame) => self.write(frame).await,
                Command::Membership { channel_id, join } => {
                    let frame = if join {
                        self.joined.insert(channel_id.clone());
                        ClientFrame::JoinChannel { channel_id }
                    } else {
                        self.joined.remove(&channel_id);
                        ClientFrame::LeaveChannel { channel_id }
                    };
                    self.write(frame).await;
                }
                Command::Heartbeat => self.write(ClientFrame::Heartbeat).await,
                Command::Frame { generation, frame } => {
                    if generation == self.socket_generation {
                        self.on_frame(frame);
                    }
                }
                Command::SocketClosed { generation, code } => {
                    if generation == self.socket_generation && self.socket.is_some() {
                        self.socket_reader = None;
                        self.on_socket_closed(code);
                    }
                }
                Command::Push { generation, event } => {
                    if generation == self.push_generation {
                        self.on_push_event(event);
                    }
                }
                Command::PushClosed { generation } => {
                    if generation == self.push_generation {
                        self.on_push_closed();
                    }
                }
                Command::TypingExpired { key, seq } => self.on_typing_expired(key, seq),
                Command::Shutdown(ack) => {
                    self.shutdown().await;
                    let _ = ack.send(());
                    break;
                }
            }
        }
        tracing::debug!("Client driver stopped");
    }

    fn emit(&self, event: ClientEvent) {
        self.shared.listeners.emit(&event);
    }

    // --- Socket lifecycle ---

    fn connect_socket(&mut self, reply: Option<oneshot::Sender<Result<()>>>) {
        if self.socket.is_some() {
            if let Some(reply) = reply {
                let _ = reply.send(Ok(()));
            }
            return;
        }
        self.connect_waiters.extend(reply);
        if self.opening.is_some() {
            return;
        }
        self.reconnect.cancel();
        self.shared.set_status(ConnectionState::Connecting);

        // Handshake runs off the driver loop
        self.socket_generation += 1;
        let generation = self.socket_generation;
        let url = self.config.ws_url();
        let deadline = self.config.connect_timeout;
        let commands = self.commands.clone();
        self.opening = Some(tokio::spawn(async move {
            let result = socket::open(&url, deadline).await;
            let _ = commands.send(Command::SocketOpened { generation, result });
        }));
    }

    async fn on_socket_opened(&mut self, result: Result<(WsSink, WsSource)>) {
        let outcome = match result {
            Ok((sink, stream)) => {
                self.socket = Some(sink);
                self.socket_reader = Some(socket::spawn_reader(
                    stream,
                    self.socket_generation,
                    self.commands.clone(),
                ));

                let commands = self.commands.clone();
                self.heartbeat.replace(ScheduledTask::every(
                    self.config.heartbeat_interval,
                    move || {
                        let _ = commands.send(Command::Heartbeat);
                    },
                ));
                self.shared.set_status(ConnectionState::Connected);
                tracing::info!(character_id = %self.config.character_id, "Socket connected");

                // Membership is per connection on the server side
                let joins: Vec<String> = self.joined.iter().cloned().collect();
                for channel_id in joins {
                    self.write(ClientFrame::JoinChannel { channel_id }).await;
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Socket connect failed");
                self.shared.set_status(ConnectionState::Errored);
                self.emit(ClientEvent::Error(e.to_string()));
                self.shared.set_status(ConnectionState::Disconnected);
                let commands = self.commands.clone();
                self.reconnect.schedule(async move {
                    let _ = commands.send(Command::Connect(None));
                });
                Err(e)
            }
        };

        let mut waiters = std::mem::take(&mut self.connect_waiters).into_iter();
        match outcome {
            Ok(()) => waiters.for_each(|w| {
                let _ = w.send(Ok(()));
            }),
            Err(e) => {
                let message = e.to_string();
                // The first caller gets the original error
                if let Some(first) = waiters.next() {
                    let _ = first.send(Err(e));
                }
                for w in waiters {
                    let _ = w.send(Err(ClientError::ConnectFailed(message.clone())));
                }
            }
        }
    }

    fn on_socket_closed(&mut self, code: Option<u16>) {
        self.socket = None;
        self.heartbeat.cancel();
        self.fail_pending_sends();

        let commands = self.commands.clone();
        let retry = self.reconnect.on_close(code, async move {
            let _ = commands.send(Command::Connect(None));
        });
        if retry {
            tracing::warn!(code = ?code, "Socket closed, reconnect scheduled");
            self.shared.set_status(ConnectionState::Errored);
        } else {
            tracing::info!("Socket closed normally");
        }
        self.shared.set_status(ConnectionState::Disconnected);
    }

    /// Sends still waiting for their echo will never get one.
    fn fail_pending_sends(&self) {
        let failed = self.shared.pending().drain();
        for send in failed {
            tracing::debug!(client_token = %send.client_token, "Pending send failed");
            self.emit(ClientEvent::SendFailed(send));
        }
    }

    async fn write(&mut self, frame: ClientFrame) {
        let Some(sink) = self.socket.as_mut() else {
            tracing::debug!("Socket not open, frame dropped");
            if let ClientFrame::Message {
                client_token: Some(token),
                ..
            } = &frame
            {
                let failed = self.shared.pending().forget(token);
                if let Some(send) = failed {
                    self.emit(ClientEvent::SendFailed(send));
                }
            }
            return;
        };
        if let Err(e) = socket::send_frame(sink, &frame).await {
            tracing::warn!(error = %e, "Socket write failed");
            if let Some(reader) = self.socket_reader.take() {
                reader.abort();
            }
            self.socket_generation += 1;
            self.on_socket_closed(None);
        }
    }

    fn on_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Connected { character_id } => {
                tracing::debug!(character_id = %character_id, "Server acknowledged socket");
            }
            ServerFrame::Message(message) => self.on_message(message),
            ServerFrame::ChannelJoined { channel_id } => {
                self.emit(ClientEvent::ChannelUpdate(ChannelUpdate::Joined { channel_id }))
            }
            ServerFrame::ChannelLeft { channel_id } => {
                self.emit(ClientEvent::ChannelUpdate(ChannelUpdate::Left { channel_id }))
            }
            ServerFrame::CharacterJoined {
                channel_id,
                character_id,
            } => self.emit(ClientEvent::ChannelUpdate(ChannelUpdate::MemberJoined {
                channel_id,
                character_id,
            })),
            ServerFrame::CharacterLeft {
                channel_id,
                character_id,
            } => self.emit(ClientEvent::ChannelUpdate(ChannelUpdate::MemberLeft {
                channel_id,
                character_id,
            })),
            ServerFrame::FriendRequest {
                from_character_id,
                from_name,
            } => self.emit(ClientEvent::FriendRequest {
                from_character_id,
                from_name,
            }),
            ServerFrame::FriendRequestSent { to_character_id } => {
                self.emit(ClientEvent::FriendRequestSent { to_character_id })
            }
            ServerFrame::CharacterStatus {
                character_id,
                is_online,
            } => self.emit(ClientEvent::Presence {
                character_id,
                is_online,
            }),
            ServerFrame::Typing {
                character_id,
                channel_id,
                ..
            } => self.on_typing(character_id, channel_id),
            ServerFrame::Error { message } => {
                tracing::warn!(message = %message, "Server reported an error");
                self.emit(ClientEvent::Error(message));
            }
        }
    }

    fn on_message(&mut self, message: relay_protocol::ChatMessage) {
        if let Some(resolved) = self.shared.pending().resolve(&message) {
            tracing::debug!(client_token = %resolved.client_token, "Pending send confirmed");
        }
        if self.seen.insert(&message.id) {
            self.emit(ClientEvent::Message(message));
        }
    }

    // --- Typing indicators ---

    fn on_typing(&mut self, character_id: String, channel_id: String) {
        self.typing_seq += 1;
        let seq = self.typing_seq;
        let key = (character_id.clone(), channel_id.clone());

        let commands = self.commands.clone();
        let expiry_key = key.clone();
        let expiry = ScheduledTask::once(self.config.typing_timeout, async move {
            let _ = commands.send(Command::TypingExpired {
                key: expiry_key,
                seq,
            });
        });
        // Replacing the entry drops, and so cancels, the previous expiry
        self.typing.insert(key, (seq, expiry));

        self.emit(ClientEvent::Typing {
            character_id,
            channel_id,
            is_typing: true,
        });
    }

    fn on_typing_expired(&mut self, key: TypingKey, seq: u64) {
        // A newer indicator for the same key has its own expiry
        if self.typing.get(&key).map(|(s, _)| *s) != Some(seq) {
            return;
        }
        self.typing.remove(&key);
        let (character_id, channel_id) = key;
        self.emit(ClientEvent::Typing {
            character_id,
            channel_id,
            is_typing: false,
        });
    }

    // --- Push stream lifecycle ---

    fn connect_push(&mut self) {
        if self.push_reader.as_ref().is_some_and(|r| !r.is_finished()) {
            return;
        }
        self.push_reconnect.cancel();
        self.push_generation += 1;
        self.push_reader = Some(tokio::spawn(push::run(
            self.http.clone(),
            self.config.events_url(),
            self.push_generation,
            self.commands.clone(),
        )));
    }

    fn on_push_closed(&mut self) {
        self.push_reader = None;
        let commands = self.commands.clone();
        self.push_reconnect.schedule(async move {
            let _ = commands.send(Command::ConnectPush);
        });
        tracing::warn!("Push stream closed, reconnect scheduled");
    }

    fn on_push_event(&mut self, event: PushEvent) {
        match event {
            PushEvent::Connected { character_id } => {
                tracing::debug!(character_id = %character_id, "Push stream acknowledged");
            }
            PushEvent::InitialChannels { channels } => {
                self.emit(ClientEvent::ChannelUpdate(ChannelUpdate::Channels(channels)))
            }
            PushEvent::InitialMessages {
                channel_id,
                messages,
            } => {
                for message in &messages {
                    self.seen.insert(&message.id);
                }
                self.emit(ClientEvent::ChannelUpdate(ChannelUpdate::History {
                    channel_id,
                    messages,
                }));
            }
            PushEvent::Message(message) => self.on_message(message),
            PushEvent::NameUpdate { character_id, name } => {
                self.emit(ClientEvent::NameUpdate { character_id, name })
            }
            PushEvent::FriendRequest {
                from_character_id,
                from_name,
            } => self.emit(ClientEvent::FriendRequest {
                from_character_id,
                from_name,
            }),
            PushEvent::CharacterStatus {
                character_id,
                is_online,
            } => self.emit(ClientEvent::Presence {
                character_id,
                is_online,
            }),
            PushEvent::Typing {
                character_id,
                channel_id,
                ..
            } => self.on_typing(character_id, channel_id),
            PushEvent::RtcOffer(body)
            | PushEvent::RtcAnswer(body)
            | PushEvent::RtcIceCandidate(body) => match SignalEnvelope::from_body(body) {
                Ok(envelope) => self.emit(ClientEvent::Signal(envelope)),
                Err(e) => tracing::warn!(error = %e, "Malformed signaling envelope"),
            },
        }
    }

    // --- Shutdown ---

    async fn shutdown(&mut self) {
        self.shared.set_status(ConnectionState::Closing);

        self.heartbeat.cancel();
        self.reconnect.cancel();
        self.push_reconnect.cancel();
        self.typing.clear();
        // Dropping the waiters makes their `connect` calls return ShutDown
        self.connect_waiters.clear();

        if let Some(mut sink) = self.socket.take() {
            socket::close_normally(&mut sink).await;
        }
        self.abort_readers();
        self.socket_generation += 1;
        self.push_generation += 1;
        self.fail_pending_sends();

        self.shared.set_status(ConnectionState::Disconnected);
        tracing::info!(character_id = %self.config.character_id, "Client shut down");
    }

    fn abort_readers(&mut self) {
        if let Some(opening) = self.opening.take() {
            opening.abort();
        }
        if let Some(reader) = self.socket_reader.take() {
            reader.abort();
        }
        if let Some(reader) = self.push_reader.take() {
            reader.abort();
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.abort_readers();
    }
}
