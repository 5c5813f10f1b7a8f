use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use relay_protocol::{close_code, ServerFrame};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::presence;
use crate::state::AppState;
use crate::ws::protocol;
use crate::ws::Connection;

/// How long the writer gets to flush a server-initiated close frame.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Why the reader loop stopped.
enum ExitReason {
    /// The peer closed the socket or the stream ended.
    Peer,
    /// The server closed the connection (superseded or liveness failure).
    Terminated,
}

/// Run the actor-per-connection pattern for one socket.
///
/// - Writer task: owns the sink, drains the bounded outbound queue
/// - Liveness task: pings on a fixed interval and terminates silent peers
/// - Reader loop: parses inbound frames and dispatches them
///
/// Registration and unregistration both cascade into the presence broadcaster.
pub async fn run_connection(socket: WebSocket, state: AppState, character_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (connection, rx) = Connection::new(&character_id, state.relay.outbound_queue_capacity);

    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    state.registry.register(connection.clone());
    connection.send(&ServerFrame::Connected {
        character_id: character_id.clone(),
    });
    presence::announce(&state, &character_id, true).await;

    tracing::info!(
        character_id = %character_id,
        connection_id = %connection.id(),
        "Socket actor started"
    );

    let liveness_handle = tokio::spawn(liveness_task(
        connection.clone(),
        state.relay.heartbeat_interval(),
    ));

    let exit = loop {
        let next = tokio::select! {
            msg = ws_receiver.next() => msg,
            _ = connection.terminated() => break ExitReason::Terminated,
        };

        match next {
            Some(Ok(msg)) => {
                connection.mark_alive();
                match msg {
                    Message::Text(text) => {
                        protocol::handle_text_message(text.as_str(), &connection, &state).await;
                    }
                    Message::Binary(_) => {
                        protocol::send_error(&connection, "Binary frames are not supported");
                    }
                    Message::Ping(data) => {
                        connection.deliver(Message::Pong(data));
                    }
                    Message::Pong(_) => {}
                    Message::Close(frame) => {
                        tracing::info!(
                            character_id = %character_id,
                            reason = ?frame,
                            "Client initiated close"
                        );
                        break ExitReason::Peer;
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!(
                    character_id = %character_id,
                    error = %e,
                    "Socket receive error"
                );
                break ExitReason::Peer;
            }
            None => {
                tracing::info!(character_id = %character_id, "Socket stream ended");
                break ExitReason::Peer;
            }
        }
    };

    liveness_handle.abort();

    // A superseded actor no longer owns the registration; only the owner
    // announces the character as offline.
    if state
        .registry
        .unregister_connection(&character_id, connection.id())
    {
        presence::announce(&state, &character_id, false).await;
    }

    match exit {
        ExitReason::Terminated => {
            if timeout(CLOSE_FLUSH_TIMEOUT, &mut writer_handle).await.is_err() {
                writer_handle.abort();
            }
        }
        ExitReason::Peer => writer_handle.abort(),
    }

    tracing::info!(
        character_id = %character_id,
        connection_id = %connection.id(),
        "Socket actor stopped"
    );
}

/// Writer task: forwards queued frames to the socket sink. Stops after
/// sending a close frame or when the sink fails.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || is_close {
            break;
        }
    }
}

/// Every tick, a connection that has not been heard from since the previous
/// tick is terminated; otherwise it is pinged.
async fn liveness_task(connection: Connection, period: Duration) {
    let mut timer = interval(period);
    // Skip the first immediate tick
    timer.tick().await;

    loop {
        timer.tick().await;

        if !connection.take_alive() {
            tracing::warn!(
                character_id = %connection.character_id(),
                last_heartbeat = %connection.last_heartbeat(),
                "Liveness check failed, terminating connection"
            );
            connection.close(close_code::GOING_AWAY, "Liveness check failed");
            break;
        }

        if connection.is_closed() {
            break;
        }
        connection.deliver(Message::Ping(vec![1, 2, 3, 4].into()));
    }
}
