//! Bidirectional socket transport.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use relay_protocol::{close_code, ClientFrame, ServerFrame};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::client::Command;
use crate::error::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub(crate) type WsSource = SplitStream<WsStream>;

/// Perform the handshake, giving up after `deadline`.
pub(crate) async fn open(url: &str, deadline: Duration) -> Result<(WsSink, WsSource)> {
    let (ws, _) = tokio::time::timeout(deadline, connect_async(url))
        .await
        .map_err(|_| ClientError::Timeout(deadline))??;
    Ok(ws.split())
}

/// Start the reader for an opened socket. Frames and the final close are
/// reported to the driver tagged with `generation`.
pub(crate) fn spawn_reader(
    stream: WsSource,
    generation: u64,
    commands: mpsc::UnboundedSender<Command>,
) -> JoinHandle<()> {
    tokio::spawn(read_loop(stream, generation, commands))
}

async fn read_loop(
    mut stream: WsSource,
    generation: u64,
    commands: mpsc::UnboundedSender<Command>,
) {
    let mut code = None;

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match ServerFrame::parse(text.as_str()) {
                Ok(frame) => {
                    if commands.send(Command::Frame { generation, frame }).is_err() {
                        return;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Unparseable server frame"),
            },
            Ok(Message::Close(frame)) => {
                code = Some(frame.map_or(close_code::ABNORMAL, |f| u16::from(f.code)));
                tracing::debug!(code = ?code, "Server closed socket");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Socket read failed");
                break;
            }
        }
    }

    let _ = commands.send(Command::SocketClosed { generation, code });
}

pub(crate) async fn send_frame(sink: &mut WsSink, frame: &ClientFrame) -> Result<()> {
    let text = frame.to_text()?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}

/// Close with code 1000. Bounded so a dead peer cannot stall shutdown.
pub(crate) async fn close_normally(sink: &mut WsSink) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "client shutdown".into(),
    };
    let closing = async {
        sink.send(Message::Close(Some(frame))).await?;
        sink.close().await
    };
    match tokio::time::timeout(CLOSE_TIMEOUT, closing).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "Close frame not delivered"),
        Err(_) => tracing::debug!("Timed out closing socket"),
    }
}
