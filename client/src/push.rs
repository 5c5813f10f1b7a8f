//! Server-push stream transport.

use futures_util::StreamExt;
use relay_protocol::PushEvent;
use tokio::sync::mpsc;

use crate::client::Command;
use crate::error::{ClientError, Result};
use crate::sse::{SseFrame, SseParser};

/// Read the push stream until it ends, then report the close.
pub(crate) async fn run(
    http: reqwest::Client,
    url: String,
    generation: u64,
    commands: mpsc::UnboundedSender<Command>,
) {
    match stream_events(&http, &url, generation, &commands).await {
        Ok(()) => tracing::debug!("Push stream ended"),
        Err(e) => tracing::warn!(error = %e, "Push stream failed"),
    }
    let _ = commands.send(Command::PushClosed { generation });
}

async fn stream_events(
    http: &reqwest::Client,
    url: &str,
    generation: u64,
    commands: &mpsc::UnboundedSender<Command>,
) -> Result<()> {
    let response = http.get(url).send().await?;
    if !response.status().is_success() {
        return Err(ClientError::Rejected(response.status().as_u16()));
    }

    let mut body = response.bytes_stream();
    let mut parser = SseParser::new();
    // Bytes of a UTF-8 sequence split across chunks
    let mut carry: Vec<u8> = Vec::new();

    while let Some(chunk) = body.next().await {
        carry.extend_from_slice(&chunk?);
        let valid = match std::str::from_utf8(&carry) {
            Ok(text) => text.len(),
            Err(e) => e.valid_up_to(),
        };
        let text = String::from_utf8_lossy(&carry[..valid]).into_owned();
        carry.drain(..valid);

        for frame in parser.feed(&text) {
            match frame {
                SseFrame::Event { name, data } => match PushEvent::from_parts(&name, &data) {
                    Ok(event) => {
                        if commands.send(Command::Push { generation, event }).is_err() {
                            return Ok(());
                        }
                    }
                    Err(e) => tracing::warn!(event = %name, error = %e, "Unparseable push event"),
                },
                SseFrame::Comment(_) => tracing::trace!("Push keep-alive"),
            }
        }
    }
    Ok(())
}
