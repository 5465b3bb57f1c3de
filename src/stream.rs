//! History stream client.
//!
//! Opens the server's one-way event channel once per page session, after
//! the first full history fetch, and forwards incoming messages in arrival
//! order. Malformed or irrelevant events are dropped by a named policy
//! ([`parse_event_line`]) that logs and never propagates. A transport
//! error closes the channel permanently — there is no reconnect.

use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::api::ApiClient;
use crate::error::ClientError;
use crate::protocol::{Message, StreamEvent};

/// Accumulates raw SSE bytes and yields complete, trimmed lines.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        SseLineBuffer::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..=pos);
            lines.push(line);
        }
        lines
    }
}

/// The drop policy for incoming stream lines.
///
/// Only `data:` lines carrying `{type: "message"}` with a role or content
/// present become messages. Everything else — keep-alives, other event
/// types, unparsable payloads — is logged at debug level and discarded;
/// a bad event must never take the stream down.
pub fn parse_event_line(line: &str) -> Option<Message> {
    if line.is_empty() {
        return None;
    }
    let payload = line
        .strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))?;

    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(event) => {
            if event.event_type == "message" && (event.role.is_some() || event.content.is_some()) {
                Some(Message::new(
                    event.role.unwrap_or_else(|| "Unknown".to_string()),
                    event.content.unwrap_or_default(),
                ))
            } else {
                tracing::debug!(event_type = %event.event_type, "dropping non-message stream event");
                None
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed stream event");
            None
        }
    }
}

/// Consume `/api/history/stream` until the channel ends.
///
/// Messages are forwarded through `tx` in arrival order. Returns `Ok(())`
/// when the server closes the stream or every receiver is gone, and
/// `Err(ClientError::Stream)` on a transport error — both are terminal
/// for this page session.
pub async fn run(api: ApiClient, tx: mpsc::UnboundedSender<Message>) -> Result<(), ClientError> {
    let response = api
        .open_history_stream()
        .await
        .map_err(|e| ClientError::Stream(e.to_string()))?;

    tracing::info!("history stream open");
    let mut stream = response.bytes_stream();
    let mut lines = SseLineBuffer::new();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "history stream closed on transport error");
                return Err(ClientError::Stream(e.to_string()));
            }
        };
        for line in lines.push(&chunk) {
            if let Some(message) = parse_event_line(&line) {
                if tx.send(message).is_err() {
                    // Every consumer is gone; nothing left to feed.
                    return Ok(());
                }
            }
        }
    }

    tracing::info!("history stream ended");
    Ok(())
}
