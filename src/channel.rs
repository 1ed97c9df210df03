use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{ComfyError, Result};
use crate::types::{ImageRef, ProgressUpdate};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A server push that the generator cares about.
///
/// `prompt_id` is whatever ComfyUI tagged the message with, if anything.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A sampling step finished.
    Progress {
        update: ProgressUpdate,
        prompt_id: Option<String>,
    },
    /// The terminal node executed and produced at least one image; carries the first.
    Completed {
        image: ImageRef,
        prompt_id: Option<String>,
    },
}

impl ChannelEvent {
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            Self::Progress { prompt_id, .. } | Self::Completed { prompt_id, .. } => {
                prompt_id.as_deref()
            }
        }
    }

    /// Whether this event can belong to the prompt accepted as `accepted`.
    ///
    /// Only two known, different ids rule an event out.
    pub fn belongs_to(&self, accepted: Option<&str>) -> bool {
        match (self.prompt_id(), accepted) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => true,
        }
    }
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct Executed {
    node: Option<String>,
    #[serde(default)]
    output: Option<ExecutedOutput>,
}

#[derive(Deserialize)]
struct ExecutedOutput {
    #[serde(default)]
    images: Option<Vec<ImageRef>>,
}

/// Classify one text frame from ComfyUI's `/ws`.
///
/// Only `executed` for `terminal_node` with a non-empty image list, and
/// `progress`, produce an event. Everything else is `None`.
pub fn parse_event(text: &str, terminal_node: &str) -> Option<ChannelEvent> {
    let raw: RawMessage = serde_json::from_str(text).ok()?;
    let prompt_id = raw
        .data
        .get("prompt_id")
        .and_then(Value::as_str)
        .map(str::to_owned);
    match raw.kind.as_str() {
        "executed" => {
            let executed: Executed = serde_json::from_value(raw.data).ok()?;
            if executed.node.as_deref() != Some(terminal_node) {
                return None;
            }
            let image = executed.output?.images?.into_iter().next()?;
            Some(ChannelEvent::Completed { image, prompt_id })
        }
        "progress" => serde_json::from_value(raw.data)
            .ok()
            .map(|update| ChannelEvent::Progress { update, prompt_id }),
        _ => None,
    }
}

struct Connection {
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    reader: JoinHandle<()>,
}

/// At most one WebSocket to ComfyUI, reused for the life of the session.
///
/// A background task reads frames, keeps the ones [`parse_event`] accepts
/// and buffers them until [`next_event`](Self::next_event) is called. Events
/// that arrive before anyone is waiting are therefore never lost.
pub struct NotificationChannel {
    url: String,
    terminal_node: String,
    connection: Option<Connection>,
}

impl NotificationChannel {
    pub fn new(url: impl Into<String>, terminal_node: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            terminal_node: terminal_node.into(),
            connection: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the reader task is still attached to a live socket.
    pub fn is_open(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|conn| !conn.reader.is_finished())
    }

    /// Return immediately if the socket is open, otherwise open a new one.
    ///
    /// Resolves once the WebSocket handshake has completed.
    pub async fn ensure_connected(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        if let Some(stale) = self.connection.take() {
            stale.reader.abort();
        }

        debug!(url = %self.url, "opening notification channel");
        let (socket, _) =
            connect_async(self.url.as_str())
                .await
                .map_err(|e| ComfyError::Connection {
                    url: self.url.clone(),
                    source: Box::new(e),
                })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(socket, self.terminal_node.clone(), tx));
        self.connection = Some(Connection { events: rx, reader });
        Ok(())
    }

    /// Wait for the next buffered event. `None` once the socket has dropped
    /// and the buffer is drained, or if it was never opened.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        let event = self.connection.as_mut()?.events.recv().await;
        if event.is_none() {
            self.connection = None;
        }
        event
    }

    /// Drop everything buffered so far. Returns how many events were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let Some(conn) = self.connection.as_mut() else {
            return 0;
        };
        let mut dropped = 0;
        while conn.events.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

impl Drop for NotificationChannel {
    fn drop(&mut self) {
        if let Some(conn) = &self.connection {
            conn.reader.abort();
        }
    }
}

async fn read_loop(
    mut socket: Socket,
    terminal_node: String,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    while let Some(msg) = socket.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "notification channel failed");
                break;
            }
        };

        if let Some(event) = parse_event(&text, &terminal_node) {
            if events.send(event).is_err() {
                break;
            }
        }
    }
    debug!("notification channel closed");
}
