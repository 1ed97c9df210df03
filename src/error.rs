use thiserror::Error;

/// Errors returned by generation attempts against ComfyUI.
///
/// Every variant is scoped to a single attempt; the [`Generator`](crate::Generator)
/// stays usable after any of them.
#[derive(Error, Debug)]
pub enum ComfyError {
    /// The prompt was empty or whitespace-only. No request was sent.
    #[error("{0}")]
    Validation(String),

    /// The WebSocket handshake with ComfyUI failed.
    #[error("Cannot connect to ComfyUI WebSocket at {url}: {source}")]
    Connection {
        url: String,
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    /// The WebSocket dropped while waiting for the image.
    #[error("Notification channel closed before the image was ready")]
    ChannelClosed,

    /// ComfyUI returned a non-success HTTP status.
    #[error("ComfyUI returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// ComfyUI accepted the request but its body carried an `error` field.
    #[error("{0}")]
    ServerReported(String),

    /// The queued workflow had node-level errors.
    #[error("Workflow node errors: {0}")]
    NodeErrors(String),

    /// The response from ComfyUI was missing expected fields.
    #[error("{0}")]
    InvalidResponse(String),

    /// The configured server URL cannot be used.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing a downloaded image failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ComfyError>;
