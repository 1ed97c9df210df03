use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ComfyError, Result};
use crate::session::ClientSession;
use crate::types::ImageRef;
use crate::workflow::WorkflowDocument;

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// HTTP side of a ComfyUI server: job submission, image URLs, and discovery.
///
/// Every request carries the same [`ClientSession`], which is also what the
/// WebSocket URL from [`ws_url`](Self::ws_url) is keyed on.
///
/// # Example
/// ```no_run
/// use comfy_prompt::ComfyClient;
///
/// # async fn example() -> comfy_prompt::Result<()> {
/// let client = ComfyClient::new("http://127.0.0.1:8188");
/// let healthy = client.health().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ComfyClient {
    http: Client,
    endpoint: String,
    session: ClientSession,
    request_timeout: Option<Duration>,
}

impl ComfyClient {
    /// Create a new client with a freshly generated session.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: normalize(endpoint.into()),
            session: ClientSession::generate(),
            request_timeout: None,
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn with_session(mut self, session: ClientSession) -> Self {
        self.session = session;
        self
    }

    /// Bound every HTTP request. Unset by default.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Returns the configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    fn timed(&self, request: RequestBuilder) -> RequestBuilder {
        match self.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    fn unreachable(&self) -> String {
        format!(
            "Cannot connect to ComfyUI at {}, is the service running?",
            self.endpoint
        )
    }

    /// `ws://` / `wss://` URL of the notification channel for this session.
    pub fn ws_url(&self) -> Result<String> {
        let base = if let Some(rest) = self.endpoint.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.endpoint.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            return Err(ComfyError::Config(format!(
                "server URL must start with http:// or https://, got '{}'",
                self.endpoint
            )));
        };
        let url = reqwest::Url::parse_with_params(
            &format!("{}/ws", base),
            &[("clientId", self.session.as_str())],
        )
        .map_err(|e| ComfyError::Config(format!("Bad server URL '{}': {}", self.endpoint, e)))?;
        Ok(url.into())
    }

    // ── Health ──────────────────────────────────────────────────────

    /// Check whether ComfyUI is reachable via `/system_stats`.
    pub async fn health(&self) -> Result<bool> {
        let url = format!("{}/system_stats", self.endpoint);
        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| ComfyError::Network {
                context: self.unreachable(),
                source: e,
            })?;
        Ok(resp.status().is_success())
    }

    // ── Prompt ──────────────────────────────────────────────────────

    /// Queue a workflow for execution under this client's session.
    ///
    /// Returns the server's `prompt_id` when it sends one.
    pub async fn queue_prompt(&self, workflow: &WorkflowDocument) -> Result<Option<String>> {
        let url = format!("{}/prompt", self.endpoint);
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": self.session.as_str(),
        });

        debug!(%url, nodes = workflow.len(), "submitting workflow");
        let resp = self
            .timed(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ComfyError::Network {
                context: self.unreachable(),
                source: e,
            })?;

        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|e| ComfyError::Network {
            context: "Failed to read ComfyUI /prompt response".into(),
            source: e,
        })?;

        let prompt_id = interpret_submission(status, &text)?;
        info!(prompt_id = prompt_id.as_deref().unwrap_or("-"), "prompt accepted");
        Ok(prompt_id)
    }

    // ── Images ──────────────────────────────────────────────────────

    /// The `/view` URL for an output image.
    pub fn image_url(&self, img: &ImageRef) -> Result<String> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/view", self.endpoint),
            &[
                ("filename", img.filename.as_str()),
                ("subfolder", img.subfolder.as_str()),
                ("type", img.img_type.as_str()),
            ],
        )
        .map_err(|e| ComfyError::InvalidResponse(format!("Bad image URL: {}", e)))?;
        Ok(url.into())
    }

    /// Download an output image by its reference. Returns raw bytes.
    pub async fn image(&self, img: &ImageRef) -> Result<Vec<u8>> {
        let url = self.image_url(img)?;

        let resp = self
            .timed(self.http.get(&url))
            .send()
            .await
            .map_err(|e| ComfyError::Network {
                context: format!("Failed to fetch image {} from ComfyUI", img.filename),
                source: e,
            })?;

        if !resp.status().is_success() {
            return Err(ComfyError::Http {
                status: resp.status().as_u16(),
                body: format!("Failed to fetch image {}", img.filename),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| ComfyError::Network {
            context: "Failed to read image bytes".into(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }

    // ── Model discovery ─────────────────────────────────────────────

    /// List available checkpoint models from ComfyUI.
    pub async fn checkpoints(&self) -> Result<Vec<String>> {
        self.object_info_list(
            "CheckpointLoaderSimple",
            "/CheckpointLoaderSimple/input/required/ckpt_name/0",
        )
        .await
    }

    /// List available LoRA files from ComfyUI.
    pub async fn loras(&self) -> Result<Vec<String>> {
        self.object_info_list("LoraLoader", "/LoraLoader/input/required/lora_name/0")
            .await
    }

    /// List available sampler algorithms from ComfyUI.
    pub async fn samplers(&self) -> Result<Vec<String>> {
        self.object_info_list("KSampler", "/KSampler/input/required/sampler_name/0")
            .await
    }

    /// List available scheduler algorithms from ComfyUI.
    pub async fn schedulers(&self) -> Result<Vec<String>> {
        self.object_info_list("KSampler", "/KSampler/input/required/scheduler/0")
            .await
    }

    async fn object_info_list(&self, node: &str, pointer: &str) -> Result<Vec<String>> {
        let url = format!("{}/object_info/{}", self.endpoint, node);
        let resp = self
            .timed(self.http.get(&url))
            .send()
            .await
            .map_err(|e| ComfyError::Network {
                context: self.unreachable(),
                source: e,
            })?;

        if !resp.status().is_success() {
            return Ok(Vec::new());
        }

        let json: Value = resp.json().await.map_err(|e| ComfyError::Network {
            context: format!("Failed to parse {} object_info", node),
            source: e,
        })?;

        Ok(string_list(&json, pointer))
    }
}

fn string_list(json: &Value, pointer: &str) -> Vec<String> {
    json.pointer(pointer)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Decide whether a `/prompt` response means the job was accepted.
///
/// Non-2xx is an HTTP error carrying the body text. A 2xx body must be JSON;
/// a non-null `error` or a non-empty `node_errors` map is a failure.
pub(crate) fn interpret_submission(status: u16, body: &str) -> Result<Option<String>> {
    if !(200..300).contains(&status) {
        return Err(ComfyError::Http {
            status,
            body: body.to_string(),
        });
    }

    let json: Value = serde_json::from_str(body).map_err(|e| {
        ComfyError::InvalidResponse(format!("Failed to parse ComfyUI /prompt response: {}", e))
    })?;

    match json.get("error") {
        None | Some(Value::Null) => {}
        Some(Value::String(message)) => return Err(ComfyError::ServerReported(message.clone())),
        Some(other) => return Err(ComfyError::ServerReported(other.to_string())),
    }

    if let Some(errors) = json.get("node_errors").and_then(|e| e.as_object()) {
        if !errors.is_empty() {
            return Err(ComfyError::NodeErrors(
                serde_json::to_string_pretty(errors).unwrap_or_default(),
            ));
        }
    }

    Ok(json
        .get("prompt_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string()))
}
