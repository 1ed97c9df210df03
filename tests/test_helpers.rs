use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::broadcast;

/// Pushing this makes the fake server close the WebSocket.
pub const CLOSE: &str = "__close__";

/// Replaced in pushes by the id of the submission that triggered them.
const CURRENT_PROMPT: &str = "{current_prompt}";

/// How the fake server answers `POST /prompt`.
#[derive(Debug, Clone)]
pub enum Reply {
    Accept,
    Status(u16, String),
    Body(Value),
}

struct Script {
    reply: Reply,
    pushes: Vec<String>,
}

#[derive(Clone)]
struct FakeState {
    script: Arc<Mutex<Script>>,
    push_tx: broadcast::Sender<String>,
    prompts: Arc<Mutex<Vec<Value>>>,
    ws_clients: Arc<Mutex<Vec<String>>>,
}

/// A stand-in for ComfyUI on a random local port.
///
/// Each `POST /prompt` pushes the scripted WebSocket messages to every
/// connected socket *before* the HTTP reply is sent. Submissions get ids
/// `prompt-1`, `prompt-2`, ... in arrival order.
pub struct FakeComfy {
    pub base_url: String,
    state: FakeState,
}

impl FakeComfy {
    pub async fn start(reply: Reply, pushes: Vec<String>) -> Self {
        let (push_tx, _) = broadcast::channel(64);
        let state = FakeState {
            script: Arc::new(Mutex::new(Script { reply, pushes })),
            push_tx,
            prompts: Arc::new(Mutex::new(Vec::new())),
            ws_clients: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/prompt", post(prompt))
            .route("/ws", get(ws))
            .route("/view", get(view))
            .route("/system_stats", get(|| async { Json(json!({"system": {}})) }))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn set_script(&self, reply: Reply, pushes: Vec<String>) {
        *self.state.script.lock().unwrap() = Script { reply, pushes };
    }

    /// Bodies received on `/prompt`, in order.
    pub fn prompts(&self) -> Vec<Value> {
        self.state.prompts.lock().unwrap().clone()
    }

    /// `clientId` of every WebSocket that connected, in order.
    pub fn ws_clients(&self) -> Vec<String> {
        self.state.ws_clients.lock().unwrap().clone()
    }
}

async fn prompt(State(state): State<FakeState>, Json(body): Json<Value>) -> Response {
    let prompt_id = {
        let mut prompts = state.prompts.lock().unwrap();
        prompts.push(body);
        format!("prompt-{}", prompts.len())
    };
    let (reply, pushes) = {
        let script = state.script.lock().unwrap();
        (script.reply.clone(), script.pushes.clone())
    };

    for text in pushes {
        let _ = state.push_tx.send(text.replace(CURRENT_PROMPT, &prompt_id));
    }

    match reply {
        Reply::Accept => Json(json!({
            "prompt_id": prompt_id,
            "number": 0,
            "node_errors": {}
        }))
        .into_response(),
        Reply::Status(code, body) => (StatusCode::from_u16(code).unwrap(), body).into_response(),
        Reply::Body(value) => Json(value).into_response(),
    }
}

async fn ws(
    upgrade: WebSocketUpgrade,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<FakeState>,
) -> Response {
    if let Some(id) = query.get("clientId") {
        state.ws_clients.lock().unwrap().push(id.clone());
    }
    // Subscribe before the handshake completes so no push can be missed.
    let pushes = state.push_tx.subscribe();
    upgrade.on_upgrade(move |socket| forward(socket, pushes))
}

async fn forward(mut socket: WebSocket, mut pushes: broadcast::Receiver<String>) {
    let hello = json!({"type": "status", "data": {"status": {"exec_info": {"queue_remaining": 0}}}});
    if socket.send(Message::Text(hello.to_string().into())).await.is_err() {
        return;
    }
    while let Ok(text) = pushes.recv().await {
        if text == CLOSE {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        if socket.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }
}

async fn view(Query(query): Query<HashMap<String, String>>) -> Response {
    match query.get("filename").map(String::as_str) {
        Some("a.png") => (StatusCode::OK, png_bytes()).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

pub fn png_bytes() -> Vec<u8> {
    vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]
}

/// `executed` for the submission that triggers the push.
pub fn executed(node: &str, filename: &str) -> String {
    executed_for(CURRENT_PROMPT, node, filename)
}

/// `executed` tagged with a fixed prompt id.
pub fn executed_for(prompt_id: &str, node: &str, filename: &str) -> String {
    json!({
        "type": "executed",
        "data": {
            "node": node,
            "prompt_id": prompt_id,
            "output": {"images": [{"filename": filename, "subfolder": "", "type": "output"}]}
        }
    })
    .to_string()
}

pub fn progress(value: u32, max: u32) -> String {
    json!({"type": "progress", "data": {"value": value, "max": max, "prompt_id": CURRENT_PROMPT}})
        .to_string()
}
