//! Scriptable OpenAI-compatible upstream for integration tests
//!
//! Replies are registered per path (relative to `/v1`) and every request is
//! recorded so tests can assert on what the runtime actually sent.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Canned reply for one path
#[derive(Debug, Clone)]
pub enum Reply {
    Json(StatusCode, Value),
    /// SSE body, one `data:` line per frame
    Sse(Vec<String>),
    /// SSE frames followed by a body that never ends
    SseStalled(Vec<String>),
    /// Arbitrary payload with a content type
    Bytes(&'static str, Vec<u8>),
}

/// One request as the upstream saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    /// JSON body, or `Null` for empty and non-JSON bodies
    pub body: Value,
    pub raw: Bytes,
}

#[derive(Default)]
struct MockState {
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<Recorded>>,
}

pub struct MockUpstream {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockUpstream {
    /// Start the mock server with no replies registered
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState::default());

        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Register the reply for `path`, e.g. `chat/completions`
    pub fn reply(&self, path: &str, reply: Reply) -> &Self {
        self.state
            .replies
            .lock()
            .unwrap()
            .insert(format!("/v1/{}", path.trim_start_matches('/')), reply);
        self
    }

    /// Shorthand for a streamed chat completion reply
    pub fn stream(&self, path: &str, frames: &[Value]) -> &Self {
        let mut frames: Vec<String> = frames.iter().map(Value::to_string).collect();
        frames.push("[DONE]".to_owned());
        self.reply(path, Reply::Sse(frames))
    }

    /// Shorthand for a successful JSON reply
    pub fn json(&self, path: &str, body: Value) -> &Self {
        self.reply(path, Reply::Json(StatusCode::OK, body))
    }

    /// API base URL, including the `/v1` prefix
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Absolute URL for a non-API asset served by this mock
    pub fn asset_url(&self, path: &str) -> String {
        format!("http://{}/v1/{}", self.addr, path.trim_start_matches('/'))
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    /// The only request made to `path`
    pub fn last_request(&self, path: &str) -> Recorded {
        let full = format!("/v1/{}", path.trim_start_matches('/'));
        self.requests()
            .into_iter()
            .rev()
            .find(|r| r.path == full)
            .unwrap_or_else(|| panic!("no request to {full}"))
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    raw: Bytes,
) -> Response {
    let path = uri.path().to_owned();
    let body = serde_json::from_slice(&raw).unwrap_or(Value::Null);

    state.requests.lock().unwrap().push(Recorded {
        method,
        path: path.clone(),
        headers,
        body,
        raw,
    });

    let reply = state.replies.lock().unwrap().get(&path).cloned();

    match reply {
        Some(Reply::Json(status, body)) => (status, axum::Json(body)).into_response(),
        Some(Reply::Sse(frames)) => sse(frames, false),
        Some(Reply::SseStalled(frames)) => sse(frames, true),
        Some(Reply::Bytes(content_type, bytes)) => ([(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            axum::Json(serde_json::json!({"error": {"message": format!("no reply for {path}")}})),
        )
            .into_response(),
    }
}

fn sse(frames: Vec<String>, stall: bool) -> Response {
    let frames = futures_util::stream::iter(
        frames
            .into_iter()
            .map(|frame| Ok::<_, Infallible>(Bytes::from(format!("data: {frame}\n\n")))),
    );

    let body = if stall {
        Body::from_stream(frames.chain(futures_util::stream::pending()))
    } else {
        Body::from_stream(frames)
    };

    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}
