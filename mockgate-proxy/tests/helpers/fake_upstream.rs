//! Fake upstream API for proxy-mode tests.
//!
//! Any path echoes the request back as JSON:
//! `{"method", "path", "query", "headers", "body"}`. `/status/{code}` answers
//! with that status and `/text` with a plain-text body. After
//! [`FakeUpstream::set_down`] every route answers 503.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Request, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use serde_json::{Map, Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct UpstreamState {
    hits: AtomicUsize,
    down: AtomicBool,
}

pub struct FakeUpstream {
    pub addr: SocketAddr,
    state: Arc<UpstreamState>,
    handle: JoinHandle<()>,
}

impl FakeUpstream {
    pub async fn start() -> Self {
        let state = Arc::new(UpstreamState::default());

        let app = Router::new()
            .route("/status/{code}", any(status_handler))
            .route("/text", get(text_handler))
            .fallback(echo_handler)
            .layer(middleware::from_fn_with_state(state.clone(), outage))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Simulate an outage without closing pooled connections.
    pub fn set_down(&self, down: bool) {
        self.state.down.store(down, Ordering::SeqCst);
    }
}

impl Drop for FakeUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A URL nothing is listening on.
pub async fn unreachable_upstream_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn outage(State(state): State<Arc<UpstreamState>>, request: Request, next: Next) -> Response {
    if state.down.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "down").into_response();
    }
    next.run(request).await
}

async fn echo_handler(
    State(state): State<Arc<UpstreamState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let headers: Map<String, Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
        })
        .collect();

    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn status_handler(
    State(state): State<Arc<UpstreamState>>,
    Path(code): Path<u16>,
) -> (StatusCode, String) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, format!("status {code}"))
}

async fn text_handler(State(state): State<Arc<UpstreamState>>) -> &'static str {
    state.hits.fetch_add(1, Ordering::SeqCst);
    "hello from upstream"
}
