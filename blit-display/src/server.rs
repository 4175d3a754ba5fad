//! HTTP and WebSocket transport.
//!
//! Every request and socket runs on its own tokio task and hands the raw
//! body straight to the shared [`IngestHandler`]. Frame drops are never
//! surfaced to the client: anything but a ping answers `200` with an
//! empty body. POST bodies longer than `max_payload` are cut to that
//! length and processed anyway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use blit_core::{BlitError, IngestHandler, Ingested};

/// Delay between bind attempts while the link comes up.
pub const BIND_RETRY: Duration = Duration::from_millis(500);

const DEVICE_NOTE: &str = "Ready for blit frames (dynamic dimensions)";

// ── State ────────────────────────────────────────────────────────

/// Shared per-router state.
#[derive(Clone)]
pub struct AppState {
    handler: Arc<IngestHandler>,
    local: SocketAddr,
    started: Instant,
    max_payload: usize,
}

impl AppState {
    pub fn new(handler: Arc<IngestHandler>, local: SocketAddr, max_payload: usize) -> Self {
        Self {
            handler,
            local,
            started: Instant::now(),
            max_payload,
        }
    }

    fn uptime_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Greeting sent on `GET /` and when a WebSocket connects.
    fn device_info(&self) -> Value {
        json!({
            "type": "device-connected",
            "timestamp": self.uptime_ms(),
            "ip": self.local.ip().to_string(),
            "port": self.local.port(),
            "protocol": "HTTP",
            "clientId": 1,
            "note": DEVICE_NOTE,
        })
    }
}

// ── Router ───────────────────────────────────────────────────────

/// Build the application router. WebSocket messages larger than
/// `max_payload` bytes close the socket.
pub fn router(state: AppState) -> Router {
    let max_payload = state.max_payload;
    Router::new()
        .route("/", get(read).post(write))
        .route("/status", get(status))
        .route(
            "/ws",
            get(move |ws: WebSocketUpgrade, State(state): State<AppState>| async move {
                ws.max_message_size(max_payload)
                    .on_upgrade(move |socket| handle_socket(socket, state))
            }),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn read(State(state): State<AppState>) -> Json<Value> {
    debug!("device info requested");
    Json(state.device_info())
}

async fn write(State(state): State<AppState>, body: Body) -> Response {
    let raw = match read_capped(body, state.max_payload).await {
        Ok((raw, false)) => raw,
        Ok((raw, true)) => {
            warn!("request body exceeds {} bytes; processing the prefix", state.max_payload);
            raw
        }
        Err(e) => {
            debug!("failed to read request body: {e}");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match state.handler.handle(&raw) {
        Ok(Ingested::Pong) => "pong".into_response(),
        // Errors are counted and logged by the handler.
        Ok(_) | Err(_) => StatusCode::OK.into_response(),
    }
}

/// Collect at most `limit` bytes of `body`. The flag is set when the
/// body was longer and the rest was left unread.
async fn read_capped(mut body: Body, limit: usize) -> Result<(Bytes, bool), axum::Error> {
    let mut buf = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let Ok(data) = frame?.into_data() else {
            continue;
        };
        let room = limit - buf.len();
        if data.len() > room {
            buf.extend_from_slice(&data[..room]);
            return Ok((buf.freeze(), true));
        }
        buf.extend_from_slice(&data);
    }
    Ok((buf.freeze(), false))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "uptime_ms": state.uptime_ms(),
        "session": state.handler.session(),
        "backlog": state.handler.backlog(),
        "stats": state.handler.stats(),
    }))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("websocket client connected");
    let (mut sender, mut receiver) = socket.split();

    let greeting = state.device_info().to_string();
    if let Err(e) = sender.send(Message::Text(greeting.into())).await {
        warn!("failed to greet websocket client: {e}");
        return;
    }

    while let Some(msg) = receiver.next().await {
        let outcome = match msg {
            Ok(Message::Binary(data)) => state.handler.handle(&data),
            Ok(Message::Text(text)) => state.handler.handle(text.as_str().as_bytes()),
            Ok(Message::Close(_)) => break,
            // Protocol pings are answered by axum.
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(e) => {
                debug!("websocket receive error: {e}");
                break;
            }
        };

        if !matches!(outcome, Ok(Ingested::Pong)) {
            continue;
        }
        if let Err(e) = sender.send(Message::Text("pong".into())).await {
            debug!("failed to send pong: {e}");
            break;
        }
    }
    info!("websocket client disconnected");
}

// ── Listener ─────────────────────────────────────────────────────

/// Bind `addr`, retrying every [`BIND_RETRY`] until `deadline` elapses.
pub async fn bind_with_deadline(
    addr: SocketAddr,
    deadline: Duration,
) -> Result<TcpListener, BlitError> {
    let started = Instant::now();
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if started.elapsed() + BIND_RETRY < deadline => {
                debug!("bind {addr} failed: {e}; retrying");
                tokio::time::sleep(BIND_RETRY).await;
            }
            Err(e) => {
                warn!("bind {addr} failed: {e}; giving up after {deadline:?}");
                return Err(BlitError::Timeout(deadline));
            }
        }
    }
}

/// Serve until the listener fails.
pub async fn serve(
    listener: TcpListener,
    handler: Arc<IngestHandler>,
    max_payload: usize,
) -> Result<(), BlitError> {
    let local = listener.local_addr()?;
    let app = router(AppState::new(handler, local, max_payload));
    info!("HTTP server listening on {local}");
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
