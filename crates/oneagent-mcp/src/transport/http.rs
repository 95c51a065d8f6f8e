//! HTTP + SSE transport adapter (spec §4.7, §6).
//!
//! `POST /` is the JSON-RPC ingress; `GET /` opens a resumable SSE stream for
//! server-initiated frames; `DELETE /` terminates a session; `/health`,
//! `/health/sessions`, `/metrics` are read-only projections from
//! [`super::health::HealthProvider`]. All routes converge on the same
//! [`Engine`] instance the stdio adapter uses.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures_util::stream;
use futures_util::StreamExt;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::origin::OriginValidator;
use crate::protocol::{Engine, JsonRpcRequest};
use crate::session::{mask_session_id, SessionManager, TouchOutcome};

use super::health::HealthProvider;

const DEFAULT_STREAM: &str = "default";
const ALLOWED_REQUEST_HEADERS: &str =
    "Authorization, Content-Type, Mcp-Session-Id, MCP-Protocol-Version, Last-Event-ID";
const ALLOWED_METHODS: &str = "GET, POST, DELETE, OPTIONS";

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8083,
        }
    }
}

struct AppState {
    engine: Arc<Engine>,
    origin: Arc<OriginValidator>,
    sessions: Arc<SessionManager>,
    health: Arc<dyn HealthProvider>,
}

pub fn router(
    engine: Arc<Engine>,
    origin: Arc<OriginValidator>,
    sessions: Arc<SessionManager>,
    health: Arc<dyn HealthProvider>,
) -> Router {
    let state = Arc::new(AppState {
        engine,
        origin,
        sessions,
        health,
    });
    Router::new()
        .route(
            "/",
            post(handle_rpc)
                .get(handle_stream)
                .delete(handle_terminate)
                .options(handle_options),
        )
        .route("/health", get(handle_health))
        .route("/health/sessions", get(handle_session_health))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds and serves the HTTP+SSE transport until `shutdown` resolves,
/// draining in-flight requests first (spec §5 cancellation contract).
pub async fn serve_http(
    config: HttpServerConfig,
    engine: Arc<Engine>,
    origin: Arc<OriginValidator>,
    sessions: Arc<SessionManager>,
    health: Arc<dyn HealthProvider>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(engine, origin, sessions, health);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "HTTP+SSE transport listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn cors_headers(origin: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(origin) = origin {
        if let Ok(v) = HeaderValue::from_str(origin) {
            headers.insert("Access-Control-Allow-Origin", v);
        }
    }
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static(ALLOWED_REQUEST_HEADERS),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert("Access-Control-Max-Age", HeaderValue::from_static("86400"));
    headers
}

fn error_response(status: StatusCode, kind: &str, cors: HeaderMap) -> Response {
    let body = json!({
        "error": {
            "code": status.as_u16(),
            "message": kind,
            "data": { "kind": kind, "retryable": false },
        }
    });
    let mut resp = (status, axum::Json(body)).into_response();
    resp.headers_mut().extend(cors);
    resp
}

async fn handle_options(headers: HeaderMap) -> Response {
    let cors = cors_headers(header_str(&headers, "origin"));
    let mut resp = StatusCode::NO_CONTENT.into_response();
    resp.headers_mut().extend(cors);
    resp
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    axum::Json(state.health.health().await).into_response()
}

async fn handle_session_health(State(state): State<Arc<AppState>>) -> Response {
    axum::Json(state.health.session_health().await).into_response()
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.health.metrics_text(),
    )
        .into_response()
}

async fn handle_terminate(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let cors = cors_headers(header_str(&headers, "origin"));
    let origin_result = state.origin.validate_and_record(header_str(&headers, "origin")).await;
    if !origin_result.allowed {
        return error_response(StatusCode::FORBIDDEN, &origin_result.reason, cors);
    }
    let Some(session_id) = header_str(&headers, "mcp-session-id") else {
        return error_response(StatusCode::NOT_FOUND, "session_not_found", cors);
    };
    if let Err(e) = state.sessions.terminate(session_id).await {
        warn!(session_id = %mask_session_id(session_id), error = %e, "terminate failed");
        return error_response(StatusCode::NOT_FOUND, "session_not_found", cors);
    }
    let mut resp = StatusCode::NO_CONTENT.into_response();
    resp.headers_mut().extend(cors);
    resp
}

/// `POST /` — the JSON-RPC ingress (spec §6).
async fn handle_rpc(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let cors = cors_headers(header_str(&headers, "origin"));

    let origin_result = state.origin.validate_and_record(header_str(&headers, "origin")).await;
    if !origin_result.allowed {
        return error_response(StatusCode::FORBIDDEN, &origin_result.reason, cors);
    }

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "malformed json-rpc body");
            return error_response(StatusCode::BAD_REQUEST, "parse_error", cors);
        }
    };

    let session_header = header_str(&headers, "mcp-session-id").map(|s| s.to_string());
    let session_id = if request.method == "initialize" {
        None
    } else {
        match &session_header {
            None => return error_response(StatusCode::NOT_FOUND, "session_not_found", cors),
            Some(id) => match state.sessions.touch(id).await {
                Ok(TouchOutcome::Ok) => Some(id.clone()),
                Ok(TouchOutcome::Expired) => {
                    return error_response(StatusCode::GONE, "session_expired", cors)
                }
                Ok(TouchOutcome::NotFound) => {
                    return error_response(StatusCode::NOT_FOUND, "session_not_found", cors)
                }
                Err(e) => {
                    warn!(error = %e, "session touch failed");
                    return error_response(StatusCode::NOT_FOUND, "session_not_found", cors);
                }
            },
        }
    };

    let ctx = crate::protocol::RequestContext::new(session_id.clone(), DEFAULT_STREAM);
    let (response, event) = state.engine.handle_traced(request, &ctx).await;

    let new_session_id = response
        .result
        .as_ref()
        .and_then(|r| r.get("sessionId"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or(session_id);

    let wants_sse = header_str(&headers, "accept")
        .map(|a| a.contains("text/event-stream"))
        .unwrap_or(false);

    if wants_sse {
        let event_id = event.map(|e| e.id).unwrap_or_else(|| "0".to_string());
        let data = serde_json::to_string(&response).unwrap_or_default();
        let sse_event = SseEvent::default().event("message").id(event_id).data(data);
        let body_stream = stream::once(async move { Ok::<_, Infallible>(sse_event) });
        let mut resp = Sse::new(body_stream)
            .keep_alive(KeepAlive::default())
            .into_response();
        resp.headers_mut().extend(cors);
        if let Some(id) = new_session_id {
            if let Ok(v) = HeaderValue::from_str(&id) {
                resp.headers_mut().insert("Mcp-Session-Id", v);
            }
        }
        resp
    } else {
        let mut resp = axum::Json(response).into_response();
        resp.headers_mut().extend(cors);
        if let Some(id) = new_session_id {
            if let Ok(v) = HeaderValue::from_str(&id) {
                resp.headers_mut().insert("Mcp-Session-Id", v);
            }
        }
        resp
    }
}

/// `GET /` — resumable SSE stream. A reconnecting client sends the same
/// `Mcp-Session-Id` plus `Last-Event-ID`; missed events replay first, then
/// the stream polls for newly produced ones (spec §4.7 Reconnection, §8 S3).
async fn handle_stream(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let cors = cors_headers(header_str(&headers, "origin"));
    let origin_result = state.origin.validate_and_record(header_str(&headers, "origin")).await;
    if !origin_result.allowed {
        return error_response(StatusCode::FORBIDDEN, &origin_result.reason, cors);
    }
    let Some(session_id) = header_str(&headers, "mcp-session-id").map(|s| s.to_string()) else {
        return error_response(StatusCode::NOT_FOUND, "session_not_found", cors);
    };
    if state.sessions.get(&session_id).await.ok().flatten().is_none() {
        return error_response(StatusCode::NOT_FOUND, "session_not_found", cors);
    }
    let last_event_id = header_str(&headers, "last-event-id").map(|s| s.to_string());
    let sessions = state.sessions.clone();

    let replay_stream = stream::unfold(
        (sessions, session_id, last_event_id, false),
        move |(sessions, session_id, mut last_event_id, mut replayed)| async move {
            loop {
                if !replayed {
                    replayed = true;
                    let replay = sessions
                        .replay_events(&session_id, DEFAULT_STREAM, last_event_id.as_deref())
                        .await
                        .ok()?;
                    if !replay.events.is_empty() {
                        let events: Vec<_> = replay.events.into_iter().collect();
                        last_event_id = events.last().map(|e| e.id.clone()).or(last_event_id);
                        let frames: Vec<Result<SseEvent, Infallible>> = events
                            .into_iter()
                            .map(|e| {
                                Ok(SseEvent::default()
                                    .event("message")
                                    .id(e.id)
                                    .data(e.payload.to_string()))
                            })
                            .collect();
                        return Some((
                            stream::iter(frames),
                            (sessions, session_id, last_event_id, replayed),
                        ));
                    }
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
                let replay = sessions
                    .replay_events(&session_id, DEFAULT_STREAM, last_event_id.as_deref())
                    .await
                    .ok()?;
                if replay.events.is_empty() {
                    if sessions.get(&session_id).await.ok().flatten().is_none() {
                        return None;
                    }
                    continue;
                }
                let events: Vec<_> = replay.events.into_iter().collect();
                last_event_id = events.last().map(|e| e.id.clone()).or(last_event_id);
                let frames: Vec<Result<SseEvent, Infallible>> = events
                    .into_iter()
                    .map(|e| {
                        Ok(SseEvent::default()
                            .event("message")
                            .id(e.id)
                            .data(e.payload.to_string()))
                    })
                    .collect();
                return Some((
                    stream::iter(frames),
                    (sessions, session_id, last_event_id, replayed),
                ));
            }
        },
    )
    .flatten();

    let mut resp = Sse::new(replay_stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    resp.headers_mut().extend(cors);
    resp
}
