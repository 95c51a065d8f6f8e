//! Integration tests for the HTTP+SSE transport (spec §8 scenarios S1, S2).
//! Exercises the router directly via `tower::ServiceExt::oneshot` rather
//! than binding a real socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use oneagent_mcp::backbone::Backbone;
use oneagent_mcp::origin::{OriginValidator, OriginValidatorConfig};
use oneagent_mcp::protocol::Engine;
use oneagent_mcp::session::{CacheEventLog, CacheSessionStorage, SessionManager, SessionManagerConfig};
use oneagent_mcp::tools::ToolRegistry;
use oneagent_mcp::transport::{router, McpHealthProvider};
use serde_json::{json, Value};
use tower::ServiceExt;

fn build_router() -> axum::Router {
    let backbone = Backbone::in_process();
    let storage = Arc::new(CacheSessionStorage::new(backbone.cache.clone()));
    let events = Arc::new(CacheEventLog::new(
        backbone.cache.clone(),
        backbone.clock.clone(),
        backbone.ids.clone(),
        1000,
    ));
    let sessions = Arc::new(SessionManager::new(
        backbone.clone(),
        storage,
        events,
        SessionManagerConfig::default(),
    ));
    let tools = Arc::new(ToolRegistry::new(backbone.clone()));
    let engine = Arc::new(Engine::new(sessions.clone(), tools.clone()));
    let origin = Arc::new(OriginValidator::new(OriginValidatorConfig::default(), backbone.cache.clone()));
    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder();
    let handle = recorder.handle();
    let health = Arc::new(McpHealthProvider {
        sessions: sessions.clone(),
        tools: tools.clone(),
        prometheus: handle,
    });
    router(engine, origin, sessions, health)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn s1_initialize_then_tools_list_over_http() {
    let app = build_router();

    let init_req = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .header("origin", "http://localhost:3000")
        .body(Body::from(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2025-06-18",
                    "capabilities": {},
                    "clientInfo": { "name": "test", "version": "1" }
                }
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.clone().oneshot(init_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .expect("Mcp-Session-Id header present")
        .to_str()
        .unwrap()
        .to_string();
    let body = body_json(response).await;
    assert_eq!(body["result"]["protocolVersion"], "2025-06-18");
    assert_eq!(body["result"]["serverInfo"]["name"], "OneAgent");

    let list_req = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .header("mcp-session-id", session_id)
        .body(Body::from(
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(list_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["result"]["tools"].is_array());
}

#[tokio::test]
async fn s2_unknown_origin_is_blocked() {
    let app = build_router();
    let req = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .header("origin", "http://evil.com")
        .body(Body::from(
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["data"]["kind"], "origin_blocked");
}

#[tokio::test]
async fn request_without_session_id_is_session_not_found() {
    let app = build_router();
    let req = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_terminates_session() {
    let app = build_router();
    let init_req = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": { "protocolVersion": "2025-06-18", "capabilities": {}, "clientInfo": { "name": "t" } }
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(init_req).await.unwrap();
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let delete_req = Request::builder()
        .method("DELETE")
        .uri("/")
        .header("mcp-session-id", session_id)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(delete_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
