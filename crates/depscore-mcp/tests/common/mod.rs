//! Shared helpers for HTTP transport tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use depscore_core::config::HttpConfig;
use depscore_core::{PackageRef, PackageScore, ScoreProvider};
use depscore_mcp::http::router;
use depscore_mcp::{HttpSettings, HttpState};
use serde_json::Value;

pub const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// Provider that scores every package with a fixed license score.
pub struct StubProvider;

#[async_trait]
impl ScoreProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn score(&self, packages: &[PackageRef]) -> depscore_core::Result<Vec<PackageScore>> {
        Ok(packages
            .iter()
            .map(|p| {
                PackageScore::scored(p.purl(), vec![("license".to_string(), 0.9)])
            })
            .collect())
    }
}

/// Router plus the state behind it, so tests can inspect the registry.
pub fn app() -> (Router, HttpState) {
    let state = HttpState::new(
        Arc::new(StubProvider),
        HttpSettings::try_from(&HttpConfig::default()).unwrap(),
    );
    (router(state.clone()), state)
}

pub fn rpc(id: i64, method: &str, params: Value) -> Value {
    serde_json::json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

pub fn initialize(id: i64) -> Value {
    rpc(
        id,
        "initialize",
        serde_json::json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0.0"}
        }),
    )
}

pub fn post(body: &Value, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .header("accept", ACCEPT_BOTH);
    if let Some(session) = session {
        builder = builder.header("mcp-session-id", session);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_stream(session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri("/")
        .header("accept", "text/event-stream");
    if let Some(session) = session {
        builder = builder.header("mcp-session-id", session);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn delete(session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("DELETE").uri("/");
    if let Some(session) = session {
        builder = builder.header("mcp-session-id", session);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn session_header(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get("mcp-session-id")
        .map(|v| v.to_str().unwrap().to_string())
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn text_body(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
