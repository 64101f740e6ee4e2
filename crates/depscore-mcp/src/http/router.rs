//! Request routing for the HTTP transport.
//!
//! Checks run in a fixed order: health probe, preflight, origin, then the
//! per-method rules. Every rejection is a JSON-RPC error envelope and no
//! rejection touches the session registry.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::header::{
    ACCEPT, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use super::error::HttpError;
use super::headers::{
    accepts, accepts_post_response, is_valid_session_id, origin_allowed, EVENT_STREAM_MEDIA_TYPE,
    JSON_MEDIA_TYPE, LAST_EVENT_ID_HEADER, SESSION_ID_HEADER,
};
use super::session::{CloseReason, Session};
use super::{HttpSettings, HttpState};
use crate::protocol::{IncomingMessage, JsonRpcResponse, RequestId};

pub use depscore_core::config::HEALTH_PATH;

/// Service name reported by the health probe.
pub const SERVICE_NAME: &str = "socket-mcp";

const INVALID_SESSION: &str = "invalid session, initialize a new session first";

/// Build the axum router for the HTTP transport.
pub fn router(state: HttpState) -> Router {
    let path = state.settings.path.clone();
    let mcp = any(mcp_endpoint).layer(middleware::from_fn_with_state(state.clone(), cors));

    Router::new()
        .route(HEALTH_PATH, any(health))
        .route(&path, mcp)
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn not_found() -> HttpError {
    HttpError::NotFound
}

async fn mcp_endpoint(
    State(state): State<HttpState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    let origin = header_str(&headers, ORIGIN.as_str());
    if !origin_allowed(origin, &state.settings.allowed_origins) {
        tracing::warn!(origin, %method, "Rejected request from disallowed origin");
        return HttpError::forbidden("Invalid origin").into_response();
    }

    let result = match method {
        Method::POST => handle_post(&state, &headers, body).await,
        Method::GET => handle_get(&state, &headers),
        Method::DELETE => handle_delete(&state, &headers),
        other => Err(HttpError::method_not_allowed(format!(
            "{} is not supported",
            other
        ))),
    };

    result.unwrap_or_else(IntoResponse::into_response)
}

async fn handle_post(
    state: &HttpState,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    // Header rejections echo the request id when the body yields one.
    let parsed = serde_json::from_slice::<Value>(&body);
    let id = parsed
        .as_ref()
        .map(RequestId::from_message)
        .unwrap_or(RequestId::Null);

    let accept = header_str(headers, ACCEPT.as_str());
    if !accepts_post_response(accept) {
        return Err(HttpError::bad_request(
            "Client must accept application/json or text/event-stream",
        )
        .with_id(id));
    }

    let requested_session = session_id(headers).map_err(|e| e.with_id(id.clone()))?;

    let value = parsed.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse request body");
        HttpError::internal(format!("Parse error: {}", e))
    })?;
    if value.is_array() {
        return Err(HttpError::bad_request("Batch requests are not supported"));
    }

    let message = IncomingMessage::from_value(value)
        .map_err(|e| HttpError::bad_request(e.message).with_id(id.clone()))?;

    let (session, created) = match requested_session {
        Some(sid) => (lookup(state, sid, id.clone())?, false),
        None => {
            let session = state.lifecycle.create(&message).map_err(|e| {
                tracing::error!(error = %e, "Failed to register session");
                HttpError::internal(e.to_string()).with_id(id.clone())
            })?;
            (session, true)
        }
    };

    tracing::debug!(
        session_id = %session.id(),
        method = message.method().unwrap_or("<response>"),
        "Dispatching message"
    );

    let worker = Arc::clone(&session);
    let reply = match tokio::spawn(async move { worker.handle(message).await }).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(session_id = %session.id(), error = %e, "Session handler failed");
            session.close(CloseReason::Error(e.to_string()));
            return Err(HttpError::internal("Internal server error").with_id(id));
        }
    };

    let mut response = match reply {
        Some(reply) => rpc_response(&reply, accept).map_err(|e| e.with_id(id))?,
        None => StatusCode::ACCEPTED.into_response(),
    };
    if created {
        set_session_header(&mut response, session.id());
    }
    Ok(response)
}

fn handle_get(state: &HttpState, headers: &HeaderMap) -> Result<Response, HttpError> {
    if !accepts(header_str(headers, ACCEPT.as_str()), EVENT_STREAM_MEDIA_TYPE) {
        return Err(HttpError::method_not_allowed(
            "Client must accept text/event-stream",
        ));
    }

    let sid = session_id(headers)?.ok_or_else(|| HttpError::bad_request("Missing session ID"))?;
    let session = lookup(state, sid, RequestId::Null)?;

    if let Some(last_event_id) = header_str(headers, LAST_EVENT_ID_HEADER) {
        tracing::info!(
            session_id = sid,
            last_event_id,
            "Resume requested; replay is not supported, starting a fresh stream"
        );
    }

    let (_channel, events) = session.attach_stream(state.settings.keep_alive);
    let mut response = Sse::new(events).into_response();
    set_session_header(&mut response, session.id());
    Ok(response)
}

fn handle_delete(state: &HttpState, headers: &HeaderMap) -> Result<Response, HttpError> {
    let sid = session_id(headers)?.ok_or_else(|| HttpError::bad_request("Missing session ID"))?;
    let session = lookup(state, sid, RequestId::Null)?;

    session.close(CloseReason::Terminated);
    Ok(StatusCode::OK.into_response())
}

/// Resolve a session id or reject the request.
fn lookup(state: &HttpState, sid: &str, id: RequestId) -> Result<Arc<Session>, HttpError> {
    state.lifecycle.registry().lookup(sid).ok_or_else(|| {
        tracing::warn!(session_id = sid, "Request for unknown session");
        HttpError::bad_request(INVALID_SESSION).with_id(id)
    })
}

/// The session id header, validated if present.
fn session_id(headers: &HeaderMap) -> Result<Option<&str>, HttpError> {
    let Some(value) = headers.get(SESSION_ID_HEADER) else {
        return Ok(None);
    };
    if !is_valid_session_id(value.as_bytes()) {
        tracing::warn!("Rejected malformed session id header");
        return Err(HttpError::bad_request("Invalid session ID"));
    }
    value
        .to_str()
        .map(Some)
        .map_err(|_| HttpError::bad_request("Invalid session ID"))
}

/// Encode a JSON-RPC reply as JSON, or as one SSE event for clients that
/// only take event streams.
fn rpc_response(reply: &JsonRpcResponse, accept: Option<&str>) -> Result<Response, HttpError> {
    if accepts(accept, JSON_MEDIA_TYPE) {
        return Ok(Json(reply).into_response());
    }

    let data = serde_json::to_string(reply).map_err(|e| HttpError::internal(e.to_string()))?;
    let event = Event::default().event("message").data(data);
    let events = futures::stream::once(async move { Ok::<_, Infallible>(event) });
    Ok(Sse::new(events).into_response())
}

fn set_session_header(response: &mut Response, session_id: &str) {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

async fn cors(State(state): State<HttpState>, request: Request, next: Next) -> Response {
    let origin = header_str(request.headers(), ORIGIN.as_str()).map(str::to_owned);
    let mut response = next.run(request).await;
    apply_cors(response.headers_mut(), origin.as_deref(), &state.settings);
    response
}

fn apply_cors(headers: &mut HeaderMap, origin: Option<&str>, settings: &HttpSettings) {
    let allow_origin = match origin {
        Some(origin) if origin_allowed(Some(origin), &settings.allowed_origins) => origin,
        _ => settings.default_origin.as_str(),
    };
    if let Ok(value) = HeaderValue::from_str(allow_origin) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Accept, mcp-session-id, Last-Event-ID"),
    );
    headers.insert(
        ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(SESSION_ID_HEADER),
    );
}

fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "Request handler panicked");
    HttpError::internal("Internal server error").into_response()
}
