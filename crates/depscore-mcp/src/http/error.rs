//! HTTP-level errors rendered as JSON-RPC error envelopes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::protocol::{JsonRpcError, JsonRpcResponse, RequestId};

/// Rejection of an HTTP request before or during session dispatch.
///
/// Every variant carries the JSON-RPC id of the rejected message, or
/// `RequestId::Null` when none could be parsed.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Forbidden: {message}")]
    Forbidden { message: String, id: RequestId },

    #[error("Bad Request: {message}")]
    BadRequest { message: String, id: RequestId },

    #[error("Method not allowed: {message}")]
    MethodNotAllowed { message: String, id: RequestId },

    #[error("Not found")]
    NotFound,

    #[error("Internal server error: {message}")]
    Internal { message: String, id: RequestId },
}

impl HttpError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        HttpError::Forbidden {
            message: message.into(),
            id: RequestId::Null,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        HttpError::BadRequest {
            message: message.into(),
            id: RequestId::Null,
        }
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        HttpError::MethodNotAllowed {
            message: message.into(),
            id: RequestId::Null,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        HttpError::Internal {
            message: message.into(),
            id: RequestId::Null,
        }
    }

    /// Attach the id of the message being rejected.
    pub fn with_id(mut self, request_id: RequestId) -> Self {
        match &mut self {
            HttpError::Forbidden { id, .. }
            | HttpError::BadRequest { id, .. }
            | HttpError::MethodNotAllowed { id, .. }
            | HttpError::Internal { id, .. } => *id = request_id,
            HttpError::NotFound => {}
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::Forbidden { .. } => StatusCode::FORBIDDEN,
            HttpError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            HttpError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            HttpError::NotFound => StatusCode::NOT_FOUND,
            HttpError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON-RPC error code carried in the envelope.
    pub fn code(&self) -> i32 {
        match self {
            HttpError::Internal { .. } => JsonRpcError::INTERNAL_ERROR,
            _ => JsonRpcError::SERVER_ERROR,
        }
    }

    fn id(&self) -> RequestId {
        match self {
            HttpError::Forbidden { id, .. }
            | HttpError::BadRequest { id, .. }
            | HttpError::MethodNotAllowed { id, .. }
            | HttpError::Internal { id, .. } => id.clone(),
            HttpError::NotFound => RequestId::Null,
        }
    }

    /// The JSON-RPC envelope sent as the response body.
    pub fn envelope(&self) -> JsonRpcResponse {
        JsonRpcResponse::error(
            self.id(),
            JsonRpcError {
                code: self.code(),
                message: self.to_string(),
                data: None,
            },
        )
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}
