//! MCP server implementation.
//!
//! The server handles the MCP protocol lifecycle:
//! 1. Initialize - exchange capabilities
//! 2. Handle tool calls - execute the scoring tool via the provider
//! 3. Shutdown - EOF on stdio, session close on HTTP
//!
//! One `McpServer` is one protocol runtime. The stdio transport drives a
//! single instance; the HTTP transport owns one per session. Handlers take
//! `&self` so overlapping requests on a session are not serialized.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use depscore_core::ScoreProvider;
use serde::Serialize;
use serde_json::Value;

use crate::handlers::ToolHandler;
use crate::protocol::{
    negotiate_version, IncomingMessage, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ProgressParams, RequestId,
    ServerCapabilities, ServerInfo, ToolCallParams, ToolsCapability, ToolsListResult,
    MCP_VERSION,
};
use crate::transport::StdioTransport;

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "socket";

/// Sink for server-initiated notifications.
pub trait Notifier: Send + Sync {
    /// Deliver a notification. Returns `false` when nothing received it.
    fn notify(&self, notification: JsonRpcNotification) -> bool;
}

/// MCP protocol runtime for the depscore tool.
pub struct McpServer {
    handler: ToolHandler,
    initialized: AtomicBool,
}

impl McpServer {
    /// Create a new MCP server backed by a score provider.
    pub fn new(provider: Arc<dyn ScoreProvider>) -> Self {
        Self {
            handler: ToolHandler::new(provider),
            initialized: AtomicBool::new(false),
        }
    }

    /// Whether `initialize` has completed on this runtime.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Run the MCP server main loop on stdin/stdout.
    pub async fn run(&self) -> depscore_core::Result<()> {
        self.serve(StdioTransport::stdio()).await
    }

    /// Run the main loop on an arbitrary line transport until EOF.
    pub async fn serve(&self, mut transport: StdioTransport) -> depscore_core::Result<()> {
        tracing::info!("Starting MCP server on stdio");

        loop {
            match transport.read_message().await {
                Ok(Some(msg)) => {
                    if let Some(resp) = self.handle_message(msg, None).await {
                        if let Err(e) = transport.write_response(&resp).await {
                            tracing::error!("Failed to write response: {}", e);
                            break;
                        }
                    }
                }
                Ok(None) => {
                    tracing::info!("EOF received, shutting down");
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    tracing::warn!("Transport error: {}", e);
                    let error_resp = JsonRpcResponse::error(
                        RequestId::Null,
                        JsonRpcError::parse_error(&e.to_string()),
                    );
                    if let Err(e) = transport.write_response(&error_resp).await {
                        tracing::error!("Failed to write response: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Transport error: {}", e);
                    break;
                }
            }
        }

        tracing::info!("MCP server stopped");
        Ok(())
    }

    /// Handle an incoming message.
    ///
    /// Progress notifications for tool calls go to `notifier` when given.
    pub async fn handle_message(
        &self,
        msg: IncomingMessage,
        notifier: Option<&dyn Notifier>,
    ) -> Option<JsonRpcResponse> {
        match msg {
            IncomingMessage::Request(req) => Some(self.handle_request(req, notifier).await),
            IncomingMessage::Notification(notif) => {
                self.handle_notification(&notif.method);
                None
            }
            IncomingMessage::Response(resp) => {
                tracing::debug!("Ignoring client response (id: {:?})", resp.id);
                None
            }
        }
    }

    /// Handle a JSON-RPC request.
    async fn handle_request(
        &self,
        req: JsonRpcRequest,
        notifier: Option<&dyn Notifier>,
    ) -> JsonRpcResponse {
        tracing::debug!("Handling request: {} (id: {:?})", req.method, req.id);

        match req.method.as_str() {
            "initialize" => self.handle_initialize(req.id, req.params),
            "tools/list" => self.handle_tools_list(req.id),
            "tools/call" => self.handle_tools_call(req.id, req.params, notifier).await,
            "ping" => self.handle_ping(req.id),
            method => {
                tracing::warn!("Unknown method: {}", method);
                JsonRpcResponse::error(req.id, JsonRpcError::method_not_found(method))
            }
        }
    }

    /// Handle notifications (no response).
    fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" | "initialized" => {
                tracing::info!("Client initialized");
            }
            "notifications/cancelled" => {
                tracing::debug!("Request cancelled by client");
            }
            _ => {
                tracing::debug!("Ignoring notification: {}", method);
            }
        }
    }

    /// Handle initialize request.
    fn handle_initialize(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request("Server already initialized"),
            );
        }

        let mut protocol_version = MCP_VERSION;
        if let Some(params) = params {
            match serde_json::from_value::<InitializeParams>(params) {
                Ok(init_params) => {
                    tracing::info!(
                        "Client: {} v{} (protocol: {})",
                        init_params.client_info.name,
                        init_params.client_info.version,
                        init_params.protocol_version
                    );
                    protocol_version = negotiate_version(&init_params.protocol_version);
                }
                Err(e) => {
                    tracing::warn!("Failed to parse initialize params: {}", e);
                }
            }
        }

        let result = InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: None,
        };

        success(id, &result)
    }

    /// Handle tools/list request.
    fn handle_tools_list(&self, id: RequestId) -> JsonRpcResponse {
        let result = ToolsListResult {
            tools: self.handler.available_tools(),
        };
        success(id, &result)
    }

    /// Handle tools/call request.
    async fn handle_tools_call(
        &self,
        id: RequestId,
        params: Option<Value>,
        notifier: Option<&dyn Notifier>,
    ) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_params(&e.to_string()),
                    );
                }
            },
            None => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params("Missing params"));
            }
        };

        tracing::info!("Calling tool: {}", params.name);

        let progress_token = params.meta.and_then(|meta| meta.progress_token);
        let report = |progress: f64, message: &str| {
            if let (Some(token), Some(notifier)) = (&progress_token, notifier) {
                if !notifier.notify(progress_notification(token.clone(), progress, message)) {
                    tracing::debug!("No stream attached, progress dropped");
                }
            }
        };

        report(0.0, "Scoring packages");
        let result = self.handler.execute(&params.name, params.arguments).await;
        report(1.0, "Done");

        success(id, &result)
    }

    /// Handle ping request.
    fn handle_ping(&self, id: RequestId) -> JsonRpcResponse {
        JsonRpcResponse::success(id, serde_json::json!({}))
    }
}

fn success<T: Serialize>(id: RequestId, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(&e.to_string())),
    }
}

fn progress_notification(token: Value, progress: f64, message: &str) -> JsonRpcNotification {
    let params = ProgressParams {
        progress_token: token,
        progress,
        total: Some(1.0),
        message: Some(message.to_string()),
    };
    JsonRpcNotification::new("notifications/progress", serde_json::to_value(params).ok())
}
