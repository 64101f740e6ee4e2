//! MCP (Model Context Protocol) server for depscore.
//!
//! This crate exposes the `depscore` tool to AI assistants over two
//! transports: newline-delimited JSON on stdio, and a multi-session HTTP
//! transport with optional SSE streams.

pub mod handlers;
pub mod http;
pub mod protocol;
pub mod server;
pub mod transport;

pub use http::{HttpSettings, HttpState};
pub use server::McpServer;
