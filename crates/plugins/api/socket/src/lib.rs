//! Socket provider implementation for depscore.
//!
//! This crate talks to the Socket package-URL scoring API and maps its
//! NDJSON (or single JSON object) responses to unified package scores.

mod client;
mod types;

pub use client::SocketClient;
pub use types::*;

/// Default Socket scoring API URL.
pub use depscore_core::config::default_api_url;

/// User agent sent with every scoring request.
pub fn user_agent() -> String {
    format!("socket-mcp/{}", env!("CARGO_PKG_VERSION"))
}
