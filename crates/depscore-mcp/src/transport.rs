//! Stdio transport for MCP JSON-RPC communication.
//!
//! MCP uses newline-delimited JSON over stdin/stdout.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::protocol::{IncomingMessage, JsonRpcNotification, JsonRpcResponse};

type Reader = Box<dyn AsyncBufRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Transport for reading/writing JSON-RPC messages.
pub struct StdioTransport {
    reader: Reader,
    writer: Writer,
}

impl StdioTransport {
    /// Create a transport using stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(
            Box::new(BufReader::new(tokio::io::stdin())),
            Box::new(tokio::io::stdout()),
        )
    }

    /// Create a transport with custom reader/writer.
    pub fn new(reader: Reader, writer: Writer) -> Self {
        Self { reader, writer }
    }

    /// Read the next JSON-RPC message, skipping blank lines.
    ///
    /// Returns `Ok(None)` on EOF and `InvalidData` for lines that are not
    /// a JSON-RPC message.
    pub async fn read_message(&mut self) -> io::Result<Option<IncomingMessage>> {
        let mut line = String::new();

        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(None);
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            tracing::debug!("Received: {}", trimmed);

            let value: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| {
                tracing::warn!("Failed to parse message: {}", trimmed);
                io::Error::new(io::ErrorKind::InvalidData, e.to_string())
            })?;

            return IncomingMessage::from_value(value)
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.message));
        }
    }

    /// Write a JSON-RPC response to the transport.
    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> io::Result<()> {
        let json = serde_json::to_string(response).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("Serialization error: {}", e))
        })?;

        tracing::debug!("Sending: {}", json);
        self.write_line(&json).await
    }

    /// Write a JSON-RPC notification to the transport.
    pub async fn write_notification(&mut self, notification: &JsonRpcNotification) -> io::Result<()> {
        let json = serde_json::to_string(notification).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("Serialization error: {}", e))
        })?;

        tracing::debug!("Sending notification: {}", json);
        self.write_line(&json).await
    }

    async fn write_line(&mut self, json: &str) -> io::Result<()> {
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}
