//! `depscore health`: probe a running HTTP server.

use anyhow::{bail, Context};
use depscore_mcp::http::HEALTH_PATH;
use serde_json::Value;

/// Outcome of a health probe.
#[derive(Debug)]
pub struct HealthReport {
    pub status: u16,
    pub body: Value,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub fn local_url(port: u16) -> String {
    format!("http://localhost:{}{}", port, HEALTH_PATH)
}

pub async fn probe(url: &str) -> anyhow::Result<HealthReport> {
    let client = reqwest::Client::builder()
        .user_agent(depscore_socket::user_agent())
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;

    let status = response.status().as_u16();
    let text = response.text().await.context("Failed to read health response")?;
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

    Ok(HealthReport { status, body })
}

pub async fn check(port: u16) -> anyhow::Result<()> {
    let url = local_url(port);
    tracing::debug!(url = %url, "Probing health endpoint");

    let report = probe(&url).await?;
    println!("Status: {}", report.status);
    println!("{}", serde_json::to_string_pretty(&report.body)?);

    if !report.is_healthy() {
        bail!("Health check failed with status {}", report.status);
    }
    Ok(())
}
