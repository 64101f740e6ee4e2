//! Socket API client implementation.

use std::time::Duration;

use async_trait::async_trait;
use depscore_core::{Error, PackageRef, PackageScore, Result, ScoreProvider};
use tracing::{debug, info, warn};

use crate::types::{ComponentsRequest, SocketPackage};
use crate::{default_api_url, user_agent};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Socket scoring API client.
pub struct SocketClient {
    url: String,
    token: String,
    client: reqwest::Client,
}

impl SocketClient {
    /// Create a new client for the production endpoint.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_url(default_api_url(), token, DEFAULT_TIMEOUT)
    }

    /// Create a new client with a custom endpoint URL (debug server, httpmock).
    pub fn with_url(url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent())
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            token: token.into(),
            client,
        })
    }

    /// Endpoint this client posts to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make an authenticated POST request and return content type and body.
    async fn post(&self, body: &ComponentsRequest) -> Result<(String, String)> {
        debug!(url = %self.url, components = body.components.len(), "Socket POST request");

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/x-ndjson")
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("Failed to read response body: {}", e)))?;

        if status != reqwest::StatusCode::OK {
            warn!(status = status.as_u16(), body = %text, "Socket API error response");
            return Err(Error::from_status(status.as_u16(), text));
        }

        if text.trim().is_empty() {
            warn!("Socket API returned an empty body");
            return Err(Error::EmptyResponse);
        }

        Ok((content_type, text))
    }
}

fn is_ndjson(content_type: &str) -> bool {
    content_type.contains("x-ndjson")
}

/// Parse a successful response body into package records.
pub(crate) fn parse_packages(content_type: &str, body: &str) -> Result<Vec<SocketPackage>> {
    if is_ndjson(content_type) {
        let packages = body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<SocketPackage>)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if packages.is_empty() {
            return Err(Error::InvalidData(
                "No valid JSON objects found in NDJSON response".to_string(),
            ));
        }
        Ok(packages)
    } else {
        Ok(vec![serde_json::from_str::<SocketPackage>(body)?])
    }
}

#[async_trait]
impl ScoreProvider for SocketClient {
    fn name(&self) -> &str {
        "socket"
    }

    async fn score(&self, packages: &[PackageRef]) -> Result<Vec<PackageScore>> {
        info!("Received request for {} packages", packages.len());
        for pkg in packages.iter().filter(|p| p.has_pinned_version()) {
            debug!(
                "Using version {} for {}",
                pkg.cleaned_version(),
                pkg.depname
            );
        }

        let request = ComponentsRequest::from_packages(packages);
        let (content_type, body) = self.post(&request).await?;

        let records = parse_packages(&content_type, &body).map_err(|e| {
            warn!(error = %e, response = %body, "Failed to parse Socket API response");
            e
        })?;

        // NDJSON lists every record; a single JSON answer only counts when scored.
        let ndjson = is_ndjson(&content_type);
        Ok(records
            .iter()
            .filter(|record| ndjson || record.is_scored())
            .map(SocketPackage::to_score)
            .collect())
    }
}
