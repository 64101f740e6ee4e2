//! Tool handlers for MCP server.
//!
//! The only tool is `depscore`, which forwards package lists to a
//! [`ScoreProvider`] and renders the scores as text. Provider failures
//! never escape this module: they become `isError` tool results.

use std::sync::Arc;

use depscore_core::{Error, PackageRef, PackageScore, ScoreProvider};
use serde::Deserialize;
use serde_json::Value;

use crate::protocol::{ToolCallResult, ToolDefinition};

/// Name of the dependency scoring tool.
pub const DEPSCORE_TOOL: &str = "depscore";

const DEPSCORE_DESCRIPTION: &str = "Get the dependency score of packages with the `depscore` tool from Socket. Use 'unknown' for version if not known. Use this tool to scan dependencies for their quality and security on existing code or when code is generated. Stop generating code and ask the user how to proceed when any of the scores are low. When checking dependencies, make sure to also check the imports in the code, not just the manifest files (pyproject.toml, package.json, etc).";

/// Tool handler that executes tools using a score provider.
pub struct ToolHandler {
    provider: Arc<dyn ScoreProvider>,
}

impl ToolHandler {
    pub fn new(provider: Arc<dyn ScoreProvider>) -> Self {
        Self { provider }
    }

    /// Get available tool definitions.
    pub fn available_tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: DEPSCORE_TOOL.to_string(),
            description: DEPSCORE_DESCRIPTION.to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "packages": {
                        "type": "array",
                        "description": "Array of packages to check",
                        "items": {
                            "type": "object",
                            "properties": {
                                "ecosystem": {
                                    "type": "string",
                                    "description": "The package ecosystem (e.g., npm, pypi)",
                                    "default": "npm"
                                },
                                "depname": {
                                    "type": "string",
                                    "description": "The name of the dependency"
                                },
                                "version": {
                                    "type": "string",
                                    "description": "The version of the dependency, use 'unknown' if not known",
                                    "default": "unknown"
                                }
                            },
                            "required": ["depname"]
                        }
                    }
                },
                "required": ["packages"]
            }),
        }]
    }

    /// Execute a tool by name with arguments.
    pub async fn execute(&self, name: &str, arguments: Option<Value>) -> ToolCallResult {
        match name {
            DEPSCORE_TOOL => self.handle_depscore(arguments).await,
            _ => ToolCallResult::error(format!("Unknown tool: {}", name)),
        }
    }

    /// Handle depscore tool call.
    async fn handle_depscore(&self, arguments: Option<Value>) -> ToolCallResult {
        let params: DepscoreParams = match arguments.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => return ToolCallResult::error(format!("Invalid arguments: {}", e)),
            None => return ToolCallResult::error("Invalid arguments: missing packages".to_string()),
        };

        match self.provider.score(&params.packages).await {
            Ok(scores) => ToolCallResult::text(format_scores(&scores)),
            Err(e) => {
                tracing::error!(provider = self.provider.name(), error = %e, "Scoring failed");
                ToolCallResult::error(error_text(&e))
            }
        }
    }
}

/// Parameters for depscore tool.
#[derive(Debug, Deserialize)]
struct DepscoreParams {
    packages: Vec<PackageRef>,
}

/// Render scores as the tool's text output.
pub fn format_scores(scores: &[PackageScore]) -> String {
    if scores.is_empty() {
        return "No scores found for the provided packages".to_string();
    }

    let lines = scores
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    format!("Dependency scores:\n{}", lines)
}

/// User-facing text for a provider failure. Details stay in the logs.
fn error_text(err: &Error) -> String {
    match err {
        Error::Api { status, message } => {
            format!("Error processing packages: [{}] {}", status, message)
        }
        Error::EmptyResponse => "No packages were found.".to_string(),
        Error::InvalidData(msg) => msg.clone(),
        Error::Serialization(_) => "Error parsing response from Socket API".to_string(),
        Error::Http(_) => "Error connecting to Socket API".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    type ScoreFn = fn(&[PackageRef]) -> depscore_core::Result<Vec<PackageScore>>;

    /// Stub provider answering with a fixed function.
    struct StubProvider {
        respond: ScoreFn,
    }

    #[async_trait]
    impl ScoreProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn score(&self, packages: &[PackageRef]) -> depscore_core::Result<Vec<PackageScore>> {
            (self.respond)(packages)
        }
    }

    fn handler(respond: ScoreFn) -> ToolHandler {
        ToolHandler::new(Arc::new(StubProvider { respond }))
    }

    fn unreachable_provider(_: &[PackageRef]) -> depscore_core::Result<Vec<PackageScore>> {
        panic!("provider must not be called")
    }

    fn args() -> Option<Value> {
        Some(serde_json::json!({
            "packages": [
                {"depname": "express", "version": "^4.18.2"},
                {"ecosystem": "pypi", "depname": "requests"}
            ]
        }))
    }

    #[test]
    fn test_available_tools() {
        let tools = handler(unreachable_provider).available_tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "depscore");
        assert_eq!(tools[0].input_schema["required"][0], "packages");
    }

    #[tokio::test]
    async fn test_execute_success() {
        let result = handler(|packages| {
            assert_eq!(packages.len(), 2);
            assert_eq!(packages[0].purl(), "pkg:npm/express@4.18.2");
            assert_eq!(packages[1].purl(), "pkg:pypi/requests");

            let scores = vec![
                ("license".to_string(), 1.0),
                ("quality".to_string(), 0.671),
            ];
            Ok(vec![
                PackageScore::scored("pkg:npm/express@4.18.2", scores),
                PackageScore::missing("pkg:pypi/requests@unknown"),
            ])
        })
        .execute("depscore", args())
        .await;

        assert!(result.is_error.is_none());
        assert_eq!(
            result.first_text(),
            Some(
                "Dependency scores:\n\
                 pkg:npm/express@4.18.2: license: 100, quality: 67\n\
                 pkg:pypi/requests@unknown: No score found"
            )
        );
    }

    #[tokio::test]
    async fn test_execute_no_scores() {
        let result = handler(|_| Ok(vec![])).execute("depscore", args()).await;
        assert_eq!(
            result.first_text(),
            Some("No scores found for the provided packages")
        );
    }

    #[tokio::test]
    async fn test_execute_api_error() {
        let result = handler(|_| Err(Error::from_status(401, "Unauthorized")))
            .execute("depscore", args())
            .await;
        assert_eq!(result.is_error, Some(true));
        assert_eq!(
            result.first_text(),
            Some("Error processing packages: [401] Unauthorized")
        );
    }

    #[tokio::test]
    async fn test_execute_empty_response() {
        let result = handler(|_| Err(Error::EmptyResponse))
            .execute("depscore", args())
            .await;
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.first_text(), Some("No packages were found."));
    }

    #[tokio::test]
    async fn test_execute_invalid_data() {
        let result = handler(|_| {
            Err(Error::InvalidData(
                "No valid JSON objects found in NDJSON response".to_string(),
            ))
        })
        .execute("depscore", args())
        .await;
        assert_eq!(
            result.first_text(),
            Some("No valid JSON objects found in NDJSON response")
        );
    }

    #[tokio::test]
    async fn test_execute_connection_error() {
        let result = handler(|_| Err(Error::Http("connection refused".to_string())))
            .execute("depscore", args())
            .await;
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.first_text(), Some("Error connecting to Socket API"));
    }

    #[tokio::test]
    async fn test_execute_parse_error() {
        let result = handler(|_| {
            Err(Error::Serialization(
                serde_json::from_str::<Value>("{").unwrap_err(),
            ))
        })
        .execute("depscore", args())
        .await;
        assert_eq!(
            result.first_text(),
            Some("Error parsing response from Socket API")
        );
    }

    #[tokio::test]
    async fn test_execute_invalid_arguments() {
        let handler = handler(unreachable_provider);

        let result = handler.execute("depscore", None).await;
        assert_eq!(result.is_error, Some(true));

        let result = handler
            .execute(
                "depscore",
                Some(serde_json::json!({"packages": [{"version": "1"}]})),
            )
            .await;
        assert_eq!(result.is_error, Some(true));
        assert!(result.first_text().unwrap().starts_with("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let result = handler(unreachable_provider).execute("nope", None).await;
        assert_eq!(result.first_text(), Some("Unknown tool: nope"));
    }
}
