//! Configuration management for depscore.
//!
//! Handles loading and saving configuration from TOML files.
//! Config files are stored in platform-specific locations:
//!
//! - **macOS/Linux**: `~/.config/depscore-mcp/config.toml`
//! - **Windows**: `%APPDATA%\depscore-mcp\config.toml`
//!
//! Environment variables (`SOCKET_DEBUG`, `MCP_HTTP_MODE`, `MCP_PORT`) are
//! applied on top of the file with [`Config::apply_env`]. The API credential
//! is never stored here.
//!
//! # Example
//!
//! ```ignore
//! use depscore_core::config::Config;
//!
//! let mut config = Config::load()?;
//! config.set("http.port", "8080")?;
//! config.save()?;
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Config file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config directory name.
const CONFIG_DIR_NAME: &str = "depscore-mcp";

/// Query string shared by the production and debug scoring endpoints.
const PURL_QUERY: &str =
    "alerts=false&compact=false&fixable=false&licenseattrib=false&licensedetails=false";

/// Production scoring endpoint.
pub fn default_api_url() -> String {
    format!("https://api.socket.dev/v0/purl?{}", PURL_QUERY)
}

/// Local scoring endpoint used when `SOCKET_DEBUG=true`.
pub fn debug_api_url() -> String {
    format!("http://localhost:8866/v0/purl?{}", PURL_QUERY)
}

/// Origins that are always allowed regardless of the configured port.
pub const PRODUCTION_ORIGINS: [&str; 2] =
    ["https://mcp.socket.dev", "https://mcp.socket-staging.dev"];

/// Path served by the health probe; the MCP endpoint cannot share it.
pub const HEALTH_PATH: &str = "/health";

// =============================================================================
// Configuration structures
// =============================================================================

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Scoring API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// HTTP transport configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Log file configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scoring API configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    /// Scoring endpoint URL
    #[serde(default = "default_api_url")]
    pub url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    /// Serve over HTTP instead of stdio
    #[serde(default)]
    pub enabled: bool,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path of the MCP message endpoint
    #[serde(default = "default_path")]
    pub path: String,
    /// Extra allowed browser origins; local dev and production origins are
    /// always allowed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_origins: Vec<String>,
    /// Keep-alive interval for streaming channels, in seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

/// Log file configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Directory for log files (defaults to the system temp directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_port() -> u16 {
    3000
}

fn default_path() -> String {
    "/".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_port(),
            path: default_path(),
            allowed_origins: Vec::new(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl HttpConfig {
    /// Reject values the HTTP transport cannot run with.
    pub fn validate(&self) -> Result<()> {
        validate_path(&self.path)?;
        validate_keep_alive(self.keep_alive_secs)
    }

    /// Full origin allow-list: local dev addresses for the configured port,
    /// production domains, then any configured extras.
    pub fn origin_allow_list(&self) -> Vec<String> {
        let mut origins = vec![
            format!("http://localhost:{}", self.port),
            format!("http://127.0.0.1:{}", self.port),
        ];
        origins.extend(PRODUCTION_ORIGINS.iter().map(|o| o.to_string()));
        for extra in &self.allowed_origins {
            if !origins.contains(extra) {
                origins.push(extra.clone());
            }
        }
        origins
    }
}

impl LoggingConfig {
    /// Directory log files are written to.
    pub fn log_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

// =============================================================================
// Config implementation
// =============================================================================

impl Config {
    /// Get the configuration directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(CONFIG_DIR_NAME))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default location.
    ///
    /// Returns a default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// Returns a default config if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = ?path, "Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        debug!(path = ?path, "Loading config");

        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;
        config.http.validate()?;

        info!(path = ?path, "Config loaded successfully");
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        debug!(path = ?path, "Saving config");

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        info!(path = ?path, "Config saved successfully");
        Ok(())
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using a custom lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup("SOCKET_DEBUG").as_deref() == Some("true") {
            debug!("SOCKET_DEBUG set, using local scoring endpoint");
            self.api.url = debug_api_url();
        }
        if lookup("MCP_HTTP_MODE").as_deref() == Some("true") {
            self.http.enabled = true;
        }
        if let Some(port) = lookup("MCP_PORT") {
            self.http.port = parse_port(&port)?;
        }
        Ok(())
    }

    /// Set a configuration value by key path.
    ///
    /// Key format: `section.field` (e.g., `http.port`, `api.url`)
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let (section, field) = split_key(key)?;

        match (section, field) {
            ("api", "url") => self.api.url = value.to_string(),
            ("api", "timeout_secs" | "timeout") => self.api.timeout_secs = parse_u64(key, value)?,
            ("http", "enabled") => {
                self.http.enabled = value
                    .parse()
                    .map_err(|_| Error::Config(format!("Invalid boolean for {}: {}", key, value)))?
            }
            ("http", "port") => self.http.port = parse_port(value)?,
            ("http", "path") => {
                validate_path(value)?;
                self.http.path = value.to_string();
            }
            ("http", "allowed_origins" | "origins") => {
                self.http.allowed_origins = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ("http", "keep_alive_secs" | "keep_alive") => {
                let secs = parse_u64(key, value)?;
                validate_keep_alive(secs)?;
                self.http.keep_alive_secs = secs;
            }
            ("logging", "dir") => self.logging.dir = Some(PathBuf::from(value)),
            ("api" | "http" | "logging", _) => {
                return Err(Error::Config(format!(
                    "Unknown {} config field: {}",
                    section, field
                )))
            }
            _ => return Err(Error::Config(format!("Unknown section: {}", section))),
        }

        Ok(())
    }

    /// Get a configuration value by key path.
    ///
    /// Key format: `section.field` (e.g., `http.port`, `api.url`)
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let (section, field) = split_key(key)?;

        match (section, field) {
            ("api", "url") => Ok(Some(self.api.url.clone())),
            ("api", "timeout_secs" | "timeout") => Ok(Some(self.api.timeout_secs.to_string())),
            ("http", "enabled") => Ok(Some(self.http.enabled.to_string())),
            ("http", "port") => Ok(Some(self.http.port.to_string())),
            ("http", "path") => Ok(Some(self.http.path.clone())),
            ("http", "allowed_origins" | "origins") => {
                if self.http.allowed_origins.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(self.http.allowed_origins.join(",")))
                }
            }
            ("http", "keep_alive_secs" | "keep_alive") => {
                Ok(Some(self.http.keep_alive_secs.to_string()))
            }
            ("logging", "dir") => Ok(self
                .logging
                .dir
                .as_ref()
                .map(|d| d.display().to_string())),
            ("api" | "http" | "logging", _) => Err(Error::Config(format!(
                "Unknown {} config field: {}",
                section, field
            ))),
            _ => Err(Error::Config(format!("Unknown section: {}", section))),
        }
    }
}

fn split_key(key: &str) -> Result<(&str, &str)> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.len() != 2 {
        return Err(Error::Config(format!(
            "Invalid config key '{}'. Expected format: section.field",
            key
        )));
    }
    Ok((parts[0], parts[1]))
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("Invalid number for {}: {}", key, value)))
}

fn validate_path(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(Error::Config(format!(
            "HTTP path must start with '/': {}",
            path
        )));
    }
    if path == HEALTH_PATH {
        return Err(Error::Config(format!(
            "HTTP path {} is reserved for the health probe",
            HEALTH_PATH
        )));
    }
    Ok(())
}

fn validate_keep_alive(secs: u64) -> Result<()> {
    if secs == 0 {
        return Err(Error::Config("Keep-alive interval must be positive".into()));
    }
    Ok(())
}

fn parse_port(value: &str) -> Result<u16> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("Invalid port: {}", value)))
}

// =============================================================================
// Tests
// =============================================================================
