//! API key bootstrap.

use std::io::{BufRead, Write};

use depscore_core::{Error, Result};

/// Environment variable holding the scoring API key.
pub const API_KEY_ENV: &str = "SOCKET_API_KEY";

const PROMPT: &str = "Please enter your Socket API key: ";

/// Read the key from the environment, prompting on stderr when `interactive`.
///
/// Stdio deployments pass `interactive = false`: stdin carries the protocol
/// stream, so a missing key is fatal there.
pub fn resolve(interactive: bool) -> Result<String> {
    let from_env = std::env::var(API_KEY_ENV).ok();
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut prompt = std::io::stderr();
    resolve_with(from_env, interactive, &mut input, &mut prompt)
}

pub fn resolve_with(
    from_env: Option<String>,
    interactive: bool,
    input: &mut dyn BufRead,
    prompt: &mut dyn Write,
) -> Result<String> {
    if let Some(key) = from_env.filter(|k| !k.trim().is_empty()) {
        return Ok(key);
    }

    tracing::error!("{} environment variable is not set", API_KEY_ENV);
    if !interactive {
        return Err(Error::Credential(format!(
            "{} environment variable is required in stdio mode",
            API_KEY_ENV
        )));
    }

    prompt
        .write_all(PROMPT.as_bytes())
        .and_then(|_| prompt.flush())
        .map_err(|e| Error::Credential(format!("Failed to write prompt: {}", e)))?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .map_err(|e| Error::Credential(format!("Failed to read API key: {}", e)))?;

    let key = answer.trim();
    if key.is_empty() {
        return Err(Error::Credential("No API key provided".to_string()));
    }
    Ok(key.to_string())
}
