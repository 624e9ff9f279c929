//! MCP server definitions and the shared env file.
//!
//! `mcp_servers.json`:
//!
//! ```json
//! { "mcpServers": { "files": { "command": "npx", "args": ["-y", "server"], "env": {} } } }
//! ```
//!
//! The env file holds `KEY=value` lines that every server receives; a
//! server's own `env` entries override them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::ConfigError;

/// How to launch one MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ServersFile {
    #[serde(rename = "mcpServers", default)]
    mcp_servers: BTreeMap<String, McpServerConfig>,
}

pub(crate) const DEFAULT_ENV_FILE: &str = "\
# Environment variables for MCP servers
# Format: KEY=value
# These variables will be available to all MCP servers
# Server-specific env in mcp_servers.json will override these

# Example:
# CORALCLAW_PROVIDER=gemini
# GEMINI_API_KEY=your-gemini-api-key
# GEMINI_MODEL=gemini-2.0-flash-exp
";

pub(crate) fn default_servers_json() -> String {
    let mut servers = BTreeMap::new();
    servers.insert(
        "example".to_string(),
        McpServerConfig {
            command: "npx".into(),
            args: vec!["-y".into(), "@modelcontextprotocol/server-everything".into()],
            env: BTreeMap::new(),
        },
    );
    serde_json::to_string_pretty(&ServersFile {
        mcp_servers: servers,
    })
    .unwrap_or_default()
}

/// Read the servers file. A missing file means no servers.
pub(crate) fn load_servers(
    path: &Path,
    base_env: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, McpServerConfig>, ConfigError> {
    if !path.exists() {
        tracing::debug!("No MCP server file at {}", path.display());
        return Ok(BTreeMap::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    parse_servers(&content, base_env).map_err(|reason| ConfigError::ParseError {
        path: path.to_path_buf(),
        reason,
    })
}

fn parse_servers(
    content: &str,
    base_env: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, McpServerConfig>, String> {
    let file: ServersFile = serde_json::from_str(content).map_err(|e| e.to_string())?;

    Ok(file
        .mcp_servers
        .into_iter()
        .map(|(name, mut server)| {
            let mut env = base_env.clone();
            env.append(&mut server.env);
            server.env = env;
            (name, server)
        })
        .collect())
}

/// Read the env file. A missing file yields an empty map.
pub(crate) fn load_env_file(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(parse_env_file(&content))
}

/// Parse `KEY=value` lines. Blank lines and `#` comments are skipped and a
/// single pair of matching surrounding quotes is stripped from the value.
pub fn parse_env_file(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), unquote(value.trim())))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
