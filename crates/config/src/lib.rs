//! Configuration loading, validation, and management for CoralClaw.
//!
//! Loads configuration from `~/.coralclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! MCP server definitions live in a separate JSON file (see [`servers`]),
//! together with a `KEY=value` env file shared by every server.

pub mod servers;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub use servers::{McpServerConfig, parse_env_file};

/// Provider names understood without extra configuration.
pub const KNOWN_PROVIDERS: &[&str] = &["openai", "gemini", "ollama", "custom"];

/// The root configuration structure.
///
/// Maps directly to `~/.coralclaw/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// System prompt placed at the top of every conversation
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Stream responses token by token
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Upper bound on model requests per turn (unbounded when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    /// MCP server settings
    #[serde(default)]
    pub mcp: McpConfig,

    /// Local command sandbox
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant.".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_true() -> bool {
    true
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// JSON file with the `mcpServers` map
    #[serde(default = "default_mcp_config_file")]
    pub config_file: String,

    /// `KEY=value` file providing the base environment of every server
    #[serde(default = "default_env_file")]
    pub env_file: String,

    /// Budget for spawn + handshake + tool listing, per server
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
}

fn default_mcp_config_file() -> String {
    "~/.coralclaw/mcp_servers.json".into()
}
fn default_env_file() -> String {
    "~/.coralclaw/env".into()
}
fn default_handshake_timeout() -> u64 {
    30
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            config_file: default_mcp_config_file(),
            env_file: default_env_file(),
            handshake_timeout_secs: default_handshake_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Expose the `run_command` tool to the model
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_sandbox_timeout")]
    pub default_timeout_secs: u64,
}

fn default_sandbox_timeout() -> u64 {
    30
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_timeout_secs: default_sandbox_timeout(),
        }
    }
}

/// Fully resolved connection settings for one model provider.
#[derive(Clone, PartialEq)]
pub struct ResolvedProvider {
    pub name: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("name", &self.name)
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.coralclaw/config.toml).
    ///
    /// Values from the env file win over the process environment, and both
    /// win over the TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        let file_env = config.base_env()?;
        config.apply_env_overrides(|key| {
            file_env
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
                .filter(|v| !v.is_empty())
        });
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Recognized: `CORALCLAW_PROVIDER`, `CORALCLAW_MODEL`, `<NAME>_API_KEY`,
    /// `<NAME>_MODEL` and `<NAME>_BASE_URL` for each known provider.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("CORALCLAW_PROVIDER") {
            self.default_provider = provider;
        }

        for name in KNOWN_PROVIDERS {
            let prefix = name.to_uppercase();
            let api_key = lookup(&format!("{prefix}_API_KEY"));
            let model = lookup(&format!("{prefix}_MODEL"));
            let base_url = lookup(&format!("{prefix}_BASE_URL"));
            if api_key.is_none() && model.is_none() && base_url.is_none() {
                continue;
            }

            let entry = self.providers.entry((*name).to_string()).or_default();
            if api_key.is_some() {
                entry.api_key = api_key;
            }
            if model.is_some() {
                entry.default_model = model;
            }
            if base_url.is_some() {
                entry.api_url = base_url;
            }
        }

        if let Some(model) = lookup("CORALCLAW_MODEL") {
            self.set_model(model);
        }
    }

    /// Override the model of the current default provider.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.providers
            .entry(self.default_provider.clone())
            .or_default()
            .default_model = Some(model.into());
    }

    /// Resolve API key, base URL and model for `name`.
    pub fn resolve_provider(&self, name: &str) -> Result<ResolvedProvider, ConfigError> {
        let configured = self.providers.get(name).cloned().unwrap_or_default();

        let (base_url, model, api_key) = match name {
            "openai" => ("https://api.openai.com/v1", "gpt-4o", ""),
            "gemini" => (
                "https://generativelanguage.googleapis.com/v1beta/openai",
                "gemini-2.0-flash-exp",
                "",
            ),
            // Ollama ignores the key but the header must be present
            "ollama" => ("http://localhost:11434/v1", "llama3.2", "ollama"),
            _ if self.providers.contains_key(name) => ("", "", ""),
            _ => return Err(ConfigError::UnknownProvider(name.to_string())),
        };

        let resolved = ResolvedProvider {
            name: name.to_string(),
            api_key: configured.api_key.unwrap_or_else(|| api_key.to_string()),
            base_url: configured.api_url.unwrap_or_else(|| base_url.to_string()),
            model: configured.default_model.unwrap_or_else(|| model.to_string()),
        };

        if resolved.base_url.is_empty() || resolved.model.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "provider '{name}' needs both api_url and default_model"
            )));
        }

        Ok(resolved)
    }

    /// Settings of the default provider.
    pub fn active_provider(&self) -> Result<ResolvedProvider, ConfigError> {
        self.resolve_provider(&self.default_provider)
    }

    /// Load the configured MCP servers, merging the env file underneath
    /// each server's own `env`.
    pub fn mcp_servers(&self) -> Result<BTreeMap<String, McpServerConfig>, ConfigError> {
        let base_env = self.base_env()?;
        servers::load_servers(&expand_home(&self.mcp.config_file), &base_env)
    }

    /// Variables from the env file; empty when the file does not exist.
    pub fn base_env(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        servers::load_env_file(&expand_home(&self.mcp.env_file))
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".coralclaw")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError("max_tokens must be > 0".into()));
        }

        if self.sandbox.default_timeout_secs == 0 || self.mcp.handshake_timeout_secs == 0 {
            return Err(ConfigError::ValidationError("timeouts must be > 0".into()));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Write default config, MCP server and env files into `dir`.
    ///
    /// Existing files are left untouched. Returns the paths that were created.
    pub fn write_defaults(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::WriteError {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let files = [
            ("config.toml", Self::default_toml()),
            ("mcp_servers.json", servers::default_servers_json()),
            ("env", servers::DEFAULT_ENV_FILE.to_string()),
        ];

        let mut created = Vec::new();
        for (name, content) in files {
            let path = dir.join(name);
            if path.exists() {
                continue;
            }
            std::fs::write(&path, content).map_err(|e| ConfigError::WriteError {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            created.push(path);
        }

        Ok(created)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            providers: HashMap::new(),
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            stream: true,
            max_iterations: None,
            mcp: McpConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs_home().join(rest),
        None if path == "~" => dirs_home(),
        None => PathBuf::from(path),
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}
