//! Configuration module
//!
//! Every tunable the loop depends on (model identifier, timeouts, round-trip
//! budget, tool endpoint address) lives here. Values come from, in order of
//! precedence:
//!
//! 1. Environment variables (after loading `.env` via `dotenvy`)
//! 2. The JSON config file (`~/.mcp-assistant/config.json` or `--config`)
//! 3. [`Config::default`]
//!
//! # Example
//!
//! ```
//! use mcp_assistant::config::Config;
//!
//! let config = Config::default();
//! assert!(config.agent.max_round_trips > 0);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AssistantError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

/// Language model provider settings (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key sent as a bearer token. Usually supplied through the environment.
    pub api_key: Option<String>,
    /// Base URL of the chat completions API, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Model identifier passed verbatim to the provider.
    pub model: String,
    /// Timeout applied to each model request.
    pub timeout_secs: u64,
    /// Extra attempts after a retryable failure. `0` disables retries.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_backoff_ms: u64,
    /// `HTTP-Referer` header (required by OpenRouter).
    pub referer: String,
    /// `X-Title` header (application name shown by OpenRouter).
    pub title: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "google/gemini-2.0-flash-001".to_string(),
            timeout_secs: 60,
            max_retries: 0,
            retry_backoff_ms: 500,
            referer: "http://localhost:3000".to_string(),
            title: "Local MCP App".to_string(),
        }
    }
}

/// Orchestration loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum model round-trips for a single user message.
    pub max_round_trips: u32,
    /// System preamble sent ahead of every conversation snapshot.
    pub system_prompt: String,
    /// Sessions kept in memory before idle ones are evicted.
    pub max_sessions: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_round_trips: 8,
            system_prompt: "You're a helpful assistant with access to the user's local files, \
                            Google Drive and email through function calls. Use the tools when \
                            the user asks about files, folders, drive documents or email. If a \
                            tool reports an error, explain it to the user plainly."
                .to_string(),
            max_sessions: 1024,
        }
    }
}

/// External tool endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Base URL of the tool server (`/invoke` and `/schema` are appended).
    pub endpoint: String,
    /// Timeout applied to each tool invocation.
    pub timeout_secs: u64,
    /// Names the external dependency in diagnostics when the endpoint is unreachable.
    pub dependency_hint: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3001".to_string(),
            timeout_secs: 30,
            dependency_hint: "the MCP tool server (start it with 'python mcp_server/server.py')"
                .to_string(),
        }
    }
}

/// HTTP server settings for `serve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Directory holding the config file (`~/.mcp-assistant`).
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mcp-assistant")
    }

    /// Default config file path.
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from the default path (if present), apply environment overrides and validate.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    /// Load from `path` (if present), apply environment overrides and validate.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load_from(path: &Path) -> Result<Self> {
        // A missing .env is normal
        let _ = dotenvy::dotenv();

        let mut config = if path.exists() {
            debug!(path = %path.display(), "Loading config file");
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| AssistantError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            Config::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides using `lookup` to read variables.
    ///
    /// Returns the names of variables that were set but could not be used.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut ignored = Vec::new();

        if let Some(key) = non_empty("OPENROUTER_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = non_empty("OPENROUTER_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(model) = non_empty("MCP_ASSISTANT_MODEL") {
            self.provider.model = model;
        }
        if let Some(endpoint) = non_empty("MCP_ASSISTANT_TOOL_ENDPOINT") {
            self.tools.endpoint = endpoint;
        }
        if let Some(max) = non_empty("MCP_ASSISTANT_MAX_ROUND_TRIPS") {
            match max.trim().parse() {
                Ok(n) => self.agent.max_round_trips = n,
                Err(_) => {
                    warn!(value = %max, "Ignoring invalid MCP_ASSISTANT_MAX_ROUND_TRIPS");
                    ignored.push("MCP_ASSISTANT_MAX_ROUND_TRIPS".to_string());
                }
            }
        }
        if let Some(max) = non_empty("MCP_ASSISTANT_MAX_SESSIONS") {
            match max.trim().parse() {
                Ok(n) => self.agent.max_sessions = n,
                Err(_) => {
                    warn!(value = %max, "Ignoring invalid MCP_ASSISTANT_MAX_SESSIONS");
                    ignored.push("MCP_ASSISTANT_MAX_SESSIONS".to_string());
                }
            }
        }
        if let Some(bind) = non_empty("MCP_ASSISTANT_BIND") {
            self.server.bind = bind;
        }
        ignored
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_round_trips == 0 {
            return Err(AssistantError::Config(
                "agent.max_round_trips must be at least 1".into(),
            ));
        }
        if self.agent.max_sessions == 0 {
            return Err(AssistantError::Config(
                "agent.max_sessions must be at least 1".into(),
            ));
        }
        if self.provider.timeout_secs == 0 {
            return Err(AssistantError::Config(
                "provider.timeout_secs must be at least 1".into(),
            ));
        }
        if self.tools.timeout_secs == 0 {
            return Err(AssistantError::Config(
                "tools.timeout_secs must be at least 1".into(),
            ));
        }
        if self.provider.model.trim().is_empty() {
            return Err(AssistantError::Config("provider.model is empty".into()));
        }
        for (field, value) in [
            ("provider.base_url", &self.provider.base_url),
            ("tools.endpoint", &self.tools.endpoint),
        ] {
            url::Url::parse(value)
                .map_err(|e| AssistantError::Config(format!("{} '{}': {}", field, value, e)))?;
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.timeout_secs)
    }
}
