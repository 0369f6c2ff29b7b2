//! Configuration loading, validation, and management for TodoClaw.
//!
//! Loads configuration from `~/.todoclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.todoclaw/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the LLM provider (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Chat endpoint configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// The todo service the tool process talks to
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Reasoning loop bounds
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    /// How the tool process is launched and supervised
    #[serde(default)]
    pub tool_process: ToolProcessConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    1024
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("gateway", &self.gateway)
            .field("upstream", &self.upstream)
            .field("orchestration", &self.orchestration)
            .field("tool_process", &self.tool_process)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Origins allowed by CORS (the web UI)
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Chat requests per minute per bearer token (0 = unlimited)
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
}

fn default_port() -> u16 {
    8001
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".into()]
}
fn default_rate_limit() -> u32 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: default_allowed_origins(),
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base address of the todo REST service; paired with each caller's token
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
}

fn default_upstream_url() -> String {
    "http://localhost:8000".into()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Tool calls allowed per run before the loop aborts
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: usize,

    /// Wall-clock budget for one chat request
    #[serde(default = "default_request_deadline")]
    pub request_deadline_secs: u64,
}

fn default_max_tool_calls() -> usize {
    8
}
fn default_request_deadline() -> u64 {
    60
}

impl OrchestrationConfig {
    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: default_max_tool_calls(),
            request_deadline_secs: default_request_deadline(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolProcessConfig {
    /// Tool process executable. When unset, `todoclaw-tools` is looked up
    /// next to the running binary, then on `PATH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,

    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,

    /// Time allowed for a graceful exit after stdin closes
    #[serde(default = "default_close_grace")]
    pub close_grace_ms: u64,
}

fn default_handshake_timeout() -> u64 {
    5_000
}
fn default_call_timeout() -> u64 {
    15_000
}
fn default_close_grace() -> u64 {
    2_000
}

impl Default for ToolProcessConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: vec![],
            handshake_timeout_ms: default_handshake_timeout(),
            call_timeout_ms: default_call_timeout(),
            close_grace_ms: default_close_grace(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.todoclaw/config.toml).
    ///
    /// Environment overrides:
    /// - `TODOCLAW_API_KEY` (highest priority), `OPENROUTER_API_KEY`, `OPENAI_API_KEY`
    /// - `TODOCLAW_PROVIDER`, `TODOCLAW_MODEL`
    /// - `TODOCLAW_UPSTREAM_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.api_key.is_none() {
            self.api_key = non_empty("TODOCLAW_API_KEY")
                .or_else(|| non_empty("OPENROUTER_API_KEY"))
                .or_else(|| non_empty("OPENAI_API_KEY"));
        }
        if let Some(provider) = non_empty("TODOCLAW_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = non_empty("TODOCLAW_MODEL") {
            self.default_model = model;
        }
        if let Some(url) = non_empty("TODOCLAW_UPSTREAM_URL") {
            self.upstream.base_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".todoclaw")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.orchestration.max_tool_calls == 0 {
            return Err(ConfigError::ValidationError(
                "orchestration.max_tool_calls must be at least 1".into(),
            ));
        }
        if self.orchestration.request_deadline_secs == 0 {
            return Err(ConfigError::ValidationError(
                "orchestration.request_deadline_secs must be > 0".into(),
            ));
        }
        let tp = &self.tool_process;
        if tp.handshake_timeout_ms == 0 || tp.call_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "tool_process timeouts must be > 0".into(),
            ));
        }
        let url = self.upstream.base_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "upstream.base_url must be an http(s) URL, got '{url}'"
            )));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            gateway: GatewayConfig::default(),
            upstream: UpstreamConfig::default(),
            orchestration: OrchestrationConfig::default(),
            tool_process: ToolProcessConfig::default(),
            providers: HashMap::new(),
        }
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

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_model, "gpt-4o-mini");
        assert_eq!(config.orchestration.max_tool_calls, 8);
        assert_eq!(config.orchestration.request_deadline(), Duration::from_secs(60));
        assert_eq!(config.tool_process.handshake_timeout_ms, 5_000);
        assert_eq!(config.tool_process.call_timeout_ms, 15_000);
        assert_eq!(config.tool_process.close_grace_ms, 2_000);
        assert_eq!(config.gateway.allowed_origins, vec!["http://localhost:3000".to_string()]);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.upstream.base_url, config.upstream.base_url);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_tool_call_bound_rejected() {
        let mut config = AppConfig::default();
        config.orchestration.max_tool_calls = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_tool_calls"));
    }

    #[test]
    fn non_http_upstream_rejected() {
        let mut config = AppConfig::default();
        config.upstream.base_url = "ftp://todos".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_model = "gpt-4o"

[orchestration]
max_tool_calls = 3

[tool_process]
command = "/opt/todoclaw/bin/todoclaw-tools"
call_timeout_ms = 500
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.orchestration.max_tool_calls, 3);
        assert_eq!(config.orchestration.request_deadline_secs, 60);
        assert_eq!(config.tool_process.command.as_deref(), Some("/opt/todoclaw/bin/todoclaw-tools"));
        assert_eq!(config.tool_process.call_timeout_ms, 500);
        assert_eq!(config.tool_process.handshake_timeout_ms, 5_000);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_model = [").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply_in_priority_order() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| match key {
            "OPENAI_API_KEY" => Some("sk-openai".into()),
            "OPENROUTER_API_KEY" => Some("sk-router".into()),
            "TODOCLAW_MODEL" => Some("gpt-4o".into()),
            "TODOCLAW_UPSTREAM_URL" => Some("https://todos.example.com".into()),
            "TODOCLAW_PROVIDER" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.api_key.as_deref(), Some("sk-router"));
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.upstream.base_url, "https://todos.example.com");
    }

    #[test]
    fn debug_redacts_api_keys() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "openrouter".into(),
            ProviderConfig {
                api_key: Some("sk-other".into()),
                api_url: None,
                default_model: None,
            },
        );
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(!dbg.contains("sk-other"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("max_tool_calls = 8"));
    }
}
