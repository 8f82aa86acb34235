//! Configuration loading, validation, and management for Spindle agents.
//!
//! Loads configuration from `~/.spindle/config.toml` (or `$SPINDLE_CONFIG`)
//! with environment variable overrides. Validates all settings before an
//! agent is assembled; nothing here is consulted while a run is in flight.

pub mod credentials;

pub use credentials::{
    CredentialChain, CredentialSource, DEFAULT_API_KEY_VARS, EnvLookup, ProcessEnv,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The agent configuration.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent ID (generated when empty)
    #[serde(default)]
    pub id: String,

    /// Human-readable agent name
    #[serde(default)]
    pub name: String,

    /// Parent agent ID, for agents spawned by other agents
    #[serde(default)]
    pub parent_id: String,

    /// System prompt
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Maximum tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Working directory handed to tools
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Tool names that must be present in the registry at build time
    #[serde(default)]
    pub tools: Vec<String>,

    /// LLM settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Tool retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// LLM backend settings, handed to whatever builds the Provider.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider type (e.g. "openai", "anthropic", "openrouter")
    #[serde(default)]
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Transport-level retries, owned by the Provider
    #[serde(default)]
    pub max_retries: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// Retry settings for tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts beyond the first (0 disables retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_prompt() -> String {
    "You are a helpful AI assistant.".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_model() -> String {
    "anthropic/claude-haiku-4.5".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_retries() -> u32 {
    2
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    5_000
}
fn default_multiplier() -> f64 {
    2.0
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
            temperature: default_temperature(),
            extra: BTreeMap::new(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            parent_id: String::new(),
            prompt: default_prompt(),
            max_tokens: default_max_tokens(),
            work_dir: default_work_dir(),
            tools: Vec::new(),
            llm: LlmConfig::default(),
            retry: RetryConfig::default(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("temperature", &self.temperature)
            .field("extra", &self.extra)
            .finish()
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent_id", &self.parent_id)
            .field("prompt", &self.prompt)
            .field("max_tokens", &self.max_tokens)
            .field("work_dir", &self.work_dir)
            .field("tools", &self.tools)
            .field("llm", &self.llm)
            .field("retry", &self.retry)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl AgentConfig {
    /// Load from `$SPINDLE_CONFIG` or the default path, then apply env overrides.
    pub fn load(env: &dyn EnvLookup) -> Result<Self, ConfigError> {
        let path = env
            .get("SPINDLE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::config_dir(env).join("config.toml"));

        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(env)?;
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

    /// Apply `SPINDLE_*` overrides.
    pub fn apply_env_overrides(&mut self, env: &dyn EnvLookup) -> Result<(), ConfigError> {
        if let Some(model) = env.get("SPINDLE_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = env.get("SPINDLE_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(prompt) = env.get("SPINDLE_PROMPT") {
            self.prompt = prompt;
        }
        if let Some(raw) = env.get("SPINDLE_MAX_TOKENS") {
            self.max_tokens = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!("SPINDLE_MAX_TOKENS is not a number: {raw}"))
            })?;
        }
        Ok(())
    }

    /// The configuration directory: `$HOME/.spindle`.
    pub fn config_dir(env: &dyn EnvLookup) -> PathBuf {
        env.get("HOME")
            .or_else(|| env.get("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".spindle")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.max_tokens == 0 {
            problems.push("max_tokens must be positive".to_string());
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            problems.push("llm.temperature must be between 0.0 and 2.0".to_string());
        }
        // Also rejects NaN.
        if !(self.retry.multiplier >= 1.0) {
            problems.push("retry.multiplier must be >= 1.0".to_string());
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            problems.push("retry.initial_backoff_ms must not exceed retry.max_backoff_ms".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(problems.join("; ")))
        }
    }

    /// An independent deep copy, for handing configuration across a trust
    /// boundary (status queries, cloning an agent). Mutating the copy never
    /// affects the original.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        Self::default().to_toml()
    }
}

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
