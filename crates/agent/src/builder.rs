//! Lazy, at-most-once agent assembly.
//!
//! Setters only record what they are given; recoverable mistakes (a zero
//! token limit, an unreadable prompt file) are collected and reported
//! together when the agent is built. Building happens once: `build`, `run`,
//! `chat` and `close` all go through a single memoized cell, so concurrent
//! first use constructs at most one agent and every caller sees either that
//! agent or the same error.

use std::path::Path;
use std::sync::Arc;

use spindle_config::{AgentConfig, CredentialChain, EnvLookup, LlmConfig, ProcessEnv};
use spindle_core::{
    AgentError, AgentEvent, Provider, RunOptions, Tool, ToolRegistry, ToolServer, TurnResult,
};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::lifecycle::{Agent, AgentParts, collect_outcome};
use crate::retry::RetryPolicy;

/// Creates a provider from LLM settings when none was supplied directly.
pub type ProviderFactory =
    Arc<dyn Fn(&LlmConfig) -> Result<Arc<dyn Provider>, AgentError> + Send + Sync>;

/// Fluent builder for [`Agent`].
///
/// ```ignore
/// let agent = AgentBuilder::new()
///     .name("assistant")
///     .system_prompt("You are helpful.")
///     .provider(provider)
///     .tool(Arc::new(Calculator))
///     .build()
///     .await?;
/// ```
pub struct AgentBuilder {
    config: AgentConfig,
    credentials: Option<CredentialChain>,
    env: Arc<dyn EnvLookup>,
    registry: Option<Arc<ToolRegistry>>,
    tool_servers: Vec<Arc<dyn ToolServer>>,
    provider: Option<Arc<dyn Provider>>,
    factory: Option<ProviderFactory>,
    retry: Option<RetryPolicy>,
    errors: Vec<String>,
    built: Mutex<Option<Result<Agent, AgentError>>>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            config: AgentConfig::default(),
            credentials: None,
            env: Arc::new(ProcessEnv),
            registry: None,
            tool_servers: Vec::new(),
            provider: None,
            factory: None,
            retry: None,
            errors: Vec::new(),
            built: Mutex::new(None),
        }
    }

    /// Start from a copy of another agent's configuration.
    ///
    /// Runtime dependencies (provider, tools, servers) are not shared; supply
    /// them again or let the provider factory recreate them.
    pub fn from_agent(agent: &Agent) -> Self {
        Self::new().config(agent.config())
    }

    // --- Identity ---

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Parent agent, for agents spawned by other agents.
    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.config.parent_id = parent_id.into();
        self
    }

    // --- LLM ---

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.llm.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.llm.api_key = Some(key.into());
        self
    }

    /// Resolve the API key from `names`, then the default variables.
    pub fn api_key_from_env<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.credentials(CredentialChain::default_env(names))
    }

    /// Resolve the API key from an explicit chain when the agent is built.
    pub fn credentials(mut self, chain: CredentialChain) -> Self {
        self.credentials = Some(chain);
        self
    }

    /// Environment used to resolve credentials. Defaults to the process environment.
    pub fn env(mut self, env: Arc<dyn EnvLookup>) -> Self {
        self.env = env;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.llm.base_url = url.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        if max_tokens == 0 {
            self.errors.push("max_tokens must be positive".into());
        } else {
            self.config.max_tokens = max_tokens;
        }
        self
    }

    // --- Behavior ---

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = prompt.into();
        self
    }

    pub fn system_prompt_from_file(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(prompt) => self.config.prompt = prompt,
            Err(e) => self
                .errors
                .push(format!("read system prompt file {}: {e}", path.display())),
        }
        self
    }

    pub fn work_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    // --- Tools ---

    /// Register a tool, creating the registry on first use.
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.registry
            .get_or_insert_with(|| Arc::new(ToolRegistry::new()))
            .register(tool);
        self
    }

    pub fn tools(self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        tools.into_iter().fold(self, Self::tool)
    }

    /// Use an existing registry in place of the builder's own.
    pub fn tool_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Copy the named tools out of a shared registry.
    pub fn tools_from_registry<I, S>(mut self, source: &ToolRegistry, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref();
            match source.get(name) {
                Some(tool) => self = self.tool(tool),
                None => self.errors.push(format!("tool not found: {name}")),
            }
        }
        self
    }

    /// Tool names that must be registered when the agent is built.
    pub fn require_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.tools.extend(names.into_iter().map(Into::into));
        self
    }

    /// A tool server to connect and load tools from at build time.
    pub fn tool_server(mut self, server: Arc<dyn ToolServer>) -> Self {
        self.tool_servers.push(server);
        self
    }

    // --- Advanced ---

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn provider_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&LlmConfig) -> Result<Arc<dyn Provider>, AgentError> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        let policy = self
            .retry
            .take()
            .unwrap_or_else(|| RetryPolicy::from(&self.config.retry));
        self.retry = Some(policy.with_max_retries(max_retries));
        self
    }

    pub fn disable_retry(self) -> Self {
        self.retry_policy(RetryPolicy::disabled())
    }

    // --- Configuration ---

    /// Replace the whole configuration.
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Load a TOML configuration file.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Self {
        match AgentConfig::load_from(path.as_ref()) {
            Ok(config) => self.config = config,
            Err(e) => self.errors.push(format!("load config file: {e}")),
        }
        self
    }

    /// TOML rendering of the configuration collected so far.
    pub fn to_toml(&self) -> String {
        self.config.to_toml()
    }

    // --- Building ---

    /// Build the agent, or return the one built earlier.
    pub async fn build(&self) -> Result<Agent, AgentError> {
        let mut built = self.built.lock().await;
        if let Some(result) = built.as_ref() {
            return result.clone();
        }
        let result = self.assemble().await;
        *built = Some(result.clone());
        result
    }

    /// Build if needed, then run. A build failure arrives as the only event.
    pub async fn run(
        &self,
        text: impl Into<String>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<AgentEvent> {
        match self.build().await {
            Ok(agent) => agent.run(text, options, cancel),
            Err(error) => {
                let (tx, rx) = mpsc::channel(1);
                // A fresh channel with one slot always has room.
                let _ = tx.try_send(AgentEvent::Error { error });
                rx
            }
        }
    }

    /// Build if needed, then chat.
    pub async fn chat(
        &self,
        text: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<TurnResult, AgentError> {
        collect_outcome(self.run(text, RunOptions::blocking(), cancel).await).await
    }

    /// Close the agent if one was built.
    pub async fn close(&self) -> Result<(), AgentError> {
        let built = self.built.lock().await;
        match built.as_ref() {
            Some(Ok(agent)) => agent.close().await,
            _ => Ok(()),
        }
    }

    async fn assemble(&self) -> Result<Agent, AgentError> {
        if !self.errors.is_empty() {
            return Err(AgentError::Build(self.errors.join("; ")));
        }

        let mut config = self.config.snapshot();
        config
            .validate()
            .map_err(|e| AgentError::Config(e.to_string()))?;

        if let (None, Some(chain)) = (&config.llm.api_key, &self.credentials) {
            let key = chain.resolve(self.env.as_ref()).ok_or_else(|| {
                AgentError::Build("no API key found in credential sources".into())
            })?;
            config.llm.api_key = Some(key);
        }

        let provider = match (&self.provider, &self.factory) {
            (Some(provider), _) => Arc::clone(provider),
            (None, Some(factory)) => factory(&config.llm)
                .map_err(|e| AgentError::Build(format!("auto-create provider: {e}")))?,
            (None, None) => {
                return Err(AgentError::Build(
                    "no provider configured and no provider factory set".into(),
                ));
            }
        };

        let mut registry = self.registry.clone();
        if !self.tool_servers.is_empty() {
            let registry = registry.get_or_insert_with(|| Arc::new(ToolRegistry::new()));
            self.load_tool_servers(registry).await?;
        }

        if !config.tools.is_empty() {
            let missing: Vec<&str> = config
                .tools
                .iter()
                .filter(|name| registry.as_ref().is_none_or(|r| !r.has(name)))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                self.close_tool_servers().await;
                return Err(AgentError::Build(format!(
                    "tools not found in registry: {}",
                    missing.join(", ")
                )));
            }
        }

        let id = if config.id.is_empty() {
            generate_agent_id()
        } else {
            config.id.clone()
        };

        Ok(Agent::from_parts(AgentParts {
            id,
            retry: self
                .retry
                .clone()
                .unwrap_or_else(|| RetryPolicy::from(&config.retry)),
            config,
            provider,
            registry,
            tool_servers: self.tool_servers.clone(),
        }))
    }

    /// Connect every server and register its tools. On any failure every
    /// server is closed and the build fails.
    async fn load_tool_servers(&self, registry: &ToolRegistry) -> Result<(), AgentError> {
        for server in &self.tool_servers {
            let loaded = match server.connect().await {
                Ok(()) => server.load_tools().await,
                Err(e) => Err(e),
            };
            let tools = match loaded {
                Ok(tools) => tools,
                Err(e) => {
                    self.close_tool_servers().await;
                    return Err(AgentError::Build(e.to_string()));
                }
            };
            for tool in tools {
                info!(server = server.name(), tool = tool.name(), "Registered server tool");
                registry.register(tool);
            }
        }
        Ok(())
    }

    async fn close_tool_servers(&self) {
        for server in &self.tool_servers {
            if let Err(e) = server.close().await {
                warn!(server = server.name(), error = %e, "Failed to close tool server");
            }
        }
    }
}

fn generate_agent_id() -> String {
    format!("agt-{}", Uuid::new_v4())
}
