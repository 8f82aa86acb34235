//! Credential resolution.
//!
//! API keys come from an explicit, ordered list of sources resolved once when
//! an agent is assembled. Environment access goes through [`EnvLookup`] so
//! nothing reads process-global state behind the caller's back, and tests
//! can inject a map.

use std::collections::HashMap;

/// Read-only access to environment-style key/value pairs.
pub trait EnvLookup: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Variables probed, in order, by [`CredentialChain::default_env`].
pub const DEFAULT_API_KEY_VARS: [&str; 5] = [
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "OPENROUTER_API_KEY",
    "LLM_API_KEY",
    "API_KEY",
];

/// Where a credential may come from.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// A literal value.
    Value(String),
    /// An environment variable, looked up through the injected [`EnvLookup`].
    Env(String),
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Value([REDACTED])"),
            Self::Env(name) => f.debug_tuple("Env").field(name).finish(),
        }
    }
}

/// An ordered list of credential sources. The first non-empty one wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialChain {
    sources: Vec<CredentialSource>,
}

impl CredentialChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom variables first, then [`DEFAULT_API_KEY_VARS`].
    pub fn default_env<I, S>(custom: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut chain = Self::new();
        for name in custom {
            chain = chain.env(name);
        }
        for name in DEFAULT_API_KEY_VARS {
            chain = chain.env(name);
        }
        chain
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.sources.push(CredentialSource::Value(value.into()));
        self
    }

    pub fn env(mut self, name: impl Into<String>) -> Self {
        self.sources.push(CredentialSource::Env(name.into()));
        self
    }

    pub fn sources(&self) -> &[CredentialSource] {
        &self.sources
    }

    /// Resolve against `env`, returning the first non-empty credential.
    pub fn resolve(&self, env: &dyn EnvLookup) -> Option<String> {
        self.sources.iter().find_map(|source| {
            let value = match source {
                CredentialSource::Value(v) => Some(v.clone()),
                CredentialSource::Env(name) => env.get(name),
            };
            value.filter(|v| !v.is_empty())
        })
    }
}
