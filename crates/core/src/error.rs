//! Error types for the Spindle domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`AgentError`] is the one
//! callers see on the event queue.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`AgentError`].
pub type Result<T> = std::result::Result<T, AgentError>;

/// Whether a failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Likely to succeed if tried again (timeouts, rate limits, 503s).
    Transient,
    /// Will fail the same way every time.
    Permanent,
}

/// Structural failure classification, set at the Provider/Tool boundary.
///
/// `None` means the error carries no classification; the retry policy then
/// falls back to inspecting the error text.
pub trait Classify: std::fmt::Display {
    fn failure_kind(&self) -> Option<FailureKind> {
        None
    }
}

// --- Agent errors ---

/// The top-level error for agent operations.
///
/// `Clone` so one terminal error can travel inside an event and be memoized
/// by the lazy builder.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("agent is stopped")]
    Stopped,

    #[error("tool registry not initialized")]
    NoToolRegistry,

    #[error("operation cancelled")]
    Cancelled,

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("{context} panicked: {message}")]
    Panicked { context: String, message: String },

    #[error("agent build failed: {0}")]
    Build(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

impl AgentError {
    /// True for caller-driven cancellation (not for agent shutdown).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}

impl Classify for ProviderError {
    fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::ApiError { status_code, .. } => match status_code {
                429 | 503 => Some(FailureKind::Transient),
                400..=499 => Some(FailureKind::Permanent),
                _ => None,
            },
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Network(_)
            | Self::StreamInterrupted(_) => Some(FailureKind::Transient),
            Self::AuthenticationFailed(_) | Self::ModelNotFound(_) | Self::NotConfigured(_) => {
                Some(FailureKind::Permanent)
            }
            Self::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("tool '{0}' not found")]
    NotFound(String),

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("tool temporarily unavailable: {tool_name}: {reason}")]
    Unavailable { tool_name: String, reason: String },

    #[error("tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("tool '{tool_name}' panicked: {message}")]
    Panicked { tool_name: String, message: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl ToolError {
    /// Shorthand for an unclassified execution failure.
    pub fn failed(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }
}

impl Classify for ToolError {
    fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Unavailable { .. } | Self::Timeout { .. } => Some(FailureKind::Transient),
            Self::NotFound(_)
            | Self::InvalidArguments(_)
            | Self::PermissionDenied { .. }
            | Self::Panicked { .. }
            | Self::Cancelled => Some(FailureKind::Permanent),
            Self::ExecutionFailed { .. } => None,
        }
    }
}

/// Errors raised by external tool-hosting servers.
#[derive(Debug, Clone, Error)]
pub enum ToolServerError {
    #[error("connect tool server {server}: {reason}")]
    Connect { server: String, reason: String },

    #[error("load tools from server {server}: {reason}")]
    LoadTools { server: String, reason: String },

    #[error("close tool server {server}: {reason}")]
    Close { server: String, reason: String },
}

/// One resource that failed to release during shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFailure {
    /// What was being released, e.g. `provider` or `tool server github`.
    pub resource: String,
    pub reason: String,
}

/// Every release failure collected by a single shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("shutdown released {} resource(s) with errors: {}", .failures.len(), render_failures(.failures))]
pub struct ShutdownError {
    pub failures: Vec<ReleaseFailure>,
}

impl ShutdownError {
    /// `Ok(())` when nothing failed, else the joined error.
    pub fn from_failures(failures: Vec<ReleaseFailure>) -> std::result::Result<(), Self> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Self { failures })
        }
    }
}

fn render_failures(failures: &[ReleaseFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("close {}: {}", f.resource, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}
