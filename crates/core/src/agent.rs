//! Agent state, status and turn result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Lifecycle state of an agent.
///
/// `Ready → Running → Ready` around each run; `Ready | Running → Stopping →
/// Stopped` on shutdown. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Ready,
    Running,
    Stopping,
    Stopped,
}

impl AgentState {
    /// Whether a new run may start from this state.
    pub fn accepts_runs(self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Point-in-time status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub state: AgentState,
    /// History appends since the agent was created
    pub step_count: u64,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

/// The finalized output of one successful turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    /// Final answer text
    pub text: String,

    /// History produced during the turn, starting with the user message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,

    /// One entry per tool call, duplicates included
    #[serde(default)]
    pub tools_used: Vec<String>,

    /// Number of model calls made
    pub step_count: usize,

    /// Tokens reported by the provider across the turn
    #[serde(default)]
    pub total_tokens: u64,
}

/// Per-run execution options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Surface text deltas as they arrive instead of once at the end.
    #[serde(default)]
    pub streaming: bool,
}

impl RunOptions {
    pub fn blocking() -> Self {
        Self { streaming: false }
    }

    pub fn streaming() -> Self {
        Self { streaming: true }
    }
}
