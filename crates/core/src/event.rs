//! Agent-level events.
//!
//! `AgentEvent` is what a run pushes onto its event queue. Callers drain the
//! queue until it closes; the last event before the close is always exactly
//! one `Done` or `Error`.
//!
//! - `text`: a text delta (streaming) or the full answer (blocking)
//! - `reasoning`: a reasoning delta (streaming only)
//! - `tool_call`: the model requested a tool
//! - `tool_result`: a tool call finished, retries included
//! - `done`: the turn finished with a [`TurnResult`]
//! - `error`: the turn ended without one

use serde::{Serialize, Serializer};

use crate::agent::TurnResult;
use crate::error::AgentError;
use crate::message::ToolCall;
use crate::tool::ToolResult;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Text {
        text: String,
    },

    Reasoning {
        text: String,
    },

    ToolCall {
        call: ToolCall,
    },

    ToolResult {
        result: ToolResult,
    },

    Done {
        result: TurnResult,
    },

    Error {
        #[serde(serialize_with = "serialize_display")]
        error: AgentError,
    },
}

impl AgentEvent {
    /// Event name for this event type (SSE style).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Reasoning { .. } => "reasoning",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

fn serialize_display<S: Serializer>(error: &AgentError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}
