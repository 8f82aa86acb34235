//! # Spindle Core
//!
//! Domain types, boundary traits, and error definitions for the Spindle agent
//! turn loop. This crate has **no runtime logic**; it defines the model that
//! the agent crate drives and that providers and tools implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`] for the LLM backend
//! - [`Tool`] for capabilities the model can invoke
//! - [`ToolServer`] for external tool-hosting servers
//!
//! Implementations live outside this workspace or in tests.

pub mod agent;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod signal;
pub mod tool;
pub mod tool_server;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentState, AgentStatus, RunOptions, TurnResult};
pub use error::{
    AgentError, Classify, FailureKind, ProviderError, ReleaseFailure, Result, ShutdownError,
    ToolError, ToolServerError,
};
pub use event::AgentEvent;
pub use message::{ContentBlock, Message, Role, ToolCall};
pub use provider::{
    DeltaStream, Provider, ProviderRequest, ProviderResponse, StreamDelta, ToolCallDelta,
    ToolDefinition, Usage,
};
pub use signal::RunSignals;
pub use tool::{
    Tool, ToolContext, ToolMetadata, ToolOutput, ToolRegistry, ToolResult, parse_input,
};
pub use tool_server::ToolServer;
