//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world. A tool can
//! be built in, or loaded from an external tool-hosting server (see
//! [`crate::tool_server`]); the agent loop only ever sees this trait.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use crate::signal::RunSignals;

/// Per-execution context handed to a tool.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The agent running this tool
    pub agent_id: String,

    /// Interruption signals of the current run
    pub signals: RunSignals,
}

/// Execution metadata a tool may report alongside its output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolMetadata {
    pub duration: Option<Duration>,
    pub cached: bool,
    pub retries: u32,
}

/// Structured output of the result-returning execution form.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub value: serde_json::Value,
    pub metadata: ToolMetadata,
}

impl ToolOutput {
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            metadata: ToolMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: ToolMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The result of one tool call, as reported to the caller and the model.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub tool_call_id: String,

    /// Name of the tool that was called
    pub name: String,

    /// Rendered output, or the error text
    pub content: String,

    /// Whether the call failed
    pub is_error: bool,
}

/// The core Tool trait.
///
/// Implement `execute` (the raw form: serialized JSON input in, JSON value
/// out). Tools that know more about their execution override
/// `execute_result` to report [`ToolMetadata`] as well; the agent always
/// calls `execute_result`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "calculator").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn input_schema(&self) -> serde_json::Value;

    /// Example inputs, sent along with the schema.
    fn examples(&self) -> Vec<serde_json::Value> {
        Vec::new()
    }

    /// Execute the tool with serialized JSON input.
    async fn execute(
        &self,
        ctx: &ToolContext,
        input: &[u8],
    ) -> Result<serde_json::Value, ToolError>;

    /// Execute and report metadata. Defaults to wrapping `execute`.
    async fn execute_result(
        &self,
        ctx: &ToolContext,
        input: &[u8],
    ) -> Result<ToolOutput, ToolError> {
        self.execute(ctx, input).await.map(ToolOutput::new)
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
            input_examples: self.examples(),
        }
    }
}

/// Deserialize raw tool input, mapping failures to `InvalidArguments`.
pub fn parse_input<T: DeserializeOwned>(input: &[u8]) -> Result<T, ToolError> {
    serde_json::from_slice(input).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// A registry of available tools.
///
/// Shared behind an `Arc`; registration goes through `&self` so tools can be
/// added or removed while the agent is live. Lookups hand out `Arc` clones,
/// so a running call keeps its tool even if it is unregistered meanwhile.
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a tool, returning the one it replaced, if any.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.name().to_string();
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, tool)
    }

    /// Remove a tool by name.
    pub fn unregister(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Get all tool definitions (for sending to the LLM), ordered by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|t| t.to_definition())
            .collect()
    }

    /// List all registered tool names, ordered.
    pub fn names(&self) -> Vec<String> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
