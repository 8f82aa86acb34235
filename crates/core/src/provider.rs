//! Provider trait: the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation to an LLM and get a response
//! back, either as a complete message or as a stream of incremental deltas.
//! Transport (HTTP, SSE, local inference) lives entirely behind this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::{ContentBlock, Message};

/// A single provider call: the history snapshot plus derived options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "anthropic/claude-haiku-4.5")
    pub model: String,

    /// System prompt
    #[serde(default)]
    pub system: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether this request is served through `stream()`
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's input
    pub input_schema: serde_json::Value,

    /// Example inputs, when the tool documents any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_examples: Vec<serde_json::Value>,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    #[serde(default)]
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Partial tool call data for one position index.
///
/// Every field but `index` is optional: a delta only ever adds information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// One incremental fragment of a streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamDelta {
    Text { text: String },
    Reasoning { text: String },
    ToolCall(ToolCallDelta),
    Usage(Usage),
}

/// The receiving half of a streaming call. The stream ends when the sender drops.
pub type DeltaStream = mpsc::Receiver<Result<StreamDelta, ProviderError>>;

/// The core Provider trait.
///
/// The agent loop calls `complete()` or `stream()` without knowing which
/// backend is in use, and `close()` exactly once on agent shutdown.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of deltas.
    ///
    /// Default implementation calls `complete()` and replays the message as
    /// whole-block deltas.
    async fn stream(&self, request: ProviderRequest) -> Result<DeltaStream, ProviderError> {
        let response = self.complete(request).await?;
        let deltas = response_to_deltas(response);
        let (tx, rx) = mpsc::channel(deltas.len().max(1));
        for delta in deltas {
            // Capacity covers every delta, so this never waits.
            let _ = tx.send(Ok(delta)).await;
        }
        Ok(rx)
    }

    /// Release transport resources.
    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

fn response_to_deltas(response: ProviderResponse) -> Vec<StreamDelta> {
    let mut deltas = Vec::new();
    let mut index = 0u32;
    for block in response.message.content {
        match block {
            ContentBlock::Text { text } if !text.is_empty() => {
                deltas.push(StreamDelta::Text { text });
            }
            ContentBlock::ToolCall(call) => {
                deltas.push(StreamDelta::ToolCall(ToolCallDelta {
                    index,
                    id: Some(call.id),
                    name: Some(call.name),
                    arguments: Some(call.input.to_string()),
                }));
                index += 1;
            }
            _ => {}
        }
    }
    if let Some(usage) = response.usage {
        deltas.push(StreamDelta::Usage(usage));
    }
    deltas
}
