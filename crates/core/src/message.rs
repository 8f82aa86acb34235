//! Message and content block domain types.
//!
//! These are the value objects that make up conversation history:
//! user text goes in, assistant messages (text and tool-call requests) come
//! back from the provider, and tool results are fed back as their own message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// A batch of tool execution results
    ToolResult,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool call id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Structured input
    pub input: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolCall(ToolCall),
    ToolResult {
        tool_call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// A single message in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// Ordered content blocks
    pub content: Vec<ContentBlock>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_blocks(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_blocks(Role::User, vec![ContentBlock::Text { text: text.into() }])
    }

    /// Create a new assistant message holding only text.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_blocks(
            Role::Assistant,
            vec![ContentBlock::Text { text: text.into() }],
        )
    }

    /// Create an assistant message from explicit blocks.
    pub fn assistant_blocks(content: Vec<ContentBlock>) -> Self {
        Self::with_blocks(Role::Assistant, content)
    }

    /// Create the synthetic message that bundles one batch of tool results.
    pub fn tool_results(content: Vec<ContentBlock>) -> Self {
        Self::with_blocks(Role::ToolResult, content)
    }

    /// Append a tool call request to this message.
    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.content.push(ContentBlock::ToolCall(call));
        self
    }

    /// Concatenated text of every text block.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool calls requested in this message, in the order the model returned them.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolCall(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolCall(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello, agent!");
        assert!(msg.tool_calls().is_empty());
    }

    #[test]
    fn text_skips_non_text_blocks() {
        let msg = Message::assistant_blocks(vec![
            ContentBlock::Text { text: "Let me ".into() },
            ContentBlock::ToolCall(ToolCall::new("c1", "search", serde_json::json!({}))),
            ContentBlock::Text { text: "check.".into() },
        ]);
        assert_eq!(msg.text(), "Let me check.");
        assert!(msg.has_tool_calls());
    }

    #[test]
    fn tool_calls_keep_model_order() {
        let msg = Message::assistant("")
            .with_tool_call(ToolCall::new("b", "second", serde_json::json!({})))
            .with_tool_call(ToolCall::new("a", "first", serde_json::json!({})));
        let names: Vec<_> = msg.tool_calls().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn content_block_tagging() {
        let block = ContentBlock::ToolResult {
            tool_call_id: "call_1".into(),
            content: "2".into(),
            is_error: false,
        };
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains(r#""type":"tool_result""#));
        assert!(json.contains(r#""tool_call_id":"call_1""#));
    }
}
