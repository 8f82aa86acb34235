//! `spindle demo`: One turn against an offline model.
//!
//! The model is a small rule-based stand-in: asked for `a op b` it calls the
//! calculator tool, and once the result comes back it answers with it.
//! Anything else is echoed. No network access is needed.

use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use spindle_agent::AgentBuilder;
use spindle_core::{
    AgentEvent, ContentBlock, Message, Provider, ProviderError, ProviderRequest, ProviderResponse,
    Role, RunOptions, Tool, ToolCall, ToolContext, ToolError, Usage, parse_input,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub async fn run(message: String, stream: bool, json_lines: bool) -> anyhow::Result<()> {
    let agent = AgentBuilder::new()
        .name("demo")
        .system_prompt("You are a calculator assistant.")
        .provider(Arc::new(OfflineModel))
        .tool(Arc::new(Calculator))
        .build()
        .await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let options = if stream {
        RunOptions::streaming()
    } else {
        RunOptions::blocking()
    };
    let mut events = agent.run(message, options, cancel);

    let mut failure = None;
    while let Some(event) = events.recv().await {
        if json_lines {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            render(&event, stream);
        }
        if let AgentEvent::Error { error } = event {
            failure = Some(error);
        }
    }

    agent.close().await?;
    if let Some(error) = failure {
        bail!("turn failed: {error}");
    }
    Ok(())
}

fn render(event: &AgentEvent, stream: bool) {
    match event {
        AgentEvent::Text { text } if stream => print!("{text}"),
        AgentEvent::Text { text } => println!("{text}"),
        AgentEvent::Reasoning { text } => println!("💭 {text}"),
        AgentEvent::ToolCall { call } => println!("🔧 {} {}", call.name, call.input),
        AgentEvent::ToolResult { result } if result.is_error => {
            println!("   ❌ {}", result.content);
        }
        AgentEvent::ToolResult { result } => println!("   → {}", result.content),
        AgentEvent::Done { result } => {
            if stream {
                println!();
            }
            println!(
                "✔ {} step(s), {} tool call(s), {} tokens",
                result.step_count,
                result.tools_used.len(),
                result.total_tokens
            );
        }
        AgentEvent::Error { error } => eprintln!("Error: {error}"),
    }
}

// --- Offline model ---

/// A deterministic stand-in for an LLM backend.
struct OfflineModel;

#[async_trait]
impl Provider for OfflineModel {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let last = request
            .messages
            .last()
            .ok_or_else(|| ProviderError::Other("empty conversation".into()))?;

        let message = match last.role {
            Role::ToolResult => Message::assistant(answer_from_results(last)),
            _ => {
                let text = last.text();
                let wants_calculator = request.tools.iter().any(|t| t.name == "calculator");
                match parse_expression(&text) {
                    Some(input) if wants_calculator => {
                        let id = format!("call_{}", request.messages.len());
                        debug!(call_id = %id, "Offline model requesting calculator");
                        Message::assistant_blocks(vec![])
                            .with_tool_call(ToolCall::new(id, "calculator", input))
                    }
                    _ => Message::assistant(format!("You said: {text}")),
                }
            }
        };

        let prompt_tokens = request.messages.iter().map(|m| m.text().len() as u32 / 4).sum::<u32>() + 1;
        let completion_tokens = message.text().len() as u32 / 4 + 1;
        Ok(ProviderResponse {
            message,
            usage: Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
            model: request.model,
        })
    }
}

fn answer_from_results(message: &Message) -> String {
    let answers: Vec<&str> = message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolResult { content, is_error: false, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    if answers.is_empty() {
        "The calculator could not help with that.".to_string()
    } else {
        format!("The answer is {}.", answers.join(", "))
    }
}

/// `"12 * 7"` → `{"a": 12, "b": 7, "op": "*"}`.
fn parse_expression(text: &str) -> Option<Value> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let [a, op, b] = parts.as_slice() else {
        return None;
    };
    let a: f64 = a.parse().ok()?;
    let b: f64 = b.parse().ok()?;
    matches!(*op, "+" | "-" | "*" | "/").then(|| json!({"a": a, "b": b, "op": op}))
}

// --- Calculator tool ---

struct Calculator;

#[derive(Deserialize)]
struct CalcInput {
    a: f64,
    b: f64,
    op: String,
}

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Apply +, -, * or / to two numbers"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": { "type": "number" },
                "b": { "type": "number" },
                "op": { "type": "string", "enum": ["+", "-", "*", "/"] }
            },
            "required": ["a", "b", "op"]
        })
    }

    fn examples(&self) -> Vec<Value> {
        vec![json!({"a": 12, "b": 7, "op": "*"})]
    }

    async fn execute(&self, _ctx: &ToolContext, input: &[u8]) -> Result<Value, ToolError> {
        let input: CalcInput = parse_input(input)?;
        let value = match input.op.as_str() {
            "+" => input.a + input.b,
            "-" => input.a - input.b,
            "*" => input.a * input.b,
            "/" if input.b == 0.0 => {
                return Err(ToolError::failed("calculator", "division by zero"));
            }
            "/" => input.a / input.b,
            other => return Err(ToolError::InvalidArguments(format!("unknown operator {other}"))),
        };
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Ok(json!(value as i64))
        } else {
            Ok(json!(value))
        }
    }
}
