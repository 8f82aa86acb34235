//! Tool batch execution.
//!
//! Every call in a batch yields exactly one result, success or error. Calls
//! run one after another in submission order, each behind its own panic
//! guard and under the agent's retry policy.

use std::sync::Arc;

use spindle_core::{
    AgentError, AgentEvent, ContentBlock, RunSignals, Tool, ToolCall, ToolContext, ToolError,
    ToolMetadata, ToolRegistry, ToolResult,
};
use tracing::{debug, error, info, warn};

use crate::guard::catch_panic;
use crate::retry::{RetryError, RetryPolicy, retry_with_backoff};
use crate::sink::EventSink;

/// Characters of tool output kept in log previews.
const PREVIEW_CHARS: usize = 200;

/// Results of one batch, in submission order.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// One `ToolResult` content block per call, for the history
    pub blocks: Vec<ContentBlock>,
    /// One result per call, as emitted to the caller
    pub results: Vec<ToolResult>,
    /// One tool name per call, duplicates included
    pub tools_used: Vec<String>,
}

/// Executes tool call batches for one agent.
pub struct ToolOrchestrator<'a> {
    agent_id: &'a str,
    registry: Option<&'a ToolRegistry>,
    retry: &'a RetryPolicy,
}

impl<'a> ToolOrchestrator<'a> {
    pub fn new(agent_id: &'a str, registry: Option<&'a ToolRegistry>, retry: &'a RetryPolicy) -> Self {
        Self {
            agent_id,
            registry,
            retry,
        }
    }

    /// Execute `calls` in order, emitting one `tool_result` event per call as
    /// soon as its outcome is known.
    pub async fn execute_batch(
        &self,
        calls: &[ToolCall],
        signals: &RunSignals,
        sink: &EventSink,
    ) -> BatchOutcome {
        if self.registry.is_none() {
            error!(agent_id = self.agent_id, "Tool registry not configured");
        }
        info!(agent_id = self.agent_id, count = calls.len(), "Executing tools");

        let mut outcome = BatchOutcome {
            blocks: Vec::with_capacity(calls.len()),
            results: Vec::with_capacity(calls.len()),
            tools_used: Vec::with_capacity(calls.len()),
        };

        for call in calls {
            outcome.tools_used.push(call.name.clone());
            info!(tool = %call.name, id = %call.id, "Tool call");

            let result = match catch_panic(self.execute_call(call, signals)).await {
                Ok(result) => result,
                Err(message) => {
                    error!(
                        agent_id = self.agent_id,
                        tool = %call.name,
                        panic = %message,
                        "Panic in tool execution"
                    );
                    error_result(
                        call,
                        &ToolError::Panicked {
                            tool_name: call.name.clone(),
                            message,
                        },
                    )
                }
            };

            info!(
                tool = %call.name,
                is_error = result.is_error,
                result_preview = %preview(&result.content),
                "Tool result"
            );

            sink.emit(AgentEvent::ToolResult {
                result: result.clone(),
            })
            .await;
            outcome.blocks.push(ContentBlock::ToolResult {
                tool_call_id: result.tool_call_id.clone(),
                content: result.content.clone(),
                is_error: result.is_error,
            });
            outcome.results.push(result);
        }

        info!(agent_id = self.agent_id, count = outcome.results.len(), "Tools executed");
        outcome
    }

    async fn execute_call(&self, call: &ToolCall, signals: &RunSignals) -> ToolResult {
        if signals.is_interrupted() {
            debug!(tool = %call.name, "Run interrupted, skipping tool call");
            return error_result(call, &ToolError::Cancelled);
        }

        let Some(registry) = self.registry else {
            return error_result(call, &AgentError::NoToolRegistry);
        };
        let Some(tool) = registry.get(&call.name) else {
            warn!(tool = %call.name, "Tool not found");
            return error_result(call, &ToolError::NotFound(call.name.clone()));
        };

        let input = match serde_json::to_vec(&call.input) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(tool = %call.name, error = %e, "Failed to marshal arguments");
                return error_result(
                    call,
                    &ToolError::InvalidArguments(format!("failed to marshal arguments: {e}")),
                );
            }
        };

        let ctx = ToolContext {
            agent_id: self.agent_id.to_string(),
            signals: signals.clone(),
        };

        debug!(tool = %call.name, "Executing tool");
        let (outcome, retries) = if self.retry.is_enabled() {
            let retried =
                retry_with_backoff(self.retry, signals, || run_tool(&tool, &ctx, &input)).await;
            (retried.result, retried.retries)
        } else {
            (run_tool(&tool, &ctx, &input).await.map_err(RetryError::Failed), 0)
        };

        match outcome {
            Ok(output) => {
                let metadata = with_policy_retries(output.metadata, retries);
                log_metadata(&call.name, &metadata);
                ToolResult {
                    tool_call_id: call.id.clone(),
                    name: call.name.clone(),
                    content: output.value.to_string(),
                    is_error: false,
                }
            }
            Err(RetryError::Failed(e)) => {
                error!(tool = %call.name, error = %e, retries, "Tool execution failed");
                error_result(call, &e)
            }
            Err(RetryError::Interrupted(e)) => {
                warn!(tool = %call.name, error = %e, "Tool retry interrupted");
                error_result(call, &e)
            }
        }
    }
}

/// One attempt: the tool's result-returning form behind a panic guard.
///
/// A panic inside the tool becomes a permanent `Panicked` error so the retry
/// policy never re-runs it.
async fn run_tool(
    tool: &Arc<dyn Tool>,
    ctx: &ToolContext,
    input: &[u8],
) -> Result<spindle_core::ToolOutput, ToolError> {
    match catch_panic(tool.execute_result(ctx, input)).await {
        Ok(result) => result,
        Err(message) => {
            error!(agent_id = %ctx.agent_id, tool = tool.name(), panic = %message, "Panic in tool execution");
            Err(ToolError::Panicked {
                tool_name: tool.name().to_string(),
                message,
            })
        }
    }
}

fn error_result(call: &ToolCall, err: &dyn std::fmt::Display) -> ToolResult {
    ToolResult {
        tool_call_id: call.id.clone(),
        name: call.name.clone(),
        content: format!("Error: {err}"),
        is_error: true,
    }
}

/// Fill in the policy's retry count unless the tool reported its own.
fn with_policy_retries(mut metadata: ToolMetadata, retries: u32) -> ToolMetadata {
    if metadata.retries == 0 {
        metadata.retries = retries;
    }
    metadata
}

fn log_metadata(tool: &str, metadata: &ToolMetadata) {
    if metadata.duration.is_none() && !metadata.cached && metadata.retries == 0 {
        return;
    }
    debug!(
        tool,
        duration_ms = metadata.duration.map(|d| d.as_millis() as u64),
        cached = metadata.cached,
        retries = metadata.retries,
        "Tool metadata"
    );
}

/// First `PREVIEW_CHARS` characters, with an ellipsis when cut.
pub(crate) fn preview(content: &str) -> std::borrow::Cow<'_, str> {
    match content.char_indices().nth(PREVIEW_CHARS) {
        None => content.into(),
        Some((cut, _)) => format!("{}...", &content[..cut]).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use spindle_core::{ToolOutput, parse_input};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct AddTool;

    #[derive(serde::Deserialize)]
    struct AddInput {
        a: i64,
        b: i64,
    }

    #[async_trait]
    impl Tool for AddTool {
        fn name(&self) -> &str {
            "add"
        }
        fn description(&self) -> &str {
            "Adds two integers"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _ctx: &ToolContext, input: &[u8]) -> Result<Value, ToolError> {
            let input: AddInput = parse_input(input)?;
            Ok(json!(input.a + input.b))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            "search"
        }
        fn description(&self) -> &str {
            "Always panics"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _ctx: &ToolContext, _input: &[u8]) -> Result<Value, ToolError> {
            panic!("search index corrupted");
        }
    }

    /// Fails transiently `failures` times, then succeeds.
    struct FlakyTool {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            "flaky"
        }
        fn description(&self) -> &str {
            "Sometimes unavailable"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _ctx: &ToolContext, _input: &[u8]) -> Result<Value, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(ToolError::Unavailable {
                    tool_name: "flaky".into(),
                    reason: "warming up".into(),
                })
            } else {
                Ok(json!("ok"))
            }
        }
    }

    struct CachedTool;

    #[async_trait]
    impl Tool for CachedTool {
        fn name(&self) -> &str {
            "cached"
        }
        fn description(&self) -> &str {
            "Reports metadata"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _ctx: &ToolContext, _input: &[u8]) -> Result<Value, ToolError> {
            Ok(json!({"hit": true}))
        }
        async fn execute_result(
            &self,
            ctx: &ToolContext,
            input: &[u8],
        ) -> Result<ToolOutput, ToolError> {
            let value = self.execute(ctx, input).await?;
            Ok(ToolOutput::new(value).with_metadata(ToolMetadata {
                duration: Some(Duration::from_millis(3)),
                cached: true,
                retries: 0,
            }))
        }
    }

    fn registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(AddTool));
        registry.register(Arc::new(PanickingTool));
        registry.register(Arc::new(CachedTool));
        registry
    }

    async fn run_batch(
        registry: Option<&ToolRegistry>,
        retry: &RetryPolicy,
        calls: &[ToolCall],
        signals: &RunSignals,
    ) -> (BatchOutcome, Vec<AgentEvent>) {
        let (sink, mut rx) = EventSink::channel();
        let outcome = ToolOrchestrator::new("agt-test", registry, retry)
            .execute_batch(calls, signals, &sink)
            .await;
        drop(sink);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (outcome, events)
    }

    #[tokio::test]
    async fn successful_call_renders_json() {
        let registry = registry();
        let calls = [ToolCall::new("c1", "add", json!({"a": 1, "b": 1}))];
        let (outcome, events) =
            run_batch(Some(&registry), &RetryPolicy::disabled(), &calls, &RunSignals::default()).await;

        assert_eq!(outcome.results[0].content, "2");
        assert!(!outcome.results[0].is_error);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &outcome.blocks[0],
            ContentBlock::ToolResult { tool_call_id, is_error: false, .. } if tool_call_id == "c1"
        ));
    }

    #[tokio::test]
    async fn panic_is_isolated_from_siblings() {
        let registry = registry();
        let calls = [
            ToolCall::new("c1", "search", json!({"q": "rust"})),
            ToolCall::new("c2", "add", json!({"a": 2, "b": 3})),
        ];
        let (outcome, events) =
            run_batch(Some(&registry), &RetryPolicy::default(), &calls, &RunSignals::default()).await;

        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results[0].is_error);
        assert!(outcome.results[0].content.contains("panicked"));
        assert!(outcome.results[0].content.contains("search index corrupted"));
        assert!(!outcome.results[1].is_error);
        assert_eq!(outcome.results[1].content, "5");
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn every_call_yields_a_result() {
        let registry = registry();
        let calls = [
            ToolCall::new("c1", "ghost", json!({})),
            ToolCall::new("c2", "add", json!({"a": "not a number"})),
            ToolCall::new("c3", "search", json!({})),
            ToolCall::new("c4", "add", json!({"a": 1, "b": 2})),
            ToolCall::new("c5", "add", json!({"a": 4, "b": 4})),
        ];
        let (outcome, events) =
            run_batch(Some(&registry), &RetryPolicy::disabled(), &calls, &RunSignals::default()).await;

        assert_eq!(outcome.blocks.len(), calls.len());
        assert_eq!(outcome.tools_used, ["ghost", "add", "search", "add", "add"]);
        assert_eq!(events.len(), calls.len());
        assert_eq!(outcome.results[0].content, "Error: tool 'ghost' not found");
        assert!(outcome.results[1].content.starts_with("Error: invalid tool arguments"));

        let ids: Vec<_> = outcome.results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2", "c3", "c4", "c5"]);
    }

    #[tokio::test]
    async fn missing_registry_still_answers_every_call() {
        let calls = [
            ToolCall::new("c1", "add", json!({})),
            ToolCall::new("c2", "add", json!({})),
        ];
        let (outcome, _) =
            run_batch(None, &RetryPolicy::disabled(), &calls, &RunSignals::default()).await;
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| r.is_error));
        assert!(outcome.results[0].content.contains("tool registry not initialized"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let registry = ToolRegistry::new();
        let flaky = Arc::new(FlakyTool {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        registry.register(flaky.clone());
        let calls = [ToolCall::new("c1", "flaky", json!({}))];

        let (outcome, _) =
            run_batch(Some(&registry), &RetryPolicy::default(), &calls, &RunSignals::default()).await;
        assert!(!outcome.results[0].is_error);
        assert_eq!(outcome.results[0].content, r#""ok""#);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_retry_runs_once() {
        let registry = ToolRegistry::new();
        let flaky = Arc::new(FlakyTool {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        registry.register(flaky.clone());
        let calls = [ToolCall::new("c1", "flaky", json!({}))];

        let (outcome, _) =
            run_batch(Some(&registry), &RetryPolicy::disabled(), &calls, &RunSignals::default()).await;
        assert!(outcome.results[0].is_error);
        assert!(outcome.results[0].content.contains("warming up"));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn interrupted_run_skips_execution() {
        let registry = registry();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let signals = RunSignals::new(cancel, CancellationToken::new());
        let calls = [ToolCall::new("c1", "add", json!({"a": 1, "b": 1}))];

        let (outcome, events) =
            run_batch(Some(&registry), &RetryPolicy::disabled(), &calls, &signals).await;
        assert_eq!(outcome.results[0].content, "Error: operation cancelled");
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn result_form_output_becomes_content() {
        let registry = registry();
        let calls = [ToolCall::new("c1", "cached", json!({}))];
        let (outcome, _) =
            run_batch(Some(&registry), &RetryPolicy::default(), &calls, &RunSignals::default()).await;
        assert_eq!(outcome.results[0].content, r#"{"hit":true}"#);
        assert!(!outcome.results[0].is_error);
    }

    #[tokio::test]
    async fn tool_reported_metadata_is_kept() {
        let output = CachedTool
            .execute_result(&ToolContext::default(), b"{}")
            .await
            .unwrap();
        let metadata = with_policy_retries(output.metadata, 2);
        assert_eq!(metadata.duration, Some(Duration::from_millis(3)));
        assert!(metadata.cached);
        // The tool reported no retries, so the policy's count fills in.
        assert_eq!(metadata.retries, 2);

        let reported = ToolMetadata {
            retries: 5,
            ..ToolMetadata::default()
        };
        assert_eq!(with_policy_retries(reported, 1).retries, 5);
        assert_eq!(with_policy_retries(ToolMetadata::default(), 0).retries, 0);
    }

    #[test]
    fn preview_cuts_on_char_boundary() {
        let short = "fine";
        assert_eq!(preview(short), "fine");

        let long = "é".repeat(250);
        let cut = preview(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), PREVIEW_CHARS + 3);
    }
}
