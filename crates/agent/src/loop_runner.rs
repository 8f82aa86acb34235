//! The turn loop.
//!
//! One turn runs model calls until the model answers without requesting
//! tools:
//!
//! 1. **Check** the run's signals; stop with `Cancelled`/`Stopped` if fired
//! 2. **Call** the provider with a snapshot of the history
//! 3. **Append** the model's message to the history
//! 4. **Finish** if it requested no tools
//! 5. **Execute** the requested tools, append their results, loop back to 1
//!
//! Signals are observed only between iterations and while waiting to retry
//! a tool; a provider call in flight completes on its own terms.

use spindle_core::{AgentError, AgentEvent, Message, RunSignals, TurnResult, Usage};
use tracing::debug;

use crate::aggregator::StreamAggregator;
use crate::lifecycle::AgentInner;
use crate::orchestrator::ToolOrchestrator;
use crate::sink::EventSink;

/// Drives one turn for an agent.
pub(crate) struct TurnLoop<'a> {
    agent: &'a AgentInner,
    signals: &'a RunSignals,
    sink: &'a EventSink,
    streaming: bool,
}

impl<'a> TurnLoop<'a> {
    pub(crate) fn new(
        agent: &'a AgentInner,
        signals: &'a RunSignals,
        sink: &'a EventSink,
        streaming: bool,
    ) -> Self {
        Self {
            agent,
            signals,
            sink,
            streaming,
        }
    }

    /// Name used when a panic escapes the loop.
    pub(crate) fn context(&self) -> &'static str {
        if self.streaming {
            "streaming loop"
        } else {
            "execution loop"
        }
    }

    /// Run until the model stops requesting tools.
    ///
    /// `start` is the history index of the user message that opened the turn.
    pub(crate) async fn run(&self, start: usize) -> Result<TurnResult, AgentError> {
        let mut tools_used = Vec::new();
        let mut step_count = 0usize;
        let mut total_tokens = 0u64;

        loop {
            self.signals.check()?;
            step_count += 1;

            debug!(
                agent_id = %self.agent.id(),
                step = step_count,
                streaming = self.streaming,
                "Turn loop iteration"
            );

            let (message, usage) = if self.streaming {
                self.call_streaming().await?
            } else {
                self.call_blocking().await?
            };
            if let Some(usage) = usage {
                total_tokens += u64::from(usage.total_tokens);
            }

            self.agent.append_message(message.clone());

            let calls = message.tool_calls();
            if calls.is_empty() {
                let text = message.text();
                if !self.streaming && !text.is_empty() {
                    self.sink.emit(AgentEvent::Text { text: text.clone() }).await;
                }
                return Ok(TurnResult {
                    text,
                    messages: self.agent.messages_since(start),
                    tools_used,
                    step_count,
                    total_tokens,
                });
            }

            for call in &calls {
                self.sink
                    .emit(AgentEvent::ToolCall { call: call.clone() })
                    .await;
            }

            let registry = self.agent.registry();
            let batch = ToolOrchestrator::new(
                self.agent.id(),
                registry.as_deref(),
                self.agent.retry_policy(),
            )
            .execute_batch(&calls, self.signals, self.sink)
            .await;

            tools_used.extend(batch.tools_used);
            self.agent.append_message(Message::tool_results(batch.blocks));
        }
    }

    async fn call_blocking(&self) -> Result<(Message, Option<Usage>), AgentError> {
        let request = self.agent.provider_request(false);
        let response = self.agent.provider().complete(request).await?;
        Ok((response.message, response.usage))
    }

    async fn call_streaming(&self) -> Result<(Message, Option<Usage>), AgentError> {
        let request = self.agent.provider_request(true);
        let mut stream = self.agent.provider().stream(request).await?;

        let mut aggregator = StreamAggregator::new();
        while let Some(delta) = stream.recv().await {
            if let Some(event) = aggregator.push(delta?) {
                self.sink.emit(event).await;
            }
        }

        debug!(
            agent_id = %self.agent.id(),
            tool_calls = aggregator.pending_tool_calls(),
            "Stream finished"
        );
        Ok(aggregator.finish())
    }
}
