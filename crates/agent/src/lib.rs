//! The Spindle agent runtime.
//!
//! An agent takes user text and drives a **turn**:
//!
//! 1. **Receive** the text and append it to the shared history
//! 2. **Call** the provider with the history, system prompt and tool schemas
//! 3. **If tool calls**: execute them (with retry), append the results, go to 2
//! 4. **If text only**: finish with a [`TurnResult`](spindle_core::TurnResult)
//!
//! Progress is reported as [`AgentEvent`](spindle_core::AgentEvent)s on a
//! bounded queue. A turn can be cancelled by the caller or stopped by
//! [`Agent::close`]; panics inside tools or the loop become error results or
//! a terminal error event, never a crashed caller.

mod guard;
mod loop_runner;

pub mod aggregator;
pub mod builder;
pub mod lifecycle;
pub mod orchestrator;
pub mod retry;
pub mod sink;

pub use aggregator::StreamAggregator;
pub use builder::{AgentBuilder, ProviderFactory};
pub use lifecycle::Agent;
pub use orchestrator::{BatchOutcome, ToolOrchestrator};
pub use retry::{
    Retried, RetryError, RetryPolicy, is_retriable, looks_transient, retry_with_backoff,
};
pub use sink::{EVENT_QUEUE_CAPACITY, EventSink};
