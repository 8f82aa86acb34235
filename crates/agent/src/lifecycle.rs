//! The agent handle: shared history, state machine, run entry point and
//! resource teardown.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use spindle_config::AgentConfig;
use spindle_core::{
    AgentError, AgentEvent, AgentState, AgentStatus, Message, Provider, ProviderRequest,
    ReleaseFailure, RunOptions, RunSignals, ShutdownError, Tool, ToolRegistry, ToolServer,
    TurnResult,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::guard::catch_panic;
use crate::loop_runner::TurnLoop;
use crate::retry::RetryPolicy;
use crate::sink::EventSink;

/// Everything an agent is assembled from.
pub(crate) struct AgentParts {
    pub id: String,
    pub config: AgentConfig,
    pub provider: Arc<dyn Provider>,
    pub registry: Option<Arc<ToolRegistry>>,
    pub tool_servers: Vec<Arc<dyn ToolServer>>,
    pub retry: RetryPolicy,
}

/// Mutable state, always accessed under one lock.
#[derive(Debug, Default)]
struct Shared {
    state: AgentState,
    messages: Vec<Message>,
    step_count: u64,
    last_activity: Option<DateTime<Utc>>,
    active_runs: usize,
}

pub(crate) struct AgentInner {
    id: String,
    created_at: DateTime<Utc>,
    config: AgentConfig,
    provider: Arc<dyn Provider>,
    registry: Option<Arc<ToolRegistry>>,
    tool_servers: Vec<Arc<dyn ToolServer>>,
    retry: RetryPolicy,
    stop: CancellationToken,
    shared: Mutex<Shared>,
}

impl AgentInner {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub(crate) fn registry(&self) -> Option<Arc<ToolRegistry>> {
        self.registry.clone()
    }

    pub(crate) fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one message, returning its index.
    pub(crate) fn append_message(&self, message: Message) -> usize {
        let mut shared = self.shared();
        shared.messages.push(message);
        shared.step_count += 1;
        shared.last_activity = Some(Utc::now());
        shared.messages.len() - 1
    }

    /// Copy of the history.
    pub(crate) fn messages(&self) -> Vec<Message> {
        self.shared().messages.clone()
    }

    /// Copy of the history from `start` on.
    pub(crate) fn messages_since(&self, start: usize) -> Vec<Message> {
        let shared = self.shared();
        shared.messages.get(start..).map(<[Message]>::to_vec).unwrap_or_default()
    }

    /// A provider request over a snapshot of the current history.
    pub(crate) fn provider_request(&self, stream: bool) -> ProviderRequest {
        ProviderRequest {
            model: self.config.llm.model.clone(),
            system: self.config.prompt.clone(),
            messages: self.messages(),
            temperature: self.config.llm.temperature,
            max_tokens: Some(self.config.max_tokens),
            tools: self
                .registry
                .as_ref()
                .map(|registry| registry.definitions())
                .unwrap_or_default(),
            stream,
        }
    }

    /// `Ready | Running → Running`, counting the run. Rejects stopping agents.
    fn begin_run(&self) -> Result<(), AgentError> {
        let mut shared = self.shared();
        if !shared.state.accepts_runs() {
            return Err(AgentError::Stopped);
        }
        shared.state = AgentState::Running;
        shared.active_runs += 1;
        Ok(())
    }

    /// `Running → Ready` once the last concurrent run exits. Never overrides
    /// a shutdown that started meanwhile.
    fn end_run(&self) {
        let mut shared = self.shared();
        shared.active_runs = shared.active_runs.saturating_sub(1);
        if shared.active_runs == 0 && shared.state == AgentState::Running {
            shared.state = AgentState::Ready;
        }
    }

    async fn drive(
        &self,
        text: String,
        options: RunOptions,
        signals: &RunSignals,
        sink: &EventSink,
    ) -> Result<TurnResult, AgentError> {
        let start = self.append_message(Message::user(text));
        let turn = TurnLoop::new(self, signals, sink, options.streaming);

        match catch_panic(turn.run(start)).await {
            Ok(outcome) => outcome,
            Err(message) => {
                error!(agent_id = %self.id, panic = %message, "Panic in {}", turn.context());
                Err(AgentError::Panicked {
                    context: turn.context().to_string(),
                    message,
                })
            }
        }
    }
}

/// A conversational agent.
///
/// Cheap to clone; clones share history and state. Built with
/// [`crate::AgentBuilder`].
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    pub(crate) fn from_parts(parts: AgentParts) -> Self {
        let agent = Self {
            inner: Arc::new(AgentInner {
                id: parts.id,
                created_at: Utc::now(),
                config: parts.config,
                provider: parts.provider,
                registry: parts.registry,
                tool_servers: parts.tool_servers,
                retry: parts.retry,
                stop: CancellationToken::new(),
                shared: Mutex::new(Shared::default()),
            }),
        };
        info!(id = %agent.id(), name = %agent.name(), "Agent created");
        agent
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn parent_id(&self) -> &str {
        &self.inner.config.parent_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Start a turn for `text` and return its event queue.
    ///
    /// The turn runs as its own task. The queue holds
    /// [`crate::EVENT_QUEUE_CAPACITY`] events; a slow consumer suspends the
    /// turn rather than losing events. The last event before the queue closes
    /// is always exactly one `Done` or `Error`. A stopping or stopped agent
    /// answers with a single `Stopped` error and starts nothing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(
        &self,
        text: impl Into<String>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<AgentEvent> {
        let (sink, rx) = EventSink::channel();

        if let Err(err) = self.inner.begin_run() {
            debug!(agent_id = %self.id(), "Run rejected: agent is stopping or stopped");
            tokio::spawn(async move { sink.emit(AgentEvent::Error { error: err }).await });
            return rx;
        }

        let inner = Arc::clone(&self.inner);
        let signals = RunSignals::new(cancel, inner.stop.clone());
        let text = text.into();

        tokio::spawn(async move {
            let outcome = catch_panic(inner.drive(text, options, &signals, &sink)).await;
            inner.end_run();

            let terminal = match outcome {
                Ok(Ok(result)) => AgentEvent::Done { result },
                Ok(Err(error)) => AgentEvent::Error { error },
                Err(message) => {
                    error!(agent_id = %inner.id, panic = %message, "Panic in run task");
                    AgentEvent::Error {
                        error: AgentError::Panicked {
                            context: "agent run".into(),
                            message,
                        },
                    }
                }
            };
            sink.emit(terminal).await;
        });

        rx
    }

    /// Run in blocking mode and wait for the turn's outcome.
    pub async fn chat(
        &self,
        text: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<TurnResult, AgentError> {
        collect_outcome(self.run(text, RunOptions::blocking(), cancel)).await
    }

    pub fn state(&self) -> AgentState {
        self.inner.shared().state
    }

    pub fn status(&self) -> AgentStatus {
        let shared = self.inner.shared();
        AgentStatus {
            agent_id: self.inner.id.clone(),
            state: shared.state,
            step_count: shared.step_count,
            message_count: shared.messages.len(),
            last_activity: shared.last_activity,
        }
    }

    /// A copy of the conversation history.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.messages()
    }

    /// A deep copy of the configuration. Changing it does not affect the agent.
    pub fn config(&self) -> AgentConfig {
        self.inner.config.snapshot()
    }

    pub fn tool_registry(&self) -> Option<Arc<ToolRegistry>> {
        self.inner.registry()
    }

    /// Add or replace a tool. Takes effect from the next loop iteration.
    pub fn add_tool(&self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let registry = self.inner.registry.as_ref().ok_or(AgentError::NoToolRegistry)?;
        let name = tool.name().to_string();
        if registry.register(tool).is_some() {
            info!(agent_id = %self.id(), tool = %name, "Tool replaced");
        } else {
            info!(agent_id = %self.id(), tool = %name, "Tool added");
        }
        Ok(())
    }

    /// Remove a tool. A call already executing keeps its handle and finishes.
    pub fn remove_tool(&self, name: &str) -> Result<(), AgentError> {
        let registry = self.inner.registry.as_ref().ok_or(AgentError::NoToolRegistry)?;
        registry.unregister(name)?;
        info!(agent_id = %self.id(), tool = name, "Tool removed");
        Ok(())
    }

    /// Shut the agent down.
    ///
    /// Signals running turns to stop at their next iteration boundary, then
    /// releases the provider and every tool server, collecting release
    /// failures instead of stopping at the first. Calling it again once
    /// shutdown has begun returns `Ok(())` and releases nothing twice.
    pub async fn close(&self) -> Result<(), AgentError> {
        {
            let mut shared = self.inner.shared();
            if matches!(shared.state, AgentState::Stopping | AgentState::Stopped) {
                return Ok(());
            }
            shared.state = AgentState::Stopping;
        }

        self.inner.stop.cancel();

        let mut failures = Vec::new();
        if let Err(e) = self.inner.provider.close().await {
            warn!(agent_id = %self.id(), error = %e, "Failed to close provider");
            failures.push(ReleaseFailure {
                resource: "provider".into(),
                reason: e.to_string(),
            });
        }
        for server in &self.inner.tool_servers {
            if let Err(e) = server.close().await {
                warn!(agent_id = %self.id(), server = server.name(), error = %e, "Failed to close tool server");
                failures.push(ReleaseFailure {
                    resource: format!("tool server {}", server.name()),
                    reason: e.to_string(),
                });
            }
        }

        self.inner.shared().state = AgentState::Stopped;
        info!(id = %self.id(), "Agent closed");

        ShutdownError::from_failures(failures).map_err(AgentError::from)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("provider", &self.inner.provider.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Drain a run's queue into its outcome.
pub(crate) async fn collect_outcome(
    mut events: mpsc::Receiver<AgentEvent>,
) -> Result<TurnResult, AgentError> {
    let mut outcome = None;
    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::Done { result } => outcome = Some(Ok(result)),
            AgentEvent::Error { error } => outcome = Some(Err(error)),
            _ => {}
        }
    }
    outcome.unwrap_or_else(|| {
        Err(AgentError::Panicked {
            context: "agent run".into(),
            message: "event queue closed without a terminal event".into(),
        })
    })
}
