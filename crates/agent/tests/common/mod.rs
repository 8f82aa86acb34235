//! Scripted providers, tools and tool servers shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use spindle_core::{
    AgentEvent, DeltaStream, Message, Provider, ProviderError, ProviderRequest, ProviderResponse,
    StreamDelta, Tool, ToolCall, ToolCallDelta, ToolContext, ToolError, ToolServer,
    ToolServerError, Usage, parse_input,
};
use tokio::sync::mpsc;

/// One scripted provider reaction.
pub enum Step {
    Respond(ProviderResponse),
    Fail(ProviderError),
    Stream(Vec<StreamDelta>),
    Panic(&'static str),
}

/// A provider that replays a script, one step per call.
#[derive(Default)]
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
    close_error: Option<String>,
    closes: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    pub fn failing_close(mut self, reason: &str) -> Self {
        self.close_error = Some(reason.to_string());
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn next(&self, request: ProviderRequest) -> Option<Step> {
        self.requests.lock().unwrap().push(request);
        self.steps.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.next(request) {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Panic(message)) => panic!("{message}"),
            Some(Step::Stream(_)) => Err(ProviderError::Other("stream step in blocking call".into())),
            None => Err(ProviderError::Other("script exhausted".into())),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<DeltaStream, ProviderError> {
        let deltas = match self.next(request) {
            Some(Step::Stream(deltas)) => deltas,
            Some(Step::Fail(err)) => return Err(err),
            Some(Step::Panic(message)) => panic!("{message}"),
            Some(Step::Respond(_)) => {
                return Err(ProviderError::Other("blocking step in streaming call".into()));
            }
            None => return Err(ProviderError::Other("script exhausted".into())),
        };
        let (tx, rx) = mpsc::channel(deltas.len().max(1));
        for delta in deltas {
            tx.send(Ok(delta)).await.unwrap();
        }
        Ok(rx)
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        match &self.close_error {
            Some(reason) => Err(ProviderError::Network(reason.clone())),
            None => Ok(()),
        }
    }
}

pub fn text(text: &str) -> Step {
    Step::Respond(ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 2,
            total_tokens: 12,
        }),
        model: "scripted-model".into(),
    })
}

pub fn tool_calls(calls: Vec<ToolCall>) -> Step {
    let message = calls
        .into_iter()
        .fold(Message::assistant_blocks(vec![]), Message::with_tool_call);
    Step::Respond(ProviderResponse {
        message,
        usage: Some(Usage {
            prompt_tokens: 20,
            completion_tokens: 5,
            total_tokens: 25,
        }),
        model: "scripted-model".into(),
    })
}

pub fn calc_call(id: &str, a: f64, b: f64, op: &str) -> ToolCall {
    ToolCall::new(id, "calculator", json!({"a": a, "b": b, "op": op}))
}

pub fn text_delta(text: &str) -> StreamDelta {
    StreamDelta::Text { text: text.into() }
}

pub fn call_delta(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> StreamDelta {
    StreamDelta::ToolCall(ToolCallDelta {
        index,
        id: id.map(str::to_string),
        name: name.map(str::to_string),
        arguments: args.map(str::to_string),
    })
}

/// Drain a run's queue.
pub async fn drain(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

pub fn event_types(events: &[AgentEvent]) -> Vec<&'static str> {
    events.iter().map(AgentEvent::event_type).collect()
}

// --- Tools ---

pub struct Calculator;

#[derive(serde::Deserialize)]
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
        "Basic arithmetic on two numbers"
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
        vec![json!({"a": 2, "b": 3, "op": "*"})]
    }

    async fn execute(&self, _ctx: &ToolContext, input: &[u8]) -> Result<Value, ToolError> {
        let input: CalcInput = parse_input(input)?;
        let value = match input.op.as_str() {
            "+" => input.a + input.b,
            "-" => input.a - input.b,
            "*" => input.a * input.b,
            "/" if input.b == 0.0 => return Err(ToolError::failed("calculator", "division by zero")),
            "/" => input.a / input.b,
            other => return Err(ToolError::InvalidArguments(format!("unknown op {other}"))),
        };
        if value.fract() == 0.0 {
            Ok(json!(value as i64))
        } else {
            Ok(json!(value))
        }
    }
}

/// Panics on every call.
pub struct PanickingSearch;

#[async_trait]
impl Tool for PanickingSearch {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Searches an index that is broken"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"q": {"type": "string"}}})
    }

    async fn execute(&self, _ctx: &ToolContext, _input: &[u8]) -> Result<Value, ToolError> {
        panic!("search index corrupted");
    }
}

/// Always fails with a transient error.
#[derive(Default)]
pub struct AlwaysBusy {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Tool for AlwaysBusy {
    fn name(&self) -> &str {
        "busy"
    }

    fn description(&self) -> &str {
        "Never available"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _ctx: &ToolContext, _input: &[u8]) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ToolError::Unavailable {
            tool_name: "busy".into(),
            reason: "backend warming up".into(),
        })
    }
}

/// Waits until the run is interrupted, then returns.
pub struct WaitForStop;

#[async_trait]
impl Tool for WaitForStop {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Blocks until the run is interrupted"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, ctx: &ToolContext, _input: &[u8]) -> Result<Value, ToolError> {
        let reason = ctx.signals.interrupted().await;
        Ok(json!(format!("woke: {reason}")))
    }
}

/// Echoes the agent id it was called for.
pub struct WhoAmI;

#[async_trait]
impl Tool for WhoAmI {
    fn name(&self) -> &str {
        "whoami"
    }

    fn description(&self) -> &str {
        "Reports the calling agent"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, ctx: &ToolContext, _input: &[u8]) -> Result<Value, ToolError> {
        Ok(json!(ctx.agent_id))
    }
}

// --- Tool servers ---

/// A tool server with scripted failures.
pub struct MockServer {
    name: String,
    fail_connect: bool,
    fail_load: bool,
    fail_close: bool,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
}

impl MockServer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            fail_connect: false,
            fail_load: false,
            fail_close: false,
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolServer for MockServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), ToolServerError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(ToolServerError::Connect {
                server: self.name.clone(),
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }

    async fn load_tools(&self) -> Result<Vec<Arc<dyn Tool>>, ToolServerError> {
        if self.fail_load {
            return Err(ToolServerError::LoadTools {
                server: self.name.clone(),
                reason: "malformed tool list".into(),
            });
        }
        Ok(vec![Arc::new(WhoAmI)])
    }

    async fn close(&self) -> Result<(), ToolServerError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(ToolServerError::Close {
                server: self.name.clone(),
                reason: "broken pipe".into(),
            });
        }
        Ok(())
    }
}
