//! Streaming delta aggregation.
//!
//! Rebuilds one assistant message from the fragments of a streaming provider
//! call. Text and reasoning fragments are handed back as events for immediate
//! forwarding; tool call fragments accumulate in per-index slots until the
//! stream ends.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use spindle_core::{AgentEvent, ContentBlock, Message, StreamDelta, ToolCall, ToolCallDelta, Usage};
use tracing::warn;

/// Partial tool call state for one position index.
#[derive(Debug, Default)]
struct Slot {
    id: String,
    name: String,
    arguments: String,
}

impl Slot {
    fn absorb(&mut self, delta: ToolCallDelta) {
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            self.id = id;
        }
        if let Some(name) = delta.name.filter(|name| !name.is_empty()) {
            self.name = name;
        }
        if let Some(arguments) = delta.arguments {
            self.arguments.push_str(&arguments);
        }
    }

    fn finalize(self) -> ToolCall {
        let input = parse_arguments(&self.name, &self.arguments);
        ToolCall::new(self.id, self.name, input)
    }
}

/// Parse an accumulated argument buffer into a JSON object.
///
/// An empty buffer is an empty object. Anything that does not parse to an
/// object is logged and replaced by an empty object.
fn parse_arguments(tool: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            warn!(tool, kind = json_kind(&other), "Tool call arguments are not an object");
            Value::Object(Map::new())
        }
        Err(e) => {
            warn!(tool, error = %e, "Failed to parse tool call arguments");
            Value::Object(Map::new())
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Accumulates one streaming response.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    text: String,
    slots: BTreeMap<u32, Slot>,
    usage: Option<Usage>,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one delta, returning the event to forward, if any.
    pub fn push(&mut self, delta: StreamDelta) -> Option<AgentEvent> {
        match delta {
            StreamDelta::Text { text } if !text.is_empty() => {
                self.text.push_str(&text);
                Some(AgentEvent::Text { text })
            }
            StreamDelta::Reasoning { text } if !text.is_empty() => {
                Some(AgentEvent::Reasoning { text })
            }
            StreamDelta::Text { .. } | StreamDelta::Reasoning { .. } => None,
            StreamDelta::ToolCall(delta) => {
                self.slots.entry(delta.index).or_default().absorb(delta);
                None
            }
            StreamDelta::Usage(usage) => {
                self.usage = Some(usage);
                None
            }
        }
    }

    /// Number of distinct tool call indices seen so far.
    pub fn pending_tool_calls(&self) -> usize {
        self.slots.len()
    }

    /// Build the assistant message: accumulated text first, then tool calls
    /// in ascending index order.
    pub fn finish(self) -> (Message, Option<Usage>) {
        let mut content = Vec::with_capacity(1 + self.slots.len());
        if !self.text.is_empty() {
            content.push(ContentBlock::Text { text: self.text });
        }
        content.extend(
            self.slots
                .into_values()
                .map(|slot| ContentBlock::ToolCall(slot.finalize())),
        );
        (Message::assistant_blocks(content), self.usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_delta(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> StreamDelta {
        StreamDelta::ToolCall(ToolCallDelta {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: args.map(str::to_string),
        })
    }

    fn aggregate(deltas: Vec<StreamDelta>) -> (Vec<AgentEvent>, Message) {
        let mut agg = StreamAggregator::new();
        let events = deltas.into_iter().filter_map(|d| agg.push(d)).collect();
        let (message, _) = agg.finish();
        (events, message)
    }

    #[test]
    fn text_deltas_are_forwarded_and_joined() {
        let (events, message) = aggregate(vec![
            StreamDelta::Text { text: "Hel".into() },
            StreamDelta::Text { text: String::new() },
            StreamDelta::Text { text: "lo".into() },
        ]);
        assert_eq!(events.len(), 2);
        assert_eq!(message.text(), "Hello");
        assert!(!message.has_tool_calls());
    }

    #[test]
    fn reasoning_is_forwarded_but_not_kept() {
        let (events, message) = aggregate(vec![
            StreamDelta::Reasoning { text: "thinking".into() },
            StreamDelta::Text { text: "2".into() },
        ]);
        assert!(matches!(&events[0], AgentEvent::Reasoning { text } if text == "thinking"));
        assert_eq!(message.text(), "2");
    }

    #[test]
    fn fragmented_arguments_match_whole_delivery() {
        let whole = r#"{"a":1,"b":1,"op":"+"}"#;
        let (_, single) = aggregate(vec![tool_delta(0, Some("call_1"), Some("calculator"), Some(whole))]);

        // Every split point, with id and name arriving late.
        for split in 0..=whole.len() {
            let (head, tail) = whole.split_at(split);
            let (_, fragmented) = aggregate(vec![
                tool_delta(0, None, None, Some(head)),
                tool_delta(0, Some("call_1"), None, None),
                tool_delta(0, None, Some("calculator"), Some(tail)),
            ]);
            assert_eq!(fragmented.tool_calls(), single.tool_calls(), "split at {split}");
        }

        let calls = single.tool_calls();
        assert_eq!(calls[0].input, json!({"a": 1, "b": 1, "op": "+"}));
    }

    #[test]
    fn calls_are_ordered_by_index_not_arrival() {
        let (_, message) = aggregate(vec![
            tool_delta(2, Some("c"), Some("third"), Some("{}")),
            tool_delta(0, Some("a"), Some("first"), Some("{}")),
            tool_delta(1, Some("b"), Some("second"), Some("{}")),
        ]);
        let names: Vec<_> = message.tool_calls().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[test]
    fn gaps_in_indices_are_tolerated() {
        let (_, message) = aggregate(vec![
            tool_delta(5, Some("b"), Some("later"), None),
            tool_delta(1, Some("a"), Some("earlier"), None),
        ]);
        let names: Vec<_> = message.tool_calls().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["earlier", "later"]);
    }

    #[test]
    fn missing_arguments_finalize_to_empty_object() {
        let (_, message) = aggregate(vec![tool_delta(0, Some("a"), Some("clock"), None)]);
        assert_eq!(message.tool_calls()[0].input, json!({}));
    }

    #[test]
    fn malformed_arguments_finalize_to_empty_object() {
        let (_, message) = aggregate(vec![
            tool_delta(0, Some("a"), Some("search"), Some(r#"{"q": "ru"#)),
            tool_delta(1, Some("b"), Some("search"), Some("[1, 2]")),
        ]);
        let calls = message.tool_calls();
        assert_eq!(calls[0].input, json!({}));
        assert_eq!(calls[1].input, json!({}));
    }

    #[test]
    fn text_precedes_tool_calls() {
        let (_, message) = aggregate(vec![
            tool_delta(0, Some("a"), Some("search"), Some("{}")),
            StreamDelta::Text { text: "let me look".into() },
        ]);
        assert!(matches!(message.content[0], ContentBlock::Text { .. }));
        assert!(matches!(message.content[1], ContentBlock::ToolCall(_)));
    }

    #[test]
    fn usage_is_reported() {
        let mut agg = StreamAggregator::new();
        agg.push(StreamDelta::Usage(Usage {
            prompt_tokens: 4,
            completion_tokens: 1,
            total_tokens: 5,
        }));
        let (_, usage) = agg.finish();
        assert_eq!(usage.map(|u| u.total_tokens), Some(5));
    }
}
