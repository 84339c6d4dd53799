//! Reassembly of streamed answers.

use std::collections::BTreeMap;

use super::events::AgentEvent;
use crate::provider::{ChatResponse, Message, StreamChunk, ToolCall, Usage};

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Collects stream fragments into one assistant message.
///
/// Content fragments are concatenated. Tool-call fragments are merged by
/// index, appending name and argument pieces in arrival order. Nothing is
/// final until [`StreamAccumulator::finish`].
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    calls: BTreeMap<usize, PartialToolCall>,
    usage: Option<Usage>,
    done: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one chunk, returning the event to forward for it.
    pub fn push(&mut self, chunk: StreamChunk) -> Option<AgentEvent> {
        match chunk {
            StreamChunk::Content(text) => {
                if text.is_empty() {
                    return None;
                }
                self.content.push_str(&text);
                Some(AgentEvent::Content { text })
            }
            StreamChunk::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => {
                let call = self.calls.entry(index).or_default();
                if let Some(id) = id.as_ref().filter(|id| !id.is_empty()) {
                    call.id.get_or_insert_with(|| id.clone());
                }
                if let Some(name) = &name {
                    call.name.push_str(name);
                }
                if let Some(arguments) = &arguments {
                    call.arguments.push_str(arguments);
                }
                Some(AgentEvent::ToolCallFragment {
                    index,
                    id,
                    name,
                    arguments,
                })
            }
            StreamChunk::Done { usage } => {
                if usage.is_some() {
                    self.usage = usage;
                }
                self.done = true;
                None
            }
        }
    }

    /// True once the end-of-stream chunk arrived.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Build the final message. Calls that never received a name are dropped.
    pub fn finish(self) -> ChatResponse {
        let tool_calls = self
            .calls
            .into_iter()
            .filter(|(_, call)| !call.name.is_empty())
            .map(|(index, call)| {
                let id = call.id.unwrap_or_else(|| format!("call_{}", index));
                ToolCall::new(id, call.name, call.arguments)
            })
            .collect();

        ChatResponse {
            message: Message::assistant_with_tools(Some(self.content), tool_calls),
            usage: self.usage,
        }
    }
}
