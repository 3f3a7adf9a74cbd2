//! Reassembly of streamed provider chunks into one assistant message.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{ContentPart, FinishReason, Message, Role, StreamChunk, ToolCall};

/// Live feedback for the host while a message is still streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialUpdate {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_tool_name: Option<String>,
    /// Best-effort parse of the active call's arguments so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_tool_args: Option<serde_json::Value>,
}

/// A tool call as accumulated so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSnapshot {
    pub id: String,
    pub name: String,
    pub raw_arguments: String,
}

/// What one pushed chunk changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushOutcome {
    pub update: Option<PartialUpdate>,
    /// Calls that appeared or grew in this chunk, in index order.
    pub touched_calls: Vec<CallSnapshot>,
    /// The chunk carried a finish reason.
    pub finished: bool,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates one assistant message from a chunk sequence.
///
/// Content and reasoning concatenate; tool-call fragments concatenate per
/// index. Once a finish reason arrives, or [`finalize`](Self::finalize) is
/// called, later chunks are ignored.
#[derive(Debug, Default)]
pub struct StreamConsumer {
    content: String,
    reasoning: String,
    calls: BTreeMap<usize, PartialCall>,
    finish_reason: Option<FinishReason>,
    finished: bool,
    finalized: bool,
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: StreamChunk) -> PushOutcome {
        if self.finished || self.finalized {
            return PushOutcome::default();
        }

        let has_payload = chunk.has_payload();
        if let Some(content) = chunk.content {
            self.content.push_str(&content);
        }
        if let Some(reasoning) = chunk.reasoning {
            self.reasoning.push_str(&reasoning);
        }

        let mut touched = Vec::new();
        let mut active = None;
        for delta in chunk.tool_call_deltas {
            let call = self.calls.entry(delta.index).or_insert_with(|| PartialCall {
                id: delta
                    .id
                    .clone()
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| generated_call_id(delta.index)),
                ..Default::default()
            });
            if let Some(name) = delta.name.filter(|n| !n.is_empty()) {
                if call.name.is_empty() {
                    call.name = name;
                } else if call.name != name {
                    call.name.push_str(&name);
                }
            }
            if let Some(arguments) = delta.arguments {
                call.arguments.push_str(&arguments);
            }
            if !touched.contains(&delta.index) {
                touched.push(delta.index);
            }
            active = Some(delta.index);
        }

        let touched_calls = touched
            .into_iter()
            .filter_map(|index| self.calls.get(&index))
            .map(|call| CallSnapshot {
                id: call.id.clone(),
                name: call.name.clone(),
                raw_arguments: call.arguments.clone(),
            })
            .collect();

        let update = has_payload.then(|| {
            let active = active
                .or_else(|| self.calls.keys().next_back().copied())
                .and_then(|index| self.calls.get(&index));
            PartialUpdate {
                content: self.content.clone(),
                reasoning: (!self.reasoning.is_empty()).then(|| self.reasoning.clone()),
                active_tool_name: active
                    .filter(|call| !call.name.is_empty())
                    .map(|call| call.name.clone()),
                active_tool_args: active.and_then(|call| best_effort_args(&call.arguments)),
            }
        });

        if let Some(reason) = chunk.finish_reason {
            self.finish_reason = Some(reason);
            self.finished = true;
        }

        PushOutcome {
            update,
            touched_calls,
            finished: self.finished,
        }
    }

    /// Whether a finish reason has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// Build the assistant message. Returns `None` on every call after the first.
    ///
    /// A stream that ended without a finish reason is treated as an implicit stop.
    pub fn finalize(&mut self) -> Option<Message> {
        if self.finalized {
            return None;
        }
        self.finalized = true;
        if self.finish_reason.is_none() {
            self.finish_reason = Some(FinishReason::Stop);
        }

        let mut content = Vec::new();
        if !self.reasoning.is_empty() {
            content.push(ContentPart::Reasoning {
                text: std::mem::take(&mut self.reasoning),
            });
        }
        if !self.content.is_empty() {
            content.push(ContentPart::Text {
                text: std::mem::take(&mut self.content),
            });
        }
        let tool_calls = std::mem::take(&mut self.calls)
            .into_values()
            .map(|call| ToolCall::new(call.id, call.name, call.arguments))
            .collect();

        Some(Message {
            role: Role::Assistant,
            content,
            tool_calls,
            timestamp: Some(chrono::Utc::now()),
        })
    }
}

fn generated_call_id(index: usize) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("call_{index}_{}", &suffix[..8])
}

fn best_effort_args(partial: &str) -> Option<serde_json::Value> {
    if partial.trim().is_empty() {
        return None;
    }
    Some(
        serde_json::from_str(partial)
            .unwrap_or_else(|_| serde_json::json!({ "raw": partial })),
    )
}
