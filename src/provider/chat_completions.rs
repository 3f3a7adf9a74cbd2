//! OpenAI-style chat-completions delta adapter.

use serde::Deserialize;

use super::ChunkAdapter;
use crate::error::ProviderError;
use crate::types::{FinishReason, StreamChunk, ToolCallDelta};

/// Adapter for `chat.completion.chunk` events.
#[derive(Debug, Default)]
pub struct ChatCompletionsAdapter;

impl ChatCompletionsAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ChunkAdapter for ChatCompletionsAdapter {
    fn adapt(&mut self, event: &serde_json::Value) -> Result<Option<StreamChunk>, ProviderError> {
        if let Some(error) = event.get("error") {
            return Err(error_from_body(error));
        }
        let chunk: ChatStreamChunk = serde_json::from_value(event.clone()).map_err(|err| {
            ProviderError::new(format!("malformed chat completion chunk: {err}"))
                .with_code("malformed_chunk")
        })?;
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(None);
        };

        let delta = choice.delta.unwrap_or_default();
        let tool_call_deltas = delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(position, call)| {
                let function = call.function.unwrap_or_default();
                ToolCallDelta {
                    index: call.index.unwrap_or(position),
                    id: call.id,
                    name: function.name,
                    arguments: function.arguments,
                }
            })
            .collect();

        let out = StreamChunk {
            content: delta.content,
            reasoning: delta.reasoning_content.or(delta.reasoning),
            tool_call_deltas,
            finish_reason: choice
                .finish_reason
                .as_deref()
                .and_then(FinishReason::parse_lenient),
        };
        Ok((out.has_payload() || out.finish_reason.is_some()).then_some(out))
    }
}

/// Build a [`ProviderError`] from an OpenAI-style `{"error": {...}}` body.
pub(crate) fn error_from_body(error: &serde_json::Value) -> ProviderError {
    let body: ErrorBody = serde_json::from_value(error.clone()).unwrap_or_default();
    let mut err = ProviderError::new(body.message.unwrap_or_else(|| error.to_string()));
    err.status = body.status;
    err.code = body.code.map(|code| match code {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    });
    err.error_type = body.error_type;
    err.request_id = body.request_id;
    err
}

#[derive(Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    delta: Option<ChatStreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatStreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
    tool_calls: Option<Vec<ChatToolCallDelta>>,
}

#[derive(Deserialize)]
struct ChatToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<ChatFunctionDelta>,
}

#[derive(Deserialize, Default)]
struct ChatFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    message: Option<String>,
    status: Option<u16>,
    code: Option<serde_json::Value>,
    #[serde(rename = "type")]
    error_type: Option<String>,
    request_id: Option<String>,
}
