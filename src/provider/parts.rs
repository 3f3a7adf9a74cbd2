//! Part-based (`candidates[].content.parts[]`) delta adapter.
//!
//! Function calls arrive whole rather than as argument fragments, and carry
//! no index, so the adapter numbers them in arrival order.

use serde::Deserialize;

use super::ChunkAdapter;
use crate::error::ProviderError;
use crate::types::{FinishReason, StreamChunk, ToolCallDelta};

#[derive(Debug, Default)]
pub struct PartsAdapter {
    next_tool_index: usize,
}

impl PartsAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkAdapter for PartsAdapter {
    fn adapt(&mut self, event: &serde_json::Value) -> Result<Option<StreamChunk>, ProviderError> {
        if let Some(error) = event.get("error") {
            return Err(error_from_body(error));
        }
        let response: PartsResponse = serde_json::from_value(event.clone()).map_err(|err| {
            ProviderError::new(format!("malformed parts chunk: {err}")).with_code("malformed_chunk")
        })?;
        let Some(candidate) = response.candidates.into_iter().next() else {
            return Ok(None);
        };

        let mut chunk = StreamChunk::default();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text {
                let target = if part.thought.unwrap_or(false) {
                    &mut chunk.reasoning
                } else {
                    &mut chunk.content
                };
                target.get_or_insert_with(String::new).push_str(&text);
            }
            if let Some(call) = part.function_call {
                let arguments = call
                    .args
                    .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
                chunk.tool_call_deltas.push(ToolCallDelta {
                    index: self.next_tool_index,
                    id: call.id,
                    name: Some(call.name),
                    arguments: Some(arguments.to_string()),
                });
                self.next_tool_index += 1;
            }
        }
        chunk.finish_reason = candidate
            .finish_reason
            .as_deref()
            .and_then(FinishReason::parse_lenient);
        if chunk.finish_reason == Some(FinishReason::Stop) && !chunk.tool_call_deltas.is_empty() {
            chunk.finish_reason = Some(FinishReason::ToolCalls);
        }

        Ok((chunk.has_payload() || chunk.finish_reason.is_some()).then_some(chunk))
    }
}

fn error_from_body(error: &serde_json::Value) -> ProviderError {
    let body: PartsError = serde_json::from_value(error.clone()).unwrap_or_default();
    let mut err = ProviderError::new(body.message.unwrap_or_else(|| error.to_string()));
    err.status = body.code;
    err.error_type = body.status;
    err
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartsResponse {
    #[serde(default)]
    candidates: Vec<PartsCandidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartsCandidate {
    content: Option<PartsContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct PartsContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    thought: Option<bool>,
    function_call: Option<FunctionCall>,
}

#[derive(Deserialize)]
struct FunctionCall {
    id: Option<String>,
    name: String,
    args: Option<serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct PartsError {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn function_calls_are_numbered_across_events() {
        let mut adapter = PartsAdapter::new();
        let event = json!({"candidates": [{"content": {"parts": [
            {"functionCall": {"name": "read_file", "args": {"path": "a.rs"}}}
        ]}}]});

        let first = adapter.adapt(&event).unwrap().unwrap();
        let second = adapter.adapt(&event).unwrap().unwrap();

        assert_eq!(first.tool_call_deltas[0].index, 0);
        assert_eq!(second.tool_call_deltas[0].index, 1);
        assert_eq!(
            first.tool_call_deltas[0].arguments.as_deref(),
            Some(r#"{"path":"a.rs"}"#)
        );
    }

    #[test]
    fn thought_parts_become_reasoning() {
        let mut adapter = PartsAdapter::new();
        let chunk = adapter
            .adapt(&json!({"candidates": [{
                "content": {"parts": [{"text": "hmm", "thought": true}, {"text": "Done."}]},
                "finishReason": "STOP"
            }]}))
            .unwrap()
            .unwrap();
        assert_eq!(chunk.reasoning.as_deref(), Some("hmm"));
        assert_eq!(chunk.content.as_deref(), Some("Done."));
        assert_eq!(chunk.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn error_status_maps_onto_provider_error() {
        let mut adapter = PartsAdapter::new();
        let err = adapter
            .adapt(&json!({"error": {"code": 503, "message": "overloaded", "status": "UNAVAILABLE"}}))
            .unwrap_err();
        assert_eq!(err.status, Some(503));
        assert_eq!(err.error_type.as_deref(), Some("UNAVAILABLE"));
    }
}
