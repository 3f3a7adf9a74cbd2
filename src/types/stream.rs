//! Streaming types.

use serde::{Deserialize, Serialize};

use super::generation::FinishReason;

/// One provider-neutral delta chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_call_deltas: Vec<ToolCallDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn reasoning(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: Some(reasoning.into()),
            ..Default::default()
        }
    }

    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            tool_call_deltas: vec![delta],
            ..Default::default()
        }
    }

    pub fn finish(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Default::default()
        }
    }

    /// Whether the chunk carries anything besides a finish reason.
    pub fn has_payload(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.is_empty())
            || self.reasoning.as_deref().is_some_and(|r| !r.is_empty())
            || !self.tool_call_deltas.is_empty()
    }
}

/// A fragment of a tool call, keyed by its position in the message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    /// The opening fragment of a call.
    pub fn start(index: usize, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index,
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: None,
        }
    }

    /// A continuation fragment carrying more argument text.
    pub fn arguments(index: usize, arguments: impl Into<String>) -> Self {
        Self {
            index,
            arguments: Some(arguments.into()),
            ..Default::default()
        }
    }
}
