//! Message types for model communication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    fn with_role(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_role(Role::System, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_role(
            Role::Assistant,
            vec![ContentPart::Text { text: text.into() }],
        )
    }

    /// Create an assistant message carrying tool calls.
    pub fn assistant_with_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let text = text.into();
        let content = if text.is_empty() {
            Vec::new()
        } else {
            vec![ContentPart::Text { text }]
        };
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// Create a tool result message.
    pub fn tool_result(result: ToolResult) -> Self {
        Self::with_role(Role::Tool, vec![ContentPart::ToolResult(result)])
    }

    /// Extract the text content, concatenating all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract the reasoning content, if any.
    pub fn reasoning(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Reasoning { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        (!parts.is_empty()).then(|| parts.join(""))
    }

    /// The tool result carried by a `tool` message.
    pub fn as_tool_result(&self) -> Option<&ToolResult> {
        self.content.iter().find_map(|part| match part {
            ContentPart::ToolResult(result) => Some(result),
            _ => None,
        })
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Reasoning { text: String },
    ToolResult(ToolResult),
}

/// Which path produced a tool call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallOrigin {
    /// Streamed as a structured tool call by the provider.
    #[default]
    Native,
    /// The whole message content was one `{name, arguments}` object.
    DirectJson,
    /// Found inside a fenced code block.
    FencedBlock,
    /// Split out of concatenated top-level JSON values.
    Splitter,
    /// A literal `*** Begin Patch` block.
    PatchFallback,
}

impl ToolCallOrigin {
    /// Prefix for ids of calls synthesized along this path.
    pub fn id_prefix(self) -> &'static str {
        match self {
            Self::Native => "call_",
            Self::DirectJson => "call_direct_",
            Self::FencedBlock => "call_fence_",
            Self::Splitter => "call_split_",
            Self::PatchFallback => "call_patch_",
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Arguments exactly as the model produced them.
    pub raw_arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_arguments: Option<serde_json::Value>,
    #[serde(default)]
    pub origin: ToolCallOrigin,
}

impl ToolCall {
    /// Create a native tool call, parsing the arguments best-effort.
    pub fn new(id: impl Into<String>, name: impl Into<String>, raw_arguments: impl Into<String>) -> Self {
        let raw_arguments = raw_arguments.into();
        let parsed_arguments = serde_json::from_str(&raw_arguments).ok();
        Self {
            id: id.into(),
            name: name.into(),
            raw_arguments,
            parsed_arguments,
            origin: ToolCallOrigin::Native,
        }
    }

    /// Create a recovered tool call with a fresh id carrying the origin's prefix.
    pub fn recovered(origin: ToolCallOrigin, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        let id = format!("{}{}", origin.id_prefix(), uuid::Uuid::new_v4().simple());
        Self {
            id,
            name: name.into(),
            raw_arguments: arguments.to_string(),
            parsed_arguments: Some(arguments),
            origin,
        }
    }
}

/// Execution status and side information for a tool result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultMetadata {
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syntax_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_detected: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ToolResultMetadata {
    pub fn exit(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Default::default()
        }
    }
}

/// A tool execution result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_call_id: String,
    pub output_text: String,
    #[serde(default)]
    pub metadata: ToolResultMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_messages: Vec<Message>,
}

/// Output text of the synthetic result answering a canceled call.
pub const ABORTED_OUTPUT: &str = "aborted";

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, output_text: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output_text: output_text.into(),
            metadata: ToolResultMetadata::exit(0),
            additional_messages: Vec::new(),
        }
    }

    pub fn failure(tool_call_id: impl Into<String>, output_text: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output_text: output_text.into(),
            metadata: ToolResultMetadata::exit(1),
            additional_messages: Vec::new(),
        }
    }

    /// Synthetic answer for a call interrupted by cancellation.
    pub fn aborted(tool_call_id: impl Into<String>) -> Self {
        Self::failure(tool_call_id, ABORTED_OUTPUT)
    }

    pub fn is_success(&self) -> bool {
        self.metadata.exit_code == 0
    }
}
