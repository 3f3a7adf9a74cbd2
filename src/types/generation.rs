//! Generation-level enums shared by requests and streams.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Reasoning effort level for reasoning models.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ReasoningEffort {
    None,
    Low,
    Medium,
    High,
}

/// Why generation finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
}

impl FinishReason {
    /// Map a provider's finish reason string, tolerating the common spellings.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" => None,
            "stop" | "end_turn" | "stop_sequence" | "finish_reason_stop" => Some(Self::Stop),
            "length" | "max_tokens" => Some(Self::Length),
            "tool_calls" | "tool_use" | "function_call" => Some(Self::ToolCalls),
            "content_filter" | "safety" | "recitation" => Some(Self::ContentFilter),
            "error" => Some(Self::Error),
            _ => Some(Self::Stop),
        }
    }
}
