//! Model provider contract and per-provider delta adapters.
//!
//! The turn loop only ever sees [`StreamChunk`]s. Each provider's wire
//! events are converted at this boundary by a [`ChunkAdapter`], so nothing
//! downstream branches on provider identity.

pub mod chat_completions;
pub mod parts;
pub mod replay;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::types::{Message, ReasoningEffort, StreamChunk};

pub use chat_completions::ChatCompletionsAdapter;
pub use parts::PartsAdapter;
pub use replay::{ReplayFormat, ReplayProvider};

/// A request sent to a model provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub reasoning_effort: Option<ReasoningEffort>,
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Ordered stream of provider-neutral chunks.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, ProviderError>>;

/// Core trait implemented by all model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "openai", "replay").
    fn provider_name(&self) -> &str;

    /// Open a streamed response for `request`.
    async fn stream(&self, request: &ProviderRequest) -> Result<ChunkStream, ProviderError>;
}

/// Converts one provider's decoded wire events into [`StreamChunk`]s.
///
/// Adapters may be stateful (e.g. to number tool calls), so one instance
/// serves exactly one response stream.
pub trait ChunkAdapter: Send {
    /// Returns `Ok(None)` for events that carry nothing the turn loop uses.
    fn adapt(&mut self, event: &serde_json::Value) -> Result<Option<StreamChunk>, ProviderError>;
}

/// Parse an SSE "data:" line, returning None for "[DONE]".
pub fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return None;
    }
    Some(data)
}
