//! Replays recorded provider events as response streams.
//!
//! A recording is JSONL: one decoded wire event per line (an optional SSE
//! `data:` prefix is accepted), with rounds separated by blank lines. Each
//! call to [`ModelProvider::stream`] consumes the next round.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;

use super::{
    parse_sse_data, ChatCompletionsAdapter, ChunkAdapter, ChunkStream, ModelProvider,
    PartsAdapter, ProviderRequest,
};
use crate::error::{AgentError, ProviderError, Result};

/// Wire format of the recorded events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayFormat {
    #[default]
    ChatCompletions,
    Parts,
}

impl ReplayFormat {
    fn adapter(self) -> Box<dyn ChunkAdapter> {
        match self {
            Self::ChatCompletions => Box::new(ChatCompletionsAdapter::new()),
            Self::Parts => Box::new(PartsAdapter::new()),
        }
    }
}

pub struct ReplayProvider {
    format: ReplayFormat,
    rounds: Mutex<VecDeque<Vec<serde_json::Value>>>,
}

impl ReplayProvider {
    /// Parse a recording. Malformed lines are rejected up front.
    pub fn from_jsonl(raw: &str, format: ReplayFormat) -> Result<Self> {
        let mut rounds = VecDeque::new();
        let mut current = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                if !current.is_empty() {
                    rounds.push_back(std::mem::take(&mut current));
                }
                continue;
            }
            if line.starts_with(':') || line == "data: [DONE]" || line == "data:[DONE]" {
                continue;
            }
            let data = parse_sse_data(line).unwrap_or(line);
            current.push(serde_json::from_str(data)?);
        }
        if !current.is_empty() {
            rounds.push_back(current);
        }
        Ok(Self {
            format,
            rounds: Mutex::new(rounds),
        })
    }

    pub fn from_file(path: &Path, format: ReplayFormat) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AgentError::Configuration(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_jsonl(&raw, format)
    }

    /// Rounds not yet served.
    pub fn remaining_rounds(&self) -> usize {
        self.rounds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl ModelProvider for ReplayProvider {
    fn provider_name(&self) -> &str {
        "replay"
    }

    async fn stream(&self, _request: &ProviderRequest) -> std::result::Result<ChunkStream, ProviderError> {
        let round = self
            .rounds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .ok_or_else(|| {
                ProviderError::new("replay recording has no rounds left").with_code("replay_exhausted")
            })?;

        let mut adapter = self.format.adapter();
        let stream = async_stream::stream! {
            for event in round {
                match adapter.adapt(&event) {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => {}
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        };
        Ok(stream.boxed())
    }
}
