//! Shared test helpers: scripted provider, recording sink, instrumented handlers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use agent_turn::agent_loop::{HostEvent, HostEventSink, TurnLoop, TurnLoopOptions};
use agent_turn::config::AgentConfig;
use agent_turn::error::{AgentError, ProviderError};
use agent_turn::provider::{ChunkStream, ModelProvider, ProviderRequest};
use agent_turn::tools::{FnHandler, HandlerRegistry, ToolHandler, ToolInvocation, ToolOutput, ToolParameters};
use agent_turn::types::{FinishReason, Message, StreamChunk, ToolCallDelta};

/// One step of a scripted response stream.
#[derive(Debug, Clone)]
pub enum Step {
    Chunk(StreamChunk),
    Delay(Duration),
    /// Fail the stream mid-way.
    Fail(ProviderError),
    /// Never yield again.
    Hang,
}

#[derive(Debug, Clone)]
pub enum Round {
    Stream(Vec<Step>),
    /// Fail before any chunk is produced.
    OpenError(ProviderError),
}

/// A text-only reply.
pub fn text_round(text: &str) -> Round {
    Round::Stream(vec![
        Step::Chunk(StreamChunk::text(text)),
        Step::Chunk(StreamChunk::finish(FinishReason::Stop)),
    ])
}

/// A reply made of native tool calls `(id, name, arguments)`.
pub fn tool_round(calls: &[(&str, &str, &str)]) -> Round {
    let mut steps = Vec::new();
    for (index, (id, name, arguments)) in calls.iter().enumerate() {
        steps.push(Step::Chunk(StreamChunk::tool_call(ToolCallDelta::start(index, *id, *name))));
        steps.push(Step::Chunk(StreamChunk::tool_call(ToolCallDelta::arguments(index, *arguments))));
    }
    steps.push(Step::Chunk(StreamChunk::finish(FinishReason::ToolCalls)));
    Round::Stream(steps)
}

/// Serves scripted rounds in order and records every request.
#[derive(Default)]
pub struct ScriptedProvider {
    rounds: Mutex<VecDeque<Round>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(rounds: impl IntoIterator<Item = Round>) -> Arc<Self> {
        Arc::new(Self {
            rounds: Mutex::new(rounds.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, round: Round) {
        self.rounds.lock().unwrap().push_back(round);
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: &ProviderRequest) -> Result<ChunkStream, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let round = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::new("script exhausted").with_code("script_exhausted"))?;

        let steps = match round {
            Round::OpenError(err) => return Err(err),
            Round::Stream(steps) => steps,
        };
        let stream = async_stream::stream! {
            for step in steps {
                match step {
                    Step::Chunk(chunk) => yield Ok(chunk),
                    Step::Delay(delay) => tokio::time::sleep(delay).await,
                    Step::Fail(err) => {
                        yield Err(err);
                        break;
                    }
                    Step::Hang => std::future::pending::<()>().await,
                }
            }
        };
        Ok(stream.boxed())
    }
}

/// Collects every host event.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<HostEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> HostEventSink {
        let events = self.events.clone();
        Arc::new(move |event| events.lock().unwrap().push(event))
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Messages delivered as `Item` events.
    pub fn items(&self) -> Vec<Message> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Item { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&HostEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }

    pub fn last_loading(&self) -> Option<bool> {
        self.events().iter().rev().find_map(|event| match event {
            HostEvent::Loading { active } => Some(*active),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

/// Config with no real delays beyond the flush window.
pub fn test_config(cwd: &Path) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.cwd = Some(cwd.to_path_buf());
    config.retry.transient_delay_ms = 10;
    config.retry.rate_limit_base_ms = 10;
    config
}

pub fn turn_loop(provider: Arc<ScriptedProvider>, registry: HandlerRegistry, config: AgentConfig, log: &EventLog) -> Arc<TurnLoop> {
    Arc::new(TurnLoop::new(
        TurnLoopOptions::builder()
            .provider(provider)
            .registry(registry)
            .config(config)
            .event_sink(log.sink())
            .build(),
    ))
}

/// Order in which instrumented handlers finished.
#[derive(Clone, Default)]
pub struct Completions(Arc<Mutex<Vec<String>>>);

impl Completions {
    pub fn record(&self, label: impl Into<String>) {
        self.0.lock().unwrap().push(label.into());
    }

    pub fn order(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// A handler that waits `delay` per call, then echoes its raw arguments.
pub fn delayed_handler(name: &str, delay: Duration, completions: Completions) -> Arc<dyn ToolHandler> {
    Arc::new(FnHandler::new(
        name,
        "sleeps, then echoes its arguments",
        ToolParameters::empty(),
        move |invocation: ToolInvocation, _ctx| {
            let completions = completions.clone();
            async move {
                tokio::time::sleep(delay).await;
                completions.record(invocation.call_id.clone());
                Ok::<_, AgentError>(ToolOutput::success(invocation.raw_arguments))
            }
        },
    ))
}

/// A handler that always fails, counting how often it ran.
pub fn failing_handler(name: &str, message: &'static str, calls: Arc<AtomicUsize>) -> Arc<dyn ToolHandler> {
    Arc::new(FnHandler::new(
        name,
        "always fails",
        ToolParameters::empty(),
        move |_invocation: ToolInvocation, _ctx| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AgentError>(ToolOutput::failure(message, 1))
            }
        },
    ))
}

/// A handler that succeeds, counting how often it ran.
pub fn counting_handler(name: &str, calls: Arc<AtomicUsize>) -> Arc<dyn ToolHandler> {
    Arc::new(FnHandler::new(
        name,
        "counts invocations",
        ToolParameters::empty(),
        move |invocation: ToolInvocation, _ctx| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AgentError>(ToolOutput::success(format!("ran {}", invocation.tool)))
            }
        },
    ))
}

/// A handler that runs until its cancellation token fires.
pub fn blocking_handler(name: &str, started: Arc<tokio::sync::Notify>) -> Arc<dyn ToolHandler> {
    Arc::new(FnHandler::new(
        name,
        "waits for cancellation",
        ToolParameters::empty(),
        move |_invocation: ToolInvocation, ctx| {
            let started = started.clone();
            async move {
                started.notify_one();
                ctx.cancel.cancelled().await;
                Ok::<_, AgentError>(ToolOutput::failure("aborted", 1))
            }
        },
    ))
}

/// Minimal `apply_patch`: writes every `*** Add File:` section verbatim.
pub fn patch_writer() -> Arc<dyn ToolHandler> {
    Arc::new(FnHandler::new(
        "apply_patch",
        "applies add-file patches",
        ToolParameters::empty(),
        |invocation: ToolInvocation, ctx| async move {
            let patch = invocation
                .args
                .as_command()
                .and_then(|command| command.patch_text())
                .unwrap_or_default()
                .to_string();
            let mut written = Vec::new();
            let mut current: Option<(String, Vec<String>)> = None;
            for line in patch.lines() {
                if let Some(path) = line.strip_prefix("*** Add File: ") {
                    if let Some(file) = current.take() {
                        written.push(file);
                    }
                    current = Some((path.trim().to_string(), Vec::new()));
                } else if let Some(body) = line.strip_prefix('+') {
                    if let Some((_, lines)) = current.as_mut() {
                        lines.push(body.to_string());
                    }
                }
            }
            if let Some(file) = current.take() {
                written.push(file);
            }
            for (path, lines) in &written {
                let full = ctx.resolve_path(path);
                std::fs::write(&full, lines.join("\n")).map_err(|err| AgentError::tool("apply_patch", err.to_string()))?;
            }
            Ok::<_, AgentError>(ToolOutput::success(format!("Applied patch to {} file(s)", written.len())))
        },
    ))
}
