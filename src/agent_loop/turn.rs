//! The turn state machine.
//!
//! One `run()` drives `Requesting -> Streaming -> (ToolDispatch -> Requesting)*
//! -> Flushing -> Idle`. Every observable effect of a run is gated on its
//! generation, so after `cancel()` a run that is still unwinding can no
//! longer touch history or the host.

use std::sync::{Arc, Mutex, MutexGuard};

use bon::Builder;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::approvals::ApprovalHandler;
use super::cancellation::CancellationController;
use super::dispatcher::ToolDispatcher;
use super::events::{EventEmitter, HostEvent, HostEventSink};
use super::flush::{ScheduledTransition, TransitionOutcome};
use super::loop_guard::LoopGuard;
use super::types::{TurnOutcome, TurnPhase};
use crate::config::AgentConfig;
use crate::error::{AgentError, ProviderError, Result};
use crate::provider::{ModelProvider, ProviderRequest};
use crate::recovery::ToolCallRecoverer;
use crate::stream::{CallSnapshot, StreamConsumer};
use crate::tools::{ExecutionContext, HandlerRegistry, NameNormalizer, SyntaxValidator};
use crate::types::{Message, ToolCall, ToolResult};
use crate::util::retry::{RetryDecision, RetryPolicy};
use crate::util::timeout::with_idle_timeout;

/// Everything needed to build a [`TurnLoop`].
#[derive(Builder)]
pub struct TurnLoopOptions {
    provider: Arc<dyn ModelProvider>,
    #[builder(default)]
    registry: HandlerRegistry,
    #[builder(default)]
    config: AgentConfig,
    event_sink: Option<HostEventSink>,
    approval_handler: Option<ApprovalHandler>,
    syntax_validator: Option<Arc<dyn SyntaxValidator>>,
    normalizer: Option<NameNormalizer>,
    system_prompt: Option<String>,
}

#[derive(Debug, Default)]
struct TurnState {
    history: Vec<Message>,
    phase: TurnPhase,
}

enum RoundError {
    Canceled,
    Provider(ProviderError),
}

enum RoundOutcome {
    Message(Message),
    Notice(String),
    Failed(ProviderError),
    Canceled,
}

/// Drives model rounds and tool dispatch for one session.
///
/// Share it as `Arc<TurnLoop>`: one task awaits [`run`](Self::run) while
/// another may call [`cancel`](Self::cancel).
pub struct TurnLoop {
    provider: Arc<dyn ModelProvider>,
    registry: Arc<HandlerRegistry>,
    dispatcher: ToolDispatcher,
    recoverer: ToolCallRecoverer,
    guard: Arc<LoopGuard>,
    controller: Arc<CancellationController>,
    emitter: EventEmitter,
    approval_handler: Option<ApprovalHandler>,
    retry: RetryPolicy,
    config: AgentConfig,
    system_prompt: Option<String>,
    state: Mutex<TurnState>,
}

impl TurnLoop {
    pub fn new(options: TurnLoopOptions) -> Self {
        let TurnLoopOptions {
            provider,
            registry,
            config,
            event_sink,
            approval_handler,
            syntax_validator,
            normalizer,
            system_prompt,
        } = options;

        let registry = Arc::new(registry);
        let guard = Arc::new(LoopGuard::new(config.loop_guard.failure_threshold));
        let controller = Arc::new(CancellationController::new());
        let normalizer = normalizer.unwrap_or_default();

        let mut dispatcher =
            ToolDispatcher::new(registry.clone(), guard.clone()).with_normalizer(normalizer.clone());
        if let Some(syntax) = syntax_validator {
            dispatcher = dispatcher.with_syntax_validator(syntax);
        }

        Self {
            provider,
            dispatcher,
            recoverer: ToolCallRecoverer::with_normalizer(normalizer),
            registry,
            guard,
            emitter: EventEmitter::new(event_sink, controller.clone()),
            controller,
            approval_handler,
            retry: RetryPolicy::from(&config.retry),
            config,
            system_prompt,
            state: Mutex::new(TurnState::default()),
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.state().phase
    }

    /// Session history committed so far.
    pub fn history(&self) -> Vec<Message> {
        self.state().history.clone()
    }

    /// Ids of calls the next run will answer with synthetic aborted results.
    pub fn pending_aborts(&self) -> Vec<String> {
        self.controller.pending_ids()
    }

    pub fn loop_guard(&self) -> &LoopGuard {
        &self.guard
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn is_terminated(&self) -> bool {
        self.controller.is_terminated()
    }

    /// Run one user turn to completion, cancellation or a terminal notice.
    ///
    /// Fails only after [`terminate`](Self::terminate) or on a provider error
    /// nobody recognizes.
    pub async fn run(&self, input: impl Into<String>) -> Result<TurnOutcome> {
        let ticket = self.controller.begin_run()?;
        let turn_id = Uuid::new_v4();
        let span = tracing::info_span!("turn", %turn_id, generation = ticket.generation);
        self.run_turn(turn_id, ticket.generation, ticket.token, input.into())
            .instrument(span)
            .await
    }

    /// Abort the active run. Returns whether any tool call was left unanswered.
    pub fn cancel(&self) -> bool {
        let had_pending = self.controller.cancel();
        self.state().phase = TurnPhase::Idle;
        self.emitter.emit_now(HostEvent::Loading { active: false });
        if !had_pending {
            self.guard.clear();
            self.emitter.emit_now(HostEvent::Reset);
        }
        tracing::info!(had_pending, "turn canceled");
        had_pending
    }

    /// Cancel everything for good. Later runs fail with [`AgentError::Terminated`].
    pub fn terminate(&self) {
        if self.controller.is_terminated() {
            return;
        }
        self.controller.terminate();
        self.state().phase = TurnPhase::Idle;
        self.emitter.emit_now(HostEvent::Loading { active: false });
        tracing::info!("turn loop terminated");
    }

    /// Forget the whole session: history, loop-guard records and pending aborts.
    pub fn clear_context(&self) {
        self.controller.cancel();
        self.controller.take_pending();
        self.guard.clear();
        {
            let mut state = self.state();
            state.history.clear();
            state.phase = TurnPhase::Idle;
        }
        self.emitter.emit_now(HostEvent::Reset);
        tracing::info!("session context cleared");
    }

    async fn run_turn(
        &self,
        turn_id: Uuid,
        generation: u64,
        token: CancellationToken,
        input: String,
    ) -> Result<TurnOutcome> {
        let mut staged = Vec::new();
        let mut rounds = 0u32;

        self.answer_interrupted_calls(generation, &mut staged);
        if !self.stage(generation, Message::user(input), &mut staged) {
            return Ok(TurnOutcome::canceled(turn_id, staged, rounds));
        }
        self.emitter.emit(generation, HostEvent::Loading { active: true });

        loop {
            if rounds >= self.config.max_rounds {
                tracing::info!(rounds, "round limit reached");
                let notice = format!(
                    "Stopped after {rounds} model rounds without a final answer. Send a follow-up message to continue."
                );
                return Ok(self.end_with_notice(turn_id, generation, notice, staged, rounds));
            }
            rounds += 1;
            tracing::debug!(round = rounds, "starting model round");

            let message = match self.request_round(generation, &token).await {
                RoundOutcome::Message(message) => message,
                RoundOutcome::Canceled => return Ok(TurnOutcome::canceled(turn_id, staged, rounds)),
                RoundOutcome::Notice(notice) => {
                    return Ok(self.end_with_notice(turn_id, generation, notice, staged, rounds));
                }
                RoundOutcome::Failed(err) => {
                    self.controller.clear_pending(generation);
                    self.settle(generation);
                    return Err(AgentError::Provider(err));
                }
            };

            let message = self.with_recovered_calls(generation, message);
            let calls = message.tool_calls.clone();
            if !is_blank(&message) && !self.stage(generation, message, &mut staged) {
                return Ok(TurnOutcome::canceled(turn_id, staged, rounds));
            }
            if calls.is_empty() {
                break;
            }

            self.set_phase(generation, TurnPhase::ToolDispatch);
            let ctx = self.execution_context(generation, &token);
            let results = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(TurnOutcome::canceled(turn_id, staged, rounds)),
                results = self.dispatcher.dispatch(&calls, &ctx) => results,
            };
            tracing::debug!(round = rounds, calls = results.len(), "tool dispatch finished");

            for mut result in results {
                let additional = std::mem::take(&mut result.additional_messages);
                let call_id = result.tool_call_id.clone();
                if !self.stage(generation, Message::tool_result(result), &mut staged) {
                    return Ok(TurnOutcome::canceled(turn_id, staged, rounds));
                }
                self.controller.resolve_call(generation, &call_id);
                for message in additional {
                    if !self.stage(generation, message, &mut staged) {
                        return Ok(TurnOutcome::canceled(turn_id, staged, rounds));
                    }
                }
            }
        }

        self.set_phase(generation, TurnPhase::Flushing);
        let transition = ScheduledTransition::new(self.config.flush_delay(), token.clone());
        if transition.wait().await == TransitionOutcome::Canceled || !self.controller.is_current(generation) {
            return Ok(TurnOutcome::canceled(turn_id, staged, rounds));
        }
        self.controller.clear_pending(generation);
        self.settle(generation);
        tracing::debug!(rounds, "turn completed");
        Ok(TurnOutcome::completed(turn_id, staged, rounds))
    }

    /// One provider round under the retry policy.
    async fn request_round(&self, generation: u64, token: &CancellationToken) -> RoundOutcome {
        let request = self.build_request();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.set_phase(generation, TurnPhase::Requesting);
            let err = match self.stream_round(generation, token, &request).await {
                Ok(message) => return RoundOutcome::Message(message),
                Err(RoundError::Canceled) => return RoundOutcome::Canceled,
                Err(RoundError::Provider(err)) => err,
            };

            // The partial message is discarded, and so are its calls.
            self.controller.clear_pending(generation);
            match self.retry.decide(&err, attempt) {
                RetryDecision::Retry { kind, delay } => {
                    tracing::warn!(
                        attempt,
                        %kind,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying model request"
                    );
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return RoundOutcome::Canceled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::EndTurn { kind, notice } => {
                    tracing::info!(attempt, %kind, error = %err, "ending turn after provider failure");
                    return RoundOutcome::Notice(notice);
                }
                RetryDecision::Propagate => {
                    tracing::error!(attempt, error = %err, "unrecognized provider failure");
                    return RoundOutcome::Failed(err);
                }
            }
        }
    }

    async fn stream_round(
        &self,
        generation: u64,
        token: &CancellationToken,
        request: &ProviderRequest,
    ) -> std::result::Result<Message, RoundError> {
        let idle = self.config.stream_idle_timeout();
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(RoundError::Canceled),
            opened = with_idle_timeout(idle, self.provider.stream(request)) => opened,
        };
        let mut stream = opened.and_then(|inner| inner).map_err(RoundError::Provider)?;
        self.set_phase(generation, TurnPhase::Streaming);

        let mut consumer = StreamConsumer::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(RoundError::Canceled),
                next = with_idle_timeout(idle, stream.next()) => next,
            };
            let chunk = match next.map_err(RoundError::Provider)? {
                None => break,
                Some(chunk) => chunk.map_err(RoundError::Provider)?,
            };
            if !self.controller.is_current(generation) {
                return Err(RoundError::Canceled);
            }

            let outcome = consumer.push(chunk);
            for call in &outcome.touched_calls {
                self.controller.track_call(generation, call);
            }
            if let Some(update) = outcome.update {
                self.emitter.emit(generation, HostEvent::PartialUpdate { update });
            }
            if outcome.finished {
                break;
            }
        }

        let message = consumer
            .finalize()
            .unwrap_or_else(|| Message::assistant_with_calls(String::new(), Vec::new()));
        for call in &message.tool_calls {
            self.controller.track_call(generation, &snapshot(call));
        }
        Ok(message)
    }

    /// Text-only messages that look like a tool invocation get their calls recovered.
    fn with_recovered_calls(&self, generation: u64, mut message: Message) -> Message {
        if message.has_tool_calls() {
            return message;
        }
        let text = message.text();
        if !self.recoverer.looks_like_tool_invocation(&text) {
            return message;
        }
        let recovered = self.recoverer.recover(&text);
        if recovered.is_empty() {
            return message;
        }
        tracing::warn!(count = recovered.len(), "recovered tool calls from assistant text");
        for call in &recovered {
            self.controller.track_call(generation, &snapshot(call));
        }
        message.tool_calls = recovered;
        message
    }

    /// Answer the calls a canceled run left open before any new input.
    fn answer_interrupted_calls(&self, generation: u64, staged: &mut Vec<Message>) {
        let pending = self.controller.take_pending();
        if pending.is_empty() {
            return;
        }

        let missing: Vec<ToolCall> = {
            let state = self.state();
            pending
                .iter()
                .filter(|(id, _)| {
                    !state
                        .history
                        .iter()
                        .any(|message| message.tool_calls.iter().any(|call| &call.id == id))
                })
                .map(|(id, call)| ToolCall::new(id.clone(), call.name.clone(), call.raw_arguments.clone()))
                .collect()
        };
        if !missing.is_empty() {
            self.stage(generation, Message::assistant_with_calls(String::new(), missing), staged);
        }

        tracing::info!(count = pending.len(), "answering interrupted tool calls");
        for (id, _) in pending {
            self.stage(generation, Message::tool_result(ToolResult::aborted(id)), staged);
        }
    }

    fn end_with_notice(
        &self,
        turn_id: Uuid,
        generation: u64,
        notice: String,
        mut staged: Vec<Message>,
        rounds: u32,
    ) -> TurnOutcome {
        if !self.stage(generation, Message::assistant(notice), &mut staged) {
            return TurnOutcome::canceled(turn_id, staged, rounds);
        }
        self.controller.clear_pending(generation);
        self.settle(generation);
        TurnOutcome::ended_with_notice(turn_id, staged, rounds)
    }

    fn build_request(&self) -> ProviderRequest {
        let mut messages = Vec::new();
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend(self.state().history.iter().cloned());
        ProviderRequest {
            model: self.config.model.clone(),
            messages,
            tools: self.registry.definitions(),
            reasoning_effort: self.config.reasoning_effort,
        }
    }

    fn execution_context(&self, generation: u64, token: &CancellationToken) -> ExecutionContext {
        let emitter = self.emitter.clone();
        ExecutionContext::new(self.config.resolved_cwd())
            .with_dry_run(self.config.dry_run)
            .with_cancel(token.child_token())
            .with_approval_handler(self.approval_handler.clone())
            .with_file_access(Arc::new(move |path| {
                emitter.emit(generation, HostEvent::FileAccess { path });
            }))
    }

    /// Commit a message to history and tell the host. False once the run is stale.
    fn stage(&self, generation: u64, message: Message, staged: &mut Vec<Message>) -> bool {
        {
            let mut state = self.state();
            if !self.controller.is_current(generation) {
                return false;
            }
            state.history.push(message.clone());
        }
        staged.push(message.clone());
        self.emitter.emit(generation, HostEvent::Item { message });
        true
    }

    fn set_phase(&self, generation: u64, phase: TurnPhase) {
        let mut state = self.state();
        if self.controller.is_current(generation) && state.phase != phase {
            tracing::debug!(from = %state.phase, to = %phase, "turn phase");
            state.phase = phase;
        }
    }

    /// Back to idle with the loading indicator cleared.
    fn settle(&self, generation: u64) {
        self.set_phase(generation, TurnPhase::Idle);
        self.emitter.emit(generation, HostEvent::Loading { active: false });
    }

    fn state(&self) -> MutexGuard<'_, TurnState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for TurnLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnLoop")
            .field("provider", &self.provider.provider_name())
            .field("phase", &self.phase())
            .field("generation", &self.controller.generation())
            .finish()
    }
}

fn snapshot(call: &ToolCall) -> CallSnapshot {
    CallSnapshot {
        id: call.id.clone(),
        name: call.name.clone(),
        raw_arguments: call.raw_arguments.clone(),
    }
}

/// An assistant message with nothing in it is not worth committing.
fn is_blank(message: &Message) -> bool {
    message.tool_calls.is_empty() && message.content.is_empty()
}
