//! Tool handler contract, execution context and registry.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use super::arguments::ToolArgs;
use super::names::NameNormalizer;
use super::types::ToolParameters;
use crate::agent_loop::approvals::{ApprovalHandler, ApprovalRequest, CommandConfirmation};
use crate::error::AgentError;
use crate::provider::ToolDefinition;
use crate::types::{Message, ToolResult, ToolResultMetadata};

/// Called by handlers whenever they read or write a file.
pub type FileAccessCallback = Arc<dyn Fn(PathBuf) + Send + Sync>;

/// Everything a handler may use while executing one call.
#[derive(Clone)]
pub struct ExecutionContext {
    pub call_id: String,
    pub cwd: PathBuf,
    pub dry_run: bool,
    /// Canceled when the run is canceled or the loop terminates.
    pub cancel: CancellationToken,
    approval_handler: Option<ApprovalHandler>,
    file_access: Option<FileAccessCallback>,
}

impl ExecutionContext {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            call_id: String::new(),
            cwd: cwd.into(),
            dry_run: false,
            cancel: CancellationToken::new(),
            approval_handler: None,
            file_access: None,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_approval_handler(mut self, handler: Option<ApprovalHandler>) -> Self {
        self.approval_handler = handler;
        self
    }

    pub fn with_file_access(mut self, callback: FileAccessCallback) -> Self {
        self.file_access = Some(callback);
        self
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }

    /// Resolve `path` against the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    pub fn report_file_access(&self, path: &Path) {
        if let Some(callback) = &self.file_access {
            callback(path.to_path_buf());
        }
    }

    /// Ask the host to confirm a command. Denied when no handler is configured.
    pub async fn request_confirmation(&self, command: &[String], patch: Option<&str>) -> CommandConfirmation {
        let Some(handler) = &self.approval_handler else {
            return CommandConfirmation::denied(Some("no approval handler is configured".into()));
        };
        handler(ApprovalRequest {
            call_id: self.call_id.clone(),
            command: command.to_vec(),
            patch: patch.map(str::to_string),
            cwd: self.cwd.clone(),
        })
        .await
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("call_id", &self.call_id)
            .field("cwd", &self.cwd)
            .field("dry_run", &self.dry_run)
            .field("has_approval_handler", &self.approval_handler.is_some())
            .finish()
    }
}

/// One validated call routed to a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub call_id: String,
    /// Name of the handler the call was routed to.
    pub tool: String,
    pub raw_arguments: String,
    pub args: ToolArgs,
}

/// What a handler produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub output_text: String,
    pub metadata: ToolResultMetadata,
    pub additional_messages: Vec<Message>,
}

impl ToolOutput {
    pub fn success(output_text: impl Into<String>) -> Self {
        Self {
            output_text: output_text.into(),
            ..Default::default()
        }
    }

    pub fn failure(output_text: impl Into<String>, exit_code: i32) -> Self {
        Self {
            output_text: output_text.into(),
            metadata: ToolResultMetadata::exit(exit_code),
            additional_messages: Vec::new(),
        }
    }

    /// A successful no-op reported under dry run.
    pub fn dry_run(output_text: impl Into<String>) -> Self {
        let mut output = Self::success(output_text);
        output.metadata.dry_run = Some(true);
        output
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.additional_messages.push(message);
        self
    }

    pub fn is_success(&self) -> bool {
        self.metadata.exit_code == 0
    }

    pub fn into_result(self, tool_call_id: impl Into<String>) -> ToolResult {
        ToolResult {
            tool_call_id: tool_call_id.into(),
            output_text: self.output_text,
            metadata: self.metadata,
            additional_messages: self.additional_messages,
        }
    }
}

/// Implement to make a tool available to the dispatcher.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> &ToolParameters;

    /// Execute a validated call. Errors are reported to the model as a
    /// failed result, never raised out of the loop.
    async fn handle(&self, invocation: &ToolInvocation, ctx: &ExecutionContext) -> Result<ToolOutput, AgentError>;
}

type HandlerFn = dyn Fn(ToolInvocation, ExecutionContext) -> Pin<Box<dyn Future<Output = Result<ToolOutput, AgentError>> + Send>>
    + Send
    + Sync;

/// Closure-based handler.
pub struct FnHandler {
    name: String,
    description: String,
    parameters: ToolParameters,
    handler: Arc<HandlerFn>,
}

impl FnHandler {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolInvocation, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, AgentError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |invocation, ctx| Box::pin(handler(invocation, ctx))),
        }
    }
}

#[async_trait]
impl ToolHandler for FnHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn handle(&self, invocation: &ToolInvocation, ctx: &ExecutionContext) -> Result<ToolOutput, AgentError> {
        (self.handler)(invocation.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for FnHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Handlers keyed by canonical tool name, in registration order.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: IndexMap<String, Arc<dyn ToolHandler>>,
    normalizer: NameNormalizer,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its canonical name, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> &mut Self {
        let key = self.normalizer.normalize(handler.name());
        self.handlers.insert(key, handler);
        self
    }

    pub fn with(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Definitions advertised to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.handlers
            .iter()
            .map(|(name, handler)| ToolDefinition {
                name: name.clone(),
                description: handler.description().to_string(),
                parameters: handler.parameters().schema.clone(),
            })
            .collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_loop::approvals::ReviewDecision;
    use futures::FutureExt;

    fn echo(name: &str) -> Arc<dyn ToolHandler> {
        Arc::new(FnHandler::new(
            name,
            "echo",
            ToolParameters::empty(),
            |invocation: ToolInvocation, _ctx| async move {
                Ok::<_, AgentError>(ToolOutput::success(invocation.raw_arguments))
            },
        ))
    }

    #[test]
    fn registry_keys_handlers_by_canonical_name() {
        let registry = HandlerRegistry::new().with(echo("bash")).with(echo("read_file"));
        assert!(registry.contains("shell"));
        assert_eq!(registry.names(), vec!["shell", "read_file"]);
        assert_eq!(registry.definitions()[0].name, "shell");
    }

    #[tokio::test]
    async fn confirmation_is_denied_without_handler() {
        let ctx = ExecutionContext::new(".");
        let confirmation = ctx.request_confirmation(&["ls".into()], None).await;
        assert_eq!(confirmation.decision, ReviewDecision::Denied);
    }

    #[tokio::test]
    async fn confirmation_forwards_host_decision() {
        let handler: ApprovalHandler = Arc::new(|request: ApprovalRequest| {
            async move {
                assert_eq!(request.command, vec!["rm".to_string(), "-rf".to_string()]);
                CommandConfirmation {
                    decision: ReviewDecision::Abort,
                    custom_deny_message: Some("not today".into()),
                }
            }
            .boxed()
        });
        let ctx = ExecutionContext::new(".").with_approval_handler(Some(handler));
        let confirmation = ctx
            .request_confirmation(&["rm".into(), "-rf".into()], None)
            .await;
        assert_eq!(confirmation.decision, ReviewDecision::Abort);
        assert_eq!(confirmation.custom_deny_message.as_deref(), Some("not today"));
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        let ctx = ExecutionContext::new("/work");
        assert_eq!(ctx.resolve_path("a/b.rs"), PathBuf::from("/work/a/b.rs"));
        assert_eq!(ctx.resolve_path("/etc/hosts"), PathBuf::from("/etc/hosts"));
    }
}
