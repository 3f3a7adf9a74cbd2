//! Convenience re-exports for common use.

pub use crate::agent_loop::{
    ApprovalHandler, ApprovalRequest, CommandConfirmation, HostEvent, HostEventSink, ReviewDecision,
    TurnLoop, TurnLoopOptions, TurnOutcome, TurnPhase, TurnStatus,
};
pub use crate::config::AgentConfig;
pub use crate::error::{AgentError, ProviderError, Result};
pub use crate::provider::{ModelProvider, ProviderRequest};
pub use crate::tools::{
    ExecutionContext, FnHandler, HandlerRegistry, ToolArgs, ToolHandler, ToolInvocation, ToolOutput,
    ToolParameters,
};
pub use crate::types::{Message, Role, StreamChunk, ToolCall, ToolResult};
