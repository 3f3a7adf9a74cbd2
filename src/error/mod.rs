//! Error types for agent-turn.

pub mod classify;
pub mod provider;

pub use classify::{classify, ProviderErrorKind};
pub use provider::ProviderError;

use thiserror::Error;

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    ArgumentValidation,
    LoopDetected,
    ToolExecution,
    SyntaxRegression,
    ProviderTransient,
    ProviderTerminal,
    Network,
    Cancellation,
    Configuration,
    Serialization,
    Io,
    Unknown,
}

/// Why a tool call's arguments were rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required argument for `{tool}`: expected {}", format_fields(.expected))]
    MissingFields {
        tool: String,
        expected: Vec<&'static str>,
    },

    #[error("arguments for `{tool}` are not valid JSON: {message}")]
    MalformedJson { tool: String, message: String },

    #[error("argument `{field}` for `{tool}` must be {expected}")]
    InvalidField {
        tool: String,
        field: &'static str,
        expected: &'static str,
    },

    #[error("arguments for `{tool}` do not match its schema: {message}")]
    Schema { tool: String, message: String },

    #[error("call {index} of a batched `{tool}` invocation is invalid: {source}")]
    Batch {
        tool: String,
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },
}

fn format_fields(fields: &[&'static str]) -> String {
    let quoted: Vec<String> = fields.iter().map(|f| format!("`{f}`")).collect();
    match quoted.len() {
        0 => "no arguments".to_string(),
        1 => quoted[0].clone(),
        _ => format!("one of {}", quoted.join(", ")),
    }
}

/// Primary error type for all agent-turn operations.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid arguments: {0}")]
    Validation(#[from] ValidationError),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Loop detected: `{tool_name}` failed {attempts} times with identical arguments")]
    LoopDetected { tool_name: String, attempts: u32 },

    #[error("Syntax check failed after patch: {}", .paths.join(", "))]
    SyntaxRegression { paths: Vec<String> },

    #[error("Run canceled")]
    Canceled,

    #[error("Agent loop terminated")]
    Terminated,

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl AgentError {
    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::ConfigParse(_) => ErrorCategory::Configuration,
            Self::Provider(err) => match classify(err) {
                kind if kind.is_retryable() => ErrorCategory::ProviderTransient,
                ProviderErrorKind::NetworkError | ProviderErrorKind::PrematureClose => {
                    ErrorCategory::Network
                }
                ProviderErrorKind::Unknown => ErrorCategory::Unknown,
                _ => ErrorCategory::ProviderTerminal,
            },
            Self::Validation(_) => ErrorCategory::ArgumentValidation,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::LoopDetected { .. } => ErrorCategory::LoopDetected,
            Self::SyntaxRegression { .. } => ErrorCategory::SyntaxRegression,
            Self::Canceled | Self::Terminated => ErrorCategory::Cancellation,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) => ErrorCategory::Io,
            Self::Stream(_) | Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::ProviderTransient)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, AgentError>;
