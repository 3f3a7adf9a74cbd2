//! Tool names, argument validation, handlers and reference tools.

pub mod arguments;
pub mod builtin;
pub mod handler;
pub mod names;
pub mod syntax;
pub mod types;
pub mod validation;

pub use arguments::{CommandArgs, ToolArgs};
pub use handler::{
    ExecutionContext, FileAccessCallback, FnHandler, HandlerRegistry, ToolHandler, ToolInvocation,
    ToolOutput,
};
pub use names::{NameNormalizer, ToolName};
pub use syntax::{DefaultSyntaxValidator, NoopSyntaxValidator, SyntaxValidator};
pub use types::ToolParameters;
pub use validation::validate;
