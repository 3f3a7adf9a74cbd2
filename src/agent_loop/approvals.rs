//! Command confirmation types.
//!
//! The loop never decides approval policy itself. Handlers ask, the host's
//! approval handler answers, and the decision is passed back unchanged.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// The host's answer to a confirmation request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    ApprovedForSession,
    Denied,
    /// Deny and stop the current turn.
    Abort,
}

impl ReviewDecision {
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved | Self::ApprovedForSession)
    }
}

/// What a handler wants to run, sent to the host for confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRequest {
    pub call_id: String,
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    pub cwd: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandConfirmation {
    pub decision: ReviewDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_deny_message: Option<String>,
}

impl CommandConfirmation {
    pub fn approved() -> Self {
        Self {
            decision: ReviewDecision::Approved,
            custom_deny_message: None,
        }
    }

    pub fn denied(message: Option<String>) -> Self {
        Self {
            decision: ReviewDecision::Denied,
            custom_deny_message: message,
        }
    }
}

/// Async approval callback supplied by the host.
pub type ApprovalHandler =
    Arc<dyn Fn(ApprovalRequest) -> BoxFuture<'static, CommandConfirmation> + Send + Sync>;
