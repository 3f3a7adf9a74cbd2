//! Utility modules: retry policy, idle timeouts, text helpers.

pub mod retry;
pub mod text;
pub mod timeout;
