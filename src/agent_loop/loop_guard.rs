//! Blocks tool calls that keep failing with identical arguments.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::util::text::snippet;

const ERROR_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Allow,
    Blocked { attempts: u32, last_error: String },
}

/// Failure counts keyed by `(canonical name, raw arguments)`.
#[derive(Debug)]
pub struct LoopGuard {
    threshold: u32,
    history: Mutex<HashMap<(String, String), FailureRecord>>,
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new(2)
    }
}

impl LoopGuard {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn check(&self, name: &str, raw_arguments: &str) -> GuardVerdict {
        match self.lock().get(&key(name, raw_arguments)) {
            Some(record) if record.attempts >= self.threshold => GuardVerdict::Blocked {
                attempts: record.attempts,
                last_error: record.last_error.clone(),
            },
            _ => GuardVerdict::Allow,
        }
    }

    pub fn record_success(&self, name: &str, raw_arguments: &str) {
        self.lock().remove(&key(name, raw_arguments));
    }

    pub fn record_failure(&self, name: &str, raw_arguments: &str, error: &str) {
        let mut history = self.lock();
        let record = history
            .entry(key(name, raw_arguments))
            .or_insert_with(|| FailureRecord {
                attempts: 0,
                last_error: String::new(),
            });
        record.attempts += 1;
        record.last_error = snippet(error.trim(), ERROR_SNIPPET_CHARS);
        if record.attempts >= self.threshold {
            tracing::warn!(tool = name, attempts = record.attempts, "identical tool call keeps failing");
        }
    }

    pub fn record(&self, name: &str, raw_arguments: &str) -> Option<FailureRecord> {
        self.lock().get(&key(name, raw_arguments)).cloned()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, String), FailureRecord>> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn key(name: &str, raw_arguments: &str) -> (String, String) {
    (name.to_string(), raw_arguments.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_threshold_identical_failures() {
        let guard = LoopGuard::new(2);
        guard.record_failure("shell", r#"{"cmd":["make"]}"#, "error: no rule");
        assert_eq!(guard.check("shell", r#"{"cmd":["make"]}"#), GuardVerdict::Allow);

        guard.record_failure("shell", r#"{"cmd":["make"]}"#, "error: no rule");
        assert_eq!(
            guard.check("shell", r#"{"cmd":["make"]}"#),
            GuardVerdict::Blocked {
                attempts: 2,
                last_error: "error: no rule".into()
            }
        );
    }

    #[test]
    fn different_arguments_are_tracked_separately() {
        let guard = LoopGuard::new(1);
        guard.record_failure("shell", "a", "boom");
        assert_eq!(guard.check("shell", "b"), GuardVerdict::Allow);
        assert_eq!(guard.check("read_file", "a"), GuardVerdict::Allow);
    }

    #[test]
    fn success_resets_the_count() {
        let guard = LoopGuard::new(2);
        guard.record_failure("shell", "a", "boom");
        guard.record_success("shell", "a");
        guard.record_failure("shell", "a", "boom");
        assert_eq!(guard.check("shell", "a"), GuardVerdict::Allow);
    }

    #[test]
    fn error_snippet_is_bounded() {
        let guard = LoopGuard::new(2);
        guard.record_failure("shell", "a", &"x".repeat(500));
        assert_eq!(guard.record("shell", "a").unwrap().last_error.len(), 200);
    }

    #[test]
    fn clear_forgets_everything() {
        let guard = LoopGuard::new(1);
        guard.record_failure("shell", "a", "boom");
        guard.clear();
        assert!(guard.is_empty());
        assert_eq!(guard.check("shell", "a"), GuardVerdict::Allow);
    }
}
