//! Retry policy for provider failures.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::classify::{classify, parse_retry_hint, ProviderErrorKind};
use crate::error::ProviderError;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Fixed delay between attempts for timeouts, 5xx and connection errors.
    pub transient_delay: Duration,
    /// First rate-limit backoff; doubles per attempt.
    pub rate_limit_base: Duration,
    /// Maximum rate-limit backoff.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            transient_delay: Duration::from_millis(1_000),
            rate_limit_base: Duration::from_millis(2_500),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            transient_delay: Duration::from_millis(config.transient_delay_ms),
            rate_limit_base: Duration::from_millis(config.rate_limit_base_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            ..Self::default()
        }
    }
}

/// What the turn loop does after a failed provider attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Re-send the same payload after `delay`.
    Retry {
        kind: ProviderErrorKind,
        delay: Duration,
    },
    /// End the turn normally with a user-visible notice.
    EndTurn {
        kind: ProviderErrorKind,
        notice: String,
    },
    /// Unrecognized failure; hand it to the caller unchanged.
    Propagate,
}

impl RetryPolicy {
    /// Decide how to handle the failure of attempt number `attempt` (1-based).
    pub fn decide(&self, err: &ProviderError, attempt: u32) -> RetryDecision {
        let kind = classify(err);
        let exhausted = attempt >= self.max_attempts;
        match kind {
            ProviderErrorKind::Timeout
            | ProviderErrorKind::ServerError
            | ProviderErrorKind::ConnectionError => {
                if exhausted {
                    RetryDecision::EndTurn {
                        kind,
                        notice: format!(
                            "The model provider did not respond successfully after {attempt} attempts. {}",
                            describe(err)
                        ),
                    }
                } else {
                    RetryDecision::Retry {
                        kind,
                        delay: self.transient_delay,
                    }
                }
            }
            ProviderErrorKind::RateLimit => {
                if exhausted {
                    RetryDecision::EndTurn {
                        kind,
                        notice: format!(
                            "Rate limited by the model provider after {attempt} attempts. {}",
                            describe(err)
                        ),
                    }
                } else {
                    RetryDecision::Retry {
                        kind,
                        delay: self.rate_limit_delay(err, attempt),
                    }
                }
            }
            ProviderErrorKind::TokenLimitExceeded => RetryDecision::EndTurn {
                kind,
                notice: format!(
                    "The conversation no longer fits in the model's context window. Clear the context or start a new session. {}",
                    describe(err)
                ),
            },
            ProviderErrorKind::InsufficientQuota => RetryDecision::EndTurn {
                kind,
                notice: format!(
                    "The model provider reports insufficient quota for this account. {}",
                    describe(err)
                ),
            },
            ProviderErrorKind::ClientError | ProviderErrorKind::InvalidRequest => {
                RetryDecision::EndTurn {
                    kind,
                    notice: format!("The model provider rejected the request. {}", describe(err)),
                }
            }
            ProviderErrorKind::NetworkError | ProviderErrorKind::PrematureClose => {
                RetryDecision::EndTurn {
                    kind,
                    notice: format!(
                        "The connection to the model provider was interrupted ({}). You can resubmit your last message.",
                        err.message
                    ),
                }
            }
            ProviderErrorKind::Unknown => RetryDecision::Propagate,
        }
    }

    /// Backoff before the next rate-limited attempt.
    ///
    /// A "try again in N" hint in the message replaces the exponential schedule.
    pub fn rate_limit_delay(&self, err: &ProviderError, attempt: u32) -> Duration {
        if let Some(hint) = err.chain().find_map(|link| parse_retry_hint(&link.message)) {
            return hint;
        }
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let scaled = self.rate_limit_base.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(scaled.min(self.max_backoff.as_secs_f64()))
    }
}

/// Human-readable failure details: status, code, type, message and request id.
pub fn describe(err: &ProviderError) -> String {
    let mut fields = Vec::new();
    if let Some(status) = err.status {
        fields.push(format!("status {status}"));
    }
    if let Some(code) = &err.code {
        fields.push(format!("code {code}"));
    }
    if let Some(error_type) = &err.error_type {
        fields.push(format!("type {error_type}"));
    }
    let mut out = if fields.is_empty() {
        err.message.clone()
    } else {
        format!("({}) {}", fields.join(", "), err.message)
    };
    if let Some(request_id) = err.any_request_id() {
        out.push_str(&format!(" [request id: {request_id}]"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[test]
    fn rate_limit_hint_overrides_exponential_schedule() {
        let err = ProviderError::status(429, "Rate limit reached. Please try again in 2.5s.");
        assert_eq!(
            policy().decide(&err, 1),
            RetryDecision::Retry {
                kind: ProviderErrorKind::RateLimit,
                delay: Duration::from_millis(2500),
            }
        );
    }

    #[test]
    fn rate_limit_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_backoff: Duration::from_secs(8),
            ..RetryPolicy::default()
        };
        let err = ProviderError::status(429, "slow down");
        assert_eq!(policy.rate_limit_delay(&err, 1), Duration::from_millis(2500));
        assert_eq!(policy.rate_limit_delay(&err, 2), Duration::from_millis(5000));
        assert_eq!(policy.rate_limit_delay(&err, 3), Duration::from_secs(8));
    }

    #[test]
    fn transient_errors_use_fixed_delay_until_exhausted() {
        let err = ProviderError::status(503, "overloaded");
        for attempt in 1..5 {
            assert_eq!(
                policy().decide(&err, attempt),
                RetryDecision::Retry {
                    kind: ProviderErrorKind::ServerError,
                    delay: Duration::from_millis(1000),
                }
            );
        }
        match policy().decide(&err, 5) {
            RetryDecision::EndTurn { notice, .. } => {
                assert!(notice.contains("after 5 attempts"));
                assert!(notice.contains("status 503"));
            }
            other => panic!("expected end of turn, got {other:?}"),
        }
    }

    #[test]
    fn terminal_errors_end_turn_with_request_id() {
        let err = ProviderError::status(400, "This model's maximum context length is 8192 tokens")
            .with_request_id("req_abc");
        match policy().decide(&err, 1) {
            RetryDecision::EndTurn { kind, notice } => {
                assert_eq!(kind, ProviderErrorKind::TokenLimitExceeded);
                assert!(notice.contains("req_abc"));
            }
            other => panic!("expected end of turn, got {other:?}"),
        }
    }

    #[test]
    fn network_errors_end_gracefully_and_unknown_propagates() {
        let network = ProviderError::network("ECONNRESET", "socket hang up");
        assert!(matches!(
            policy().decide(&network, 1),
            RetryDecision::EndTurn {
                kind: ProviderErrorKind::NetworkError,
                ..
            }
        ));
        assert_eq!(
            policy().decide(&ProviderError::new("mystery"), 1),
            RetryDecision::Propagate
        );
    }

    #[test]
    fn describe_lists_status_code_type_and_message() {
        let err = ProviderError::status(429, "Too many")
            .with_code("rate_limit_exceeded")
            .with_type("requests");
        assert_eq!(
            describe(&err),
            "(status 429, code rate_limit_exceeded, type requests) Too many"
        );
    }
}
