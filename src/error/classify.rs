//! Provider failure classification.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use strum::{Display, EnumString};

use super::provider::ProviderError;

/// Classification of a provider failure, driving the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ProviderErrorKind {
    Timeout,
    ConnectionError,
    ServerError,
    RateLimit,
    TokenLimitExceeded,
    InsufficientQuota,
    ClientError,
    PrematureClose,
    NetworkError,
    InvalidRequest,
    Unknown,
}

impl ProviderErrorKind {
    /// Kinds the retry policy re-sends.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionError | Self::ServerError | Self::RateLimit
        )
    }
}

const NETWORK_ERRNOS: [&str; 11] = [
    "ECONNRESET",
    "ECONNREFUSED",
    "ECONNABORTED",
    "EPIPE",
    "ENOTFOUND",
    "ENETUNREACH",
    "EHOSTUNREACH",
    "EAI_AGAIN",
    "ETIMEDOUT",
    "ENOTCONN",
    "EADDRNOTAVAIL",
];

const PREMATURE_CLOSE_CODE: &str = "ERR_STREAM_PREMATURE_CLOSE";

static TOKEN_LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)maximum context length|context length exceeded|context window|too many tokens|token limit|prompt is too long",
    )
    .expect("token limit regex must compile")
});

static QUOTA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)insufficient[_ ]quota|exceeded your current quota")
        .expect("quota regex must compile")
});

static RATE_LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)rate[_ ]?limit|too many requests").expect("rate limit regex must compile")
});

static TIMEOUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)timed out|\btimeout\b").expect("timeout regex must compile")
});

static CONNECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)connection error|error connecting|connection (?:was )?closed")
        .expect("connection regex must compile")
});

static RETRY_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:try again|retry) (?:in|after) (\d+(?:\.\d+)?)\s*(ms|milliseconds?|s|secs?|seconds?)\b",
    )
    .expect("retry hint regex must compile")
});

fn code_is(err: &ProviderError, expected: &str) -> bool {
    err.code
        .as_deref()
        .is_some_and(|code| code.eq_ignore_ascii_case(expected))
}

fn type_is(err: &ProviderError, expected: &str) -> bool {
    err.error_type
        .as_deref()
        .is_some_and(|kind| kind.eq_ignore_ascii_case(expected))
}

fn has_network_errno(err: &ProviderError) -> bool {
    err.chain().any(|link| {
        [link.errno.as_deref(), link.code.as_deref()]
            .into_iter()
            .flatten()
            .any(|code| NETWORK_ERRNOS.contains(&code))
    })
}

fn is_premature_close(err: &ProviderError) -> bool {
    err.chain().any(|link| {
        code_is(link, PREMATURE_CLOSE_CODE)
            || link.message.to_ascii_lowercase().contains("premature close")
    })
}

/// Classify a provider failure.
///
/// Quota and token-limit markers are checked before the status code, since
/// providers report both under 429/400.
pub fn classify(err: &ProviderError) -> ProviderErrorKind {
    let message = err.message.as_str();
    // Transport wording only counts when no HTTP status came back.
    let transport_only = err.status.is_none();
    if is_premature_close(err) {
        return ProviderErrorKind::PrematureClose;
    }
    if has_network_errno(err) {
        return ProviderErrorKind::NetworkError;
    }
    if err.timed_out || err.status == Some(408) || (transport_only && TIMEOUT_RE.is_match(message)) {
        return ProviderErrorKind::Timeout;
    }
    if code_is(err, "context_length_exceeded") || TOKEN_LIMIT_RE.is_match(message) {
        return ProviderErrorKind::TokenLimitExceeded;
    }
    if code_is(err, "insufficient_quota") || QUOTA_RE.is_match(message) {
        return ProviderErrorKind::InsufficientQuota;
    }
    if err.status == Some(429)
        || code_is(err, "rate_limit_exceeded")
        || RATE_LIMIT_RE.is_match(message)
    {
        return ProviderErrorKind::RateLimit;
    }
    if matches!(err.status, Some(500..=599)) || type_is(err, "server_error") {
        return ProviderErrorKind::ServerError;
    }
    if code_is(err, "connection_error") || (transport_only && CONNECTION_RE.is_match(message)) {
        return ProviderErrorKind::ConnectionError;
    }
    if type_is(err, "invalid_request_error") || code_is(err, "invalid_request") {
        return ProviderErrorKind::InvalidRequest;
    }
    if matches!(err.status, Some(400..=499)) {
        return ProviderErrorKind::ClientError;
    }
    ProviderErrorKind::Unknown
}

/// Parse a "try again in N s" style hint out of an error message.
pub fn parse_retry_hint(message: &str) -> Option<Duration> {
    let captures = RETRY_HINT_RE.captures(message)?;
    let amount: f64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2)?.as_str().to_ascii_lowercase();
    let millis = if unit.starts_with("ms") || unit.starts_with("milli") {
        amount
    } else {
        amount * 1000.0
    };
    if !millis.is_finite() || millis < 0.0 {
        return None;
    }
    Some(Duration::from_millis(millis.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_classify_by_range() {
        assert_eq!(
            classify(&ProviderError::status(502, "bad gateway")),
            ProviderErrorKind::ServerError
        );
        assert_eq!(
            classify(&ProviderError::status(429, "slow down")),
            ProviderErrorKind::RateLimit
        );
        assert_eq!(
            classify(&ProviderError::status(404, "no such model")),
            ProviderErrorKind::ClientError
        );
    }

    #[test]
    fn rate_limit_is_recognized_from_message_alone() {
        let err = ProviderError::new("Rate limit reached for gpt-4o in organization org-x");
        assert_eq!(classify(&err), ProviderErrorKind::RateLimit);
    }

    #[test]
    fn quota_wins_over_429_status() {
        let err = ProviderError::status(429, "You exceeded your current quota, please check your plan")
            .with_code("insufficient_quota");
        assert_eq!(classify(&err), ProviderErrorKind::InsufficientQuota);
    }

    #[test]
    fn token_limit_wins_over_invalid_request_type() {
        let err = ProviderError::status(400, "This model's maximum context length is 128000 tokens")
            .with_type("invalid_request_error");
        assert_eq!(classify(&err), ProviderErrorKind::TokenLimitExceeded);
    }

    #[test]
    fn invalid_request_type_is_not_a_generic_client_error() {
        let err = ProviderError::status(400, "Invalid value for 'tools'").with_type("invalid_request_error");
        assert_eq!(classify(&err), ProviderErrorKind::InvalidRequest);
    }

    #[test]
    fn nested_errno_is_a_network_error() {
        let err = ProviderError::new("fetch failed")
            .with_cause(ProviderError::new("request failed").with_cause(ProviderError::network("EAI_AGAIN", "getaddrinfo")));
        assert_eq!(classify(&err), ProviderErrorKind::NetworkError);
    }

    #[test]
    fn premature_close_is_detected_by_code_or_message() {
        assert_eq!(
            classify(&ProviderError::new("stream ended").with_code(PREMATURE_CLOSE_CODE)),
            ProviderErrorKind::PrematureClose
        );
        assert_eq!(
            classify(&ProviderError::new("Premature close")),
            ProviderErrorKind::PrematureClose
        );
    }

    #[test]
    fn timeouts_and_connection_errors_are_retryable() {
        let timeout = classify(&ProviderError::new("Request timed out."));
        let connection = classify(&ProviderError::new("Connection error."));
        assert_eq!(timeout, ProviderErrorKind::Timeout);
        assert_eq!(connection, ProviderErrorKind::ConnectionError);
        assert!(timeout.is_retryable());
        assert!(connection.is_retryable());
    }

    #[test]
    fn client_errors_mentioning_timeouts_are_not_retried() {
        let timeout_word = ProviderError::status(400, "Unrecognized request argument supplied: timeout");
        let connection_word = ProviderError::status(401, "Incorrect API key; connection closed by policy");
        assert_eq!(classify(&timeout_word), ProviderErrorKind::ClientError);
        assert_eq!(classify(&connection_word), ProviderErrorKind::ClientError);
        assert!(!classify(&timeout_word).is_retryable());
        assert_eq!(classify(&ProviderError::status(408, "Request Timeout")), ProviderErrorKind::Timeout);
    }

    #[test]
    fn unrecognized_failures_are_unknown() {
        assert_eq!(
            classify(&ProviderError::new("something odd happened")),
            ProviderErrorKind::Unknown
        );
    }

    #[test]
    fn retry_hint_parses_fractional_seconds() {
        let hint = parse_retry_hint("Rate limit reached. Please try again in 2.5s. Visit ...");
        assert_eq!(hint, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn retry_hint_parses_milliseconds() {
        assert_eq!(
            parse_retry_hint("Please try again in 120ms."),
            Some(Duration::from_millis(120))
        );
        assert_eq!(parse_retry_hint("no hint here"), None);
    }
}
