//! Structured provider failures.

use std::fmt;
use std::io::ErrorKind;

use serde::{Deserialize, Serialize};

/// A failed provider request or stream, as reported by the transport.
///
/// Transports fill in whatever they know; classification only looks at the
/// populated fields, so a bare message is a valid error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub error_type: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// OS-level error code name such as `ECONNRESET`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ProviderError>>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// An HTTP-level failure.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            ..Default::default()
        }
    }

    /// A socket-level failure carrying an errno name.
    pub fn network(errno: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errno: Some(errno.into()),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_cause(mut self, cause: ProviderError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Iterate over this error and every nested cause, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &ProviderError> {
        std::iter::successors(Some(self), |err| err.cause.as_deref())
    }

    /// First request id found anywhere in the cause chain.
    pub fn any_request_id(&self) -> Option<&str> {
        self.chain().find_map(|err| err.request_id.as_deref())
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(status) = self.status {
            write!(f, "status {status}: ")?;
        }
        f.write_str(&self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code {code})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::TimedOut => Self::timeout(message),
            ErrorKind::UnexpectedEof => Self::new(message).with_code("ERR_STREAM_PREMATURE_CLOSE"),
            kind => match errno_for_kind(kind) {
                Some(errno) => Self::network(errno, message),
                None => Self::new(message),
            },
        }
    }
}

fn errno_for_kind(kind: ErrorKind) -> Option<&'static str> {
    Some(match kind {
        ErrorKind::ConnectionReset => "ECONNRESET",
        ErrorKind::ConnectionRefused => "ECONNREFUSED",
        ErrorKind::ConnectionAborted => "ECONNABORTED",
        ErrorKind::BrokenPipe => "EPIPE",
        ErrorKind::NotConnected => "ENOTCONN",
        ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_walks_nested_causes() {
        let err = ProviderError::new("fetch failed")
            .with_cause(ProviderError::network("ECONNRESET", "socket hang up").with_request_id("req_1"));

        let errnos: Vec<_> = err.chain().map(|e| e.errno.as_deref()).collect();
        assert_eq!(errnos, vec![None, Some("ECONNRESET")]);
        assert_eq!(err.any_request_id(), Some("req_1"));
    }

    #[test]
    fn io_errors_map_onto_errno_names() {
        let reset = ProviderError::from(std::io::Error::new(ErrorKind::ConnectionReset, "reset"));
        let timeout = ProviderError::from(std::io::Error::new(ErrorKind::TimedOut, "slow"));

        assert_eq!(reset.errno.as_deref(), Some("ECONNRESET"));
        assert!(timeout.timed_out);
    }

    #[test]
    fn display_includes_status_and_code() {
        let err = ProviderError::status(400, "bad").with_code("invalid_value");
        assert_eq!(err.to_string(), "status 400: bad (code invalid_value)");
    }
}
