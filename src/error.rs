//! Error taxonomy surfaced to screens, per the external-interface contract.
//!
//! Pool errors are captured, not raised: a fetch function returns
//! `Result<T, Error>` and the pool stores the `Error` in its snapshot rather
//! than propagating it. This module only defines the shape of that error.

use thiserror::Error;

/// The small set of error kinds a screen can branch on, independent of the
/// underlying transport or remote API library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Usage,
    NotFound,
    AuthRequired,
    Forbidden,
    RateLimit,
    Network,
    ApiError,
    Ambiguous,
}

impl ErrorKind {
    /// Exit code for non-interactive callers.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Usage => 1,
            ErrorKind::NotFound => 2,
            ErrorKind::AuthRequired => 3,
            ErrorKind::Forbidden => 4,
            ErrorKind::RateLimit => 5,
            ErrorKind::Network => 6,
            ErrorKind::ApiError => 7,
            ErrorKind::Ambiguous => 8,
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: humanize(kind, message.into()),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Usage, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthRequired, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn api_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ApiError, message)
    }

    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Ambiguous, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Network, "request cancelled")
    }

    /// Authentication failures get a persistent status line rather than a
    /// transient toast. Screens check this instead of matching on `kind`
    /// directly so the 401-string heuristic lives here.
    pub fn is_session_expired(&self) -> bool {
        self.kind == ErrorKind::AuthRequired || self.message.contains("401")
    }
}

/// Humanize transport-ish errors into short strings; anything else is
/// truncated to 80 characters.
fn humanize(kind: ErrorKind, message: String) -> String {
    let lower = message.to_lowercase();
    let short = match kind {
        ErrorKind::Network if lower.contains("dns") || lower.contains("resolve") => {
            Some("could not resolve host".to_string())
        }
        ErrorKind::Network if lower.contains("connect") => {
            Some("could not connect".to_string())
        }
        ErrorKind::Network if lower.contains("timed out") || lower.contains("timeout") => {
            Some("request timed out".to_string())
        }
        ErrorKind::ApiError if lower.contains("500") || lower.contains("502") || lower.contains("503") => {
            Some("server error".to_string())
        }
        _ => None,
    };
    let message = short.unwrap_or(message);
    if message.len() > 80 {
        let mut truncated: String = message.chars().take(77).collect();
        truncated.push_str("...");
        truncated
    } else {
        message
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_spec_order() {
        assert_eq!(ErrorKind::Usage.exit_code(), 1);
        assert_eq!(ErrorKind::Ambiguous.exit_code(), 8);
    }

    #[test]
    fn long_messages_are_truncated() {
        let msg = "x".repeat(200);
        let err = Error::api_error(msg);
        assert_eq!(err.message.len(), 80);
        assert!(err.message.ends_with("..."));
    }

    #[test]
    fn dns_errors_are_humanized() {
        let err = Error::network("dns resolution failed for host example.com");
        assert_eq!(err.message, "could not resolve host");
    }

    #[test]
    fn session_expired_detection() {
        assert!(Error::auth_required("no token").is_session_expired());
        assert!(Error::api_error("server returned 401 unauthorized").is_session_expired());
        assert!(!Error::network("could not connect").is_session_expired());
    }
}
