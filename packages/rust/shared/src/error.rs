//! Error types for WebResolve.
//!
//! Library crates use [`WebResolveError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all WebResolve operations.
#[derive(Debug, thiserror::Error)]
pub enum WebResolveError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP transport error.
    #[error("network error: {0}")]
    Network(String),

    /// A model response envelope that could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Language model API error (auth, quota, empty choices).
    #[error("model error: {0}")]
    Model(String),

    /// The query optimizer produced no usable query.
    #[error("query optimization failed: {0}")]
    Optimization(String),

    /// The search provider failed, leaving no candidates to process.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// A single candidate page could not be fetched.
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// The semantic evaluator returned output that does not match the contract.
    #[error("evaluation output could not be parsed: {message}")]
    EvaluationParse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (blank question, malformed URL, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, WebResolveError>;

impl WebResolveError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a fetch failure for a candidate URL.
    pub fn fetch(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create an evaluation parse failure.
    pub fn evaluation_parse(msg: impl Into<String>) -> Self {
        Self::EvaluationParse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is confined to a single candidate.
    ///
    /// Recoverable errors are recorded against the candidate and the
    /// resolution loop moves on; everything else aborts the attempt.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. }
                | Self::EvaluationParse { .. }
                | Self::Model(_)
                | Self::Parse { .. }
                | Self::Network(_)
                | Self::Conversion(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = WebResolveError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = WebResolveError::fetch("https://example.com", "HTTP 404 Not Found");
        assert_eq!(
            err.to_string(),
            "fetch failed for https://example.com: HTTP 404 Not Found"
        );
    }

    #[test]
    fn per_candidate_errors_are_recoverable() {
        assert!(WebResolveError::fetch("https://a.example", "timeout").is_recoverable());
        assert!(WebResolveError::evaluation_parse("missing field `reasoning`").is_recoverable());
        assert!(WebResolveError::Model("HTTP 429".into()).is_recoverable());
        assert!(WebResolveError::parse("expected value at line 1").is_recoverable());
    }

    #[test]
    fn attempt_level_errors_are_fatal() {
        assert!(!WebResolveError::Optimization("empty completion".into()).is_recoverable());
        assert!(!WebResolveError::Retrieval("HTTP 401".into()).is_recoverable());
        assert!(!WebResolveError::validation("blank question").is_recoverable());
    }
}
