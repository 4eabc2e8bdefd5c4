//! Error types and handling for glossa-core operations.
//!
//! This module provides a comprehensive error type covering every failure
//! surface of the corpus pipeline: citation parsing, ingestion, storage and
//! cache access, search pagination, and lexical value generation. Errors are
//! categorized for easier handling and include context about recoverability
//! for retry logic.
//!
//! ## Error Categories
//!
//! - **Ingestion errors**: [`Error::CitationFormat`], [`Error::Encoding`],
//!   [`Error::DivisionIntegrity`]. Collected into an ingest report rather
//!   than halting the job.
//! - **Boundary errors**: [`Error::Storage`], [`Error::Cache`],
//!   [`Error::LlmUpstream`]. Surfaced to the caller.
//! - **Lifecycle errors**: [`Error::ResultsExpired`], [`Error::StaleTrigger`],
//!   [`Error::Cancelled`], [`Error::Deadline`].
//! - **Transient failures**: [`Error::Transient`], retried locally with
//!   exponential backoff before being converted to the underlying kind.
//!
//! ## Recovery Hints
//!
//! [`Error::is_recoverable`] reports whether a retry might succeed. The
//! retry helper in [`crate::llm`] consults this before backing off.

use thiserror::Error;

/// The main error type for glossa-core operations.
///
/// All public functions in glossa-core return `Result<T, Error>`. The error
/// type includes automatic conversion from common library errors and carries
/// a machine-readable [`kind`](Error::kind) for callers that dispatch on the
/// failure class rather than the message.
#[derive(Error, Debug)]
pub enum Error {
    /// A source line carried a malformed citation prefix.
    ///
    /// Reported per line during ingestion; the line is skipped and the job
    /// continues unless the configured error-rate threshold is exceeded.
    #[error("citation format error: {0}")]
    CitationFormat(String),

    /// A source line contained invalid Unicode.
    ///
    /// The line is skipped and does not contribute to any sentence; a gap
    /// is recorded in the ingest report.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A division failed close-time validation.
    ///
    /// Non-contiguous line numbers, a duplicate title part, or a nested
    /// title. The division is still emitted (best-effort ingestion).
    #[error("division integrity error: {0}")]
    DivisionIntegrity(String),

    /// The persistent store is unavailable or rejected the operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// The external cache engine failed.
    ///
    /// Non-fatal during result-set writes (the first page is still served);
    /// fatal during page fetches.
    #[error("cache error: {0}")]
    Cache(String),

    /// A `results_id` was not found in the cache.
    ///
    /// The result set expired or its cache fill failed; the client must
    /// re-run the search.
    #[error("results expired: {0}")]
    ResultsExpired(String),

    /// The external LLM returned an error or an unparsable reply.
    #[error("llm upstream error: {0}")]
    LlmUpstream(String),

    /// A timeout or known-retryable failure.
    ///
    /// Retried locally with exponential backoff (base 1 s, factor 2, cap 3
    /// attempts) before surfacing as the underlying kind.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The total budget for a task was exceeded.
    #[error("deadline exceeded: {0}")]
    Deadline(String),

    /// A delete confirmation no longer matches the latest version.
    ///
    /// Another write intervened between `trigger_delete` and `delete`;
    /// nothing was removed.
    #[error("stale delete trigger: {0}")]
    StaleTrigger(String),

    /// The task was cancelled.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A lemma, text, or sentence does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller-supplied parameters violate their constraints.
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network operation failed.
    ///
    /// Covers HTTP requests to the LLM boundary. The underlying
    /// `reqwest::Error` is preserved for detailed connection information.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration is invalid or inaccessible.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Returns `true` for errors that are typically temporary and might
    /// succeed if the operation is retried after a delay: transient
    /// failures, connection and timeout errors, and interrupted I/O.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Transient(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the error kind as a string identifier.
    ///
    /// Returns a static string identifying the failure class for logging,
    /// task-status records, and kind-specific handling. Ingest reports and
    /// lexical task records embed this identifier in their messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CitationFormat(_) => "citation_format",
            Self::Encoding(_) => "encoding",
            Self::DivisionIntegrity(_) => "division_integrity",
            Self::Storage(_) => "storage",
            Self::Cache(_) => "cache",
            Self::ResultsExpired(_) => "results_expired",
            Self::LlmUpstream(_) => "llm_upstream",
            Self::Transient(_) => "transient",
            Self::Deadline(_) => "deadline",
            Self::StaleTrigger(_) => "stale_trigger",
            Self::Cancelled(_) => "cancelled",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
///
/// Used throughout glossa-core for consistent error handling.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io;

    #[test]
    fn test_error_display_formatting() {
        let errors = vec![
            Error::CitationFormat("bad prefix".to_string()),
            Error::Encoding("invalid utf-8".to_string()),
            Error::DivisionIntegrity("gap in line numbers".to_string()),
            Error::Storage("constraint violation".to_string()),
            Error::Cache("connection refused".to_string()),
            Error::ResultsExpired("rs_abc".to_string()),
            Error::LlmUpstream("bad reply".to_string()),
            Error::Transient("timed out".to_string()),
            Error::Deadline("budget exhausted".to_string()),
            Error::StaleTrigger("v1 != v2".to_string()),
            Error::Cancelled("by caller".to_string()),
            Error::NotFound("lemma".to_string()),
            Error::Validation("page_size".to_string()),
        ];

        for error in errors {
            let rendered = error.to_string();
            assert!(!rendered.is_empty());
            assert!(rendered.contains(": "), "missing separator: '{rendered}'");
        }
    }

    #[test]
    fn test_error_kinds() {
        let cases = vec![
            (Error::CitationFormat("x".into()), "citation_format"),
            (Error::Encoding("x".into()), "encoding"),
            (Error::DivisionIntegrity("x".into()), "division_integrity"),
            (Error::Storage("x".into()), "storage"),
            (Error::Cache("x".into()), "cache"),
            (Error::ResultsExpired("x".into()), "results_expired"),
            (Error::LlmUpstream("x".into()), "llm_upstream"),
            (Error::Transient("x".into()), "transient"),
            (Error::Deadline("x".into()), "deadline"),
            (Error::StaleTrigger("x".into()), "stale_trigger"),
            (Error::Cancelled("x".into()), "cancelled"),
            (Error::NotFound("x".into()), "not_found"),
            (Error::Validation("x".into()), "validation"),
            (Error::Io(io::Error::other("x")), "io"),
            (Error::Serialization("x".into()), "serialization"),
            (Error::Config("x".into()), "config"),
        ];

        for (error, expected) in cases {
            assert_eq!(error.kind(), expected);
        }
    }

    #[test]
    fn test_error_recoverability() {
        let recoverable = vec![
            Error::Transient("timeout".to_string()),
            Error::Io(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
            Error::Io(io::Error::new(io::ErrorKind::Interrupted, "interrupted")),
        ];
        let permanent = vec![
            Error::CitationFormat("bad".to_string()),
            Error::Storage("down".to_string()),
            Error::Cache("down".to_string()),
            Error::ResultsExpired("gone".to_string()),
            Error::LlmUpstream("bad reply".to_string()),
            Error::Deadline("over".to_string()),
            Error::StaleTrigger("stale".to_string()),
            Error::Cancelled("stop".to_string()),
            Error::NotFound("missing".to_string()),
            Error::Validation("bad arg".to_string()),
            Error::Io(io::Error::new(io::ErrorKind::NotFound, "missing")),
        ];

        for error in recoverable {
            assert!(error.is_recoverable(), "expected {error:?} recoverable");
        }
        for error in permanent {
            assert!(!error.is_recoverable(), "expected {error:?} permanent");
        }
    }

    #[test]
    fn test_error_chain_source() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: Error = io_error.into();

        let source = std::error::Error::source(&error);
        assert!(source.is_some());
        assert!(source.unwrap().to_string().contains("access denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{nope");
        let error: Error = bad.unwrap_err().into();
        assert_eq!(error.kind(), "serialization");
    }

    proptest! {
        #[test]
        fn test_citation_format_with_arbitrary_messages(msg in r".{0,400}") {
            let error = Error::CitationFormat(msg.clone());
            prop_assert!(error.to_string().contains(&msg));
            prop_assert_eq!(error.kind(), "citation_format");
            prop_assert!(!error.is_recoverable());
        }

        #[test]
        fn test_transient_with_arbitrary_messages(msg in r".{0,400}") {
            let error = Error::Transient(msg.clone());
            prop_assert!(error.to_string().contains(&msg));
            prop_assert_eq!(error.kind(), "transient");
            prop_assert!(error.is_recoverable());
        }
    }

    #[test]
    fn test_error_with_greek_messages() {
        let messages = vec!["ἄρθρον not found", "lemma αἷμα", "Ὤμου δὲ ἄρθρον"];
        for msg in messages {
            let error = Error::NotFound(msg.to_string());
            assert!(error.to_string().contains(msg));
        }
    }

    #[test]
    fn test_error_size() {
        let error_size = std::mem::size_of::<Error>();
        assert!(error_size <= 64, "Error type too large: {error_size} bytes");
    }
}
