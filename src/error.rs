//! Centralized error type for the shard runtime.
//!
//! DESIGN DECISION: one enum-based error type for the whole crate, following
//! the teacher's `Error` pattern (structured variants + thiserror + a
//! `Result<T>` alias) rather than a separate error type per shard.
//! WHY: the three shards and the durable-store adapters funnel errors
//! through the same `Execute` boundary (spec.md §7: "Any shard `Execute`
//! returns `(summary, error)`"), so one exhaustive enum keeps dispatch sites
//! simple and keeps the `?` operator usable everywhere.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A retryable collaborator failure surfaced only after backoff attempts
    /// were exhausted (spec.md §7: UpstreamTimeout / NetworkTransient).
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("network error: {0}")]
    NetworkTransient(String),

    /// No model client configured for an operation that strictly requires one.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("store error: {0}")]
    Store(String),

    /// A cancellation token fired; propagated unwrapped at the next
    /// suspension point (spec.md §5, §7).
    #[error("operation cancelled")]
    Cancelled,

    /// LLM synthesis JSON failed to decode; never surfaced, callers fall
    /// back to a single synthesized atom (spec.md §4.1 step 6, §7).
    #[error("LLM response could not be parsed as JSON: {0}")]
    ParserMismatch(String),

    /// `CheckAlignment` result was `failed` or `blocked`.
    #[error("alignment check blocked: {0}")]
    AlignmentBlocked(String),

    #[error("research failed: {0}")]
    ResearchFailed(String),

    #[error("tester shard failed: {0}")]
    TesterFailed(String),

    #[error("guardian failed: {0}")]
    GuardianFailed(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Store(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::UpstreamTimeout(err.to_string())
        } else {
            Error::NetworkTransient(err.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("task join failed: {err}"))
    }
}
