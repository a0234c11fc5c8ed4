//! Structured error kinds for the indexing and retrieval pipeline.
//!
//! Every fallible operation in this crate returns `Result<T, ConexusError>` rather
//! than a stringly-typed error: callers that need to make a policy decision (skip
//! a file, abort a pass, degrade a query) match on the variant, not on message text.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConexusError {
    /// A single file could not be processed; the pass continues without it.
    #[error("skipping {path}: {reason}")]
    SkipRecoverable { path: PathBuf, reason: String },

    /// A retryable network/DB error. Exhausted retries escalate to `FatalStoreError`
    /// on writes or degrade the caller on reads.
    #[error("transient I/O error for {id}: {source}")]
    TransientIOError { id: String, #[source] source: std::io::Error },

    /// One retrieval arm was unavailable; the query still produced a result.
    #[error("query degraded: {arm} arm unavailable")]
    DegradedQuery { arm: &'static str },

    /// Both retrieval arms failed; the query itself fails.
    #[error("retrieval unavailable: dense and sparse arms both failed")]
    RetrievalUnavailable,

    /// A store write failed after retries during an indexing pass.
    #[error("fatal store error during {operation} on {id}: {cause}")]
    FatalStoreError { operation: &'static str, id: String, cause: String },

    /// IndexState could not be deserialized; treated as absent, triggers full reindex.
    #[error("corrupt index state at {path}: {cause}")]
    CorruptStateWarning { path: PathBuf, cause: String },

    /// Missing/invalid options at startup; hard fail before any work begins.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

pub type Result<T> = std::result::Result<T, ConexusError>;

impl ConexusError {
    /// True for errors that represent a single-item degradation rather than an
    /// operation-wide failure — the caller may continue the surrounding pass/query.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConexusError::SkipRecoverable { .. } | ConexusError::DegradedQuery { .. }
        )
    }
}
