//! Crate-wide error type.

use thiserror::Error;

use crate::bql::errors::ParseError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BasaltError>;

/// Errors surfaced by the compiler, executor, and protocol layers.
///
/// Lock contention is deliberately absent: a contended acquisition is an
/// ordinary `Ok(None)` outcome, not an error (callers retry or abandon).
#[derive(Debug, Error)]
pub enum BasaltError {
    /// Front-end rejection: unresolvable name or unsupported operator.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Malformed step list or IR handed to the generator. Programming error.
    #[error("codegen invariant violated: {0}")]
    CodegenInvariant(&'static str),
    /// The authorization collaborator refused the record.
    #[error("access denied: {0}")]
    Denied(String),
    /// Get/Update/Delete target missing, or a lock row went stale.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// A document came back without a field the hydrator requires.
    #[error("malformed document: {0}")]
    Malformed(String),
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
    /// Database transport failure, propagated unchanged. No internal retry.
    #[error("transport: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl BasaltError {
    /// Wraps an arbitrary transport-layer failure.
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        BasaltError::Transport(Box::new(err))
    }
}
