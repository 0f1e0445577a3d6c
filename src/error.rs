//! Core error taxonomy.
//!
//! Mirrors the error kinds a reimplementation of the hybrid retrieval engine
//! needs to distinguish: bad input, missing entities, unreadable documents,
//! embedding/vector-store failures, and upstream transport failures. Library
//! code returns `CoreError`; the HTTP edge wraps it (or any other failure)
//! in `anyhow::Error` and maps it to a status code.

use thiserror::Error;

/// The error kinds a caller of the retrieval engine needs to distinguish.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad figure id, over-length text, out-of-range year, etc.
    #[error("validation error: {0}")]
    Validation(String),

    /// Figure or chunk not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unsupported file type, empty extraction, or corrupt bytes.
    #[error("decode error: {0}")]
    Decode(String),

    /// Local model failure or remote embedding HTTP error.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Vector store unavailable or BM25 rebuild failure.
    #[error("index error: {0}")]
    Index(String),

    /// LLM chat endpoint (or any outbound HTTP call) failed.
    #[error("transport error: {0}")]
    Transport(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn index(msg: impl Into<String>) -> Self {
        Self::Index(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}
