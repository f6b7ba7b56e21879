//! Crate-wide error taxonomy.
//!
//! One enum, one stable code per variant. No `anyhow`/`thiserror`: every
//! fallible path in this crate returns `Result<T, Error>` and propagates with
//! `?`, matching the rest of the ambient stack.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    InvalidRequest(String),
    NotReady(String),
    Timeout(String),
    Parse { path: String, detail: String },
    WorkerFailure(String),
    ModelUnavailable(String),
    VectorStore(String),
    Filesystem(String),
    Pattern(String),
    Io(std::io::Error),
}

impl Error {
    /// Stable string code surfaced on the RPC protocol.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidRequest(_) => "invalid_request",
            Error::NotReady(_) => "not_ready",
            Error::Timeout(_) => "timeout",
            Error::Parse { .. } => "parse_error",
            Error::WorkerFailure(_) => "worker_failure",
            Error::ModelUnavailable(_) => "model_unavailable",
            Error::VectorStore(_) => "vector_store_error",
            Error::Filesystem(_) => "filesystem_error",
            Error::Pattern(_) => "pattern_error",
            Error::Io(_) => "io_error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidRequest(m) => write!(f, "invalid request: {m}"),
            Error::NotReady(m) => write!(f, "index not ready: {m}"),
            Error::Timeout(m) => write!(f, "timed out: {m}"),
            Error::Parse { path, detail } => write!(f, "failed to parse {path}: {detail}"),
            Error::WorkerFailure(m) => write!(f, "worker failure: {m}"),
            Error::ModelUnavailable(m) => write!(f, "embedding model unavailable: {m}"),
            Error::VectorStore(m) => write!(f, "vector store error: {m}"),
            Error::Filesystem(m) => write!(f, "filesystem error: {m}"),
            Error::Pattern(m) => write!(f, "invalid pattern: {m}"),
            Error::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::VectorStore(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
