use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur across the search engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Bad query: {0}")]
    BadQuery(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    #[error("File too large: {path} ({size} bytes, limit {limit})")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Vector dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Failed to read file {path}: {source}")]
    FileRead { path: PathBuf, source: io::Error },

    #[error("Index I/O error: {0}")]
    IndexIo(String),

    #[error("Embedder unavailable: {0}")]
    EmbedderUnavailable(String),

    #[error("Index is not ready for search")]
    NotReady,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock poisoned: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<bincode::Error> for Error {
    fn from(error: bincode::Error) -> Self {
        Error::IndexIo(error.to_string())
    }
}

impl Error {
    /// Process exit code for the CLI: 0 success, 2 bad-request, 3 config
    /// error, 4 index I/O error, 5 internal.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::BadQuery(_) | Error::DimensionMismatch { .. } => 2,
            Error::Config(_) => 3,
            Error::IndexIo(_)
            | Error::Io(_)
            | Error::FileRead { .. }
            | Error::Serialization(_) => 4,
            _ => 5,
        }
    }

    /// JSON-RPC 2.0 error code for the stdio surface.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Error::BadQuery(_) | Error::DimensionMismatch { .. } => -32602,
            _ => -32603,
        }
    }

    /// Short machine-readable label carried in structured error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BadQuery(_) => "bad_query",
            Error::FileNotFound(_) => "not_found",
            Error::ChunkNotFound(_) => "not_found",
            Error::FileTooLarge { .. } => "too_large",
            Error::DimensionMismatch { .. } => "bad_query",
            Error::FileRead { .. } | Error::IndexIo(_) | Error::Io(_) | Error::Serialization(_) => {
                "index_io"
            }
            Error::EmbedderUnavailable(_) => "embedder_unavailable",
            Error::NotReady => "not_ready",
            Error::Cancelled => "cancelled",
            Error::Config(_) => "config",
            Error::Lock(_) | Error::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_match_taxonomy() {
        assert_eq!(Error::BadQuery("x".into()).exit_code(), 2);
        assert_eq!(Error::Config("x".into()).exit_code(), 3);
        assert_eq!(Error::IndexIo("x".into()).exit_code(), 4);
        assert_eq!(Error::Internal("x".into()).exit_code(), 5);
        assert_eq!(Error::Cancelled.exit_code(), 5);
    }

    #[test]
    fn test_rpc_codes() {
        assert_eq!(Error::BadQuery("empty".into()).rpc_code(), -32602);
        assert_eq!(Error::Internal("bug".into()).rpc_code(), -32603);
    }
}
