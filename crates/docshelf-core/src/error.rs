//! Error taxonomy for the ingestion and retrieval pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or empty input to the chunker.
    #[error("chunking failed: {0}")]
    Chunking(String),

    /// Unknown document or chunk id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad query or command parameters.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Embedding or index backend unreachable. Fatal for the current
    /// operation only.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    /// External search provider failure. Recovered inside the fallback
    /// controller and never surfaced to callers of `answer`.
    #[error("external search failed: {0}")]
    ExternalSearch(String),

    /// Persistence backend failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        Error::InvalidArgument(what.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
