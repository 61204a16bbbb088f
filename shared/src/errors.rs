//! Error types for the Reelport job core.
use thiserror::Error;

/// Metadata could not be resolved for a URL.
///
/// Raised on the synchronous request path and shown to the caller as a
/// client error. Never retried.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Message reported by the extractor itself, passed through verbatim.
    #[error("{0}")]
    Adapter(String),

    #[error("Failed to spawn extractor: {0}")]
    Spawn(String),

    #[error("Extractor returned invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Extractor metadata is missing required field `{0}`")]
    MissingField(&'static str),
}

/// Failure during a background download, after metadata succeeded.
///
/// Only ever observed through the job's `error` field.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{0}")]
    Adapter(String),

    #[error("Failed to spawn downloader: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download task panicked: {0}")]
    Panicked(String),
}

/// Malformed progress payload from the extractor. Swallowed by the
/// orchestrator, which resets progress to zero.
#[derive(Debug, Error, PartialEq)]
pub enum ProgressParseError {
    #[error("progress event carries neither a percentage nor byte counts")]
    MissingFields,

    #[error("percentage string {0:?} contains no digits")]
    Empty(String),

    #[error("percentage string {0:?} is not a number")]
    NotNumeric(String),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;
pub type DownloadResult<T> = Result<T, DownloadError>;
