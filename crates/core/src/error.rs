use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported document format: .{0}")]
    UnsupportedFormat(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("extraction timed out after {0:?}")]
    ExtractionTimeout(Duration),

    #[error("extracted content too short: {got} chars, minimum is {minimum}")]
    ContentValidation { got: usize, minimum: usize },

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("document processing failed: {0}")]
    ProcessingFailed(String),
}

impl IngestError {
    /// Hard rejections never index the document. Everything else is
    /// recoverable at the pipeline level: the document is indexed with
    /// placeholder content and flagged.
    pub fn is_hard_rejection(&self) -> bool {
        matches!(
            self,
            IngestError::UnsupportedFormat(_) | IngestError::ContentValidation { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("remote index unavailable: {0}")]
    BackendUnavailable(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("background scoring disabled after repeated failures")]
    WorkerCircuitOpen,

    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("document not indexed: {0}")]
    NotFound(String),

    #[error("search unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
