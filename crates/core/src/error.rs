use thiserror::Error;

/// Failures talking to a remote backend (embedding service or vector store).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("vector dimension {got} does not match collection dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document parse error: {0}")]
    Parse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("token counting failed: {0}")]
    Tokenization(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Generation failures are rendered into a terminal in-stream event so
/// partial output already delivered stays visible to the consumer.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation backend unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation backend returned {status}")]
    Backend { status: reqwest::StatusCode },

    #[error("generation stream interrupted: {0}")]
    Interrupted(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
