use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure kinds surfaced by the retrieval and memory core.
///
/// Callers can match on the variant to tell local rejections
/// (`DimensionMismatch`, `InvalidArgument`) apart from failures of an
/// external collaborator (`BackendUnavailable`, `CompletionFailure`).
#[derive(Debug, Error)]
pub enum Error {
    #[error("embedding has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("backend '{backend}' unavailable: {source}")]
    BackendUnavailable {
        backend: String,
        #[source]
        source: BoxError,
    },

    #[error("completion failed: {message}")]
    CompletionFailure {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn backend<E>(backend: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::BackendUnavailable { backend: backend.into(), source: source.into() }
    }

    pub fn completion<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::CompletionFailure { message: message.into(), source: Some(source.into()) }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
