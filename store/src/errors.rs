use thiserror::Error;

/// Errors related to communication with the artifact store.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The supplied revision is stale, the record already exists, or the
    /// requested status transition is not allowed.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        if value.kind() == std::io::ErrorKind::InvalidInput {
            Error::InvalidRequest(value.to_string())
        } else {
            Error::StorageUnavailable(value.to_string())
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        // don't leak credentials that might be part of the url.
        Error::StorageUnavailable(value.without_url().to_string())
    }
}

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::InvalidRequest(msg) => Self::new(std::io::ErrorKind::InvalidInput, msg),
            Error::NotFound(msg) => Self::new(std::io::ErrorKind::NotFound, msg),
            Error::Conflict(msg) => Self::new(std::io::ErrorKind::AlreadyExists, msg),
            Error::StorageUnavailable(msg) => Self::new(std::io::ErrorKind::Other, msg),
        }
    }
}
