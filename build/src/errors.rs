use thiserror::Error;

/// Everything that can go wrong submitting, running or fetching a build.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("invalid secret")]
    Unauthorized,

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("could not spawn: {0}")]
    SpawnFailed(String),

    #[error("output stream broke: {0}")]
    StreamError(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Short name of the error kind, used in diagnostics sent to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Unauthorized => "Unauthorized",
            Error::MalformedRequest(_) => "MalformedRequest",
            Error::StorageUnavailable(_) => "StorageUnavailable",
            Error::Conflict(_) => "Conflict",
            Error::SpawnFailed(_) => "SpawnFailed",
            Error::StreamError(_) => "StreamError",
            Error::NotFound(_) => "NotFound",
        }
    }

    /// Renders the line written into a live output stream, or an error
    /// response body.
    pub fn diagnostic(&self) -> String {
        format!("Error occurred: [{}] {}\n", self.kind(), self)
    }
}

impl From<remake_store::Error> for Error {
    fn from(value: remake_store::Error) -> Self {
        match value {
            remake_store::Error::InvalidRequest(msg) => Error::MalformedRequest(msg),
            remake_store::Error::StorageUnavailable(msg) => Error::StorageUnavailable(msg),
            remake_store::Error::Conflict(msg) => Error::Conflict(msg),
            remake_store::Error::NotFound(msg) => Error::NotFound(msg),
        }
    }
}
