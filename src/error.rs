use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the indexing and query engines.
#[derive(Debug, Error)]
pub enum Error {
    /// Nothing exists at the index path. Callers decide whether to create a fresh index.
    #[error("no index exists at {}", .0.display())]
    IndexNotFound(PathBuf),

    /// The index could not be opened, read or written.
    #[error("index storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    /// Lookup of an unknown document id.
    #[error("document '{0}' not found")]
    NotFound(String),

    /// A source record or a staged write was rejected.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The document source failed while being read.
    #[error("document source failed: {0}")]
    Source(#[source] std::io::Error),
}

/// Underlying cause of [`Error::StorageUnavailable`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Sled(#[from] sled::Error),

    #[error("corrupt entry: {0}")]
    Codec(#[from] bincode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Format(String),
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Error::StorageUnavailable(StorageError::Sled(err))
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::StorageUnavailable(StorageError::Codec(err))
    }
}

impl Error {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Error::StorageUnavailable(StorageError::Format(message.into()))
    }

    /// True for failures that leave the index unreadable or unwritable.
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
