use std::io;
use std::path::PathBuf;

use thiserror::Error;
use txsaga_core::StorageError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    #[error("partitioned storage needs at least one partition")]
    NoPartitions,

    #[error("failed to create log directory '{path}'")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read log '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write log '{path}'")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("log entries must be single-line, got {len} bytes spanning several lines")]
    MultilineEntry { len: usize },
}

impl From<BackendError> for StorageError {
    fn from(err: BackendError) -> Self {
        StorageError::Backend(Box::new(err))
    }
}
