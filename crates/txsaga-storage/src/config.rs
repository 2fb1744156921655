use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use txsaga_core::{ConfigError, MemoryStorage, Storage, load_toml_file};

use crate::error::BackendError;
use crate::file::FileStorage;
use crate::partitioned::PartitionedStorage;

/// Storage backend selection, loadable from TOML.
///
/// ```toml
/// kind = "partitioned"
/// dir = "/var/lib/txsaga"
/// partitions = 8
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Process-local map, lost on exit.
    #[default]
    Memory,
    /// One log file per transaction in `dir`.
    File { dir: PathBuf },
    /// `partitions` file stores in `dir/partition-<n>`.
    Partitioned { dir: PathBuf, partitions: usize },
}

impl StorageConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if `content` is not a valid configuration.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_toml_file(path)
    }

    /// Builds the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created or no partitions
    /// are configured.
    pub fn open(&self) -> Result<Arc<dyn Storage>, BackendError> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryStorage::new())),
            Self::File { dir } => Ok(Arc::new(FileStorage::open(dir)?)),
            Self::Partitioned { dir, partitions } => {
                let stores = (0..*partitions)
                    .map(|index| FileStorage::open(dir.join(format!("partition-{index}"))))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Arc::new(PartitionedStorage::new(stores)?))
            }
        }
    }
}
