use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::StorageError;
use crate::ids::TxId;

/// Append-only persistence for transaction logs.
///
/// Implementations must return the entries of one transaction in the order
/// they were appended. Entries are opaque encoded strings to the backend.
pub trait Storage: Send + Sync {
    /// Returns `true` if any entries are persisted for `tx_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    fn exists(&self, tx_id: &TxId) -> Result<bool, StorageError>;

    /// Appends one encoded entry to the log of `tx_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    fn append(&self, tx_id: &TxId, entry: &str) -> Result<(), StorageError>;

    /// Reads every entry of `tx_id` in append order; empty if none exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn read_all(&self, tx_id: &TxId) -> Result<Vec<String>, StorageError>;
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn exists(&self, tx_id: &TxId) -> Result<bool, StorageError> {
        (**self).exists(tx_id)
    }

    fn append(&self, tx_id: &TxId, entry: &str) -> Result<(), StorageError> {
        (**self).append(tx_id, entry)
    }

    fn read_all(&self, tx_id: &TxId) -> Result<Vec<String>, StorageError> {
        (**self).read_all(tx_id)
    }
}

/// Process-local storage keeping every log in a map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    logs: RwLock<HashMap<TxId, Vec<String>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every transaction with at least one entry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Poisoned` if a writer panicked.
    pub fn tx_ids(&self) -> Result<Vec<TxId>, StorageError> {
        let logs = self.logs.read().map_err(|_| StorageError::Poisoned)?;
        let mut ids: Vec<TxId> = logs
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, tx_id: &TxId) -> Result<bool, StorageError> {
        let logs = self.logs.read().map_err(|_| StorageError::Poisoned)?;
        Ok(logs.get(tx_id).is_some_and(|entries| !entries.is_empty()))
    }

    fn append(&self, tx_id: &TxId, entry: &str) -> Result<(), StorageError> {
        let mut logs = self.logs.write().map_err(|_| StorageError::Poisoned)?;
        logs.entry(tx_id.clone())
            .or_default()
            .push(entry.to_string());
        Ok(())
    }

    fn read_all(&self, tx_id: &TxId) -> Result<Vec<String>, StorageError> {
        let logs = self.logs.read().map_err(|_| StorageError::Poisoned)?;
        Ok(logs.get(tx_id).cloned().unwrap_or_default())
    }
}
