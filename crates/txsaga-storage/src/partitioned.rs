use txsaga_core::{Storage, StorageError, TxId};

use crate::error::BackendError;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Storage sharded across several inner backends.
///
/// Every transaction id is pinned to one partition by a stable hash of the
/// id, so all entries of a transaction live in a single backend and read
/// back in append order. The mapping depends only on the id and the number
/// of partitions; changing the count moves transactions.
#[derive(Debug)]
pub struct PartitionedStorage<S> {
    partitions: Vec<S>,
}

impl<S: Storage> PartitionedStorage<S> {
    /// # Errors
    ///
    /// Returns `BackendError::NoPartitions` if `partitions` is empty.
    pub fn new(partitions: Vec<S>) -> Result<Self, BackendError> {
        if partitions.is_empty() {
            return Err(BackendError::NoPartitions);
        }
        Ok(Self { partitions })
    }

    /// Index of the partition holding `tx_id`.
    #[must_use]
    pub fn partition_for(&self, tx_id: &TxId) -> usize {
        let hash = fnv1a(tx_id.as_str().as_bytes());
        // Lossless: the remainder is smaller than the partition count.
        #[allow(clippy::cast_possible_truncation)]
        let index = (hash % self.partitions.len() as u64) as usize;
        index
    }

    #[must_use]
    pub fn partitions(&self) -> &[S] {
        &self.partitions
    }

    fn backend(&self, tx_id: &TxId) -> &S {
        &self.partitions[self.partition_for(tx_id)]
    }
}

impl<S: Storage> Storage for PartitionedStorage<S> {
    fn exists(&self, tx_id: &TxId) -> Result<bool, StorageError> {
        self.backend(tx_id).exists(tx_id)
    }

    fn append(&self, tx_id: &TxId, entry: &str) -> Result<(), StorageError> {
        self.backend(tx_id).append(tx_id, entry)
    }

    fn read_all(&self, tx_id: &TxId) -> Result<Vec<String>, StorageError> {
        self.backend(tx_id).read_all(tx_id)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}
