//! Storage backends for `txsaga` transaction logs.
//!
//! [`FileStorage`] keeps one append-only file per transaction so logs survive
//! a restart and dangling transactions can be rolled back by the next
//! process. [`PartitionedStorage`] spreads transactions over several
//! backends while keeping each transaction's entries together.
//! [`StorageConfig`] selects one of them from TOML.

mod config;
mod error;
mod file;
mod partitioned;

pub use config::StorageConfig;
pub use error::BackendError;
pub use file::FileStorage;
pub use partitioned::PartitionedStorage;
