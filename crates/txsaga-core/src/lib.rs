//! Log-driven saga coordinator with compensating transactions.
//!
//! A [`Saga`] binds step ids to an action and a compensation. A
//! [`Transaction`] runs steps against an append-only log kept in a
//! [`Storage`] backend: each step's arguments are persisted before its action
//! runs, and a rollback replays the log to compensate every started step in
//! the order the steps were started. Because the log is the only state, a
//! transaction left unfinished by a crashed process is rolled back when its
//! id is started again.

mod callable;
mod config;
mod context;
mod entry;
mod erased;
mod error;
mod history;
mod ids;
mod logger;
mod retry;
mod saga;
mod step;
mod step_registry;
mod storage;
mod transaction;
mod type_registry;
mod value;

pub use callable::{CallError, Callable, IntoCallable, Signature, Slot};
pub use config::{SagaConfig, load_toml_file};
pub use context::{Context, DoneReason};
pub use entry::{ArgData, LogEntry, LogKind, UnknownLogKind};
pub use error::{
    ArgumentError, BoxError, CallableRole, ConfigError, Result, SagaError, StorageError,
    ValidationRule,
};
pub use history::{StepRecord, StepStatus, TxHistory, TxState};
pub use ids::{StepId, TxId};
pub use logger::{Logger, NoopLogger, TracingLogger};
pub use retry::{Backoff, RetryLimit, RetryPolicy};
pub use saga::Saga;
pub use step::SubTx;
pub use step_registry::{StepDefinition, StepRegistry};
pub use storage::{MemoryStorage, Storage};
pub use transaction::Transaction;
pub use type_registry::{TypeDescriptor, TypeRegistry};
pub use value::{Arg, SagaValue, canonical_type_name};
