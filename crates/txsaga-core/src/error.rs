use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::context::DoneReason;
use crate::ids::{StepId, TxId};

/// Error type returned by actions and compensations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, SagaError>;

/// Which callable of a step definition an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableRole {
    Action,
    Compensation,
}

impl fmt::Display for CallableRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action => f.write_str("action"),
            Self::Compensation => f.write_str("compensation"),
        }
    }
}

/// Structural rule a callable's signature broke at registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationRule {
    #[error("first parameter must be the context token")]
    MissingContext,

    #[error("first result must be the error slot")]
    MissingError,

    #[error("parameter {position} is a context token; only the first parameter may be one")]
    MisplacedContext { position: usize },

    #[error("result {position} is an error slot; only the first result may be one")]
    MisplacedError { position: usize },
}

/// Mismatch between the arguments supplied to a callable and its parameters.
#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("expected {expected} argument(s), got {actual}")]
    Count { expected: usize, actual: usize },

    #[error("argument {position} has type '{actual}', expected '{expected}'")]
    Type {
        position: usize,
        expected: String,
        actual: String,
    },

    #[error("argument {position} could not be converted to '{expected}'")]
    Convert {
        position: usize,
        expected: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure reported by a [`Storage`](crate::Storage) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage lock poisoned")]
    Poisoned,

    #[error("storage backend failed")]
    Backend(#[source] BoxError),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SagaError {
    #[error("invalid {role} for step '{step}': {rule}")]
    Validation {
        step: StepId,
        role: CallableRole,
        rule: ValidationRule,
    },

    #[error(
        "action and compensation of step '{step}' take different parameters: {action} vs {compensation}"
    )]
    SignatureMismatch {
        step: StepId,
        action: String,
        compensation: String,
    },

    #[error("type '{type_name}' is not registered")]
    TypeNotRegistered { type_name: String },

    #[error("step '{step}' is not registered")]
    NotFound { step: StepId },

    #[error("arguments for {role} of step '{step}' do not match its parameters")]
    ArgumentMismatch {
        step: StepId,
        role: CallableRole,
        #[source]
        source: ArgumentError,
    },

    #[error("could not {what}")]
    Serialization {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage failed for transaction '{tx_id}'")]
    Persistence {
        tx_id: TxId,
        #[source]
        source: StorageError,
    },

    #[error("action of step '{step}' failed")]
    Action {
        step: StepId,
        #[source]
        source: BoxError,
    },

    #[error("compensation of step '{step}' failed")]
    Compensation {
        step: StepId,
        #[source]
        source: BoxError,
    },

    #[error("could not roll back dangling transaction '{tx_id}'")]
    ResidualRollback {
        tx_id: TxId,
        #[source]
        source: Box<SagaError>,
    },

    #[error("transaction '{tx_id}' has already ended")]
    TransactionClosed { tx_id: TxId },

    #[error("rollback of transaction '{tx_id}' stopped: context {reason}")]
    Cancelled {
        tx_id: TxId,
        reason: DoneReason,
        #[source]
        last_error: Box<SagaError>,
    },
}

/// Failure while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration")]
    Parse(#[from] toml::de::Error),
}
