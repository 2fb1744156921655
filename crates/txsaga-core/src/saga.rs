use std::fmt;
use std::sync::Arc;

use crate::callable::IntoCallable;
use crate::config::SagaConfig;
use crate::context::Context;
use crate::entry::ArgData;
use crate::error::{CallableRole, Result, SagaError};
use crate::ids::{StepId, TxId};
use crate::logger::{Logger, TracingLogger};
use crate::step::SubTx;
use crate::step_registry::{StepDefinition, StepRegistry};
use crate::storage::Storage;
use crate::transaction::Transaction;
use crate::type_registry::TypeRegistry;
use crate::value::Arg;

/// Step definitions, the types their arguments use, and the collaborators
/// every transaction runs against.
///
/// Steps are added while the saga is exclusively owned. Transactions borrow
/// the saga, so no definition can change while one is live.
///
/// ```
/// use txsaga_core::{BoxError, Context, MemoryStorage, Saga, args};
///
/// fn debit(_ctx: &Context, amount: i32, account: String) -> Result<(), BoxError> {
///     println!("debit {amount} from {account}");
///     Ok(())
/// }
///
/// fn refund(_ctx: &Context, amount: i32, account: String) -> Result<(), BoxError> {
///     println!("refund {amount} to {account}");
///     Ok(())
/// }
///
/// # fn main() -> Result<(), txsaga_core::SagaError> {
/// let mut saga = Saga::new(MemoryStorage::new());
/// saga.add_sub_tx("debit", debit, refund)?;
///
/// let tx = saga.new_tx(Context::new(), "tx1");
/// tx.start()?;
/// tx.execute_step("debit", args![100_i32, String::from("sam")])?;
/// tx.end()?;
/// # Ok(())
/// # }
/// ```
pub struct Saga {
    types: TypeRegistry,
    steps: StepRegistry,
    storage: Arc<dyn Storage>,
    logger: Arc<dyn Logger>,
    config: SagaConfig,
}

impl Saga {
    /// Creates a saga persisting to `storage` and logging through
    /// [`TracingLogger`].
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self {
            types: TypeRegistry::new(),
            steps: StepRegistry::new(),
            storage: Arc::new(storage),
            logger: Arc::new(TracingLogger),
            config: SagaConfig::default(),
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: SagaConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a step under `id`.
    ///
    /// The value types of `action` and then of `compensation` are registered
    /// first; they stay registered even if a later check fails. Re-adding an
    /// id replaces its previous definition.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::Validation` if either callable breaks the
    /// context/error slot rules, or `SagaError::SignatureMismatch` if they
    /// take different parameters. Nothing is added in either case.
    pub fn add_sub_tx<A, C, MA, MC>(
        &mut self,
        id: impl Into<StepId>,
        action: A,
        compensation: C,
    ) -> Result<()>
    where
        A: IntoCallable<MA>,
        C: IntoCallable<MC>,
    {
        let id = id.into();
        let action = action.into_callable();
        let compensation = compensation.into_callable();

        for (role, callable) in [
            (CallableRole::Action, &action),
            (CallableRole::Compensation, &compensation),
        ] {
            self.types
                .register(callable)
                .map_err(|rule| SagaError::Validation {
                    step: id.clone(),
                    role,
                    rule,
                })?;
        }

        if self.steps.add(id.clone(), action, compensation)?.is_some() {
            self.logger
                .info(format_args!("step '{id}' redefined, previous definition replaced"));
        }
        tracing::debug!(step = %id, "step registered");
        Ok(())
    }

    /// Registers a [`SubTx`] under its id.
    ///
    /// The step is invoked with a single argument of type `S::Args`.
    ///
    /// # Errors
    ///
    /// See [`Saga::add_sub_tx`].
    pub fn add_step<S: SubTx>(&mut self, step: S) -> Result<()> {
        let id = step.id();
        let action_step = Arc::new(step);
        let compensation_step = Arc::clone(&action_step);

        let action = move |ctx: &Context, args: S::Args| action_step.execute(ctx, args);
        let compensation =
            move |ctx: &Context, args: S::Args| compensation_step.compensate(ctx, args);

        self.add_sub_tx(id, action, compensation)
    }

    /// # Errors
    ///
    /// Returns `SagaError::NotFound` if no step is registered under `id`.
    pub fn step(&self, id: &str) -> Result<&StepDefinition> {
        self.steps.get(id)
    }

    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    #[must_use]
    pub fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    /// Encodes `args` with their registered type names, in input order.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::TypeNotRegistered` for an argument of an unknown
    /// type and `SagaError::Serialization` if a value cannot be encoded.
    pub fn marshal_args(&self, args: &[Arg]) -> Result<Vec<ArgData>> {
        args.iter()
            .enumerate()
            .map(|(position, arg)| {
                let type_name = self.types.name_of_arg(arg)?;
                let value = arg.encode().map_err(|source| SagaError::Serialization {
                    what: format!("encode argument {position} of type '{type_name}'"),
                    source,
                })?;
                Ok(ArgData::new(type_name, value))
            })
            .collect()
    }

    /// Rebuilds argument values from their marshalled form, in input order.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::TypeNotRegistered` for an unknown type name and
    /// `SagaError::Serialization` if a payload does not decode.
    pub fn unmarshal_args(&self, data: &[ArgData]) -> Result<Vec<Arg>> {
        data.iter()
            .enumerate()
            .map(|(position, item)| {
                let descriptor = self.types.type_of(&item.type_name)?;
                descriptor
                    .decode(&item.value)
                    .map_err(|source| SagaError::Serialization {
                        what: format!("decode argument {position} as '{}'", item.type_name),
                        source,
                    })
            })
            .collect()
    }

    /// Creates a handle for the transaction `id`. Nothing is persisted until
    /// [`Transaction::start`].
    pub fn new_tx(&self, ctx: Context, id: impl Into<TxId>) -> Transaction<'_> {
        Transaction::new(self, ctx, id.into())
    }

    #[must_use]
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    #[must_use]
    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &SagaConfig {
        &self.config
    }
}

impl fmt::Debug for Saga {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Saga")
            .field("types", &self.types)
            .field("steps", &self.steps)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
