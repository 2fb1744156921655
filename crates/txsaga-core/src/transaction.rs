use std::fmt;

use crate::callable::CallError;
use crate::context::Context;
use crate::entry::{ArgData, LogEntry, LogKind};
use crate::error::{CallableRole, Result, SagaError, StorageError};
use crate::history::{TxHistory, TxState};
use crate::ids::{StepId, TxId};
use crate::retry::{RetryLimit, RetryPolicy};
use crate::saga::Saga;
use crate::value::Arg;

/// Handle driving one transaction against the saga's storage.
///
/// The persisted log is the only state: the handle keeps the context, the
/// id and a borrow of the saga, nothing else. Calls on one handle must not
/// overlap; distinct handles are independent.
pub struct Transaction<'a> {
    saga: &'a Saga,
    ctx: Context,
    id: TxId,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(saga: &'a Saga, ctx: Context, id: TxId) -> Self {
        Self { saga, ctx, id }
    }

    #[must_use]
    pub fn id(&self) -> &TxId {
        &self.id
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Replaces the context passed to subsequent actions and compensations.
    pub fn set_context(&mut self, ctx: Context) {
        self.ctx = ctx;
    }

    /// Whether any entries are already persisted under this id.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::Persistence` if storage cannot be queried.
    pub fn is_tx_id_in_use(&self) -> Result<bool> {
        self.saga
            .storage()
            .exists(&self.id)
            .map_err(|source| self.persistence(source))
    }

    /// Begins the transaction by appending `StartTx`.
    ///
    /// A log already left under this id by an unfinished transaction is
    /// rolled back once first. A fully aborted log needs no rollback.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::TransactionClosed` if the id belongs to an ended
    /// transaction, `SagaError::ResidualRollback` if rolling back the
    /// leftover log fails, or `SagaError::Persistence` on storage failure.
    pub fn start(&self) -> Result<()> {
        let span = tracing::debug_span!("start", tx_id = %self.id);
        let _guard = span.enter();

        if self.is_tx_id_in_use()? {
            match self.history()?.state() {
                TxState::Ended => {
                    return Err(SagaError::TransactionClosed {
                        tx_id: self.id.clone(),
                    });
                }
                TxState::Aborted => {
                    tracing::debug!("previous transaction under this id was aborted");
                }
                state => {
                    self.saga.logger().info(format_args!(
                        "transaction '{}' was left {state}, rolling it back before starting",
                        self.id
                    ));
                    self.rollback(1)
                        .map_err(|source| SagaError::ResidualRollback {
                            tx_id: self.id.clone(),
                            source: Box::new(source),
                        })?;
                }
            }
        }

        self.append(&LogEntry::start_tx())
    }

    /// Runs the action of `step` with `args`, discarding its results.
    ///
    /// # Errors
    ///
    /// See [`Transaction::execute_step_and_get_result`].
    pub fn execute_step(&self, step: &str, args: Vec<Arg>) -> Result<()> {
        self.execute_step_and_get_result(step, args).map(drop)
    }

    /// Runs the action of `step` with `args` and returns its results.
    ///
    /// `StartStep` with the marshalled arguments is persisted before the
    /// action is invoked and `EndStep` after it succeeds. A failing action
    /// leaves the transaction as it is; rolling back is up to the caller.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::NotFound` for an unknown step,
    /// `SagaError::ArgumentMismatch` if `args` do not fit the action,
    /// `SagaError::TypeNotRegistered` or `SagaError::Serialization` if they
    /// cannot be marshalled, `SagaError::Persistence` on storage failure, and
    /// `SagaError::Action` with the action's own error.
    pub fn execute_step_and_get_result(&self, step: &str, args: Vec<Arg>) -> Result<Vec<Arg>> {
        let span = tracing::debug_span!("execute_step", tx_id = %self.id, step);
        let _guard = span.enter();

        let definition = self.saga.step(step)?;
        let step = definition.id();
        definition
            .action()
            .signature()
            .check_args(&args)
            .map_err(|source| SagaError::ArgumentMismatch {
                step: step.clone(),
                role: CallableRole::Action,
                source,
            })?;

        let data = self.saga.marshal_args(&args)?;
        self.append(&LogEntry::start_step(step.clone(), data))?;

        match definition.action().call(&self.ctx, args) {
            Ok(results) => {
                self.append(&LogEntry::end_step(step.clone()))?;
                tracing::debug!(results = results.len(), "step executed");
                Ok(results)
            }
            Err(CallError::Failed(source)) => {
                self.saga.logger().error(format_args!(
                    "step '{step}' of transaction '{}' failed: {source}",
                    self.id
                ));
                Err(SagaError::Action {
                    step: step.clone(),
                    source,
                })
            }
            Err(CallError::Arguments(source)) => Err(SagaError::ArgumentMismatch {
                step: step.clone(),
                role: CallableRole::Action,
                source,
            }),
        }
    }

    /// Compensates every started step, trying up to `try_count` passes
    /// (at least one) with no pause in between.
    ///
    /// # Errors
    ///
    /// Returns the error of the last failed pass.
    pub fn rollback(&self, try_count: u32) -> Result<()> {
        self.rollback_with_policy(&RetryPolicy::bounded(try_count))
    }

    /// Repeats rollback passes until one succeeds, pausing with the
    /// configured backoff in between.
    ///
    /// Blocks the calling thread. The only way out besides success is the
    /// transaction context being cancelled or passing its deadline.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::Cancelled` carrying the last pass's error once the
    /// context is done.
    pub fn rollback_with_unbounded_retries(&self) -> Result<()> {
        let policy = self
            .saga
            .config()
            .rollback
            .clone()
            .with_limit(RetryLimit::Unbounded);
        self.rollback_with_policy(&policy)
    }

    /// Repeats rollback passes as permitted by `policy`.
    ///
    /// Each pass reads the whole log, appends `AbortTx` and compensates every
    /// `StartStep` in chronological order, bracketing each compensation with
    /// `StartCompensateStep`/`EndCompensateStep`. A pass stops at its first
    /// error. Steps compensated by an earlier pass are compensated again.
    ///
    /// # Errors
    ///
    /// Returns the error of the last permitted pass. With an unbounded limit,
    /// returns `SagaError::Cancelled` if the context is done before the next
    /// pass; bounded limits always run their remaining passes.
    pub fn rollback_with_policy(&self, policy: &RetryPolicy) -> Result<()> {
        let span = tracing::info_span!("rollback", tx_id = %self.id);
        let _guard = span.enter();

        let mut attempt: u32 = 1;
        loop {
            let err = match self.rollback_pass() {
                Ok(()) => {
                    tracing::debug!(attempt, "rollback complete");
                    return Ok(());
                }
                Err(err) => err,
            };
            self.saga.logger().error(format_args!(
                "rollback attempt {attempt} of transaction '{}' failed: {err}",
                self.id
            ));

            if !policy.limit.permits(attempt.saturating_add(1)) {
                return Err(err);
            }
            policy.pause_after(attempt);
            let done = match policy.limit {
                RetryLimit::Unbounded => self.ctx.done_reason(),
                RetryLimit::Bounded(_) => None,
            };
            if let Some(reason) = done {
                return Err(SagaError::Cancelled {
                    tx_id: self.id.clone(),
                    reason,
                    last_error: Box::new(err),
                });
            }
            attempt = attempt.saturating_add(1);
        }
    }

    /// Appends `EndTx` and releases the handle. The log is kept.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::Persistence` on storage failure.
    pub fn end(self) -> Result<()> {
        let span = tracing::debug_span!("end", tx_id = %self.id);
        let _guard = span.enter();

        self.append(&LogEntry::end_tx())
    }

    /// Reads and decodes the persisted log.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::Persistence` on storage failure and
    /// `SagaError::Serialization` if an entry does not decode.
    pub fn history(&self) -> Result<TxHistory> {
        let raw = self
            .saga
            .storage()
            .read_all(&self.id)
            .map_err(|source| self.persistence(source))?;
        TxHistory::from_encoded(&raw)
    }

    /// Current state, derived from the persisted log.
    ///
    /// # Errors
    ///
    /// See [`Transaction::history`].
    pub fn state(&self) -> Result<TxState> {
        Ok(self.history()?.state())
    }

    fn rollback_pass(&self) -> Result<()> {
        let history = self.history()?;
        self.append(&LogEntry::abort_tx())?;

        let started = history
            .entries()
            .iter()
            .filter(|entry| entry.kind == LogKind::StartStep);
        for entry in started {
            // Decoding guarantees step entries carry an id.
            let Some(step) = &entry.sub_tx_id else {
                continue;
            };
            self.compensate(step, &entry.args)?;
        }
        Ok(())
    }

    fn compensate(&self, step: &StepId, data: &[ArgData]) -> Result<()> {
        self.append(&LogEntry::start_compensate(step.clone()))?;

        let definition = self.saga.step(step.as_str())?;
        let args = self.saga.unmarshal_args(data)?;
        definition
            .compensation()
            .call(&self.ctx, args)
            .map_err(|err| match err {
                CallError::Failed(source) => SagaError::Compensation {
                    step: step.clone(),
                    source,
                },
                CallError::Arguments(source) => SagaError::ArgumentMismatch {
                    step: step.clone(),
                    role: CallableRole::Compensation,
                    source,
                },
            })?;

        self.append(&LogEntry::end_compensate(step.clone()))?;
        tracing::debug!(step = %step, "step compensated");
        Ok(())
    }

    fn append(&self, entry: &LogEntry) -> Result<()> {
        let encoded = entry.encode().map_err(|source| SagaError::Serialization {
            what: format!("encode {} entry", entry.kind),
            source,
        })?;
        self.saga
            .storage()
            .append(&self.id, &encoded)
            .map_err(|source| self.persistence(source))?;
        tracing::trace!(kind = %entry.kind, "log entry appended");
        Ok(())
    }

    fn persistence(&self, source: StorageError) -> SagaError {
        SagaError::Persistence {
            tx_id: self.id.clone(),
            source,
        }
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}
