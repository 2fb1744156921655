use crate::context::Context;
use crate::error::BoxError;
use crate::value::SagaValue;

/// A step declared as a type rather than as a pair of functions.
///
/// The step's arguments travel as one value of type `Args` (a tuple or a
/// struct); the same value is persisted when the action starts and handed to
/// the compensation on rollback.
///
/// # Type Parameters
///
/// - `Args`: Data the action and the compensation receive
/// - `Output`: Data the action returns on success, `()` for none
/// - `Error`: The error type for step failures
pub trait SubTx: Send + Sync + 'static {
    /// Data passed to both the action and the compensation.
    type Args: SagaValue;

    /// Data returned by the action.
    type Output: SagaValue;

    /// Error type for action and compensation failures.
    type Error: Into<BoxError> + 'static;

    /// Identifier under which the step is registered.
    fn id(&self) -> &'static str;

    /// Perform the step's forward work.
    ///
    /// # Errors
    ///
    /// Returns an error if the step fails to complete.
    fn execute(&self, ctx: &Context, args: Self::Args) -> Result<Self::Output, Self::Error>;

    /// Undo the step's effects.
    ///
    /// Called during rollback for every started step, including steps whose
    /// action failed or never confirmed completion, and possibly more than
    /// once for the same arguments. Implementations must be idempotent.
    ///
    /// The default implementation is a no-op, suitable for read-only steps.
    ///
    /// # Errors
    ///
    /// Returns an error if compensation fails.
    fn compensate(&self, ctx: &Context, args: Self::Args) -> Result<(), Self::Error> {
        let _ = (ctx, args);
        Ok(())
    }
}
