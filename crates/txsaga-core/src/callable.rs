use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::erased::{DynamicFn, ErasedFn};
use crate::error::{ArgumentError, BoxError, ValidationRule};
use crate::type_registry::TypeDescriptor;
use crate::value::Arg;

/// One position in a callable's parameter or result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The cancellation/context token.
    Context,
    /// The error-or-success result.
    Error,
    /// A serializable domain value.
    Value(TypeDescriptor),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context => f.write_str("context"),
            Self::Error => f.write_str("error"),
            Self::Value(descriptor) => f.write_str(descriptor.name()),
        }
    }
}

/// Shape of a callable: ordered parameter and result slots.
///
/// A well-formed signature starts its parameters with [`Slot::Context`] and
/// its results with [`Slot::Error`]; every other slot is a value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    params: Vec<Slot>,
    results: Vec<Slot>,
}

impl Signature {
    #[must_use]
    pub fn new(params: Vec<Slot>, results: Vec<Slot>) -> Self {
        Self { params, results }
    }

    #[must_use]
    pub fn params(&self) -> &[Slot] {
        &self.params
    }

    #[must_use]
    pub fn results(&self) -> &[Slot] {
        &self.results
    }

    /// Parameters after the leading context token.
    pub fn value_params(&self) -> impl Iterator<Item = &Slot> {
        self.params.iter().skip(1)
    }

    /// Number of domain arguments the callable expects.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len().saturating_sub(1)
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationRule> {
        if self.params.first() != Some(&Slot::Context) {
            return Err(ValidationRule::MissingContext);
        }
        if self.results.first() != Some(&Slot::Error) {
            return Err(ValidationRule::MissingError);
        }
        if let Some(position) = self.params.iter().skip(1).position(|s| *s == Slot::Context) {
            return Err(ValidationRule::MisplacedContext {
                position: position + 1,
            });
        }
        if let Some(position) = self.results.iter().skip(1).position(|s| *s == Slot::Error) {
            return Err(ValidationRule::MisplacedError {
                position: position + 1,
            });
        }
        Ok(())
    }

    /// Compares parameter lists by registry name, so pointer wrappers match
    /// their pointee.
    pub(crate) fn same_params(&self, other: &Self) -> bool {
        self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| slot_name(a) == slot_name(b))
    }

    pub(crate) fn check_args(&self, args: &[Arg]) -> Result<(), ArgumentError> {
        if args.len() != self.arity() {
            return Err(ArgumentError::Count {
                expected: self.arity(),
                actual: args.len(),
            });
        }
        for (position, (slot, arg)) in self.value_params().zip(args).enumerate() {
            let expected = slot_name(slot);
            if arg.canonical_name() != expected {
                return Err(ArgumentError::Type {
                    position,
                    expected: expected.to_string(),
                    actual: arg.canonical_name().to_string(),
                });
            }
        }
        Ok(())
    }
}

fn slot_name(slot: &Slot) -> &'static str {
    match slot {
        Slot::Context => "context",
        Slot::Error => "error",
        Slot::Value(descriptor) => descriptor.name(),
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |slots: &[Slot]| {
            slots
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "fn({}) -> ({})", join(&self.params), join(&self.results))
    }
}

/// Why invoking a callable did not produce results.
#[derive(Debug)]
pub enum CallError {
    /// The supplied arguments do not fit the parameters.
    Arguments(ArgumentError),
    /// The callable ran and reported failure.
    Failed(BoxError),
}

/// A step action or compensation, invocable with a context and an erased
/// argument list.
///
/// Typed functions of the shape `Fn(&Context, A1, .., An) -> Result<R, E>`
/// (up to six arguments) convert through [`IntoCallable`]; a result type of
/// `()` means the callable returns nothing besides its error slot. Callables
/// whose shape is only known at runtime are built with
/// [`Callable::dynamic`].
#[derive(Clone)]
pub struct Callable {
    signature: Signature,
    func: Arc<dyn ErasedFn>,
}

impl Callable {
    pub(crate) fn from_erased(signature: Signature, func: impl ErasedFn + 'static) -> Self {
        Self {
            signature,
            func: Arc::new(func),
        }
    }

    /// Builds a callable from an explicit signature and a function over erased
    /// arguments. The signature is trusted as declared and validated when the
    /// callable is registered.
    pub fn dynamic<F>(signature: Signature, func: F) -> Self
    where
        F: Fn(&Context, Vec<Arg>) -> Result<Vec<Arg>, BoxError> + Send + Sync + 'static,
    {
        Self::from_erased(signature, DynamicFn::new(func))
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Invokes the callable after checking `args` against its parameters.
    ///
    /// # Errors
    ///
    /// Returns `CallError::Arguments` if the arguments do not fit the
    /// signature and `CallError::Failed` with the callable's own error.
    pub fn call(&self, ctx: &Context, args: Vec<Arg>) -> Result<Vec<Arg>, CallError> {
        self.signature
            .check_args(&args)
            .map_err(CallError::Arguments)?;
        self.func.call_erased(ctx, args)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("signature", &self.signature.to_string())
            .finish_non_exhaustive()
    }
}

/// Conversion into a [`Callable`].
///
/// `Marker` only disambiguates the blanket implementations for functions of
/// different arities; callers never name it.
pub trait IntoCallable<Marker> {
    fn into_callable(self) -> Callable;
}

impl IntoCallable<Callable> for Callable {
    fn into_callable(self) -> Callable {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct TestError(String);

    fn debit(_ctx: &Context, amount: i32, from: String) -> Result<(), TestError> {
        if amount < 0 {
            return Err(TestError(format!("negative debit for {from}")));
        }
        Ok(())
    }

    fn balance(_ctx: &Context, account: String) -> Result<i64, TestError> {
        Ok(i64::try_from(account.len()).unwrap_or_default())
    }

    fn ping(_ctx: &Context) -> Result<(), TestError> {
        Ok(())
    }

    #[test]
    fn typed_function_records_signature() {
        let callable = debit.into_callable();
        let signature = callable.signature();

        assert_eq!(signature.arity(), 2);
        assert_eq!(signature.params()[0], Slot::Context);
        assert_eq!(signature.params()[1], Slot::Value(TypeDescriptor::of::<i32>()));
        assert_eq!(signature.params()[2], Slot::Value(TypeDescriptor::of::<String>()));
        assert_eq!(signature.results(), &[Slot::Error]);
        assert!(signature.validate().is_ok());
    }

    #[test]
    fn unit_result_adds_no_result_slot_but_values_do() {
        assert_eq!(ping.into_callable().signature().results().len(), 1);
        assert_eq!(
            balance.into_callable().signature().results(),
            &[Slot::Error, Slot::Value(TypeDescriptor::of::<i64>())]
        );
    }

    #[test]
    fn call_passes_arguments_in_order() {
        let callable = balance.into_callable();

        let results = callable
            .call(&Context::new(), args![String::from("abcd")])
            .expect("call succeeds");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].downcast_ref::<i64>(), Some(&4));
    }

    #[test]
    fn call_surfaces_callable_failure() {
        let callable = debit.into_callable();

        let err = callable
            .call(&Context::new(), args![-1_i32, String::from("sam")])
            .expect_err("negative amount fails");

        match err {
            CallError::Failed(source) => assert_eq!(source.to_string(), "negative debit for sam"),
            CallError::Arguments(other) => panic!("unexpected argument error: {other}"),
        }
    }

    #[test]
    fn call_rejects_wrong_arity_and_types() {
        let callable = debit.into_callable();

        let err = callable
            .call(&Context::new(), args![1_i32])
            .expect_err("missing argument");
        assert!(matches!(
            err,
            CallError::Arguments(ArgumentError::Count {
                expected: 2,
                actual: 1
            })
        ));

        let err = callable
            .call(&Context::new(), args![1_i64, String::from("sam")])
            .expect_err("wrong type");
        assert!(matches!(
            err,
            CallError::Arguments(ArgumentError::Type { position: 0, .. })
        ));
    }

    #[test]
    fn validate_reports_missing_leading_slots() {
        let no_context = Signature::new(
            vec![Slot::Value(TypeDescriptor::of::<i32>())],
            vec![Slot::Error],
        );
        assert_eq!(no_context.validate(), Err(ValidationRule::MissingContext));

        let no_error = Signature::new(vec![Slot::Context], Vec::new());
        assert_eq!(no_error.validate(), Err(ValidationRule::MissingError));

        let late_error = Signature::new(vec![Slot::Context], vec![Slot::Error, Slot::Error]);
        assert_eq!(
            late_error.validate(),
            Err(ValidationRule::MisplacedError { position: 1 })
        );
    }

    #[test]
    fn same_params_treats_pointer_as_pointee() {
        let plain = Signature::new(
            vec![Slot::Context, Slot::Value(TypeDescriptor::of::<u8>())],
            vec![Slot::Error],
        );
        let boxed = Signature::new(
            vec![Slot::Context, Slot::Value(TypeDescriptor::of::<Box<u8>>())],
            vec![Slot::Error],
        );
        let other = Signature::new(
            vec![Slot::Context, Slot::Value(TypeDescriptor::of::<u16>())],
            vec![Slot::Error],
        );

        assert!(plain.same_params(&boxed));
        assert!(!plain.same_params(&other));
    }

    #[test]
    fn signature_display_lists_slots() {
        let signature = ping.into_callable().signature().clone();
        assert_eq!(signature.to_string(), "fn(context) -> (error)");
    }
}
