use std::any::TypeId;
use std::marker::PhantomData;

use crate::callable::{CallError, Callable, IntoCallable, Signature, Slot};
use crate::context::Context;
use crate::error::{ArgumentError, BoxError};
use crate::type_registry::TypeDescriptor;
use crate::value::{Arg, SagaValue};

pub(crate) trait ErasedFn: Send + Sync {
    fn call_erased(&self, ctx: &Context, args: Vec<Arg>) -> Result<Vec<Arg>, CallError>;
}

pub(crate) struct FnWrapper<F, Marker> {
    func: F,
    _marker: PhantomData<fn() -> Marker>,
}

impl<F, Marker> FnWrapper<F, Marker> {
    pub(crate) fn new(func: F) -> Self {
        Self {
            func,
            _marker: PhantomData,
        }
    }
}

pub(crate) struct DynamicFn<F> {
    func: F,
}

impl<F> DynamicFn<F> {
    pub(crate) fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> ErasedFn for DynamicFn<F>
where
    F: Fn(&Context, Vec<Arg>) -> Result<Vec<Arg>, BoxError> + Send + Sync,
{
    fn call_erased(&self, ctx: &Context, args: Vec<Arg>) -> Result<Vec<Arg>, CallError> {
        (self.func)(ctx, args).map_err(CallError::Failed)
    }
}

fn is_unit<R: 'static>() -> bool {
    TypeId::of::<R>() == TypeId::of::<()>()
}

fn result_slots<R: SagaValue>() -> Vec<Slot> {
    if is_unit::<R>() {
        vec![Slot::Error]
    } else {
        vec![Slot::Error, Slot::Value(TypeDescriptor::of::<R>())]
    }
}

fn into_results<R: SagaValue>(result: R) -> Vec<Arg> {
    if is_unit::<R>() {
        Vec::new()
    } else {
        vec![Arg::new(result)]
    }
}

fn next_arg<T: SagaValue>(
    args: &mut std::vec::IntoIter<Arg>,
    position: &mut usize,
    expected: usize,
) -> Result<T, CallError> {
    let index = *position;
    *position += 1;
    let arg = args.next().ok_or(CallError::Arguments(ArgumentError::Count {
        expected,
        actual: index,
    }))?;
    arg.extract::<T>(index).map_err(CallError::Arguments)
}

macro_rules! impl_typed_fn {
    ($($ty:ident $var:ident),*) => {
        impl<F, R, E, $($ty,)*> ErasedFn for FnWrapper<F, fn($($ty,)*) -> Result<R, E>>
        where
            F: Fn(&Context, $($ty,)*) -> Result<R, E> + Send + Sync,
            R: SagaValue,
            E: Into<BoxError>,
            $($ty: SagaValue,)*
        {
            #[allow(unused_mut, unused_variables)]
            fn call_erased(&self, ctx: &Context, args: Vec<Arg>) -> Result<Vec<Arg>, CallError> {
                let expected = <[&str]>::len(&[$(stringify!($ty)),*]);
                if args.len() != expected {
                    return Err(CallError::Arguments(ArgumentError::Count {
                        expected,
                        actual: args.len(),
                    }));
                }
                let mut args = args.into_iter();
                let mut position = 0;
                $(let $var = next_arg::<$ty>(&mut args, &mut position, expected)?;)*
                match (self.func)(ctx, $($var,)*) {
                    Ok(result) => Ok(into_results(result)),
                    Err(error) => Err(CallError::Failed(error.into())),
                }
            }
        }

        impl<F, R, E, $($ty,)*> IntoCallable<fn($($ty,)*) -> Result<R, E>> for F
        where
            F: Fn(&Context, $($ty,)*) -> Result<R, E> + Send + Sync + 'static,
            R: SagaValue,
            E: Into<BoxError> + 'static,
            $($ty: SagaValue,)*
        {
            fn into_callable(self) -> Callable {
                let signature = Signature::new(
                    vec![Slot::Context, $(Slot::Value(TypeDescriptor::of::<$ty>()),)*],
                    result_slots::<R>(),
                );
                Callable::from_erased(
                    signature,
                    FnWrapper::<F, fn($($ty,)*) -> Result<R, E>>::new(self),
                )
            }
        }
    };
}

impl_typed_fn!();
impl_typed_fn!(A1 a1);
impl_typed_fn!(A1 a1, A2 a2);
impl_typed_fn!(A1 a1, A2 a2, A3 a3);
impl_typed_fn!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_typed_fn!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_typed_fn!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
