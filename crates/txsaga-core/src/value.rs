use std::any::{Any, TypeId, type_name};
use std::fmt::{self, Debug};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ArgumentError;

/// Values that can travel through a saga: passed to actions, persisted in the
/// transaction log, and rebuilt from it for compensation.
pub trait SagaValue: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {}

impl<T> SagaValue for T where T: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {}

const POINTER_WRAPPERS: [&str; 3] = ["alloc::boxed::Box<", "alloc::sync::Arc<", "alloc::rc::Rc<"];

/// Strips references and owning pointer wrappers from a type name so that a
/// value and a pointer to it share one registry name.
#[must_use]
pub fn canonical_type_name(raw: &'static str) -> &'static str {
    let mut name = raw;
    loop {
        if let Some(rest) = name.strip_prefix("&mut ") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix('&') {
            name = rest;
        } else if let Some(inner) = POINTER_WRAPPERS.iter().find_map(|wrapper| {
            name.strip_prefix(wrapper)
                .and_then(|rest| rest.strip_suffix('>'))
        }) {
            name = inner;
        } else {
            return name;
        }
    }
}

/// Type-erased saga value that can be cloned and encoded.
///
/// Extends the plain `Any` capability with the operations the coordinator
/// needs without knowing the concrete type: cloning, JSON encoding and
/// debug formatting.
pub(crate) trait ErasedValue: Any + Send + Sync {
    fn clone_box(&self) -> Box<dyn ErasedValue>;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;

    fn as_any(&self) -> &dyn Any;

    fn value_type_id(&self) -> TypeId;

    fn value_type_name(&self) -> &'static str;

    fn encode(&self) -> Result<String, serde_json::Error>;

    fn fmt_value(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T> ErasedValue for T
where
    T: SagaValue,
{
    fn clone_box(&self) -> Box<dyn ErasedValue> {
        Box::new(self.clone())
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn value_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn fmt_value(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// One argument or result of a step callable.
///
/// ```
/// use txsaga_core::Arg;
///
/// let amount = Arg::new(100_u64);
/// assert_eq!(amount.downcast_ref::<u64>(), Some(&100));
/// assert!(amount.downcast_ref::<i32>().is_none());
/// ```
pub struct Arg {
    value: Box<dyn ErasedValue>,
}

impl Arg {
    #[must_use]
    pub fn new<T: SagaValue>(value: T) -> Self {
        Self {
            value: Box::new(value),
        }
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.value.value_type_id()
    }

    /// Full Rust type name of the held value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.value.value_type_name()
    }

    /// Registry name of the held value, see [`canonical_type_name`].
    #[must_use]
    pub fn canonical_name(&self) -> &'static str {
        canonical_type_name(self.type_name())
    }

    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id() == TypeId::of::<T>()
    }

    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.as_any().downcast_ref::<T>()
    }

    /// Takes the value out if it is exactly a `T`, handing the argument back
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns the unchanged argument when it holds a different type.
    pub fn into_value<T: 'static>(self) -> Result<T, Self> {
        if !self.is::<T>() {
            return Err(self);
        }
        match self.value.into_any().downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(_) => unreachable!("type id was checked before downcasting"),
        }
    }

    /// Converts the argument into the parameter type `T` of a callable.
    ///
    /// Exact types are moved out directly. A value whose canonical name
    /// matches `T` (for instance `Account` passed where `Box<Account>` is
    /// expected) is converted through its encoded form.
    pub(crate) fn extract<T: SagaValue>(self, position: usize) -> Result<T, ArgumentError> {
        let expected = canonical_type_name(type_name::<T>());
        if self.is::<T>() {
            return self.into_value::<T>().map_err(|arg| ArgumentError::Type {
                position,
                expected: expected.to_string(),
                actual: arg.canonical_name().to_string(),
            });
        }
        if self.canonical_name() != expected {
            return Err(ArgumentError::Type {
                position,
                expected: expected.to_string(),
                actual: self.canonical_name().to_string(),
            });
        }
        let convert = |source| ArgumentError::Convert {
            position,
            expected: expected.to_string(),
            source,
        };
        let encoded = self.encode().map_err(convert)?;
        serde_json::from_str::<T>(&encoded).map_err(convert)
    }

    pub(crate) fn encode(&self) -> Result<String, serde_json::Error> {
        self.value.encode()
    }
}

impl Clone for Arg {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone_box(),
        }
    }
}

impl Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt_value(f)
    }
}

/// Builds a `Vec<Arg>` from a list of saga values.
///
/// ```
/// use txsaga_core::args;
///
/// let args = args![100_i32, String::from("sam")];
/// assert_eq!(args.len(), 2);
/// assert_eq!(args[1].downcast_ref::<String>().map(String::as_str), Some("sam"));
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Arg>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Arg::new($value)),+]
    };
}
