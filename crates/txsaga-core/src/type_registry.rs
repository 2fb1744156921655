use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;

use crate::callable::{Callable, Slot};
use crate::error::{SagaError, ValidationRule};
use crate::value::{Arg, SagaValue, canonical_type_name};

/// Runtime description of a saga value type: its identity, its registry
/// name, and how to rebuild a value of it from an encoded payload.
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    type_id: TypeId,
    rust_name: &'static str,
    decode: fn(&str) -> Result<Arg, serde_json::Error>,
}

impl TypeDescriptor {
    #[must_use]
    pub fn of<T: SagaValue>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            rust_name: type_name::<T>(),
            decode: decode_as::<T>,
        }
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    /// Stable name under which the type is registered and persisted.
    #[must_use]
    pub fn name(&self) -> &'static str {
        canonical_type_name(self.rust_name)
    }

    /// Allocates a new value of this type from its encoded payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a valid encoding of the type.
    pub fn decode(&self, payload: &str) -> Result<Arg, serde_json::Error> {
        (self.decode)(payload)
    }
}

fn decode_as<T: SagaValue>(payload: &str) -> Result<Arg, serde_json::Error> {
    serde_json::from_str::<T>(payload).map(Arg::new)
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeDescriptor").field(&self.rust_name).finish()
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeDescriptor {}

/// Bidirectional mapping between value types and their persisted names.
///
/// Entries accumulate for the lifetime of the registry. Pointer wrappers
/// share the entry of their pointee: the first descriptor registered under a
/// name is the one used to decode payloads carrying that name.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_name: HashMap<&'static str, TypeDescriptor>,
    by_id: HashMap<TypeId, &'static str>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every parameter and result type of `callable`, skipping the
    /// leading context parameter and the leading error result.
    ///
    /// Types registered before a misplaced slot is found stay registered.
    ///
    /// # Errors
    ///
    /// Returns the broken rule if a context token or error slot appears past
    /// the leading position.
    pub fn register(&mut self, callable: &Callable) -> Result<(), ValidationRule> {
        let signature = callable.signature();
        for (position, slot) in signature.params().iter().enumerate().skip(1) {
            match slot {
                Slot::Value(descriptor) => {
                    self.register_type(*descriptor);
                }
                Slot::Context => return Err(ValidationRule::MisplacedContext { position }),
                Slot::Error => return Err(ValidationRule::MisplacedError { position }),
            }
        }
        for (position, slot) in signature.results().iter().enumerate().skip(1) {
            match slot {
                Slot::Value(descriptor) => {
                    self.register_type(*descriptor);
                }
                Slot::Context => return Err(ValidationRule::MisplacedContext { position }),
                Slot::Error => return Err(ValidationRule::MisplacedError { position }),
            }
        }
        Ok(())
    }

    /// Registers a single type. Returns `false` if it was already known.
    pub fn register_type(&mut self, descriptor: TypeDescriptor) -> bool {
        if self.by_id.contains_key(&descriptor.type_id()) {
            return false;
        }
        let name = descriptor.name();
        self.by_name.entry(name).or_insert(descriptor);
        self.by_id.insert(descriptor.type_id(), name);
        true
    }

    /// # Errors
    ///
    /// Returns `SagaError::TypeNotRegistered` if `T` was never registered.
    pub fn name_of<T: ?Sized + 'static>(&self) -> Result<&'static str, SagaError> {
        self.lookup_name(TypeId::of::<T>(), type_name::<T>())
    }

    /// Falls back to the argument's canonical name, so a pointer to a
    /// registered type resolves to the pointee's entry.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::TypeNotRegistered` if neither the argument's type
    /// nor its pointee was registered.
    pub fn name_of_arg(&self, arg: &Arg) -> Result<&'static str, SagaError> {
        self.lookup_name(arg.type_id(), arg.type_name())
            .or_else(|err| {
                self.by_name
                    .get_key_value(arg.canonical_name())
                    .map(|(name, _)| *name)
                    .ok_or(err)
            })
    }

    /// # Errors
    ///
    /// Returns `SagaError::TypeNotRegistered` if no type is registered under
    /// `name`.
    pub fn type_of(&self, name: &str) -> Result<&TypeDescriptor, SagaError> {
        self.by_name
            .get(name)
            .ok_or_else(|| SagaError::TypeNotRegistered {
                type_name: name.to_string(),
            })
    }

    #[must_use]
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.by_id.contains_key(&TypeId::of::<T>())
    }

    /// Number of distinct registry names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn lookup_name(&self, type_id: TypeId, rust_name: &str) -> Result<&'static str, SagaError> {
        self.by_id
            .get(&type_id)
            .copied()
            .ok_or_else(|| SagaError::TypeNotRegistered {
                type_name: rust_name.to_string(),
            })
    }
}
