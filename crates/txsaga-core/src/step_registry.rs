use std::collections::HashMap;

use crate::callable::Callable;
use crate::error::{CallableRole, SagaError};
use crate::ids::StepId;

/// Validated action/compensation pair registered under a step id.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    id: StepId,
    action: Callable,
    compensation: Callable,
}

impl StepDefinition {
    #[must_use]
    pub fn id(&self) -> &StepId {
        &self.id
    }

    #[must_use]
    pub fn action(&self) -> &Callable {
        &self.action
    }

    #[must_use]
    pub fn compensation(&self) -> &Callable {
        &self.compensation
    }
}

/// Step definitions by id.
#[derive(Debug, Default)]
pub struct StepRegistry {
    steps: HashMap<StepId, StepDefinition>,
}

impl StepRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores a definition, returning the one it replaced.
    ///
    /// Each callable must take the context token first and return the error
    /// slot first; both must take the same parameters.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::Validation` naming the callable and the broken
    /// rule, or `SagaError::SignatureMismatch` if the parameter lists differ.
    pub fn add(
        &mut self,
        id: StepId,
        action: Callable,
        compensation: Callable,
    ) -> Result<Option<StepDefinition>, SagaError> {
        for (role, callable) in [
            (CallableRole::Action, &action),
            (CallableRole::Compensation, &compensation),
        ] {
            callable
                .signature()
                .validate()
                .map_err(|rule| SagaError::Validation {
                    step: id.clone(),
                    role,
                    rule,
                })?;
        }

        if !action.signature().same_params(compensation.signature()) {
            return Err(SagaError::SignatureMismatch {
                step: id,
                action: action.signature().to_string(),
                compensation: compensation.signature().to_string(),
            });
        }

        let definition = StepDefinition {
            id: id.clone(),
            action,
            compensation,
        };
        Ok(self.steps.insert(id, definition))
    }

    /// # Errors
    ///
    /// Returns `SagaError::NotFound` if no step is registered under `id`.
    pub fn get(&self, id: &str) -> Result<&StepDefinition, SagaError> {
        self.steps.get(id).ok_or_else(|| SagaError::NotFound {
            step: StepId::from(id),
        })
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.steps.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
