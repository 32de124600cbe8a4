//! FILENAME: engine/src/context.rs
//! PURPOSE: The variable bindings visible to one evaluation.
//! CONTEXT: Contexts are immutable values. Adding or removing a binding
//! produces a new context and leaves the original untouched, so a
//! formula-set run can thread step results forward without any step
//! contaminating the inputs of an earlier one. The variable count is
//! capped; the cap is checked on every derived context.

use crate::evaluator::EvalError;
use crate::value::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationContext {
    variables: BTreeMap<String, Value>,
    max_variables: usize,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::with_limit(crate::config::EngineConfig::default().max_variables)
    }

    pub fn with_limit(max_variables: usize) -> Self {
        EvaluationContext {
            variables: BTreeMap::new(),
            max_variables,
        }
    }

    /// Builds a context from a variable map, enforcing the cap.
    pub fn from_variables(
        variables: &BTreeMap<String, Value>,
        max_variables: usize,
    ) -> Result<Self, EvalError> {
        Self::with_limit(max_variables).with_variables(variables.clone())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    /// Returns a new context with `name` bound to `value`. Rebinding an
    /// existing name replaces it.
    pub fn with_variable(
        &self,
        name: impl Into<String>,
        value: Value,
    ) -> Result<Self, EvalError> {
        let mut next = self.clone();
        next.variables.insert(name.into(), value);
        next.check_limit()?;
        Ok(next)
    }

    /// Returns a new context extended with every binding in `variables`.
    pub fn with_variables(
        &self,
        variables: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<Self, EvalError> {
        let mut next = self.clone();
        next.variables.extend(variables);
        next.check_limit()?;
        Ok(next)
    }

    /// Returns a new context without `name`. Removing an absent name is a
    /// no-op.
    pub fn without_variable(&self, name: &str) -> Self {
        let mut next = self.clone();
        next.variables.remove(name);
        next
    }

    fn check_limit(&self) -> Result<(), EvalError> {
        if self.variables.len() > self.max_variables {
            return Err(EvalError::TooManyVariables {
                limit: self.max_variables,
                actual: self.variables.len(),
            });
        }
        Ok(())
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_variable_leaves_original_untouched() {
        let base = EvaluationContext::new();
        let derived = base.with_variable("x", Value::Number(1.0)).unwrap();
        assert!(base.is_empty());
        assert_eq!(derived.get("x"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_rebinding_replaces() {
        let ctx = EvaluationContext::new()
            .with_variable("x", Value::Number(1.0))
            .unwrap()
            .with_variable("x", Value::Number(2.0))
            .unwrap();
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.get("x"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_variable_cap() {
        let ctx = EvaluationContext::with_limit(2)
            .with_variable("a", Value::Number(1.0))
            .unwrap()
            .with_variable("b", Value::Number(2.0))
            .unwrap();
        let err = ctx.with_variable("c", Value::Number(3.0)).unwrap_err();
        assert_eq!(
            err,
            EvalError::TooManyVariables {
                limit: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn test_without_variable() {
        let ctx = EvaluationContext::new()
            .with_variable("x", Value::Number(1.0))
            .unwrap();
        let removed = ctx.without_variable("x");
        assert!(removed.is_empty());
        assert_eq!(ctx.len(), 1);
    }
}
