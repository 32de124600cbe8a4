//! FILENAME: engine/src/orchestrator.rs
//! PURPOSE: Runs a FormulaSet step by step and records the audit trail.
//! CONTEXT: Steps run strictly in `order`. Each step's result is bound
//! to its result variable in a derived context, so later steps see it
//! without the inputs ever being mutated. A falsy condition skips a step
//! (status at most Partial); the first failure stops the run (status
//! Failed, remaining steps never execute).

use crate::context::EvaluationContext;
use crate::engine::{FormulaEngine, FormulaError};
use crate::evaluator::{truth_of, EvalError, Evaluator};
use crate::formula::{ExecutionStatus, ExecutionStep, Formula, FormulaExecution, FormulaSet};
use crate::value::Value;
use chrono::Utc;
use log::{debug, warn};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    #[error("formula set '{0}' has no steps")]
    EmptySteps(String),

    #[error("formula set '{name}' has {actual} steps, exceeding the limit of {limit}")]
    TooManySteps {
        name: String,
        limit: usize,
        actual: usize,
    },

    #[error("invalid inputs: {source}")]
    InvalidInputs {
        #[source]
        source: EvalError,
    },

    #[error("step '{step}' failed: {source}")]
    StepExecutionError {
        step: String,
        #[source]
        source: FormulaError,
    },
}

pub struct Orchestrator<'e> {
    engine: &'e FormulaEngine,
}

impl<'e> Orchestrator<'e> {
    pub fn new(engine: &'e FormulaEngine) -> Self {
        Orchestrator { engine }
    }

    /// Runs the set against the given inputs. Guard violations (empty set,
    /// step ceiling, bad inputs) fail before any step runs; once steps are
    /// running, failures are recorded in the returned trace instead.
    pub fn run(
        &self,
        set: &FormulaSet,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<FormulaExecution, OrchestratorError> {
        let started_at = Utc::now();
        let ordered = set.ordered();
        if ordered.is_empty() {
            return Err(OrchestratorError::EmptySteps(set.name.clone()));
        }
        let limit = self.engine.config().max_steps;
        if ordered.len() > limit {
            return Err(OrchestratorError::TooManySteps {
                name: set.name.clone(),
                limit,
                actual: ordered.len(),
            });
        }

        let mut context =
            EvaluationContext::from_variables(inputs, self.engine.config().max_variables)
                .map_err(|source| OrchestratorError::InvalidInputs { source })?;

        let mut steps: Vec<ExecutionStep> = Vec::with_capacity(ordered.len());
        let mut status = ExecutionStatus::Success;
        let mut error = None;
        let mut final_result = Value::Null;
        let mut any_skipped = false;

        for formula in ordered {
            let timestamp = Utc::now();
            debug!("set '{}': running step '{}'", set.name, formula.name);

            match self.run_step(formula, &context) {
                Ok(Some((value, next_context))) => {
                    context = next_context;
                    final_result = value.clone();
                    steps.push(ExecutionStep {
                        order: formula.order,
                        name: formula.name.clone(),
                        expression: formula.expression.clone(),
                        result_variable: formula.result_variable.clone(),
                        value,
                        skipped: false,
                        timestamp,
                    });
                }
                Ok(None) => {
                    debug!("set '{}': step '{}' skipped", set.name, formula.name);
                    any_skipped = true;
                    steps.push(ExecutionStep {
                        order: formula.order,
                        name: formula.name.clone(),
                        expression: formula.expression.clone(),
                        result_variable: formula.result_variable.clone(),
                        value: Value::Null,
                        skipped: true,
                        timestamp,
                    });
                }
                Err(source) => {
                    warn!(
                        "set '{}': step '{}' failed: {}",
                        set.name, formula.name, source
                    );
                    status = ExecutionStatus::Failed;
                    error = Some(
                        OrchestratorError::StepExecutionError {
                            step: formula.name.clone(),
                            source,
                        }
                        .to_string(),
                    );
                    break;
                }
            }
        }

        if status != ExecutionStatus::Failed && any_skipped {
            status = ExecutionStatus::Partial;
        }

        Ok(FormulaExecution {
            set_name: set.name.clone(),
            inputs: inputs.clone(),
            steps,
            final_result,
            status,
            error,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Runs one step. `Ok(None)` means the condition skipped it;
    /// `Ok(Some)` carries the value and the context extended with it.
    fn run_step(
        &self,
        formula: &Formula,
        context: &EvaluationContext,
    ) -> Result<Option<(Value, EvaluationContext)>, FormulaError> {
        let evaluator = Evaluator::new(self.engine.config());

        if let Some(condition) = &formula.condition {
            let guard = self.engine.parse(condition)?;
            let value = evaluator.evaluate(&guard, context)?;
            // A condition that cannot be read as a boolean is a step
            // failure, not a silent skip.
            if !truth_of(&value)? {
                return Ok(None);
            }
        }

        let expr = self.engine.parse(&formula.expression)?;
        let value = evaluator.evaluate(&expr, context)?;
        let next = context.with_variable(formula.result_variable.clone(), value.clone())?;
        Ok(Some((value, next)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn engine() -> FormulaEngine {
        FormulaEngine::new().unwrap()
    }

    fn inputs(pairs: &[(&str, f64)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(name, n)| (name.to_string(), Value::Number(*n)))
            .collect()
    }

    #[test]
    fn test_two_step_set_threads_results() {
        let set = FormulaSet::new("grading")
            .add_formula(Formula::new("sum", "a + b", 1, "step1"))
            .add_formula(Formula::new("double", "step1 * 2", 2, "final"));
        let engine = engine();
        let execution = engine
            .execute_set(&set, &inputs(&[("a", 2.0), ("b", 3.0)]))
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(execution.steps.len(), 2);
        assert_eq!(execution.steps[0].value, Value::Number(5.0));
        assert_eq!(execution.steps[1].value, Value::Number(10.0));
        assert_eq!(execution.final_result, Value::Number(10.0));
        assert!(execution.error.is_none());
        assert!(execution.finished_at >= execution.started_at);
    }

    #[test]
    fn test_condition_skips_step() {
        let set = FormulaSet::new("bonus")
            .add_formula(Formula::new("base", "score", 1, "base"))
            .add_formula(
                Formula::new("bonus", "base + 10", 2, "withBonus").with_condition("score > 90"),
            );
        let execution = engine()
            .execute_set(&set, &inputs(&[("score", 50.0)]))
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Partial);
        assert!(execution.steps[1].skipped);
        assert_eq!(execution.steps[1].value, Value::Null);
        // The final result is the last executed step's value.
        assert_eq!(execution.final_result, Value::Number(50.0));
    }

    #[test]
    fn test_all_steps_skipped() {
        let set = FormulaSet::new("conditional").add_formula(
            Formula::new("maybe", "1", 1, "r").with_condition("false"),
        );
        let execution = engine().execute_set(&set, &BTreeMap::new()).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Partial);
        assert_eq!(execution.final_result, Value::Null);
    }

    #[test]
    fn test_failure_stops_the_run() {
        let set = FormulaSet::new("failing")
            .add_formula(Formula::new("first", "1 + 1", 1, "a"))
            .add_formula(Formula::new("boom", "a / 0", 2, "b"))
            .add_formula(Formula::new("never", "b + 1", 3, "c"));
        let execution = engine().execute_set(&set, &BTreeMap::new()).unwrap();

        assert_eq!(execution.status, ExecutionStatus::Failed);
        // The failing step produced no ExecutionStep; only the first ran.
        assert_eq!(execution.steps.len(), 1);
        let error = execution.error.unwrap();
        assert!(error.contains("boom"));
        assert!(error.contains("division by zero"));
    }

    #[test]
    fn test_non_boolean_condition_fails_the_step() {
        // "yes" coerces to neither true nor false; the step must fail
        // rather than be silently skipped.
        let set = FormulaSet::new("guarded").add_formula(
            Formula::new("maybe", "1", 1, "r").with_condition("flag"),
        );
        let inputs = BTreeMap::from([("flag".to_string(), Value::Text("yes".to_string()))]);
        let execution = engine().execute_set(&set, &inputs).unwrap();

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.steps.is_empty());
        let error = execution.error.unwrap();
        assert!(error.contains("maybe"));
        assert!(error.contains("expected boolean"));
    }

    #[test]
    fn test_empty_set_is_rejected() {
        let set = FormulaSet::new("empty");
        let result = engine().execute_set(&set, &BTreeMap::new());
        assert!(matches!(result, Err(OrchestratorError::EmptySteps(name)) if name == "empty"));
    }

    #[test]
    fn test_step_ceiling() {
        let config = EngineConfig {
            max_steps: 1,
            ..EngineConfig::default()
        };
        let engine = FormulaEngine::with_config(config).unwrap();
        let set = FormulaSet::new("big")
            .add_formula(Formula::new("one", "1", 1, "a"))
            .add_formula(Formula::new("two", "2", 2, "b"));
        let result = engine.execute_set(&set, &BTreeMap::new());
        assert!(matches!(
            result,
            Err(OrchestratorError::TooManySteps {
                limit: 1,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let set = FormulaSet::new("rebind")
            .add_formula(Formula::new("shadow", "a + 1", 1, "a"));
        let original = inputs(&[("a", 1.0)]);
        let execution = engine().execute_set(&set, &original).unwrap();
        assert_eq!(execution.final_result, Value::Number(2.0));
        assert_eq!(original.get("a"), Some(&Value::Number(1.0)));
        assert_eq!(execution.inputs.get("a"), Some(&Value::Number(1.0)));
    }
}
