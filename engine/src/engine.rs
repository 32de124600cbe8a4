//! FILENAME: engine/src/engine.rs
//! PURPOSE: The FormulaEngine facade: parse, validate, evaluate, execute.
//! CONTEXT: Owns one immutable ParserEngine and one config. The length
//! guard runs before tokenization, optimization runs after parsing when
//! enabled, and every failure surfaces as a FormulaError that keeps the
//! original parse or evaluation cause attached.

use crate::config::EngineConfig;
use crate::context::EvaluationContext;
use crate::evaluator::{functions_in, EvalError, EvaluationResult, Evaluator};
use crate::formula::{FormulaExecution, FormulaSet};
use crate::optimizer::Optimizer;
use crate::orchestrator::{Orchestrator, OrchestratorError};
use crate::value::Value;
use parser::{Expr, GrammarError, ParseError, ParserEngine};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use thiserror::Error;

/// Failures of the engine facade. Parse and evaluation causes are wrapped,
/// not replaced: the original error stays reachable through `source()`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("formula is too large: {actual} characters exceed the limit of {limit}")]
    TooLarge { limit: usize, actual: usize },

    #[error("failed to parse formula: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("failed to evaluate formula: {source}")]
    Eval {
        #[from]
        source: EvalError,
    },
}

/// The complete formula pipeline behind one handle. Immutable once built;
/// one instance serves any number of callers.
pub struct FormulaEngine {
    parser: ParserEngine,
    config: EngineConfig,
}

impl FormulaEngine {
    /// Builds the engine with default configuration. Fails only if the
    /// grammar or its tables cannot be constructed.
    pub fn new() -> Result<Self, GrammarError> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, GrammarError> {
        let parser = ParserEngine::with_limits(config.lexer_limits(), config.parser_limits())?;
        Ok(FormulaEngine { parser, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parses a formula into an AST, applying the length guard before any
    /// tokenization and constant folding after.
    pub fn parse(&self, text: &str) -> Result<Expr, FormulaError> {
        let length = text.chars().count();
        if length > self.config.max_formula_length {
            return Err(FormulaError::TooLarge {
                limit: self.config.max_formula_length,
                actual: length,
            });
        }
        let expr = self.parser.parse(text)?;
        if self.config.enable_optimization {
            Ok(Optimizer::new(&self.config).optimize(expr))
        } else {
            Ok(expr)
        }
    }

    /// Checks that a formula parses, without evaluating it.
    pub fn validate(&self, text: &str) -> Result<(), FormulaError> {
        self.parse(text).map(|_| ())
    }

    /// The names of every variable the formula references.
    pub fn extract_variables(&self, text: &str) -> Result<BTreeSet<String>, FormulaError> {
        Ok(self.parse(text)?.variables())
    }

    /// Evaluates a formula against a variable map.
    pub fn evaluate(&self, text: &str, variables: &BTreeMap<String, Value>) -> EvaluationResult {
        let start = Instant::now();
        match EvaluationContext::from_variables(variables, self.config.max_variables) {
            Ok(context) => self.evaluate_with_context(text, &context),
            Err(cause) => EvaluationResult::failed(
                FormulaError::from(cause).to_string(),
                start.elapsed(),
                Vec::new(),
                Vec::new(),
            ),
        }
    }

    /// Evaluates a formula against an existing context.
    pub fn evaluate_with_context(
        &self,
        text: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult {
        let start = Instant::now();
        let expr = match self.parse(text) {
            Ok(expr) => expr,
            Err(cause) => {
                return EvaluationResult::failed(
                    cause.to_string(),
                    start.elapsed(),
                    Vec::new(),
                    Vec::new(),
                );
            }
        };

        let variables_used: Vec<String> = expr.variables().into_iter().collect();
        let functions_used: Vec<String> = functions_in(&expr).into_iter().collect();

        match Evaluator::new(&self.config).evaluate(&expr, context) {
            Ok(value) => EvaluationResult::succeeded(
                value,
                start.elapsed(),
                variables_used,
                functions_used,
            ),
            Err(cause) => EvaluationResult::failed(
                FormulaError::from(cause).to_string(),
                start.elapsed(),
                variables_used,
                functions_used,
            ),
        }
    }

    /// Runs a formula set and returns its audit trail.
    pub fn execute_set(
        &self,
        set: &FormulaSet,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<FormulaExecution, OrchestratorError> {
        Orchestrator::new(self).run(set, inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn engine() -> FormulaEngine {
        FormulaEngine::new().unwrap()
    }

    #[test]
    fn test_validate() {
        let engine = engine();
        assert!(engine.validate("1 + 2 * x").is_ok());
        assert!(engine.validate("1 +").is_err());
    }

    #[test]
    fn test_validate_preserves_cause() {
        let err = engine().validate("1 +").unwrap_err();
        assert!(matches!(err, FormulaError::Parse { .. }));
        // The original ParseError stays reachable through source().
        assert!(err.source().is_some());
    }

    #[test]
    fn test_extract_variables() {
        let names = engine()
            .extract_variables("IF(a > b, a, ${c_total}) + a")
            .unwrap();
        let expected: BTreeSet<String> = ["a", "b", "c_total"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_extract_variables_reports_parse_failure() {
        assert!(engine().extract_variables("1 + (").is_err());
    }

    #[test]
    fn test_length_guard_runs_before_tokenization() {
        let config = EngineConfig {
            max_formula_length: 10,
            ..EngineConfig::default()
        };
        let engine = FormulaEngine::with_config(config).unwrap();
        // The formula contains a character the lexer would reject; the
        // length guard must fire first.
        let result = engine.parse("1 + 2 + 3 + #");
        assert!(matches!(
            result,
            Err(FormulaError::TooLarge {
                limit: 10,
                actual: 13
            })
        ));
    }

    #[test]
    fn test_evaluate_reports_variables_and_functions() {
        let variables = BTreeMap::from([
            ("a".to_string(), Value::Number(4.0)),
            ("b".to_string(), Value::Number(2.0)),
        ]);
        let result = engine().evaluate("MIN(a, b) + a", &variables);
        assert!(result.success);
        assert_eq!(result.value, Value::Number(6.0));
        assert_eq!(result.variables_used, vec!["a", "b"]);
        assert_eq!(result.functions_used, vec!["MIN"]);
    }

    #[test]
    fn test_evaluation_result_serializes() {
        let result = engine().evaluate("2 + 3 * 4", &BTreeMap::new());
        let json = serde_json::to_string(&result).unwrap();
        let parsed: EvaluationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
        assert_eq!(parsed.value, Value::Number(14.0));
    }
}
