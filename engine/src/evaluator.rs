//! FILENAME: engine/src/evaluator.rs
//! PURPOSE: Evaluates AST expressions against an evaluation context.
//! CONTEXT: After a formula is parsed into an AST, this module traverses
//! the tree and computes the final value. Evaluation is purely
//! functional: the same tree and context always produce the same result,
//! which is what makes the optional per-call memo cache sound.
//!
//! SUPPORTED FEATURES:
//! - Literal evaluation: Numbers, Strings, Booleans
//! - Variable lookup from the EvaluationContext
//! - Binary operations: +, -, *, /, %, ^, =, !=, <, >, <=, >=, &&, ||
//! - Short-circuit && and ||
//! - Unary operations: - (negation)
//! - Builtin functions via the functions module
//!
//! Division and modulo by zero, undefined variables, and non-finite
//! arithmetic results are typed errors, never NaN leaking into results.

use crate::config::EngineConfig;
use crate::context::EvaluationContext;
use crate::functions;
use crate::value::Value;
use parser::ast::{BinaryOperator, Expr, UnaryOperator};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use thiserror::Error;

/// Errors produced while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("operator '{operator}' does not apply to {left} and {right}")]
    UnsupportedOperator {
        operator: String,
        left: String,
        right: String,
    },

    #[error("unsupported function '{0}'")]
    UnsupportedFunction(String),

    #[error("function '{function}' expects {expected} argument(s), got {actual}")]
    WrongArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("unsupported type: expected {expected}, got {actual}")]
    UnsupportedType { expected: String, actual: String },

    #[error("cannot convert '{0}' to a number")]
    NumberConversionError(String),

    #[error("'{0}' produced a non-finite result")]
    MathError(String),

    #[error("expression nests too deeply: evaluation exceeded {limit} levels")]
    TooDeep { limit: usize },

    #[error("too many variables: {actual} exceeds the limit of {limit}")]
    TooManyVariables { limit: usize, actual: usize },
}

/// Coerces a value to a number. Strict mode refuses text.
pub(crate) fn number_of(value: &Value, strict: bool) -> Result<f64, EvalError> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Text(s) => {
            if strict {
                Err(EvalError::UnsupportedType {
                    expected: "number".to_string(),
                    actual: "text".to_string(),
                })
            } else {
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| EvalError::NumberConversionError(s.clone()))
            }
        }
        Value::Null => Err(EvalError::UnsupportedType {
            expected: "number".to_string(),
            actual: "null".to_string(),
        }),
    }
}

/// Coerces a value to a boolean.
pub(crate) fn truth_of(value: &Value) -> Result<bool, EvalError> {
    value.as_boolean().ok_or_else(|| EvalError::UnsupportedType {
        expected: "boolean".to_string(),
        actual: value.type_name().to_string(),
    })
}

/// Rejects non-finite arithmetic results.
pub(crate) fn finite(operation: &str, n: f64) -> Result<f64, EvalError> {
    if n.is_finite() {
        Ok(n)
    } else {
        Err(EvalError::MathError(operation.to_string()))
    }
}

/// Every function name called anywhere in the tree.
pub fn functions_in(expr: &Expr) -> BTreeSet<String> {
    fn walk(expr: &Expr, names: &mut BTreeSet<String>) {
        match expr {
            Expr::Literal(_) | Expr::Variable(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                walk(left, names);
                walk(right, names);
            }
            Expr::UnaryOp { operand, .. } => walk(operand, names),
            Expr::FunctionCall { name, args } => {
                names.insert(name.to_ascii_uppercase());
                for arg in args {
                    walk(arg, names);
                }
            }
        }
    }
    let mut names = BTreeSet::new();
    walk(expr, &mut names);
    names
}

/// The tree-walking evaluator. Holds only configuration; all state lives
/// on the call stack and in the per-call memo cache.
pub struct Evaluator {
    strict_mode: bool,
    max_depth: usize,
    enable_caching: bool,
}

impl Evaluator {
    pub fn new(config: &EngineConfig) -> Self {
        Evaluator {
            strict_mode: config.strict_mode,
            max_depth: config.max_parsing_depth,
            enable_caching: config.enable_caching,
        }
    }

    /// Evaluates an expression. Pure: neither the tree nor the context is
    /// modified, and repeated calls return identical results.
    pub fn evaluate(&self, expr: &Expr, context: &EvaluationContext) -> Result<Value, EvalError> {
        let mut cache: HashMap<usize, Value> = HashMap::new();
        self.eval(expr, context, 0, &mut cache)
    }

    fn eval(
        &self,
        expr: &Expr,
        context: &EvaluationContext,
        depth: usize,
        cache: &mut HashMap<usize, Value>,
    ) -> Result<Value, EvalError> {
        if depth > self.max_depth {
            return Err(EvalError::TooDeep {
                limit: self.max_depth,
            });
        }

        // Node identity keys the memo cache; sound because the tree and
        // context are immutable for the duration of the call.
        let key = expr as *const Expr as usize;
        if self.enable_caching {
            if let Some(cached) = cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        let value = match expr {
            Expr::Literal(literal) => Value::from(literal.clone()),

            Expr::Variable(name) => context
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UndefinedVariable(name.clone()))?,

            Expr::UnaryOp { op, operand } => {
                let operand = self.eval(operand, context, depth + 1, cache)?;
                match op {
                    UnaryOperator::Negate => {
                        let n = number_of(&operand, self.strict_mode)?;
                        Value::Number(finite("negation", -n)?)
                    }
                }
            }

            Expr::BinaryOp { left, op, right } => {
                self.eval_binary(left, *op, right, context, depth, cache)?
            }

            Expr::FunctionCall { name, args } => {
                // IF is the one lazy builtin: only the selected branch may
                // run, so a guarded expression like IF(b = 0, 0, a / b)
                // never touches the division.
                if name.eq_ignore_ascii_case("IF") {
                    self.eval_if(args, context, depth, cache)?
                } else {
                    let mut evaluated = Vec::with_capacity(args.len());
                    for arg in args {
                        evaluated.push(self.eval(arg, context, depth + 1, cache)?);
                    }
                    functions::call(name, &evaluated, self.strict_mode)?
                }
            }
        };

        if self.enable_caching {
            cache.insert(key, value.clone());
        }
        Ok(value)
    }

    /// Evaluates IF(condition, then, else?) lazily. Arity is checked
    /// before any argument runs.
    fn eval_if(
        &self,
        args: &[Expr],
        context: &EvaluationContext,
        depth: usize,
        cache: &mut HashMap<usize, Value>,
    ) -> Result<Value, EvalError> {
        let arity = functions::arity_of("IF").unwrap_or(functions::Arity::Range(2, 3));
        if !arity.accepts(args.len()) {
            return Err(EvalError::WrongArgumentCount {
                function: "IF".to_string(),
                expected: arity.to_string(),
                actual: args.len(),
            });
        }
        let condition = self.eval(&args[0], context, depth + 1, cache)?;
        if truth_of(&condition)? {
            self.eval(&args[1], context, depth + 1, cache)
        } else {
            match args.get(2) {
                Some(otherwise) => self.eval(otherwise, context, depth + 1, cache),
                None => Ok(Value::Null),
            }
        }
    }

    fn eval_binary(
        &self,
        left: &Expr,
        op: BinaryOperator,
        right: &Expr,
        context: &EvaluationContext,
        depth: usize,
        cache: &mut HashMap<usize, Value>,
    ) -> Result<Value, EvalError> {
        // Logical operators short-circuit: the right operand is not
        // evaluated when the left already decides the result.
        match op {
            BinaryOperator::And => {
                let l = self.eval(left, context, depth + 1, cache)?;
                if !truth_of(&l)? {
                    return Ok(Value::Boolean(false));
                }
                let r = self.eval(right, context, depth + 1, cache)?;
                return Ok(Value::Boolean(truth_of(&r)?));
            }
            BinaryOperator::Or => {
                let l = self.eval(left, context, depth + 1, cache)?;
                if truth_of(&l)? {
                    return Ok(Value::Boolean(true));
                }
                let r = self.eval(right, context, depth + 1, cache)?;
                return Ok(Value::Boolean(truth_of(&r)?));
            }
            _ => {}
        }

        let l = self.eval(left, context, depth + 1, cache)?;
        let r = self.eval(right, context, depth + 1, cache)?;

        match op {
            BinaryOperator::Equal => Ok(Value::Boolean(self.values_equal(&l, &r))),
            BinaryOperator::NotEqual => Ok(Value::Boolean(!self.values_equal(&l, &r))),

            BinaryOperator::LessThan
            | BinaryOperator::LessEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterEqual => {
                let ordering = self.compare(op, &l, &r)?;
                let holds = match op {
                    BinaryOperator::LessThan => ordering == std::cmp::Ordering::Less,
                    BinaryOperator::LessEqual => ordering != std::cmp::Ordering::Greater,
                    BinaryOperator::GreaterThan => ordering == std::cmp::Ordering::Greater,
                    BinaryOperator::GreaterEqual => ordering != std::cmp::Ordering::Less,
                    _ => unreachable!("arm covers only ordering operators"),
                };
                Ok(Value::Boolean(holds))
            }

            BinaryOperator::Add => self.arithmetic("+", &l, &r, |a, b| a + b),
            BinaryOperator::Subtract => self.arithmetic("-", &l, &r, |a, b| a - b),
            BinaryOperator::Multiply => self.arithmetic("*", &l, &r, |a, b| a * b),
            BinaryOperator::Power => self.arithmetic("^", &l, &r, f64::powf),

            BinaryOperator::Divide => {
                let a = number_of(&l, self.strict_mode)?;
                let b = number_of(&r, self.strict_mode)?;
                if b == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                Ok(Value::Number(finite("/", a / b)?))
            }
            BinaryOperator::Modulo => {
                let a = number_of(&l, self.strict_mode)?;
                let b = number_of(&r, self.strict_mode)?;
                if b == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                Ok(Value::Number(finite("%", a % b)?))
            }

            BinaryOperator::And | BinaryOperator::Or => {
                unreachable!("logical operators handled above")
            }
        }
    }

    fn arithmetic(
        &self,
        operator: &str,
        l: &Value,
        r: &Value,
        apply: impl Fn(f64, f64) -> f64,
    ) -> Result<Value, EvalError> {
        let a = number_of(l, self.strict_mode)?;
        let b = number_of(r, self.strict_mode)?;
        Ok(Value::Number(finite(operator, apply(a, b))?))
    }

    fn values_equal(&self, l: &Value, r: &Value) -> bool {
        match (l, r) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) => true,
            _ if !self.strict_mode => match (l.as_number(), r.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            _ => false,
        }
    }

    fn compare(
        &self,
        op: BinaryOperator,
        l: &Value,
        r: &Value,
    ) -> Result<std::cmp::Ordering, EvalError> {
        if let (Value::Text(a), Value::Text(b)) = (l, r) {
            return Ok(a.cmp(b));
        }
        let a = number_of(l, self.strict_mode)?;
        let b = number_of(r, self.strict_mode)?;
        a.partial_cmp(&b)
            .ok_or_else(|| EvalError::UnsupportedOperator {
                operator: op.to_string(),
                left: l.type_name().to_string(),
                right: r.type_name().to_string(),
            })
    }
}

/// The serializable outcome of evaluating one formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub value: Value,
    pub success: bool,
    pub error: Option<String>,
    pub elapsed: Duration,
    pub variables_used: Vec<String>,
    pub functions_used: Vec<String>,
}

impl EvaluationResult {
    pub fn succeeded(
        value: Value,
        elapsed: Duration,
        variables_used: Vec<String>,
        functions_used: Vec<String>,
    ) -> Self {
        EvaluationResult {
            value,
            success: true,
            error: None,
            elapsed,
            variables_used,
            functions_used,
        }
    }

    pub fn failed(
        error: String,
        elapsed: Duration,
        variables_used: Vec<String>,
        functions_used: Vec<String>,
    ) -> Self {
        EvaluationResult {
            value: Value::Null,
            success: false,
            error: Some(error),
            elapsed,
            variables_used,
            functions_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::ast::Value as AstValue;
    use parser::ParserEngine;

    fn parse(input: &str) -> Expr {
        ParserEngine::new().unwrap().parse(input).unwrap()
    }

    fn eval(input: &str, ctx: &EvaluationContext) -> Result<Value, EvalError> {
        Evaluator::new(&EngineConfig::default()).evaluate(&parse(input), ctx)
    }

    fn eval_strict(input: &str, ctx: &EvaluationContext) -> Result<Value, EvalError> {
        let config = EngineConfig {
            strict_mode: true,
            ..EngineConfig::default()
        };
        Evaluator::new(&config).evaluate(&parse(input), ctx)
    }

    #[test]
    fn test_literal_number() {
        let ctx = EvaluationContext::new();
        assert_eq!(eval("42", &ctx), Ok(Value::Number(42.0)));
    }

    #[test]
    fn test_precedence() {
        let ctx = EvaluationContext::new();
        assert_eq!(eval("2 + 3 * 4", &ctx), Ok(Value::Number(14.0)));
        assert_eq!(eval("(2 + 3) * 4", &ctx), Ok(Value::Number(20.0)));
        assert_eq!(eval("2 ^ 3 ^ 2", &ctx), Ok(Value::Number(512.0)));
        assert_eq!(eval("10 - 4 - 3", &ctx), Ok(Value::Number(3.0)));
    }

    #[test]
    fn test_variable_lookup() {
        let ctx = EvaluationContext::new()
            .with_variable("x", Value::Number(3.0))
            .unwrap();
        assert_eq!(eval("(x + 1) * 2", &ctx), Ok(Value::Number(8.0)));
    }

    #[test]
    fn test_undefined_variable() {
        let ctx = EvaluationContext::new();
        assert_eq!(
            eval("unknownVar + 1", &ctx),
            Err(EvalError::UndefinedVariable("unknownVar".to_string()))
        );
    }

    #[test]
    fn test_division_by_zero() {
        let ctx = EvaluationContext::new()
            .with_variable("a", Value::Number(1.0))
            .unwrap()
            .with_variable("b", Value::Number(0.0))
            .unwrap();
        assert_eq!(eval("a / b", &ctx), Err(EvalError::DivisionByZero));
        assert_eq!(eval("a % b", &ctx), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_comparisons_and_logic() {
        let ctx = EvaluationContext::new()
            .with_variable("score", Value::Number(75.0))
            .unwrap();
        assert_eq!(eval("score >= 60", &ctx), Ok(Value::Boolean(true)));
        assert_eq!(
            eval("score >= 60 && score < 70", &ctx),
            Ok(Value::Boolean(false))
        );
        assert_eq!(
            eval("score < 60 || score > 70", &ctx),
            Ok(Value::Boolean(true))
        );
        assert_eq!(eval("score = 75", &ctx), Ok(Value::Boolean(true)));
        assert_eq!(eval("score != 75", &ctx), Ok(Value::Boolean(false)));
    }

    #[test]
    fn test_short_circuit_skips_right_operand() {
        // The right side would error; short-circuiting must prevent that.
        let ctx = EvaluationContext::new()
            .with_variable("b", Value::Number(0.0))
            .unwrap();
        assert_eq!(eval("false && 1 / b > 0", &ctx), Ok(Value::Boolean(false)));
        assert_eq!(eval("true || 1 / b > 0", &ctx), Ok(Value::Boolean(true)));
    }

    #[test]
    fn test_if_evaluates_only_the_taken_branch() {
        // Guarded division: the untaken branch must never run.
        let ctx = EvaluationContext::new()
            .with_variable("a", Value::Number(10.0))
            .unwrap()
            .with_variable("b", Value::Number(0.0))
            .unwrap();
        assert_eq!(eval("IF(b = 0, 0, a / b)", &ctx), Ok(Value::Number(0.0)));

        let ctx = EvaluationContext::new()
            .with_variable("a", Value::Number(10.0))
            .unwrap()
            .with_variable("b", Value::Number(2.0))
            .unwrap();
        assert_eq!(eval("IF(b = 0, 0, a / b)", &ctx), Ok(Value::Number(5.0)));
    }

    #[test]
    fn test_if_without_else_yields_null() {
        let ctx = EvaluationContext::new();
        assert_eq!(eval("IF(false, 1)", &ctx), Ok(Value::Null));
    }

    #[test]
    fn test_if_arity_checked_before_any_argument_runs() {
        // One argument is too few; the arity error must win over the
        // division-by-zero the argument would raise.
        let ctx = EvaluationContext::new();
        assert_eq!(
            eval("IF(1 / 0)", &ctx),
            Err(EvalError::WrongArgumentCount {
                function: "IF".to_string(),
                expected: "between 2 and 3".to_string(),
                actual: 1
            })
        );
    }

    #[test]
    fn test_text_coercion_default_vs_strict() {
        let ctx = EvaluationContext::new()
            .with_variable("n", Value::Text("5".to_string()))
            .unwrap();
        assert_eq!(eval("n + 1", &ctx), Ok(Value::Number(6.0)));
        assert!(matches!(
            eval_strict("n + 1", &ctx),
            Err(EvalError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_number_conversion_error() {
        let ctx = EvaluationContext::new()
            .with_variable("n", Value::Text("abc".to_string()))
            .unwrap();
        assert_eq!(
            eval("n + 1", &ctx),
            Err(EvalError::NumberConversionError("abc".to_string()))
        );
    }

    #[test]
    fn test_non_finite_result() {
        let ctx = EvaluationContext::new();
        // 10^400 overflows f64 to infinity.
        assert_eq!(
            eval("10 ^ 400", &ctx),
            Err(EvalError::MathError("^".to_string()))
        );
    }

    #[test]
    fn test_unary_negation() {
        let ctx = EvaluationContext::new();
        assert_eq!(eval("--5", &ctx), Ok(Value::Number(5.0)));
        assert_eq!(eval("-(2 + 3)", &ctx), Ok(Value::Number(-5.0)));
    }

    #[test]
    fn test_purity() {
        let ctx = EvaluationContext::new()
            .with_variable("x", Value::Number(2.0))
            .unwrap();
        let expr = parse("x * x + 1");
        let evaluator = Evaluator::new(&EngineConfig::default());
        let first = evaluator.evaluate(&expr, &ctx);
        let second = evaluator.evaluate(&expr, &ctx);
        assert_eq!(first, second);
        assert_eq!(first, Ok(Value::Number(5.0)));
        assert_eq!(ctx.get("x"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_depth_guard() {
        let config = EngineConfig {
            max_parsing_depth: 4,
            ..EngineConfig::default()
        };
        let ctx = EvaluationContext::new();
        let expr = parse("1 + 2 + 3 + 4 + 5 + 6 + 7 + 8");
        let result = Evaluator::new(&config).evaluate(&expr, &ctx);
        assert_eq!(result, Err(EvalError::TooDeep { limit: 4 }));
    }

    #[test]
    fn test_functions_in_collects_names() {
        let expr = parse("IF(MIN(a, b) > 0, SUM(a, b), 0)");
        let names: Vec<String> = functions_in(&expr).into_iter().collect();
        assert_eq!(names, vec!["IF", "MIN", "SUM"]);
    }

    #[test]
    fn test_literal_conversion() {
        assert_eq!(
            Value::from(AstValue::String("hi".to_string())),
            Value::Text("hi".to_string())
        );
    }
}
