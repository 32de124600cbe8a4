//! FILENAME: engine/src/value.rs
//! PURPOSE: Runtime values produced by evaluating formulas.
//! CONTEXT: The parser's literal values are a strict subset of these.
//! Evaluation adds `Null` for absent results (a skipped step, a missing
//! IF branch). Coercion between types is centralized here so the
//! evaluator and the builtin functions agree on what "truthy" and
//! "numeric" mean.

use serde::{Deserialize, Serialize};

/// A runtime value: the result of evaluating an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Boolean(bool),
    Null,
}

impl Value {
    /// Attempts to coerce the value to a number. Text parses through the
    /// standard float syntax; booleans map to 1/0; Null has no numeric
    /// value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            Value::Null => None,
        }
    }

    /// Attempts to coerce the value to a boolean. Zero is false, any other
    /// number is true; the strings TRUE/FALSE (any case) convert; Null is
    /// false.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Number(n) => Some(*n != 0.0),
            Value::Text(s) => {
                if s.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }
            Value::Null => Some(false),
        }
    }

    /// The textual form of the value, as used by CONCAT and the trace.
    pub fn as_text(&self) -> String {
        match self {
            Value::Number(n) => n.to_string(),
            Value::Text(s) => s.clone(),
            Value::Boolean(b) => b.to_string(),
            Value::Null => String::new(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The type name, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Boolean(_) => "boolean",
            Value::Null => "null",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<parser::ast::Value> for Value {
    fn from(literal: parser::ast::Value) -> Self {
        match literal {
            parser::ast::Value::Number(n) => Value::Number(n),
            parser::ast::Value::String(s) => Value::Text(s),
            parser::ast::Value::Boolean(b) => Value::Boolean(b),
        }
    }
}
