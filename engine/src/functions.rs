//! FILENAME: engine/src/functions.rs
//! PURPOSE: Builtin formula functions and their arity table.
//! CONTEXT: Function arguments arrive already evaluated. Arity is
//! validated against the static table before any argument is inspected,
//! so a call with the wrong argument count fails the same way whether or
//! not the arguments make sense. Unknown names are a typed error, not a
//! silent Null.
//!
//! SUPPORTED FUNCTIONS:
//! - Aggregates: SUM, AVERAGE, MIN, MAX, COUNT
//! - Math: ABS, ROUND, FLOOR, CEILING, SQRT, POWER, MOD
//! - Logic: IF, AND, OR, NOT
//! - Text: CONCAT, LEN, UPPER, LOWER

use crate::evaluator::{finite, number_of, truth_of, EvalError};
use crate::value::Value;

/// How many arguments a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == *n,
            Arity::AtLeast(n) => count >= *n,
            Arity::Range(lo, hi) => (*lo..=*hi).contains(&count),
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
            Arity::Range(lo, hi) => write!(f, "between {} and {}", lo, hi),
        }
    }
}

/// The arity of a builtin, looked up by canonical (uppercase) name.
pub fn arity_of(name: &str) -> Option<Arity> {
    let arity = match name {
        "SUM" | "AVERAGE" | "MIN" | "MAX" | "COUNT" | "AND" | "OR" | "CONCAT" => Arity::AtLeast(1),
        "ABS" | "FLOOR" | "CEILING" | "SQRT" | "NOT" | "LEN" | "UPPER" | "LOWER" => Arity::Exact(1),
        "POWER" | "MOD" => Arity::Exact(2),
        "ROUND" => Arity::Range(1, 2),
        "IF" => Arity::Range(2, 3),
        _ => return None,
    };
    Some(arity)
}

/// Calls a builtin by name. The name is case-insensitive.
pub fn call(name: &str, args: &[Value], strict: bool) -> Result<Value, EvalError> {
    let canonical = name.to_ascii_uppercase();
    let arity = arity_of(&canonical)
        .ok_or_else(|| EvalError::UnsupportedFunction(name.to_string()))?;
    if !arity.accepts(args.len()) {
        return Err(EvalError::WrongArgumentCount {
            function: canonical,
            expected: arity.to_string(),
            actual: args.len(),
        });
    }

    match canonical.as_str() {
        "SUM" => {
            let mut total = 0.0;
            for arg in args {
                total += number_of(arg, strict)?;
            }
            Ok(Value::Number(finite("SUM", total)?))
        }

        "AVERAGE" => {
            let mut total = 0.0;
            for arg in args {
                total += number_of(arg, strict)?;
            }
            Ok(Value::Number(finite("AVERAGE", total / args.len() as f64)?))
        }

        "MIN" => fold_numbers("MIN", args, strict, f64::min),
        "MAX" => fold_numbers("MAX", args, strict, f64::max),

        "COUNT" => {
            let count = args
                .iter()
                .filter(|arg| matches!(arg, Value::Number(_)))
                .count();
            Ok(Value::Number(count as f64))
        }

        "ABS" => unary_number("ABS", args, strict, f64::abs),
        "FLOOR" => unary_number("FLOOR", args, strict, f64::floor),
        "CEILING" => unary_number("CEILING", args, strict, f64::ceil),
        "SQRT" => unary_number("SQRT", args, strict, f64::sqrt),

        "POWER" => {
            let base = number_of(&args[0], strict)?;
            let exponent = number_of(&args[1], strict)?;
            Ok(Value::Number(finite("POWER", base.powf(exponent))?))
        }

        "MOD" => {
            let a = number_of(&args[0], strict)?;
            let b = number_of(&args[1], strict)?;
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Number(finite("MOD", a % b)?))
        }

        "ROUND" => {
            let n = number_of(&args[0], strict)?;
            let digits = match args.get(1) {
                Some(arg) => number_of(arg, strict)? as i32,
                None => 0,
            };
            let factor = 10f64.powi(digits);
            Ok(Value::Number(finite("ROUND", (n * factor).round() / factor)?))
        }

        "IF" => {
            let condition = truth_of(&args[0])?;
            if condition {
                Ok(args[1].clone())
            } else {
                Ok(args.get(2).cloned().unwrap_or(Value::Null))
            }
        }

        "AND" => {
            for arg in args {
                if !truth_of(arg)? {
                    return Ok(Value::Boolean(false));
                }
            }
            Ok(Value::Boolean(true))
        }

        "OR" => {
            for arg in args {
                if truth_of(arg)? {
                    return Ok(Value::Boolean(true));
                }
            }
            Ok(Value::Boolean(false))
        }

        "NOT" => Ok(Value::Boolean(!truth_of(&args[0])?)),

        "CONCAT" => {
            let mut text = String::new();
            for arg in args {
                text.push_str(&arg.as_text());
            }
            Ok(Value::Text(text))
        }

        "LEN" => Ok(Value::Number(args[0].as_text().chars().count() as f64)),
        "UPPER" => Ok(Value::Text(args[0].as_text().to_uppercase())),
        "LOWER" => Ok(Value::Text(args[0].as_text().to_lowercase())),

        other => Err(EvalError::UnsupportedFunction(other.to_string())),
    }
}

fn fold_numbers(
    name: &str,
    args: &[Value],
    strict: bool,
    pick: impl Fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    let mut result = number_of(&args[0], strict)?;
    for arg in &args[1..] {
        result = pick(result, number_of(arg, strict)?);
    }
    Ok(Value::Number(finite(name, result)?))
}

fn unary_number(
    name: &str,
    args: &[Value],
    strict: bool,
    apply: impl Fn(f64) -> f64,
) -> Result<Value, EvalError> {
    let n = number_of(&args[0], strict)?;
    Ok(Value::Number(finite(name, apply(n))?))
}
