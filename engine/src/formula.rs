//! FILENAME: engine/src/formula.rs
//! PURPOSE: Named formulas, ordered formula sets, and the execution trace.
//! CONTEXT: A formula set is a small ordered program: each step evaluates
//! one expression and binds the result to a variable visible to later
//! steps. Running a set produces a FormulaExecution — an append-only
//! audit record of the inputs, every step (including skipped ones), the
//! final result, and timestamps. All of it serializes to JSON.

use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One named formula within a set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    pub expression: String,
    /// Execution order within the set; lower runs first.
    pub order: u32,
    /// The variable the result is bound to for subsequent steps.
    pub result_variable: String,
    /// Optional guard expression. A falsy guard skips the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Formula {
    pub fn new(
        name: impl Into<String>,
        expression: impl Into<String>,
        order: u32,
        result_variable: impl Into<String>,
    ) -> Self {
        Formula {
            name: name.into(),
            expression: expression.into(),
            order,
            result_variable: result_variable.into(),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// An ordered collection of formulas executed as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaSet {
    pub name: String,
    pub formulas: Vec<Formula>,
}

impl FormulaSet {
    pub fn new(name: impl Into<String>) -> Self {
        FormulaSet {
            name: name.into(),
            formulas: Vec::new(),
        }
    }

    pub fn add_formula(mut self, formula: Formula) -> Self {
        self.formulas.push(formula);
        self
    }

    /// The formulas sorted by `order`. Ties keep insertion order.
    pub fn ordered(&self) -> Vec<&Formula> {
        let mut sorted: Vec<&Formula> = self.formulas.iter().collect();
        sorted.sort_by_key(|f| f.order);
        sorted
    }
}

/// The recorded outcome of one step of a formula-set run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub order: u32,
    pub name: String,
    pub expression: String,
    pub result_variable: String,
    /// The computed value; Null when the step was skipped.
    pub value: Value,
    pub skipped: bool,
    pub timestamp: DateTime<Utc>,
}

/// The overall outcome of a formula-set run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Every step ran.
    Success,
    /// At least one step was skipped by its condition; none failed.
    Partial,
    /// A step failed; later steps did not run.
    Failed,
}

/// The full audit record of one formula-set run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaExecution {
    pub set_name: String,
    pub inputs: BTreeMap<String, Value>,
    pub steps: Vec<ExecutionStep>,
    pub final_result: Value,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
