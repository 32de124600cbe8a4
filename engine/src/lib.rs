//! FILENAME: engine/src/lib.rs
//! PURPOSE: Main library entry point for the formula engine.
//! CONTEXT: Re-exports public types and modules for use by other crates.
//!
//! PIPELINE: Formula String --> FormulaEngine (length guard) --> parser
//! crate (lex + LALR parse) --> Optimizer (constant folding) -->
//! Evaluator (typed values, builtin functions) --> EvaluationResult, or
//! via the Orchestrator for whole FormulaSets with an audit trail.

pub mod config;
pub mod context;
pub mod engine;
pub mod evaluator;
pub mod formula;
pub mod functions;
pub mod optimizer;
pub mod orchestrator;
pub mod value;

// Re-export commonly used types at the crate root
pub use config::EngineConfig;
pub use context::EvaluationContext;
pub use engine::{FormulaEngine, FormulaError};
pub use evaluator::{EvalError, EvaluationResult, Evaluator};
pub use formula::{ExecutionStatus, ExecutionStep, Formula, FormulaExecution, FormulaSet};
pub use functions::Arity;
pub use optimizer::Optimizer;
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use value::Value;
