//! FILENAME: engine/src/optimizer.rs
//! PURPOSE: Constant folding of literal subtrees.
//! CONTEXT: Runs after parsing when the config enables it. A subtree
//! with no variable references evaluates the same way every time, so it
//! can be replaced by its value up front. Folding never changes error
//! semantics: a subtree whose evaluation fails (division by zero, domain
//! errors) is left in place for the evaluator to report at run time.

use crate::config::EngineConfig;
use crate::context::EvaluationContext;
use crate::evaluator::Evaluator;
use crate::value::Value;
use parser::ast::{Expr, Value as AstValue};

pub struct Optimizer {
    evaluator: Evaluator,
    context: EvaluationContext,
}

impl Optimizer {
    pub fn new(config: &EngineConfig) -> Self {
        Optimizer {
            evaluator: Evaluator::new(config),
            context: EvaluationContext::with_limit(0),
        }
    }

    /// Folds every constant subtree bottom-up.
    pub fn optimize(&self, expr: Expr) -> Expr {
        match expr {
            Expr::Literal(_) | Expr::Variable(_) => expr,

            Expr::UnaryOp { op, operand } => self.fold(Expr::UnaryOp {
                op,
                operand: Box::new(self.optimize(*operand)),
            }),

            Expr::BinaryOp { left, op, right } => self.fold(Expr::BinaryOp {
                left: Box::new(self.optimize(*left)),
                op,
                right: Box::new(self.optimize(*right)),
            }),

            Expr::FunctionCall { name, args } => self.fold(Expr::FunctionCall {
                name,
                args: args.into_iter().map(|arg| self.optimize(arg)).collect(),
            }),
        }
    }

    fn fold(&self, expr: Expr) -> Expr {
        if !expr.variables().is_empty() {
            return expr;
        }
        match self.evaluator.evaluate(&expr, &self.context) {
            Ok(value) => match literal_of(value) {
                Some(literal) => Expr::Literal(literal),
                None => expr,
            },
            // Leave failing subtrees for the evaluator to report.
            Err(_) => expr,
        }
    }
}

fn literal_of(value: Value) -> Option<AstValue> {
    match value {
        Value::Number(n) => Some(AstValue::Number(n)),
        Value::Text(s) => Some(AstValue::String(s)),
        Value::Boolean(b) => Some(AstValue::Boolean(b)),
        Value::Null => None,
    }
}
