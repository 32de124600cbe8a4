//! FILENAME: parser/src/builder.rs
//! PURPOSE: Per-production AST builders and the registry mapping every
//! production id to exactly one builder.
//! CONTEXT: When the parser reduces a production it pops the matched
//! children off the value stack (tokens and previously built subtrees,
//! left to right) and hands them to that production's builder. Builders
//! validate arity and child types before constructing anything and fail
//! fast with a structural-mismatch error naming expected vs. actual.
//! Registry totality is checked once, at engine construction.

use crate::ast::{BinaryOperator, Expr, UnaryOperator, Value};
use crate::grammar::{Grammar, GrammarError};
use crate::token::{Token, TokenKind};
use thiserror::Error;

/// A reduce-time child: either a raw token shifted from the input, a
/// previously built expression, or an argument list under construction.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildNode {
    Token(Token),
    Node(Expr),
    List(Vec<Expr>),
}

impl ChildNode {
    fn describe(&self) -> &'static str {
        match self {
            ChildNode::Token(_) => "token",
            ChildNode::Node(_) => "expression",
            ChildNode::List(_) => "argument list",
        }
    }
}

/// Structural mismatches between a production and the children handed to
/// its builder. These indicate a grammar/registry bug, not bad user input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("production {production}: expected {expected} children, got {actual}")]
    ChildCountMismatch {
        production: usize,
        expected: usize,
        actual: usize,
    },

    #[error("production {production}, child {index}: expected {expected}, got {actual}")]
    ChildTypeMismatch {
        production: usize,
        index: usize,
        expected: String,
        actual: String,
    },
}

/// The builder for one production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeBuilder {
    /// Passes the single child through unchanged (chain productions like
    /// `Add -> Mul`).
    Passthrough,
    /// `( expr )` -- passes the middle child through unchanged.
    Parenthesized,
    /// `left op right`.
    Binary,
    /// `- operand`.
    UnaryNegate,
    /// A number, string, or boolean literal token.
    Literal,
    /// An identifier token becoming a variable reference.
    Variable,
    /// `name ( )`.
    EmptyCall,
    /// `name ( args )`.
    Call,
    /// `Args -> Expr`: starts an argument list.
    ArgsFirst,
    /// `Args -> Args , Expr`: appends to an argument list.
    ArgsAppend,
}

impl NodeBuilder {
    /// Reduces the children of `production` into a stack value. Arity is
    /// validated against the production's RHS length before any child is
    /// inspected.
    pub fn build(
        &self,
        production: usize,
        expected_len: usize,
        mut children: Vec<ChildNode>,
    ) -> Result<ChildNode, BuildError> {
        if children.len() != expected_len {
            return Err(BuildError::ChildCountMismatch {
                production,
                expected: expected_len,
                actual: children.len(),
            });
        }

        match self {
            NodeBuilder::Passthrough => Ok(children.remove(0)),

            NodeBuilder::Parenthesized => {
                let expr = expect_node(production, 1, children.remove(1))?;
                Ok(ChildNode::Node(expr))
            }

            NodeBuilder::Binary => {
                let right = expect_node(production, 2, children.remove(2))?;
                let op_token = expect_token(production, 1, children.remove(1))?;
                let left = expect_node(production, 0, children.remove(0))?;
                let op = binary_operator(op_token.kind).ok_or_else(|| {
                    BuildError::ChildTypeMismatch {
                        production,
                        index: 1,
                        expected: "binary operator token".to_string(),
                        actual: op_token.kind.to_string(),
                    }
                })?;
                Ok(ChildNode::Node(Expr::BinaryOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                }))
            }

            NodeBuilder::UnaryNegate => {
                let operand = expect_node(production, 1, children.remove(1))?;
                Ok(ChildNode::Node(Expr::UnaryOp {
                    op: UnaryOperator::Negate,
                    operand: Box::new(operand),
                }))
            }

            NodeBuilder::Literal => {
                let token = expect_token(production, 0, children.remove(0))?;
                let value = match token.kind {
                    TokenKind::Number => token.number_value().map(Value::Number),
                    TokenKind::Str => token.string_value().map(|s| Value::String(s.to_string())),
                    TokenKind::Boolean => token.boolean_value().map(Value::Boolean),
                    _ => None,
                };
                match value {
                    Some(value) => Ok(ChildNode::Node(Expr::Literal(value))),
                    None => Err(BuildError::ChildTypeMismatch {
                        production,
                        index: 0,
                        expected: "literal token".to_string(),
                        actual: token.kind.to_string(),
                    }),
                }
            }

            NodeBuilder::Variable => {
                let token = expect_token(production, 0, children.remove(0))?;
                match token.identifier_name() {
                    Some(name) => Ok(ChildNode::Node(Expr::Variable(name.to_string()))),
                    None => Err(BuildError::ChildTypeMismatch {
                        production,
                        index: 0,
                        expected: "identifier token".to_string(),
                        actual: token.kind.to_string(),
                    }),
                }
            }

            NodeBuilder::EmptyCall => {
                let name_token = expect_token(production, 0, children.remove(0))?;
                let name = identifier_text(production, &name_token)?;
                Ok(ChildNode::Node(Expr::FunctionCall {
                    name,
                    args: Vec::new(),
                }))
            }

            NodeBuilder::Call => {
                let args = expect_list(production, 2, children.remove(2))?;
                let name_token = expect_token(production, 0, children.remove(0))?;
                let name = identifier_text(production, &name_token)?;
                Ok(ChildNode::Node(Expr::FunctionCall { name, args }))
            }

            NodeBuilder::ArgsFirst => {
                let expr = expect_node(production, 0, children.remove(0))?;
                Ok(ChildNode::List(vec![expr]))
            }

            NodeBuilder::ArgsAppend => {
                let expr = expect_node(production, 2, children.remove(2))?;
                let mut args = expect_list(production, 0, children.remove(0))?;
                args.push(expr);
                Ok(ChildNode::List(args))
            }
        }
    }
}

fn expect_node(production: usize, index: usize, child: ChildNode) -> Result<Expr, BuildError> {
    match child {
        ChildNode::Node(expr) => Ok(expr),
        other => Err(BuildError::ChildTypeMismatch {
            production,
            index,
            expected: "expression".to_string(),
            actual: other.describe().to_string(),
        }),
    }
}

fn expect_token(production: usize, index: usize, child: ChildNode) -> Result<Token, BuildError> {
    match child {
        ChildNode::Token(token) => Ok(token),
        other => Err(BuildError::ChildTypeMismatch {
            production,
            index,
            expected: "token".to_string(),
            actual: other.describe().to_string(),
        }),
    }
}

fn expect_list(production: usize, index: usize, child: ChildNode) -> Result<Vec<Expr>, BuildError> {
    match child {
        ChildNode::List(args) => Ok(args),
        other => Err(BuildError::ChildTypeMismatch {
            production,
            index,
            expected: "argument list".to_string(),
            actual: other.describe().to_string(),
        }),
    }
}

fn identifier_text(production: usize, token: &Token) -> Result<String, BuildError> {
    token
        .identifier_name()
        .map(|name| name.to_string())
        .ok_or_else(|| BuildError::ChildTypeMismatch {
            production,
            index: 0,
            expected: "identifier token".to_string(),
            actual: token.kind.to_string(),
        })
}

fn binary_operator(kind: TokenKind) -> Option<BinaryOperator> {
    match kind {
        TokenKind::OrOr => Some(BinaryOperator::Or),
        TokenKind::AndAnd => Some(BinaryOperator::And),
        TokenKind::Eq => Some(BinaryOperator::Equal),
        TokenKind::NotEq => Some(BinaryOperator::NotEqual),
        TokenKind::Less => Some(BinaryOperator::LessThan),
        TokenKind::LessEq => Some(BinaryOperator::LessEqual),
        TokenKind::Greater => Some(BinaryOperator::GreaterThan),
        TokenKind::GreaterEq => Some(BinaryOperator::GreaterEqual),
        TokenKind::Plus => Some(BinaryOperator::Add),
        TokenKind::Minus => Some(BinaryOperator::Subtract),
        TokenKind::Star => Some(BinaryOperator::Multiply),
        TokenKind::Slash => Some(BinaryOperator::Divide),
        TokenKind::Percent => Some(BinaryOperator::Modulo),
        TokenKind::Caret => Some(BinaryOperator::Power),
        _ => None,
    }
}

/// A total mapping from production id to builder. Construction verifies
/// that every production of the grammar has exactly one builder.
#[derive(Debug, Clone)]
pub struct BuilderRegistry {
    builders: Vec<NodeBuilder>,
}

impl BuilderRegistry {
    /// Builds the registry for the formula grammar of `Grammar::formula()`.
    pub fn for_formula_grammar(grammar: &Grammar) -> Result<Self, GrammarError> {
        use NodeBuilder::*;
        let builders = vec![
            Passthrough,  // 0: Start -> Expr (accept; never reduced)
            Binary,       // 1: Expr -> Expr || And
            Passthrough,  // 2: Expr -> And
            Binary,       // 3: And -> And && Cmp
            Passthrough,  // 4: And -> Cmp
            Binary,       // 5: Cmp -> Cmp = Add
            Binary,       // 6: Cmp -> Cmp != Add
            Binary,       // 7: Cmp -> Cmp < Add
            Binary,       // 8: Cmp -> Cmp <= Add
            Binary,       // 9: Cmp -> Cmp > Add
            Binary,       // 10: Cmp -> Cmp >= Add
            Passthrough,  // 11: Cmp -> Add
            Binary,       // 12: Add -> Add + Mul
            Binary,       // 13: Add -> Add - Mul
            Passthrough,  // 14: Add -> Mul
            Binary,       // 15: Mul -> Mul * Unary
            Binary,       // 16: Mul -> Mul / Unary
            Binary,       // 17: Mul -> Mul % Unary
            Passthrough,  // 18: Mul -> Unary
            UnaryNegate,  // 19: Unary -> - Unary
            Passthrough,  // 20: Unary -> Power
            Binary,       // 21: Power -> Atom ^ Unary
            Passthrough,  // 22: Power -> Atom
            Literal,      // 23: Atom -> NUMBER
            Literal,      // 24: Atom -> STRING
            Literal,      // 25: Atom -> BOOLEAN
            Variable,     // 26: Atom -> IDENTIFIER
            Parenthesized, // 27: Atom -> ( Expr )
            EmptyCall,    // 28: Atom -> IDENTIFIER ( )
            Call,         // 29: Atom -> IDENTIFIER ( Args )
            ArgsFirst,    // 30: Args -> Expr
            ArgsAppend,   // 31: Args -> Args , Expr
        ];
        Self::new(grammar, builders)
    }

    /// Builds a registry from an explicit builder table, verifying
    /// totality against the grammar.
    pub fn new(grammar: &Grammar, builders: Vec<NodeBuilder>) -> Result<Self, GrammarError> {
        if builders.len() != grammar.productions().len() {
            return Err(GrammarError::InvalidGrammar(format!(
                "builder registry covers {} productions, grammar has {}",
                builders.len(),
                grammar.productions().len()
            )));
        }
        Ok(BuilderRegistry { builders })
    }

    pub fn builder(&self, production: usize) -> Option<NodeBuilder> {
        self.builders.get(production).copied()
    }
}
