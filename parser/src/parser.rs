//! FILENAME: parser/src/parser.rs
//! PURPOSE: Table-driven LALR(1) parser for token streams.
//! CONTEXT: This is the second stage of the parsing pipeline. One ACTION
//! lookup per token drives an explicit state stack and value stack, so
//! parsing is O(n) in input length and deeply nested expressions cannot
//! overflow the call stack. Stack height and total step count are bounded
//! by configurable guards that convert to typed errors.

use crate::builder::{BuildError, BuilderRegistry, ChildNode};
use crate::grammar::Grammar;
use crate::lexer::LexError;
use crate::table::{Action, ParseTable};
use crate::token::{Position, Token, TokenKind};
use thiserror::Error;

/// Parser errors with offending text and position for diagnostics.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("unexpected token '{text}' at {position}; expected one of: {expected}")]
    UnexpectedToken {
        text: String,
        position: Position,
        expected: String,
    },

    #[error("expression nests too deeply: parse stack exceeded {limit} entries")]
    TooDeep { limit: usize },

    #[error("parsing exceeded the limit of {limit} steps")]
    TooManySteps { limit: usize },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("internal parser error: {0}")]
    Internal(String),
}

/// Guards against pathological inputs. Violations become typed errors,
/// never unbounded recursion or memory growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserLimits {
    /// Maximum height of the state/value stacks.
    pub max_stack_depth: usize,
    /// Maximum number of shift/reduce steps for one parse.
    pub max_steps: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        ParserLimits {
            max_stack_depth: 256,
            max_steps: 100_000,
        }
    }
}

/// The table-driven parser. Holds only shared references; one instance
/// can be used for any number of parses.
pub struct Parser<'e> {
    grammar: &'e Grammar,
    table: &'e ParseTable,
    registry: &'e BuilderRegistry,
    limits: ParserLimits,
}

impl<'e> Parser<'e> {
    pub fn new(
        grammar: &'e Grammar,
        table: &'e ParseTable,
        registry: &'e BuilderRegistry,
        limits: ParserLimits,
    ) -> Self {
        Parser {
            grammar,
            table,
            registry,
            limits,
        }
    }

    /// Parses a token stream (as produced by the lexer, ending with EOF)
    /// into an expression tree.
    pub fn parse(&self, tokens: &[Token]) -> Result<crate::ast::Expr, ParseError> {
        let mut state_stack: Vec<usize> = vec![0];
        let mut value_stack: Vec<ChildNode> = Vec::new();
        let mut cursor = 0;
        let mut steps = 0usize;

        loop {
            steps += 1;
            if steps > self.limits.max_steps {
                return Err(ParseError::TooManySteps {
                    limit: self.limits.max_steps,
                });
            }

            let state = *state_stack
                .last()
                .ok_or_else(|| ParseError::Internal("empty state stack".to_string()))?;
            let token = tokens
                .get(cursor)
                .ok_or_else(|| ParseError::Internal("token stream ended before EOF".to_string()))?;

            let action = match self.table.action(state, token.kind) {
                Some(action) => action,
                None => return Err(self.unexpected_token(state, token)),
            };

            match action {
                Action::Shift(next_state) => {
                    state_stack.push(next_state);
                    value_stack.push(ChildNode::Token(token.clone()));
                    cursor += 1;
                    if state_stack.len() > self.limits.max_stack_depth {
                        return Err(ParseError::TooDeep {
                            limit: self.limits.max_stack_depth,
                        });
                    }
                }

                Action::Reduce(production_id) => {
                    let production = self.grammar.production(production_id);
                    let rhs_len = production.len();
                    if state_stack.len() <= rhs_len || value_stack.len() < rhs_len {
                        return Err(ParseError::Internal(format!(
                            "reduce of production {} underflows the stack",
                            production_id
                        )));
                    }
                    state_stack.truncate(state_stack.len() - rhs_len);
                    let children = value_stack.split_off(value_stack.len() - rhs_len);

                    let builder = self.registry.builder(production_id).ok_or_else(|| {
                        ParseError::Internal(format!(
                            "no builder registered for production {}",
                            production_id
                        ))
                    })?;
                    let node = builder.build(production_id, rhs_len, children)?;

                    let exposed = *state_stack
                        .last()
                        .ok_or_else(|| ParseError::Internal("empty state stack".to_string()))?;
                    let next_state =
                        self.table.goto(exposed, production.lhs).ok_or_else(|| {
                            ParseError::Internal(format!(
                                "missing goto for ({}, {})",
                                exposed, production.lhs
                            ))
                        })?;
                    state_stack.push(next_state);
                    value_stack.push(node);
                }

                Action::Accept => {
                    return match value_stack.pop() {
                        Some(ChildNode::Node(expr)) => Ok(expr),
                        other => Err(ParseError::Internal(format!(
                            "accept with a non-expression on the value stack: {:?}",
                            other
                        ))),
                    };
                }
            }
        }
    }

    fn unexpected_token(&self, state: usize, token: &Token) -> ParseError {
        let mut expected: Vec<String> = self
            .table
            .expected_terminals(state)
            .into_iter()
            .filter(|t| *t != TokenKind::Eof)
            .map(|t| format!("'{}'", t))
            .collect();
        if self
            .table
            .expected_terminals(state)
            .contains(&TokenKind::Eof)
        {
            expected.push("end of input".to_string());
        }
        ParseError::UnexpectedToken {
            text: token.to_string(),
            position: token.position,
            expected: expected.join(", "),
        }
    }
}
