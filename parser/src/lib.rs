//! FILENAME: parser/src/lib.rs
//! PURPOSE: Library root for the formula parser.
//! CONTEXT: This crate converts formula strings into evaluatable
//! expression trees via a generated LALR(1) parse table.
//!
//! PIPELINE: Formula String --> Lexer --> Tokens --> Parser (ACTION/GOTO
//! tables + builder registry) --> AST --> Evaluator (engine crate)
//!
//! SUPPORTED FEATURES:
//! - Arithmetic: +, -, *, /, %, ^ (power)
//! - Comparison: = (==), != (<>), <, >, <=, >=
//! - Logical: &&, ||
//! - Variables: plain identifiers or delimited ${name}
//! - Function calls: MIN(a, b), IF(x > 0, 1, 0)
//! - Parentheses for grouping, unary negation
//!
//! The grammar, parse table, and builder registry are built once into a
//! ParserEngine and shared read-only across all parses.

pub mod ast;
pub mod builder;
pub mod engine;
pub mod grammar;
pub mod lexer;
pub mod lr;
pub mod parser;
pub mod table;
pub mod token;

// Register the separate tests module
#[cfg(test)]
mod tests;

// Re-export commonly used types for convenience
pub use ast::{BinaryOperator, Expr, UnaryOperator, Value};
pub use builder::{BuildError, BuilderRegistry, ChildNode, NodeBuilder};
pub use engine::ParserEngine;
pub use grammar::{Conflict, Grammar, GrammarError, NonTerminal, Production, Symbol, Terminal};
pub use lexer::{tokenize, LexError, Lexer, LexerLimits};
pub use lr::{can_merge_lalr, has_lookahead_conflicts, CompressedLrState, LrItem};
pub use parser::{ParseError, Parser, ParserLimits};
pub use table::{Action, ParseTable, TableBuilder};
pub use token::{Position, Token, TokenKind};
