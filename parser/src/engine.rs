//! FILENAME: parser/src/engine.rs
//! PURPOSE: The ParserEngine: grammar + parse table + builder registry,
//! constructed once and shared immutably.
//! CONTEXT: All table construction and registry totality checks happen
//! here, at initialization. A conflicting grammar refuses to start. The
//! finished engine has no interior mutability, so one instance can be
//! shared by reference across any number of concurrent parses.

use crate::ast::Expr;
use crate::builder::BuilderRegistry;
use crate::grammar::{Grammar, GrammarError};
use crate::lexer::{Lexer, LexerLimits};
use crate::parser::{ParseError, Parser, ParserLimits};
use crate::table::{ParseTable, TableBuilder};
use crate::token::Token;

/// The fully built parsing pipeline for the formula language.
#[derive(Debug)]
pub struct ParserEngine {
    grammar: Grammar,
    table: ParseTable,
    registry: BuilderRegistry,
    lexer_limits: LexerLimits,
    parser_limits: ParserLimits,
}

impl ParserEngine {
    /// Builds the engine for the formula grammar with default limits.
    /// Fails if the grammar is invalid or not LALR(1).
    pub fn new() -> Result<Self, GrammarError> {
        Self::with_limits(LexerLimits::default(), ParserLimits::default())
    }

    pub fn with_limits(
        lexer_limits: LexerLimits,
        parser_limits: ParserLimits,
    ) -> Result<Self, GrammarError> {
        let grammar = Grammar::formula()?;
        let table = TableBuilder::new(&grammar).build()?;
        let registry = BuilderRegistry::for_formula_grammar(&grammar)?;
        Ok(ParserEngine {
            grammar,
            table,
            registry,
            lexer_limits,
            parser_limits,
        })
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn table(&self) -> &ParseTable {
        &self.table
    }

    /// Tokenizes a formula string under the engine's lexer limits.
    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, ParseError> {
        Ok(Lexer::with_limits(input, self.lexer_limits).tokenize()?)
    }

    /// Parses a formula string end to end: lex, then table-driven parse
    /// and AST construction.
    pub fn parse(&self, input: &str) -> Result<Expr, ParseError> {
        let tokens = self.tokenize(input)?;
        self.parse_tokens(&tokens)
    }

    /// Parses an already tokenized stream.
    pub fn parse_tokens(&self, tokens: &[Token]) -> Result<Expr, ParseError> {
        Parser::new(&self.grammar, &self.table, &self.registry, self.parser_limits).parse(tokens)
    }
}
