//! FILENAME: engine/src/config.rs
//! PURPOSE: Tunable limits and feature switches for the formula engine.
//! CONTEXT: One config value is threaded through the whole pipeline:
//! the facade checks formula length before tokenizing, the lexer and
//! parser enforce their own ceilings, the evaluator bounds recursion,
//! and the orchestrator caps the number of steps in a formula set.
//! Every limit violation is a typed error, never a panic.

use parser::{LexerLimits, ParserLimits};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum formula length in characters, checked before tokenization.
    pub max_formula_length: usize,
    /// Maximum number of variables in one evaluation context.
    pub max_variables: usize,
    /// Maximum evaluator recursion depth.
    pub max_parsing_depth: usize,
    /// Maximum shift/reduce steps for one parse.
    pub max_parsing_steps: usize,
    /// Maximum parser stack height.
    pub max_stack_depth: usize,
    /// Maximum number of tokens produced from one formula.
    pub max_token_count: usize,
    /// Maximum number of steps in one formula set.
    pub max_steps: usize,
    /// When set, text values are not silently coerced to numbers.
    pub strict_mode: bool,
    /// Constant-fold literal subtrees after parsing.
    pub enable_optimization: bool,
    /// Memoize subtree results within one evaluation call.
    pub enable_caching: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_formula_length: 10_000,
            max_variables: 1_000,
            max_parsing_depth: 256,
            max_parsing_steps: 100_000,
            max_stack_depth: 256,
            max_token_count: 2_000,
            max_steps: 1_000,
            strict_mode: false,
            enable_optimization: true,
            enable_caching: true,
        }
    }
}

impl EngineConfig {
    /// The lexer's view of this config.
    pub fn lexer_limits(&self) -> LexerLimits {
        LexerLimits {
            max_length: self.max_formula_length,
            max_tokens: self.max_token_count,
        }
    }

    /// The parser's view of this config.
    pub fn parser_limits(&self) -> ParserLimits {
        ParserLimits {
            max_stack_depth: self.max_stack_depth,
            max_steps: self.max_parsing_steps,
        }
    }
}
