//! FILENAME: parser/src/token.rs
//! PURPOSE: Token definitions for the formula lexer.
//! CONTEXT: Tokens are the atomic units produced by the lexer and consumed
//! by the table-driven parser. Each token carries its exact source lexeme
//! and position so diagnostics can point at the offending text and so the
//! original input can be reconstructed from the token stream.

use serde::{Deserialize, Serialize};

/// Source position of a token: absolute character index plus 1-based
/// line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub index: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn start() -> Self {
        Position {
            index: 0,
            line: 1,
            column: 1,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// The kind of a token. This enum carries no payload so it doubles as the
/// terminal alphabet of the grammar: parse-table lookups are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals and names
    Number,
    Str,
    Boolean,
    Identifier,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    AndAnd,
    OrOr,

    // Delimiters
    LParen,
    RParen,
    Comma,

    // End of input
    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TokenKind::Number => "NUMBER",
            TokenKind::Str => "STRING",
            TokenKind::Boolean => "BOOLEAN",
            TokenKind::Identifier => "IDENTIFIER",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Caret => "^",
            TokenKind::Eq => "=",
            TokenKind::NotEq => "!=",
            TokenKind::Less => "<",
            TokenKind::LessEq => "<=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEq => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Comma => ",",
            TokenKind::Eof => "EOF",
        };
        write!(f, "{}", s)
    }
}

/// A single token: classification, exact source lexeme, and position.
///
/// `text` is the raw slice of the input, including string quotes and the
/// `${`/`}` delimiters of a delimited variable. Concatenating the `text`
/// of every token (plus the whitespace the lexer skipped) reproduces the
/// original input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, position: Position) -> Self {
        Token {
            kind,
            text: text.into(),
            position,
        }
    }

    /// Parses the numeric value of a `Number` token.
    /// The lexer has already validated the format, so this only fails if
    /// called on the wrong token kind.
    pub fn number_value(&self) -> Option<f64> {
        if self.kind == TokenKind::Number {
            self.text.parse::<f64>().ok()
        } else {
            None
        }
    }

    /// Returns the boolean value of a `Boolean` token.
    pub fn boolean_value(&self) -> Option<bool> {
        if self.kind == TokenKind::Boolean {
            Some(self.text.eq_ignore_ascii_case("true"))
        } else {
            None
        }
    }

    /// Returns the variable name of an `Identifier` token, stripping the
    /// `${...}` delimiters if the variable was written in delimited form.
    pub fn identifier_name(&self) -> Option<&str> {
        if self.kind != TokenKind::Identifier {
            return None;
        }
        let text = self.text.as_str();
        if let Some(inner) = text.strip_prefix("${").and_then(|t| t.strip_suffix('}')) {
            Some(inner)
        } else {
            Some(text)
        }
    }

    /// Returns the contents of a `Str` token without the surrounding quotes.
    pub fn string_value(&self) -> Option<&str> {
        if self.kind != TokenKind::Str {
            return None;
        }
        self.text
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.kind == TokenKind::Eof {
            write!(f, "end of input")
        } else {
            write!(f, "{}", self.text)
        }
    }
}
