//! FILENAME: parser/src/lexer.rs
//! PURPOSE: Scans a raw formula string and produces a stream of Tokens.
//! CONTEXT: This is the first stage of the parsing pipeline. It handles
//! whitespace skipping, number parsing (integer/decimal/exponent), string
//! literals, plain and delimited `${name}` variables, and multi-character
//! operators like `<=`, `!=`, `&&`.
//!
//! SUPPORTED OPERATORS:
//! - Single char: + - * / % ^ ( ) , = < >
//! - Multi char: == != <> <= >= && ||
//!
//! The scan is a single linear pass with no backtracking. A running
//! (index, line, column) position advances on every character; `\n` starts
//! a new line.

use crate::token::{Position, Token, TokenKind};
use thiserror::Error;

/// Errors produced while tokenizing. Each variant carries the offending
/// text and its position for diagnostics.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("unexpected character '{text}' at {position}")]
    UnexpectedCharacter { text: String, position: Position },

    #[error("unclosed variable '{text}' starting at {position}")]
    UnclosedVariable { text: String, position: Position },

    #[error("invalid number format '{text}' at {position}")]
    InvalidNumberFormat { text: String, position: Position },

    #[error("invalid token sequence '{text}' at {position}")]
    InvalidTokenSequence { text: String, position: Position },

    #[error("input too large: {actual} exceeds the configured limit of {limit}")]
    TooLarge { limit: usize, actual: usize },
}

/// Guards against unbounded input. Violations become a fatal
/// [`LexError::TooLarge`] instead of unbounded memory growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerLimits {
    /// Maximum input length in characters.
    pub max_length: usize,
    /// Maximum number of tokens produced from one input.
    pub max_tokens: usize,
}

impl Default for LexerLimits {
    fn default() -> Self {
        LexerLimits {
            max_length: 10_000,
            max_tokens: 2_000,
        }
    }
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    position: Position,
    limits: LexerLimits,
    input_len: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_limits(input, LexerLimits::default())
    }

    pub fn with_limits(input: &'a str, limits: LexerLimits) -> Self {
        Lexer {
            chars: input.chars().peekable(),
            position: Position::start(),
            limits,
            input_len: input.chars().count(),
        }
    }

    /// Tokenizes the entire input eagerly. The returned stream always ends
    /// with a single `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        if self.input_len > self.limits.max_length {
            return Err(LexError::TooLarge {
                limit: self.limits.max_length,
                actual: self.input_len,
            });
        }

        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let at_end = token.kind == TokenKind::Eof;
            tokens.push(token);
            if at_end {
                return Ok(tokens);
            }
            if tokens.len() > self.limits.max_tokens {
                return Err(LexError::TooLarge {
                    limit: self.limits.max_tokens,
                    actual: tokens.len(),
                });
            }
        }
    }

    /// Advances the lexer and returns the next token.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let start = self.position;
        let ch = match self.advance() {
            Some(ch) => ch,
            None => return Ok(Token::new(TokenKind::Eof, "", start)),
        };

        match ch {
            '+' => Ok(Token::new(TokenKind::Plus, "+", start)),
            '-' => Ok(Token::new(TokenKind::Minus, "-", start)),
            '*' => Ok(Token::new(TokenKind::Star, "*", start)),
            '/' => Ok(Token::new(TokenKind::Slash, "/", start)),
            '%' => Ok(Token::new(TokenKind::Percent, "%", start)),
            '^' => Ok(Token::new(TokenKind::Caret, "^", start)),
            '(' => Ok(Token::new(TokenKind::LParen, "(", start)),
            ')' => Ok(Token::new(TokenKind::RParen, ")", start)),
            ',' => Ok(Token::new(TokenKind::Comma, ",", start)),

            // '=' and '==' both mean equality
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(Token::new(TokenKind::Eq, "==", start))
                } else {
                    Ok(Token::new(TokenKind::Eq, "=", start))
                }
            }

            // '<' may start <, <=, or the '<>' spelling of not-equal
            '<' => match self.peek() {
                Some('=') => {
                    self.advance();
                    Ok(Token::new(TokenKind::LessEq, "<=", start))
                }
                Some('>') => {
                    self.advance();
                    Ok(Token::new(TokenKind::NotEq, "<>", start))
                }
                _ => Ok(Token::new(TokenKind::Less, "<", start)),
            },

            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(Token::new(TokenKind::GreaterEq, ">=", start))
                } else {
                    Ok(Token::new(TokenKind::Greater, ">", start))
                }
            }

            // '!' is only valid as part of '!='
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(Token::new(TokenKind::NotEq, "!=", start))
                } else {
                    Err(LexError::InvalidTokenSequence {
                        text: "!".to_string(),
                        position: start,
                    })
                }
            }

            // '&' and '|' are only valid doubled
            '&' => {
                if self.peek() == Some('&') {
                    self.advance();
                    Ok(Token::new(TokenKind::AndAnd, "&&", start))
                } else {
                    Err(LexError::InvalidTokenSequence {
                        text: "&".to_string(),
                        position: start,
                    })
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.advance();
                    Ok(Token::new(TokenKind::OrOr, "||", start))
                } else {
                    Err(LexError::InvalidTokenSequence {
                        text: "|".to_string(),
                        position: start,
                    })
                }
            }

            '"' => self.read_string(start),

            // Delimited variable reference: ${name}
            '$' => self.read_delimited_variable(start),

            ch if ch.is_ascii_digit() => self.read_number(ch, start),

            ch if is_identifier_start(ch) => Ok(self.read_identifier(ch, start)),

            ch => Err(LexError::UnexpectedCharacter {
                text: ch.to_string(),
                position: start,
            }),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Consumes one character and advances the running position.
    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        self.position.index += 1;
        if ch == '\n' {
            self.position.line += 1;
            self.position.column = 1;
        } else {
            self.position.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.advance();
        }
    }

    /// Reads a numeric literal: digits, optional fraction, optional
    /// exponent. A dot or exponent marker that is not followed by a digit
    /// is an InvalidNumberFormat error.
    fn read_number(&mut self, first_char: char, start: Position) -> Result<Token, LexError> {
        let mut text = String::from(first_char);

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if self.peek() == Some('.') {
            text.push('.');
            self.advance();
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(LexError::InvalidNumberFormat {
                    text,
                    position: start,
                });
            }
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    text.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        if let Some(marker @ ('e' | 'E')) = self.peek() {
            text.push(marker);
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.advance();
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(LexError::InvalidNumberFormat {
                    text,
                    position: start,
                });
            }
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    text.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        // A digit immediately after the number would have been consumed, but
        // a second dot means something like "1.2.3"
        if self.peek() == Some('.') {
            text.push('.');
            return Err(LexError::InvalidNumberFormat {
                text,
                position: start,
            });
        }

        Ok(Token::new(TokenKind::Number, text, start))
    }

    /// Reads an identifier, keyword, or function name. The booleans
    /// `true`/`false` (any case) lex as Boolean tokens.
    fn read_identifier(&mut self, first_char: char, start: Position) -> Token {
        let mut text = String::from(first_char);

        while let Some(ch) = self.peek() {
            if is_identifier_continue(ch) {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") {
            Token::new(TokenKind::Boolean, text, start)
        } else {
            Token::new(TokenKind::Identifier, text, start)
        }
    }

    /// Reads a delimited variable: `${name}`. The brace must close before
    /// end of input.
    fn read_delimited_variable(&mut self, start: Position) -> Result<Token, LexError> {
        let mut text = String::from('$');

        if self.peek() != Some('{') {
            return Err(LexError::UnexpectedCharacter {
                text,
                position: start,
            });
        }
        text.push('{');
        self.advance();

        loop {
            match self.peek() {
                Some('}') => {
                    text.push('}');
                    self.advance();
                    break;
                }
                Some(ch) if is_identifier_continue(ch) => {
                    text.push(ch);
                    self.advance();
                }
                Some(ch) => {
                    text.push(ch);
                    return Err(LexError::UnclosedVariable {
                        text,
                        position: start,
                    });
                }
                None => {
                    return Err(LexError::UnclosedVariable {
                        text,
                        position: start,
                    });
                }
            }
        }

        if text == "${}" {
            return Err(LexError::UnclosedVariable {
                text,
                position: start,
            });
        }

        Ok(Token::new(TokenKind::Identifier, text, start))
    }

    /// Reads a string literal. The closing quote must appear before end of
    /// input.
    fn read_string(&mut self, start: Position) -> Result<Token, LexError> {
        let mut text = String::from('"');

        loop {
            match self.advance() {
                Some('"') => {
                    text.push('"');
                    return Ok(Token::new(TokenKind::Str, text, start));
                }
                Some(ch) => text.push(ch),
                None => {
                    return Err(LexError::InvalidTokenSequence {
                        text,
                        position: start,
                    });
                }
            }
        }
    }
}

/// Returns true if `ch` can start an identifier.
fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

/// Returns true if `ch` can continue an identifier.
fn is_identifier_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Convenience function: tokenizes with default limits.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(input).tokenize()
}
