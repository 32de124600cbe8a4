//! FILENAME: parser/src/grammar.rs
//! PURPOSE: The fixed context-free grammar of the formula language.
//! CONTEXT: Operator precedence and associativity are encoded structurally
//! through production shape (left-recursive chains for left-associative
//! operators, `Power -> Atom '^' Unary` for right-associative power), not
//! through a separate precedence table. Ambiguity is resolved entirely by
//! the LALR construction in table.rs.
//!
//! GRAMMAR:
//!   Start  --> Expr                                (augmented)
//!   Expr   --> Expr "||" And | And
//!   And    --> And "&&" Cmp | Cmp
//!   Cmp    --> Cmp ("=" | "!=" | "<" | "<=" | ">" | ">=") Add | Add
//!   Add    --> Add ("+" | "-") Mul | Mul
//!   Mul    --> Mul ("*" | "/" | "%") Unary | Unary
//!   Unary  --> "-" Unary | Power
//!   Power  --> Atom "^" Unary | Atom
//!   Atom   --> NUMBER | STRING | BOOLEAN | IDENTIFIER
//!            | "(" Expr ")"
//!            | IDENTIFIER "(" ")" | IDENTIFIER "(" Args ")"
//!   Args   --> Expr | Args "," Expr

use crate::token::TokenKind;
use thiserror::Error;

/// A terminal symbol is exactly a token kind.
pub type Terminal = TokenKind;

/// Nonterminal symbols of the formula grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NonTerminal {
    /// Augmented start symbol; appears only on the left of production 0.
    Start,
    Expr,
    And,
    Cmp,
    Add,
    Mul,
    Unary,
    Power,
    Atom,
    Args,
}

impl std::fmt::Display for NonTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NonTerminal::Start => "Start",
            NonTerminal::Expr => "Expr",
            NonTerminal::And => "And",
            NonTerminal::Cmp => "Cmp",
            NonTerminal::Add => "Add",
            NonTerminal::Mul => "Mul",
            NonTerminal::Unary => "Unary",
            NonTerminal::Power => "Power",
            NonTerminal::Atom => "Atom",
            NonTerminal::Args => "Args",
        };
        write!(f, "{}", s)
    }
}

/// A grammar symbol: terminal or nonterminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
    Terminal(Terminal),
    NonTerminal(NonTerminal),
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Symbol::Terminal(t) => write!(f, "'{}'", t),
            Symbol::NonTerminal(n) => write!(f, "{}", n),
        }
    }
}

/// One production: a stable integer id, the left-hand nonterminal, and the
/// ordered right-hand sequence of symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Production {
    pub id: usize,
    pub lhs: NonTerminal,
    pub rhs: Vec<Symbol>,
}

impl Production {
    pub fn len(&self) -> usize {
        self.rhs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rhs.is_empty()
    }

    /// True if the production's RHS starts with its own LHS.
    pub fn is_left_recursive(&self) -> bool {
        self.rhs.first() == Some(&Symbol::NonTerminal(self.lhs))
    }
}

impl std::fmt::Display for Production {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ->", self.lhs)?;
        for sym in &self.rhs {
            write!(f, " {}", sym)?;
        }
        Ok(())
    }
}

/// A conflict detected while resolving the ACTION table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub state: usize,
    pub terminal: Terminal,
    pub existing: String,
    pub conflicting: String,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "state {} on '{}': {} vs {}",
            self.state, self.terminal, self.existing, self.conflicting
        )
    }
}

/// Fatal grammar and table-construction errors. The engine must not start
/// with a grammar that produces any of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GrammarError {
    #[error("invalid grammar: {0}")]
    InvalidGrammar(String),

    #[error("grammar is not LALR(1): {} conflict(s): {}", .0.len(), format_conflicts(.0))]
    Conflicts(Vec<Conflict>),

    #[error("LR state {0} has no core items")]
    EmptyCoreItems(usize),
}

fn format_conflicts(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The grammar model: the production table plus terminal/nonterminal
/// classification and derived queries. Built once and never mutated.
#[derive(Debug, Clone)]
pub struct Grammar {
    productions: Vec<Production>,
    terminals: Vec<Terminal>,
    non_terminals: Vec<NonTerminal>,
    start: NonTerminal,
}

impl Grammar {
    /// Builds the formula-language grammar. Fails with `InvalidGrammar` if
    /// the production table is internally inconsistent.
    pub fn formula() -> Result<Self, GrammarError> {
        use NonTerminal::*;
        use TokenKind::*;

        let t = Symbol::Terminal;
        let n = Symbol::NonTerminal;

        let rules: Vec<(NonTerminal, Vec<Symbol>)> = vec![
            // 0: augmented start
            (Start, vec![n(Expr)]),
            // 1-2: logical or
            (Expr, vec![n(Expr), t(OrOr), n(And)]),
            (Expr, vec![n(And)]),
            // 3-4: logical and
            (And, vec![n(And), t(AndAnd), n(Cmp)]),
            (And, vec![n(Cmp)]),
            // 5-11: comparison
            (Cmp, vec![n(Cmp), t(Eq), n(Add)]),
            (Cmp, vec![n(Cmp), t(NotEq), n(Add)]),
            (Cmp, vec![n(Cmp), t(Less), n(Add)]),
            (Cmp, vec![n(Cmp), t(LessEq), n(Add)]),
            (Cmp, vec![n(Cmp), t(Greater), n(Add)]),
            (Cmp, vec![n(Cmp), t(GreaterEq), n(Add)]),
            (Cmp, vec![n(Add)]),
            // 12-14: additive
            (Add, vec![n(Add), t(Plus), n(Mul)]),
            (Add, vec![n(Add), t(Minus), n(Mul)]),
            (Add, vec![n(Mul)]),
            // 15-18: multiplicative
            (Mul, vec![n(Mul), t(Star), n(Unary)]),
            (Mul, vec![n(Mul), t(Slash), n(Unary)]),
            (Mul, vec![n(Mul), t(Percent), n(Unary)]),
            (Mul, vec![n(Unary)]),
            // 19-20: unary minus
            (Unary, vec![t(Minus), n(Unary)]),
            (Unary, vec![n(Power)]),
            // 21-22: right-associative power
            (Power, vec![n(Atom), t(Caret), n(Unary)]),
            (Power, vec![n(Atom)]),
            // 23-29: atoms
            (Atom, vec![t(Number)]),
            (Atom, vec![t(Str)]),
            (Atom, vec![t(Boolean)]),
            (Atom, vec![t(Identifier)]),
            (Atom, vec![t(LParen), n(Expr), t(RParen)]),
            (Atom, vec![t(Identifier), t(LParen), t(RParen)]),
            (Atom, vec![t(Identifier), t(LParen), n(Args), t(RParen)]),
            // 30-31: argument lists
            (Args, vec![n(Expr)]),
            (Args, vec![n(Args), t(Comma), n(Expr)]),
        ];

        let productions = rules
            .into_iter()
            .enumerate()
            .map(|(id, (lhs, rhs))| Production { id, lhs, rhs })
            .collect();

        let terminals = vec![
            Number, Str, Boolean, Identifier, Plus, Minus, Star, Slash, Percent, Caret, Eq, NotEq,
            Less, LessEq, Greater, GreaterEq, AndAnd, OrOr, LParen, RParen, Comma, Eof,
        ];

        let non_terminals = vec![Start, Expr, And, Cmp, Add, Mul, Unary, Power, Atom, Args];

        let grammar = Grammar {
            productions,
            terminals,
            non_terminals,
            start: Expr,
        };
        grammar.validate()?;
        Ok(grammar)
    }

    /// Builds a grammar from an explicit production table. Used by tests
    /// that exercise the table builder on small synthetic grammars.
    pub fn new(
        productions: Vec<Production>,
        terminals: Vec<Terminal>,
        non_terminals: Vec<NonTerminal>,
        start: NonTerminal,
    ) -> Result<Self, GrammarError> {
        let grammar = Grammar {
            productions,
            terminals,
            non_terminals,
            start,
        };
        grammar.validate()?;
        Ok(grammar)
    }

    /// Checks the production table for internal consistency: ids are dense,
    /// every referenced symbol is declared, the start symbol is a declared
    /// nonterminal with at least one production, and production 0 is the
    /// augmented `Start -> start_symbol`.
    fn validate(&self) -> Result<(), GrammarError> {
        if self.productions.is_empty() {
            return Err(GrammarError::InvalidGrammar(
                "grammar has no productions".to_string(),
            ));
        }
        if !self.non_terminals.contains(&self.start) {
            return Err(GrammarError::InvalidGrammar(format!(
                "start symbol {} is not a declared nonterminal",
                self.start
            )));
        }

        let augmented = &self.productions[0];
        if augmented.lhs != NonTerminal::Start
            || augmented.rhs != vec![Symbol::NonTerminal(self.start)]
        {
            return Err(GrammarError::InvalidGrammar(format!(
                "production 0 must be Start -> {}, found '{}'",
                self.start, augmented
            )));
        }

        for (index, production) in self.productions.iter().enumerate() {
            if production.id != index {
                return Err(GrammarError::InvalidGrammar(format!(
                    "production '{}' has id {} at index {}",
                    production, production.id, index
                )));
            }
            if !self.non_terminals.contains(&production.lhs) {
                return Err(GrammarError::InvalidGrammar(format!(
                    "undeclared nonterminal {} on the left of '{}'",
                    production.lhs, production
                )));
            }
            for symbol in &production.rhs {
                let declared = match symbol {
                    Symbol::Terminal(t) => self.terminals.contains(t),
                    Symbol::NonTerminal(n) => self.non_terminals.contains(n),
                };
                if !declared {
                    return Err(GrammarError::InvalidGrammar(format!(
                        "undeclared symbol {} in '{}'",
                        symbol, production
                    )));
                }
            }
        }

        // Every nonterminal used on a RHS must be derivable.
        for production in &self.productions {
            for symbol in &production.rhs {
                if let Symbol::NonTerminal(nt) = symbol {
                    if self.productions_for(*nt).is_empty() {
                        return Err(GrammarError::InvalidGrammar(format!(
                            "nonterminal {} has no productions",
                            nt
                        )));
                    }
                }
            }
        }

        if self.productions_for(self.start).is_empty() {
            return Err(GrammarError::InvalidGrammar(format!(
                "start symbol {} has no productions",
                self.start
            )));
        }

        Ok(())
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    pub fn production(&self, id: usize) -> &Production {
        &self.productions[id]
    }

    pub fn terminals(&self) -> &[Terminal] {
        &self.terminals
    }

    pub fn non_terminals(&self) -> &[NonTerminal] {
        &self.non_terminals
    }

    pub fn start_symbol(&self) -> NonTerminal {
        self.start
    }

    /// The augmented production `Start -> start_symbol`, always id 0.
    pub fn augmented_production(&self) -> &Production {
        &self.productions[0]
    }

    /// All productions whose left-hand side is `nt`.
    pub fn productions_for(&self, nt: NonTerminal) -> Vec<&Production> {
        self.productions.iter().filter(|p| p.lhs == nt).collect()
    }

    /// All directly left-recursive productions.
    pub fn left_recursive_productions(&self) -> Vec<&Production> {
        self.productions
            .iter()
            .filter(|p| p.is_left_recursive())
            .collect()
    }

    /// All productions with an empty right-hand side.
    pub fn epsilon_productions(&self) -> Vec<&Production> {
        self.productions.iter().filter(|p| p.is_empty()).collect()
    }
}
