//! FILENAME: parser/src/tests.rs
//! PURPOSE: Consolidated unit tests for the parser crate.

use crate::ast::{BinaryOperator, Expr, UnaryOperator, Value};
use crate::builder::{BuildError, BuilderRegistry, ChildNode, NodeBuilder};
use crate::engine::ParserEngine;
use crate::grammar::{Grammar, GrammarError, NonTerminal, Production, Symbol};
use crate::lexer::{Lexer, LexerLimits};
use crate::lr::{can_merge_lalr, CompressedLrState, LrItem};
use crate::parser::{ParseError, ParserLimits};
use crate::table::TableBuilder;
use crate::token::{Position, TokenKind};
use std::collections::BTreeSet;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn engine() -> ParserEngine {
    ParserEngine::new().expect("formula grammar must build")
}

fn num(n: f64) -> Expr {
    Expr::Literal(Value::Number(n))
}

fn var(name: &str) -> Expr {
    Expr::Variable(name.to_string())
}

fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

// ========================================
// LEXER TESTS
// ========================================

#[test]
fn lexer_tokenizes_simple_math() {
    let tokens = Lexer::new("1 + 2").tokenize().unwrap();
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Number,
            TokenKind::Plus,
            TokenKind::Number,
            TokenKind::Eof
        ]
    );
    assert_eq!(tokens[0].text, "1");
    assert_eq!(tokens[2].text, "2");
}

#[test]
fn lexer_tokenizes_comparison_operators() {
    let tokens = Lexer::new("< > <= >= != <> = ==").tokenize().unwrap();
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Less,
            TokenKind::Greater,
            TokenKind::LessEq,
            TokenKind::GreaterEq,
            TokenKind::NotEq,
            TokenKind::NotEq,
            TokenKind::Eq,
            TokenKind::Eq,
            TokenKind::Eof
        ]
    );
}

#[test]
fn lexer_tokenizes_logical_operators_and_booleans() {
    let tokens = Lexer::new("true && FALSE || x").tokenize().unwrap();
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Boolean,
            TokenKind::AndAnd,
            TokenKind::Boolean,
            TokenKind::OrOr,
            TokenKind::Identifier,
            TokenKind::Eof
        ]
    );
    assert_eq!(tokens[0].boolean_value(), Some(true));
    assert_eq!(tokens[2].boolean_value(), Some(false));
}

#[test]
fn lexer_tokenizes_numbers_with_exponents() {
    let tokens = Lexer::new("3.14 1e3 2.5E-2").tokenize().unwrap();
    assert_eq!(tokens[0].number_value(), Some(3.14));
    assert_eq!(tokens[1].number_value(), Some(1000.0));
    assert_eq!(tokens[2].number_value(), Some(0.025));
}

#[test]
fn lexer_rejects_malformed_numbers() {
    assert!(matches!(
        Lexer::new("1.").tokenize(),
        Err(crate::lexer::LexError::InvalidNumberFormat { .. })
    ));
    assert!(matches!(
        Lexer::new("1e+").tokenize(),
        Err(crate::lexer::LexError::InvalidNumberFormat { .. })
    ));
    assert!(matches!(
        Lexer::new("1.2.3").tokenize(),
        Err(crate::lexer::LexError::InvalidNumberFormat { .. })
    ));
}

#[test]
fn lexer_tokenizes_delimited_variables() {
    let tokens = Lexer::new("${math_score} + 1").tokenize().unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Identifier);
    assert_eq!(tokens[0].text, "${math_score}");
    assert_eq!(tokens[0].identifier_name(), Some("math_score"));
}

#[test]
fn lexer_rejects_unclosed_delimited_variable() {
    assert!(matches!(
        Lexer::new("${score").tokenize(),
        Err(crate::lexer::LexError::UnclosedVariable { .. })
    ));
    assert!(matches!(
        Lexer::new("${}").tokenize(),
        Err(crate::lexer::LexError::UnclosedVariable { .. })
    ));
}

#[test]
fn lexer_rejects_lone_ampersand_and_bang() {
    assert!(matches!(
        Lexer::new("a & b").tokenize(),
        Err(crate::lexer::LexError::InvalidTokenSequence { text, .. }) if text == "&"
    ));
    assert!(matches!(
        Lexer::new("!a").tokenize(),
        Err(crate::lexer::LexError::InvalidTokenSequence { text, .. }) if text == "!"
    ));
}

#[test]
fn lexer_rejects_unexpected_characters() {
    let err = Lexer::new("1 + #").tokenize().unwrap_err();
    match err {
        crate::lexer::LexError::UnexpectedCharacter { text, position } => {
            assert_eq!(text, "#");
            assert_eq!(position.column, 5);
        }
        other => panic!("expected UnexpectedCharacter, got {:?}", other),
    }
}

#[test]
fn lexer_tracks_line_and_column() {
    let tokens = Lexer::new("a +\nbb").tokenize().unwrap();
    assert_eq!(
        tokens[0].position,
        Position {
            index: 0,
            line: 1,
            column: 1
        }
    );
    assert_eq!(
        tokens[1].position,
        Position {
            index: 2,
            line: 1,
            column: 3
        }
    );
    assert_eq!(
        tokens[2].position,
        Position {
            index: 4,
            line: 2,
            column: 1
        }
    );
}

#[test]
fn lexer_enforces_input_length_limit() {
    let limits = LexerLimits {
        max_length: 5,
        max_tokens: 100,
    };
    let result = Lexer::with_limits("1 + 2 + 3", limits).tokenize();
    assert!(matches!(
        result,
        Err(crate::lexer::LexError::TooLarge { limit: 5, .. })
    ));
}

#[test]
fn lexer_enforces_token_count_limit() {
    let limits = LexerLimits {
        max_length: 1_000,
        max_tokens: 3,
    };
    let result = Lexer::with_limits("1 + 2 + 3", limits).tokenize();
    assert!(matches!(
        result,
        Err(crate::lexer::LexError::TooLarge { limit: 3, .. })
    ));
}

#[test]
fn lexer_round_trips_raw_text() {
    // Concatenating the raw lexemes reproduces the input minus whitespace.
    let input = "IF(${raw_score} >= 2.5e1, \"pa ss\", total % 7) && true";
    // The space inside the string literal stays inside the token.
    let tokens = Lexer::new(input).tokenize().unwrap();
    let rebuilt: String = tokens.iter().map(|t| t.text.as_str()).collect();
    let squeezed: String = {
        // Whitespace inside string/variable tokens is preserved; only the
        // whitespace the lexer skipped between tokens is removed.
        let mut out = String::new();
        let mut inside = None;
        for ch in input.chars() {
            match (inside, ch) {
                (None, '"') => {
                    inside = Some('"');
                    out.push(ch);
                }
                (Some('"'), '"') => {
                    inside = None;
                    out.push(ch);
                }
                (None, '$') => {
                    inside = Some('}');
                    out.push(ch);
                }
                (Some('}'), '}') => {
                    inside = None;
                    out.push(ch);
                }
                (None, c) if c.is_whitespace() => {}
                (_, c) => out.push(c),
            }
        }
        out
    };
    assert_eq!(rebuilt, squeezed);
}

// ========================================
// GRAMMAR TESTS
// ========================================

#[test]
fn grammar_builds_and_exposes_queries() {
    let grammar = Grammar::formula().unwrap();
    assert_eq!(grammar.start_symbol(), NonTerminal::Expr);
    assert_eq!(grammar.augmented_production().id, 0);
    assert!(grammar.epsilon_productions().is_empty());

    let add_rules = grammar.productions_for(NonTerminal::Add);
    assert_eq!(add_rules.len(), 3);

    // Every left-associative operator tier is expressed left-recursively.
    let left_recursive = grammar.left_recursive_productions();
    assert!(left_recursive.iter().any(|p| p.lhs == NonTerminal::Add));
    assert!(left_recursive.iter().any(|p| p.lhs == NonTerminal::Mul));
    assert!(left_recursive.iter().any(|p| p.lhs == NonTerminal::Args));
    assert!(!left_recursive.iter().any(|p| p.lhs == NonTerminal::Unary));
}

#[test]
fn grammar_rejects_undeclared_symbols() {
    // Expr is used on a RHS but has no productions.
    let productions = vec![
        Production {
            id: 0,
            lhs: NonTerminal::Start,
            rhs: vec![Symbol::NonTerminal(NonTerminal::Expr)],
        },
        Production {
            id: 1,
            lhs: NonTerminal::Add,
            rhs: vec![Symbol::Terminal(TokenKind::Number)],
        },
    ];
    let result = Grammar::new(
        productions,
        vec![TokenKind::Number, TokenKind::Eof],
        vec![NonTerminal::Start, NonTerminal::Expr, NonTerminal::Add],
        NonTerminal::Expr,
    );
    assert!(matches!(result, Err(GrammarError::InvalidGrammar(_))));
}

#[test]
fn grammar_rejects_nonterminal_start_missing() {
    let productions = vec![Production {
        id: 0,
        lhs: NonTerminal::Start,
        rhs: vec![Symbol::NonTerminal(NonTerminal::Expr)],
    }];
    let result = Grammar::new(
        productions,
        vec![TokenKind::Eof],
        vec![NonTerminal::Start],
        NonTerminal::Expr,
    );
    assert!(matches!(result, Err(GrammarError::InvalidGrammar(_))));
}

// ========================================
// LR ITEM / LALR MERGE TESTS
// ========================================

/// A two-production grammar whose complete items share a core shape:
///   0: Start -> Expr
///   1: Expr -> NUMBER
///   2: Expr -> IDENTIFIER
fn tiny_grammar() -> Grammar {
    Grammar::new(
        vec![
            Production {
                id: 0,
                lhs: NonTerminal::Start,
                rhs: vec![Symbol::NonTerminal(NonTerminal::Expr)],
            },
            Production {
                id: 1,
                lhs: NonTerminal::Expr,
                rhs: vec![Symbol::Terminal(TokenKind::Number)],
            },
            Production {
                id: 2,
                lhs: NonTerminal::Expr,
                rhs: vec![Symbol::Terminal(TokenKind::Identifier)],
            },
        ],
        vec![TokenKind::Number, TokenKind::Identifier, TokenKind::Eof],
        vec![NonTerminal::Start, NonTerminal::Expr],
        NonTerminal::Expr,
    )
    .unwrap()
}

#[test]
fn lr_item_core_strips_lookahead() {
    let a = LrItem::new(3, 1, TokenKind::Plus);
    let b = LrItem::new(3, 1, TokenKind::Eof);
    assert_eq!(a.core(), b.core());
    assert_ne!(a, b);
}

#[test]
fn compressed_state_signature_is_deterministic() {
    let items: BTreeSet<LrItem> = [
        LrItem::new(2, 1, TokenKind::Eof),
        LrItem::new(1, 0, TokenKind::Plus),
        LrItem::new(1, 0, TokenKind::Eof),
    ]
    .into_iter()
    .collect();
    let a = CompressedLrState::from_items(0, &items).unwrap();
    let b = CompressedLrState::from_items(7, &items).unwrap();
    assert_eq!(a.signature, b.signature);
    assert_eq!(a.signature, "1.0;2.1");
    assert!(!a.fully_built);
}

#[test]
fn compressed_state_rejects_empty_item_set() {
    let result = CompressedLrState::from_items(4, &BTreeSet::new());
    assert!(matches!(result, Err(GrammarError::EmptyCoreItems(4))));
}

#[test]
fn lalr_merge_allows_disjoint_lookaheads() {
    let grammar = tiny_grammar();
    // Both states reduce production 1 and 2, but never on the same
    // lookahead even after merging.
    let a: BTreeSet<LrItem> = [
        LrItem::new(1, 1, TokenKind::Eof),
        LrItem::new(2, 1, TokenKind::Comma),
    ]
    .into_iter()
    .collect();
    let b: BTreeSet<LrItem> = [
        LrItem::new(1, 1, TokenKind::RParen),
        LrItem::new(2, 1, TokenKind::Plus),
    ]
    .into_iter()
    .collect();
    assert!(can_merge_lalr(&grammar, &a, &b));
}

#[test]
fn lalr_merge_rejects_introduced_reduce_reduce_conflict() {
    let grammar = tiny_grammar();
    // Each state alone is conflict-free, but the union reduces both
    // production 1 and production 2 on EOF.
    let a: BTreeSet<LrItem> = [
        LrItem::new(1, 1, TokenKind::Eof),
        LrItem::new(2, 1, TokenKind::Comma),
    ]
    .into_iter()
    .collect();
    let b: BTreeSet<LrItem> = [
        LrItem::new(1, 1, TokenKind::Comma),
        LrItem::new(2, 1, TokenKind::Eof),
    ]
    .into_iter()
    .collect();
    assert!(!can_merge_lalr(&grammar, &a, &b));
}

#[test]
fn lalr_merge_tolerates_preexisting_conflict() {
    let grammar = tiny_grammar();
    // The reduce/reduce conflict on EOF already exists in state `a`, so
    // merging does not introduce anything new.
    let a: BTreeSet<LrItem> = [
        LrItem::new(1, 1, TokenKind::Eof),
        LrItem::new(2, 1, TokenKind::Eof),
    ]
    .into_iter()
    .collect();
    let b: BTreeSet<LrItem> = [
        LrItem::new(1, 1, TokenKind::Eof),
        LrItem::new(2, 1, TokenKind::Comma),
    ]
    .into_iter()
    .collect();
    assert!(can_merge_lalr(&grammar, &a, &b));
}

#[test]
fn lalr_merge_requires_identical_cores() {
    let grammar = tiny_grammar();
    let a: BTreeSet<LrItem> = [LrItem::new(1, 1, TokenKind::Eof)].into_iter().collect();
    let b: BTreeSet<LrItem> = [LrItem::new(2, 1, TokenKind::Eof)].into_iter().collect();
    assert!(!can_merge_lalr(&grammar, &a, &b));
}

// ========================================
// TABLE BUILDER TESTS
// ========================================

#[test]
fn table_builds_for_formula_grammar() {
    init_logging();
    let grammar = Grammar::formula().unwrap();
    let table = TableBuilder::new(&grammar).build().unwrap();
    assert!(table.state_count() > 0);
    // State 0 must at least shift the atoms and unary minus.
    let expected = table.expected_terminals(0);
    assert!(expected.contains(&TokenKind::Number));
    assert!(expected.contains(&TokenKind::Identifier));
    assert!(expected.contains(&TokenKind::Minus));
    assert!(expected.contains(&TokenKind::LParen));
}

#[test]
fn table_construction_is_idempotent() {
    let grammar = Grammar::formula().unwrap();
    let first = TableBuilder::new(&grammar).build().unwrap();
    let second = TableBuilder::new(&grammar).build().unwrap();
    assert_eq!(first, second);
}

#[test]
fn table_reports_conflicts_for_ambiguous_grammar() {
    init_logging();
    // Expr -> Expr + Expr | NUMBER is ambiguous: classic shift/reduce.
    let grammar = Grammar::new(
        vec![
            Production {
                id: 0,
                lhs: NonTerminal::Start,
                rhs: vec![Symbol::NonTerminal(NonTerminal::Expr)],
            },
            Production {
                id: 1,
                lhs: NonTerminal::Expr,
                rhs: vec![
                    Symbol::NonTerminal(NonTerminal::Expr),
                    Symbol::Terminal(TokenKind::Plus),
                    Symbol::NonTerminal(NonTerminal::Expr),
                ],
            },
            Production {
                id: 2,
                lhs: NonTerminal::Expr,
                rhs: vec![Symbol::Terminal(TokenKind::Number)],
            },
        ],
        vec![TokenKind::Plus, TokenKind::Number, TokenKind::Eof],
        vec![NonTerminal::Start, NonTerminal::Expr],
        NonTerminal::Expr,
    )
    .unwrap();

    match TableBuilder::new(&grammar).build() {
        Err(GrammarError::Conflicts(conflicts)) => {
            assert!(!conflicts.is_empty());
            assert!(conflicts.iter().any(|c| c.terminal == TokenKind::Plus));
        }
        other => panic!("expected conflicts, got {:?}", other.map(|t| t.state_count())),
    }
}

#[test]
fn table_accepts_unambiguous_left_recursive_grammar() {
    // Expr -> Expr + NUMBER | NUMBER is LALR(1).
    let grammar = Grammar::new(
        vec![
            Production {
                id: 0,
                lhs: NonTerminal::Start,
                rhs: vec![Symbol::NonTerminal(NonTerminal::Expr)],
            },
            Production {
                id: 1,
                lhs: NonTerminal::Expr,
                rhs: vec![
                    Symbol::NonTerminal(NonTerminal::Expr),
                    Symbol::Terminal(TokenKind::Plus),
                    Symbol::Terminal(TokenKind::Number),
                ],
            },
            Production {
                id: 2,
                lhs: NonTerminal::Expr,
                rhs: vec![Symbol::Terminal(TokenKind::Number)],
            },
        ],
        vec![TokenKind::Plus, TokenKind::Number, TokenKind::Eof],
        vec![NonTerminal::Start, NonTerminal::Expr],
        NonTerminal::Expr,
    )
    .unwrap();
    assert!(TableBuilder::new(&grammar).build().is_ok());
}

// ========================================
// PARSER TESTS - LITERALS AND VARIABLES
// ========================================

#[test]
fn parser_parses_number_literal() {
    assert_eq!(engine().parse("42").unwrap(), num(42.0));
}

#[test]
fn parser_parses_decimal_number() {
    assert_eq!(engine().parse("3.14159").unwrap(), num(3.14159));
}

#[test]
fn parser_parses_string_literal() {
    assert_eq!(
        engine().parse("\"Hello World\"").unwrap(),
        Expr::Literal(Value::String("Hello World".to_string()))
    );
}

#[test]
fn parser_parses_boolean_literals() {
    assert_eq!(
        engine().parse("true").unwrap(),
        Expr::Literal(Value::Boolean(true))
    );
    assert_eq!(
        engine().parse("FALSE").unwrap(),
        Expr::Literal(Value::Boolean(false))
    );
}

#[test]
fn parser_parses_variables_plain_and_delimited() {
    let e = engine();
    assert_eq!(e.parse("score").unwrap(), var("score"));
    assert_eq!(e.parse("${final_score}").unwrap(), var("final_score"));
}

// ========================================
// PARSER TESTS - PRECEDENCE AND GROUPING
// ========================================

#[test]
fn parser_groups_multiplication_before_addition() {
    // 2 + 3 * 4 parses as 2 + (3 * 4), purely from production shape.
    let expected = binary(
        num(2.0),
        BinaryOperator::Add,
        binary(num(3.0), BinaryOperator::Multiply, num(4.0)),
    );
    assert_eq!(engine().parse("2 + 3 * 4").unwrap(), expected);
}

#[test]
fn parser_groups_left_associative_subtraction() {
    // 10 - 4 - 3 parses as (10 - 4) - 3.
    let expected = binary(
        binary(num(10.0), BinaryOperator::Subtract, num(4.0)),
        BinaryOperator::Subtract,
        num(3.0),
    );
    assert_eq!(engine().parse("10 - 4 - 3").unwrap(), expected);
}

#[test]
fn parser_groups_power_right_associatively() {
    // 2 ^ 3 ^ 2 parses as 2 ^ (3 ^ 2).
    let expected = binary(
        num(2.0),
        BinaryOperator::Power,
        binary(num(3.0), BinaryOperator::Power, num(2.0)),
    );
    assert_eq!(engine().parse("2 ^ 3 ^ 2").unwrap(), expected);
}

#[test]
fn parser_parses_parenthesized_expression() {
    let expected = binary(
        binary(var("x"), BinaryOperator::Add, num(1.0)),
        BinaryOperator::Multiply,
        num(2.0),
    );
    assert_eq!(engine().parse("(x + 1) * 2").unwrap(), expected);
}

#[test]
fn parser_parses_unary_negation() {
    let expected = Expr::UnaryOp {
        op: UnaryOperator::Negate,
        operand: Box::new(var("x")),
    };
    assert_eq!(engine().parse("-x").unwrap(), expected);

    // Double negation nests.
    let expected = Expr::UnaryOp {
        op: UnaryOperator::Negate,
        operand: Box::new(Expr::UnaryOp {
            op: UnaryOperator::Negate,
            operand: Box::new(num(5.0)),
        }),
    };
    assert_eq!(engine().parse("--5").unwrap(), expected);
}

#[test]
fn parser_groups_comparison_below_arithmetic() {
    // a + 1 > b * 2 parses as (a + 1) > (b * 2).
    let expected = binary(
        binary(var("a"), BinaryOperator::Add, num(1.0)),
        BinaryOperator::GreaterThan,
        binary(var("b"), BinaryOperator::Multiply, num(2.0)),
    );
    assert_eq!(engine().parse("a + 1 > b * 2").unwrap(), expected);
}

#[test]
fn parser_groups_logical_operators_lowest() {
    // a > 1 && b < 2 || c = 3 parses as ((a>1) && (b<2)) || (c=3).
    let expected = binary(
        binary(
            binary(var("a"), BinaryOperator::GreaterThan, num(1.0)),
            BinaryOperator::And,
            binary(var("b"), BinaryOperator::LessThan, num(2.0)),
        ),
        BinaryOperator::Or,
        binary(var("c"), BinaryOperator::Equal, num(3.0)),
    );
    assert_eq!(engine().parse("a > 1 && b < 2 || c = 3").unwrap(), expected);
}

// ========================================
// PARSER TESTS - FUNCTION CALLS
// ========================================

#[test]
fn parser_parses_function_call_with_arguments() {
    let expected = Expr::FunctionCall {
        name: "MIN".to_string(),
        args: vec![var("a"), num(10.0)],
    };
    assert_eq!(engine().parse("MIN(a, 10)").unwrap(), expected);
}

#[test]
fn parser_parses_function_call_without_arguments() {
    let expected = Expr::FunctionCall {
        name: "PI".to_string(),
        args: vec![],
    };
    assert_eq!(engine().parse("PI()").unwrap(), expected);
}

#[test]
fn parser_parses_nested_function_calls() {
    let expected = Expr::FunctionCall {
        name: "MAX".to_string(),
        args: vec![
            Expr::FunctionCall {
                name: "MIN".to_string(),
                args: vec![var("a"), var("b")],
            },
            num(0.0),
        ],
    };
    assert_eq!(engine().parse("MAX(MIN(a, b), 0)").unwrap(), expected);
}

// ========================================
// PARSER TESTS - ERRORS AND GUARDS
// ========================================

#[test]
fn parser_rejects_trailing_tokens() {
    let err = engine().parse("1 + 2 3").unwrap_err();
    assert!(matches!(err, ParseError::UnexpectedToken { .. }));
}

#[test]
fn parser_rejects_missing_operand() {
    let err = engine().parse("1 +").unwrap_err();
    match err {
        ParseError::UnexpectedToken { text, expected, .. } => {
            assert_eq!(text, "end of input");
            assert!(expected.contains("NUMBER"));
        }
        other => panic!("expected UnexpectedToken, got {:?}", other),
    }
}

#[test]
fn parser_rejects_unbalanced_parenthesis() {
    let err = engine().parse("(1 + 2").unwrap_err();
    assert!(matches!(err, ParseError::UnexpectedToken { .. }));
}

#[test]
fn parser_reports_error_position() {
    let err = engine().parse("1 + , 2").unwrap_err();
    match err {
        ParseError::UnexpectedToken { text, position, .. } => {
            assert_eq!(text, ",");
            assert_eq!(position.column, 5);
        }
        other => panic!("expected UnexpectedToken, got {:?}", other),
    }
}

#[test]
fn parser_enforces_stack_depth_limit() {
    let limits = ParserLimits {
        max_stack_depth: 16,
        max_steps: 100_000,
    };
    let e = ParserEngine::with_limits(LexerLimits::default(), limits).unwrap();
    let deep = format!("{}1{}", "(".repeat(50), ")".repeat(50));
    assert!(matches!(
        e.parse(&deep),
        Err(ParseError::TooDeep { limit: 16 })
    ));
}

#[test]
fn parser_enforces_step_limit() {
    let limits = ParserLimits {
        max_stack_depth: 1_000,
        max_steps: 10,
    };
    let e = ParserEngine::with_limits(LexerLimits::default(), limits).unwrap();
    assert!(matches!(
        e.parse("1 + 2 + 3 + 4 + 5"),
        Err(ParseError::TooManySteps { limit: 10 })
    ));
}

#[test]
fn parser_is_deterministic() {
    let e = engine();
    let input = "IF(a >= 60 && b != 0, a / b, -1) * 100";
    let first = e.parse(input).unwrap();
    let second = e.parse(input).unwrap();
    assert_eq!(first, second);
}

// ========================================
// BUILDER REGISTRY TESTS
// ========================================

#[test]
fn registry_is_total_over_formula_grammar() {
    let grammar = Grammar::formula().unwrap();
    let registry = BuilderRegistry::for_formula_grammar(&grammar).unwrap();
    for production in grammar.productions() {
        assert!(registry.builder(production.id).is_some());
    }
}

#[test]
fn registry_rejects_partial_builder_table() {
    let grammar = Grammar::formula().unwrap();
    let result = BuilderRegistry::new(&grammar, vec![NodeBuilder::Passthrough]);
    assert!(matches!(result, Err(GrammarError::InvalidGrammar(_))));
}

#[test]
fn builder_rejects_wrong_child_count() {
    let result = NodeBuilder::Binary.build(12, 3, vec![ChildNode::Node(num(1.0))]);
    assert!(matches!(
        result,
        Err(BuildError::ChildCountMismatch {
            production: 12,
            expected: 3,
            actual: 1
        })
    ));
}

#[test]
fn builder_rejects_wrong_child_type() {
    let result = NodeBuilder::UnaryNegate.build(
        19,
        2,
        vec![ChildNode::Node(num(1.0)), ChildNode::List(vec![])],
    );
    assert!(matches!(result, Err(BuildError::ChildTypeMismatch { .. })));
}

// ========================================
// AST TESTS
// ========================================

#[test]
fn ast_collects_referenced_variables() {
    let expr = engine().parse("IF(a > b, a, ${c_total}) + a").unwrap();
    let names = expr.variables();
    let expected: BTreeSet<String> = ["a", "b", "c_total"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(names, expected);
}

#[test]
fn ast_display_round_trips_structure() {
    let expr = engine().parse("2 + 3 * 4").unwrap();
    assert_eq!(expr.to_string(), "(2 + (3 * 4))");
}
