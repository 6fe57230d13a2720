//! Integration tests for the three evaluation strategies
//!
//! Every test runs the same grammar and input through packrat, bottom-up
//! and pika evaluation and checks that they agree. The areas covered are:
//! - Terminals, sequences and ordered choice
//! - Repetition and lookahead
//! - Direct and indirect left recursion
//! - Terminals that match the empty string
//! - Back-references and colon constraints
//! - Failure diagnostics

use lakepeg::peg::loader;
use lakepeg::{Grammar, NodeKind, ParseError, ParseTree, Parser, Strategy};

fn grammar(text: &str) -> Grammar {
    loader::load(text).expect("grammar should load")
}

fn parse_all(grammar: &Grammar, input: &str) -> Vec<Result<ParseTree, ParseError>> {
    Strategy::ALL
        .iter()
        .map(|&strategy| Parser::new(grammar).with_strategy(strategy).parse(input, None))
        .collect()
}

fn texts(tree: &ParseTree, symbol: &str) -> Vec<String> {
    tree.find_all(symbol)
        .into_iter()
        .map(|id| tree.text(id).to_string())
        .collect()
}

// ============================================================================
// Terminals and Combinators
// ============================================================================

#[test]
fn test_literal_match() {
    let g = grammar("s <- 'hello'");
    for result in parse_all(&g, "hello") {
        let tree = result.expect("should parse 'hello'");
        assert_eq!(tree.text(tree.root()), "hello");
    }
}

#[test]
fn test_literal_no_match() {
    let g = grammar("s <- 'hello'");
    for result in parse_all(&g, "world") {
        assert!(matches!(result, Err(ParseError::Failed(_))));
    }
}

#[test]
fn test_sequence_and_choice() {
    let g = grammar("s <- greeting ' ' name\ngreeting <- 'hi' / 'hello'\nname <- [a-z]+");
    for result in parse_all(&g, "hello bob") {
        let tree = result.expect("should parse");
        assert_eq!(texts(&tree, "greeting"), vec!["hello"]);
        assert_eq!(texts(&tree, "name"), vec!["bob"]);
    }
}

#[test]
fn test_choice_is_ordered() {
    // 'a' wins over 'ab', so nothing is left for 'b'
    let g = grammar("s <- ('a' / 'ab') 'c'");
    for result in parse_all(&g, "abc") {
        assert!(result.is_err());
    }
    for result in parse_all(&g, "ac") {
        assert!(result.is_ok());
    }
}

#[test]
fn test_choice_index_recorded() {
    let g = grammar("s <- 'x' / 'y' / 'z'");
    for result in parse_all(&g, "z") {
        let tree = result.expect("should parse");
        let indexes: Vec<usize> = tree
            .preorder()
            .filter_map(|id| match tree.node(id).kind {
                NodeKind::OrderedChoice { index } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(indexes, vec![2]);
    }
}

#[test]
fn test_repetition() {
    let g = grammar("list <- item (',' item)*\nitem <- [0-9]+");
    for result in parse_all(&g, "1,22,333") {
        let tree = result.expect("should parse");
        assert_eq!(texts(&tree, "item"), vec!["1", "22", "333"]);
    }
}

#[test]
fn test_one_or_more_requires_one() {
    let g = grammar("s <- 'a'+");
    for result in parse_all(&g, "") {
        assert!(matches!(result, Err(ParseError::Failed(_))));
    }
    for result in parse_all(&g, "aaa") {
        assert!(result.is_ok());
    }
}

#[test]
fn test_optional_and_empty_input() {
    let g = grammar("s <- 'a'?");
    for result in parse_all(&g, "") {
        let tree = result.expect("empty input should parse");
        assert!(tree.node(tree.root()).range.is_empty());
    }
}

#[test]
fn test_lookahead() {
    let g = grammar("s <- !'-' [a-z-]+ &'!' '!'");
    for result in parse_all(&g, "ab-c!") {
        assert!(result.is_ok());
    }
    for result in parse_all(&g, "-ab!") {
        assert!(result.is_err());
    }
}

#[test]
fn test_multibyte_input() {
    let g = grammar("s <- word (' ' word)*\nword <- [^ ]+");
    for result in parse_all(&g, "naïve café ☕") {
        let tree = result.expect("should parse");
        assert_eq!(texts(&tree, "word"), vec!["naïve", "café", "☕"]);
    }
}

// ============================================================================
// Left Recursion
// ============================================================================

#[test]
fn test_direct_left_recursion_is_left_associative() {
    let g = grammar("expr <- expr '-' num / num\nnum <- [0-9]+");
    for result in parse_all(&g, "1-2-3") {
        let tree = result.expect("should parse");
        assert_eq!(texts(&tree, "expr"), vec!["1-2-3", "1-2", "1"]);
    }
}

#[test]
fn test_indirect_left_recursion() {
    let g = grammar("x <- y 'b' / 'a'\ny <- x");
    for result in parse_all(&g, "abbb") {
        let tree = result.expect("should parse");
        assert_eq!(texts(&tree, "x"), vec!["abbb", "abb", "ab", "a"]);
    }
}

#[test]
fn test_left_recursion_with_precedence_levels() {
    let g = grammar(
        "sum <- sum '+' prod / prod\nprod <- prod '*' atom / atom\natom <- [0-9] / '(' sum ')'",
    );
    for result in parse_all(&g, "1+2*3+(4+5)*6") {
        let tree = result.expect("should parse");
        assert_eq!(tree.text(tree.root()), "1+2*3+(4+5)*6");
        let products = texts(&tree, "prod");
        assert!(products.contains(&"2*3".to_string()));
        assert!(products.contains(&"(4+5)*6".to_string()));
    }
}

#[test]
fn test_left_recursion_through_choice_in_another_rule() {
    let g = grammar(
        "x <- expr '[' number ']' / expr\nexpr <- x '-' number / number\nnumber <- [0-9]+",
    );
    for input in ["1-1[2]-1", "1[2]-1-1", "7"] {
        for result in parse_all(&g, input) {
            let tree = result.expect("should parse");
            assert_eq!(tree.text(tree.root()), input);
        }
    }
    for result in parse_all(&g, "1-1[2") {
        assert!(result.is_err());
    }
}

#[test]
fn test_leading_empty_matching_terminal() {
    let g = grammar("s <- ws t\nws <- `[ ]*`\nt <- 'b'");
    for input in ["b", "  b"] {
        for result in parse_all(&g, input) {
            let tree = result.expect("should parse");
            assert_eq!(texts(&tree, "t"), vec!["b"]);
        }
    }
}

// ============================================================================
// Back-references and Constraints
// ============================================================================

#[test]
fn test_back_reference() {
    let g = grammar("tag <- '<' n@name '>' [a-z ]* '</' n@name '>'\nname <- [a-z]+");
    for result in parse_all(&g, "<b>bold text</b>") {
        assert!(result.is_ok());
    }
    for result in parse_all(&g, "<b>bold text</i>") {
        assert!(result.is_err());
    }
}

#[test]
fn test_back_reference_inside_choice() {
    let g = grammar("s <- x@w ' ' (x@w / w '!')\nw <- [a-z]+");
    for input in ["abc abc", "abc abd!"] {
        for result in parse_all(&g, input) {
            assert!(result.is_ok(), "{:?} should parse", input);
        }
    }
    for result in parse_all(&g, "abc abd") {
        assert!(result.is_err());
    }
}

#[test]
fn test_adjacent_back_reference_needs_a_separator() {
    // the first [a-z]+ takes every letter, leaving nothing for the second
    let g = grammar("program <- name@ID name@ID\nID <- [a-z]+");
    for input in ["abcabc", "abcxyz"] {
        for result in parse_all(&g, input) {
            assert!(result.is_err(), "{:?} should fail", input);
        }
    }

    let g = grammar("program <- name@ID ' ' name@ID\nID <- [a-z]+");
    for result in parse_all(&g, "abc abc") {
        assert!(result.is_ok());
    }
    for result in parse_all(&g, "abc xyz") {
        assert!(result.is_err());
    }
}

#[test]
fn test_colon_constraint() {
    // an identifier that is also a keyword
    let g = grammar("s <- kw:[a-z]+\nkw <- 'if' / 'else'");
    for result in parse_all(&g, "else") {
        assert!(result.is_ok());
    }
    for result in parse_all(&g, "elsewhere") {
        assert!(result.is_err());
    }
}

#[test]
fn test_colon_not_constraint() {
    // an identifier that is not a keyword
    let g = grammar("s <- kw:![a-z]+\nkw <- 'if' / 'else'");
    for result in parse_all(&g, "elsewhere") {
        assert!(result.is_ok());
    }
    for result in parse_all(&g, "if") {
        assert!(result.is_err());
    }
}

// ============================================================================
// Rewriting
// ============================================================================

#[test]
fn test_rewriting_output() {
    let g = grammar("s <- (word / ' ')*\nword <- [a-z]+ -> '<$0>'");
    for result in parse_all(&g, "ab cd") {
        let tree = result.expect("should parse");
        assert_eq!(tree.rewritten(), "<ab> <cd>");
    }
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_failure_diagnostic_points_at_deepest_offset() {
    let g = grammar("expr <- expr '-' num / num\nnum <- [0-9]");
    for result in parse_all(&g, "1-x") {
        let err = result.expect_err("should fail");
        let diagnostic = err.diagnostic().expect("failure has a diagnostic");
        assert_eq!(diagnostic.offset, 2);
        assert_eq!(diagnostic.position.column, 3);
        assert!(diagnostic.expected.iter().any(|e| e == "[0-9]"));
    }
}

#[test]
fn test_incomplete_reports_consumed() {
    let g = grammar("s <- 'a'+");
    for result in parse_all(&g, "aab") {
        match result {
            Err(ParseError::Incomplete {
                consumed,
                diagnostic,
            }) => {
                assert_eq!(consumed, 2);
                assert!(diagnostic.offset >= 2);
            }
            other => panic!("expected Incomplete, got {:?}", other),
        }
    }
}

#[test]
fn test_unknown_start_symbol() {
    let g = grammar("s <- 'a'");
    let err = Parser::new(&g).parse("a", Some("nope")).unwrap_err();
    assert!(matches!(err, ParseError::InvalidGrammar { .. }));
}

#[test]
fn test_explicit_start_symbol() {
    let g = grammar("s <- num ',' num\nnum <- [0-9]+");
    for strategy in Strategy::ALL {
        let tree = Parser::new(&g)
            .with_strategy(strategy)
            .parse("42", Some("num"))
            .unwrap();
        assert_eq!(tree.symbol_path(tree.root()), vec!["num"]);
    }
}

#[test]
fn test_render_diagnostic() {
    let g = grammar("s <- 'a' 'b'");
    let input = "ac";
    let err = Parser::new(&g).parse(input, None).unwrap_err();
    let rendered = err.diagnostic().unwrap().render(input);
    assert!(rendered.contains("1 | ac"));
    assert!(rendered.contains("'b'"));
}
