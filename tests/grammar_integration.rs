//! Integration tests for grammar construction, text form and analysis

use lakepeg::peg::builder::*;
use lakepeg::peg::{loader, GrammarAnalyzer, WarningKind};
use lakepeg::{compute_alt, compute_beginning, compute_succeed, Expr, GrammarError, Marker, Mode};

const ARITHMETIC: &str = "\
%top sum
sum <- sum '+' prod / sum '-' prod / prod
prod <- prod '*' atom / atom
atom <- num / '(' sum ')'
num <- [0-9]+
";

#[test]
fn test_loaded_grammar_prints_back() {
    let g = loader::load(ARITHMETIC).unwrap();
    assert_eq!(g.to_peg(), ARITHMETIC);
}

#[test]
fn test_builder_and_loader_agree() {
    let built = GrammarBuilder::new()
        .rule(
            "sum",
            (nt("sum") >> lit("+") >> nt("prod"))
                | (nt("sum") >> lit("-") >> nt("prod"))
                | nt("prod"),
        )
        .rule("prod", (nt("prod") >> lit("*") >> nt("atom")) | nt("atom"))
        .rule("atom", nt("num") | (lit("(") >> nt("sum") >> lit(")")))
        .rule("num", class("0-9").plus())
        .top_level("sum")
        .build()
        .unwrap();
    assert_eq!(built.to_peg(), ARITHMETIC);
}

#[test]
fn test_duplicate_rule_rejected() {
    let err = loader::load("a <- 'x'\na <- 'y'").unwrap_err();
    assert_eq!(
        err,
        GrammarError::DuplicateRule {
            symbol: "a".to_string()
        }
    );
}

#[test]
fn test_invalid_regex_rejected() {
    let err = loader::load("a <- `[unclosed`").unwrap_err();
    assert!(matches!(err, GrammarError::InvalidPattern { .. }));
}

#[test]
fn test_left_recursion_report() {
    let g = loader::load(ARITHMETIC).unwrap();
    let analyzer = GrammarAnalyzer::new(&g);
    let recursive: Vec<&str> = analyzer
        .left_recursive_rules()
        .into_iter()
        .map(|r| g.rule(r).symbol.as_str())
        .collect();
    assert_eq!(recursive, vec!["sum", "prod"]);

    let warnings = analyzer.analyze();
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().all(|w| w.kind == WarningKind::LeftRecursion));
    assert!(warnings[0].message.contains("'sum' is left recursive"));
}

#[test]
fn test_rule_graph_puts_leaves_first() {
    let g = loader::load(ARITHMETIC).unwrap();
    let graph = GrammarAnalyzer::new(&g).graph();
    let num = g.rule_by_symbol("num").unwrap();
    let sum = g.rule_by_symbol("sum").unwrap();
    assert!(graph.rank(num) < graph.rank(sum));
    assert!(graph.is_bottom(num));
    assert!(!graph.is_bottom(sum));
}

#[test]
fn test_set_entry_points() {
    let g = loader::load("s <- a? 'x' / 'y'\na <- 'a'").unwrap();
    let beginning = compute_beginning(&g, Mode::Ordinary);
    let succeed = compute_succeed(&g, &beginning, Mode::Ordinary);
    let alt = compute_alt(&g, &beginning, &succeed, Mode::Ordinary);

    let terminal = |source: &str| {
        g.exprs()
            .find(|(_, e)| matches!(e, Expr::Terminal { source: s, .. } if s == source))
            .map(|(id, _)| id)
            .unwrap()
    };
    let a_ref = g
        .exprs()
        .find(|(_, e)| matches!(e, Expr::Nonterminal { symbol, .. } if symbol == "a"))
        .map(|(id, _)| id)
        .unwrap();

    let s_rhs = g.rule(g.rule_by_symbol("s").unwrap()).rhs;
    let start = beginning.get(s_rhs);
    assert!(start.contains(&Marker::Symbol(a_ref)));
    assert!(start.contains(&Marker::Symbol(terminal("'x'"))));
    assert!(start.contains(&Marker::Symbol(terminal("'y'"))));
    assert!(!beginning.nullable(s_rhs));

    // after `a` comes 'x'; ordered choice would otherwise try 'y'
    assert!(succeed
        .get(a_ref)
        .contains(&Marker::Symbol(terminal("'x'"))));
    assert!(alt.get(a_ref).contains(&Marker::Symbol(terminal("'x'"))));
}
