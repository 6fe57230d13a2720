//! Grammar builder - assembling grammars in Rust code
//!
//! Patterns are plain values combined with methods (`then`, `or`, `star`,
//! ...) or the `>>` / `|` operators, then registered as rules on a
//! [`GrammarBuilder`]. Rules may reference rules that are defined later;
//! references are fixed up when the grammar is built.
//!
//! # Example
//!
//! ```rust
//! use lakepeg::peg::builder::*;
//!
//! let grammar = GrammarBuilder::new()
//!     .rule("list", lit("[") >> nt("items").opt() >> lit("]"))
//!     .rule("items", nt("item") >> (lit(",") >> nt("item")).star())
//!     .rule("item", class("0-9").plus())
//!     .build()
//!     .unwrap();
//! assert_eq!(grammar.rule_count(), 3);
//! ```

use crate::peg::error::GrammarError;
use crate::peg::grammar::{Expr, ExprId, Grammar};
use crate::peg::printer::quote;
use crate::peg::regex_cache;
use std::ops::{BitOr, Shr};

/// A grammar fragment not yet placed in a grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Rule reference, optionally bound to a name
    Ref {
        /// Rule symbol
        symbol: String,
        /// Back-reference name
        binding: Option<String>,
    },
    /// Regex terminal
    Terminal {
        /// Regex source
        pattern: String,
        /// Grammar-text form
        source: String,
    },
    /// Sequence
    Seq(Vec<Pattern>),
    /// Ordered choice
    Choice(Vec<Pattern>),
    /// `p*`
    Star(Box<Pattern>),
    /// `p+`
    Plus(Box<Pattern>),
    /// `p?`
    Opt(Box<Pattern>),
    /// `&p`
    And(Box<Pattern>),
    /// `!p`
    Not(Box<Pattern>),
    /// `(p)`
    Group(Box<Pattern>),
    /// `p -> 'output'`
    Rewrite(Box<Pattern>, String),
    /// `left:right`
    Colon(Box<Pattern>, Box<Pattern>),
    /// `left:!right`
    ColonNot(Box<Pattern>, Box<Pattern>),
    /// `<<p>>`
    Lake(Box<Pattern>),
}

impl Pattern {
    /// Sequence: `self` then `other`
    pub fn then(self, other: Pattern) -> Pattern {
        match self {
            Pattern::Seq(mut items) => {
                items.push(other);
                Pattern::Seq(items)
            }
            first => Pattern::Seq(vec![first, other]),
        }
    }

    /// Ordered choice: `self`, else `other`
    pub fn or(self, other: Pattern) -> Pattern {
        match self {
            Pattern::Choice(mut alternatives) => {
                alternatives.push(other);
                Pattern::Choice(alternatives)
            }
            first => Pattern::Choice(vec![first, other]),
        }
    }

    /// Zero or more repetitions
    pub fn star(self) -> Pattern {
        Pattern::Star(Box::new(self))
    }

    /// One or more repetitions
    pub fn plus(self) -> Pattern {
        Pattern::Plus(Box::new(self))
    }

    /// Optional
    pub fn opt(self) -> Pattern {
        Pattern::Opt(Box::new(self))
    }

    /// Parenthesize
    pub fn group(self) -> Pattern {
        Pattern::Group(Box::new(self))
    }

    /// Rewrite the matched text as `output` (`$0` stands for the match)
    pub fn rewrite(self, output: &str) -> Pattern {
        Pattern::Rewrite(Box::new(self), output.to_string())
    }
}

impl Shr for Pattern {
    type Output = Pattern;

    fn shr(self, rhs: Pattern) -> Pattern {
        self.then(rhs)
    }
}

impl BitOr for Pattern {
    type Output = Pattern;

    fn bitor(self, rhs: Pattern) -> Pattern {
        self.or(rhs)
    }
}

// ============================================================================
// Constructors
// ============================================================================

/// Reference a rule by symbol
pub fn nt(symbol: &str) -> Pattern {
    Pattern::Ref {
        symbol: symbol.to_string(),
        binding: None,
    }
}

/// Reference a rule and bind the matched text to `name`
///
/// Within one rule body, the first `name@Rule` records the text and every
/// later one must match the same text (surrounding whitespace ignored).
pub fn bind(name: &str, symbol: &str) -> Pattern {
    Pattern::Ref {
        symbol: symbol.to_string(),
        binding: Some(name.to_string()),
    }
}

/// Literal text
pub fn lit(text: &str) -> Pattern {
    Pattern::Terminal {
        pattern: regex::escape(text),
        source: quote(text),
    }
}

/// Regular expression terminal
pub fn re(pattern: &str) -> Pattern {
    Pattern::Terminal {
        pattern: pattern.to_string(),
        source: format!("`{}`", pattern),
    }
}

/// Character class, written without the brackets (`class("a-z")`)
pub fn class(body: &str) -> Pattern {
    let bracketed = format!("[{}]", body);
    Pattern::Terminal {
        pattern: bracketed.clone(),
        source: bracketed,
    }
}

/// Any single character
pub fn any() -> Pattern {
    Pattern::Terminal {
        pattern: ANY_CHAR_PATTERN.to_string(),
        source: ".".to_string(),
    }
}

/// Regex used for `.`
pub const ANY_CHAR_PATTERN: &str = "(?s:.)";

/// Sequence of patterns; empty matches the empty string
pub fn seq(items: impl IntoIterator<Item = Pattern>) -> Pattern {
    Pattern::Seq(items.into_iter().collect())
}

/// Ordered choice of patterns
pub fn choice(alternatives: impl IntoIterator<Item = Pattern>) -> Pattern {
    Pattern::Choice(alternatives.into_iter().collect())
}

/// Positive lookahead
pub fn and(p: Pattern) -> Pattern {
    Pattern::And(Box::new(p))
}

/// Negative lookahead
pub fn not(p: Pattern) -> Pattern {
    Pattern::Not(Box::new(p))
}

/// `right` whose span `left` also matches exactly
pub fn colon(left: Pattern, right: Pattern) -> Pattern {
    Pattern::Colon(Box::new(left), Box::new(right))
}

/// `right` whose span `left` does not match exactly
pub fn colon_not(left: Pattern, right: Pattern) -> Pattern {
    Pattern::ColonNot(Box::new(left), Box::new(right))
}

/// Lake of `island`s
pub fn lake(island: Pattern) -> Pattern {
    Pattern::Lake(Box::new(island))
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Debug, Clone)]
struct PendingRule {
    symbol: String,
    pattern: Pattern,
    water: bool,
}

/// Grammar builder; the first rule is the default start rule
#[derive(Debug, Clone, Default)]
pub struct GrammarBuilder {
    rules: Vec<PendingRule>,
    top_level: Vec<String>,
}

impl GrammarBuilder {
    /// Create a new grammar builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule
    pub fn rule(mut self, symbol: &str, pattern: Pattern) -> Self {
        self.rules.push(PendingRule {
            symbol: symbol.to_string(),
            pattern,
            water: false,
        });
        self
    }

    /// Add a rule usable as lake water
    pub fn water_rule(mut self, symbol: &str, pattern: Pattern) -> Self {
        self.rules.push(PendingRule {
            symbol: symbol.to_string(),
            pattern,
            water: true,
        });
        self
    }

    /// Declare a top-level rule
    pub fn top_level(mut self, symbol: &str) -> Self {
        self.top_level.push(symbol.to_string());
        self
    }

    /// Number of rules added so far
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Build the grammar, resolving every rule reference
    pub fn build(self) -> Result<Grammar, GrammarError> {
        let mut grammar = Grammar::new();
        for rule in self.rules {
            let rhs = lower(&mut grammar, rule.pattern)?;
            grammar.add_rule(rule.symbol, rhs, rule.water)?;
        }
        grammar.resolve()?;
        for symbol in &self.top_level {
            grammar.add_top_level(symbol)?;
        }
        log_debug!(
            "built grammar: {} rules, {} expressions",
            grammar.rule_count(),
            grammar.expr_count()
        );
        Ok(grammar)
    }
}

/// Place a pattern into the grammar arena
pub(crate) fn lower(grammar: &mut Grammar, pattern: Pattern) -> Result<ExprId, GrammarError> {
    let expr = match pattern {
        Pattern::Ref { symbol, binding } => Expr::Nonterminal {
            symbol,
            rule: None,
            binding,
        },
        Pattern::Terminal { pattern, source } => {
            regex_cache::validate(&pattern).map_err(|e| GrammarError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            Expr::Terminal { pattern, source }
        }
        Pattern::Seq(items) => Expr::Sequence {
            items: lower_all(grammar, items)?,
        },
        Pattern::Choice(alternatives) => Expr::Choice {
            alternatives: lower_all(grammar, alternatives)?,
        },
        Pattern::Star(p) => Expr::ZeroOrMore {
            expr: lower(grammar, *p)?,
        },
        Pattern::Plus(p) => Expr::OneOrMore {
            expr: lower(grammar, *p)?,
        },
        Pattern::Opt(p) => Expr::Optional {
            expr: lower(grammar, *p)?,
        },
        Pattern::And(p) => Expr::And {
            expr: lower(grammar, *p)?,
        },
        Pattern::Not(p) => Expr::Not {
            expr: lower(grammar, *p)?,
        },
        Pattern::Group(p) => Expr::Grouping {
            expr: lower(grammar, *p)?,
        },
        Pattern::Rewrite(p, output) => Expr::Rewriting {
            expr: lower(grammar, *p)?,
            output,
        },
        Pattern::Colon(left, right) => Expr::Colon {
            left: lower(grammar, *left)?,
            right: lower(grammar, *right)?,
        },
        Pattern::ColonNot(left, right) => Expr::ColonNot {
            left: lower(grammar, *left)?,
            right: lower(grammar, *right)?,
        },
        Pattern::Lake(p) => Expr::Lake {
            expr: lower(grammar, *p)?,
            water: None,
        },
    };
    Ok(grammar.add_expr(expr))
}

fn lower_all(grammar: &mut Grammar, patterns: Vec<Pattern>) -> Result<Vec<ExprId>, GrammarError> {
    patterns.into_iter().map(|p| lower(grammar, p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peg::grammar::RuleId;

    #[test]
    fn test_then_flattens_sequence() {
        let p = lit("a").then(lit("b")).then(lit("c"));
        match p {
            Pattern::Seq(items) => assert_eq!(items.len(), 3),
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_operators_match_methods() {
        assert_eq!(lit("a") >> lit("b"), lit("a").then(lit("b")));
        assert_eq!(lit("a") | lit("b") | lit("c"), choice([lit("a"), lit("b"), lit("c")]));
    }

    #[test]
    fn test_group_stops_flattening() {
        let p = (lit("a") >> lit("b")).group() >> lit("c");
        match p {
            Pattern::Seq(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0], Pattern::Group(_)));
            }
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_literal_is_escaped() {
        match lit("a+b") {
            Pattern::Terminal { pattern, source } => {
                assert_eq!(pattern, r"a\+b");
                assert_eq!(source, "'a+b'");
            }
            other => panic!("expected terminal, got {:?}", other),
        }
    }

    #[test]
    fn test_build_forward_reference() {
        let grammar = GrammarBuilder::new()
            .rule("start", nt("later") >> lit("!"))
            .rule("later", class("a-z").plus())
            .build()
            .unwrap();

        let later = grammar.rule_by_symbol("later").unwrap();
        let resolved = grammar
            .exprs()
            .any(|(_, e)| matches!(e, Expr::Nonterminal { rule: Some(r), .. } if *r == later));
        assert!(resolved);
        assert_eq!(grammar.start_rule(None), Some(RuleId::from_index(0)));
    }

    #[test]
    fn test_build_unknown_reference_fails() {
        let err = GrammarBuilder::new()
            .rule("start", nt("missing"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            GrammarError::UnresolvedNonterminal {
                symbol: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_build_invalid_regex_fails() {
        let err = GrammarBuilder::new()
            .rule("start", re("[unclosed"))
            .build()
            .unwrap_err();
        assert!(matches!(err, GrammarError::InvalidPattern { .. }));
    }

    #[test]
    fn test_build_empty_fails() {
        assert_eq!(
            GrammarBuilder::new().build().unwrap_err(),
            GrammarError::EmptyGrammar
        );
    }

    #[test]
    fn test_water_and_top_level() {
        let grammar = GrammarBuilder::new()
            .rule("doc", lake(nt("island")))
            .rule("island", lit("x"))
            .water_rule("comment", lit("#") >> re("[^\n]*"))
            .top_level("island")
            .build()
            .unwrap();

        let comment = grammar.rule_by_symbol("comment").unwrap();
        assert!(grammar.rule(comment).water);
        assert_eq!(grammar.start_rule(None), grammar.rule_by_symbol("island"));
        assert!(grammar.has_unrewritten_lakes());
    }
}
