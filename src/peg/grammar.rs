//! Grammar types for lakepeg
//!
//! A grammar is an arena of expressions plus an ordered list of rules.
//! Expressions refer to each other by [`ExprId`] and to rules by [`RuleId`],
//! so shared sub-expressions and recursive rules need no reference counting.
//! Cycles only ever go through rules: a `Nonterminal` names a rule, the rule
//! names its right-hand side.

use crate::peg::error::GrammarError;
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of an expression in the grammar arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExprId(u32);

impl ExprId {
    /// Build an id from a raw arena index
    #[inline]
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Raw arena index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Index of a rule in the grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(u32);

impl RuleId {
    /// Build an id from a raw rule index
    #[inline]
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Raw rule index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Water attached to a lake by the lake rewriter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LakeWater {
    /// Nonterminal invoking the synthesized water rule
    pub water: ExprId,
    /// Guard expressions: water never starts where one of these matches
    pub alternatives: Vec<ExprId>,
    /// User water rules tried before the any-character fallback
    pub water_rules: Vec<RuleId>,
}

/// Parsing expression
///
/// Operand fields are arena indices into the owning [`Grammar`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a rule, optionally binding the matched text to a name
    Nonterminal {
        /// Rule symbol as written
        symbol: String,
        /// Resolved rule (None only inside lake operands)
        rule: Option<RuleId>,
        /// Back-reference name (`name@Rule`)
        binding: Option<String>,
    },

    /// Regular expression match at the current position
    Terminal {
        /// Regex source (matched anchored at the current position)
        pattern: String,
        /// How the terminal is written in grammar text
        source: String,
    },

    /// Match all operands in order
    Sequence {
        /// Operands, left to right
        items: Vec<ExprId>,
    },

    /// Ordered choice: first alternative that matches wins
    Choice {
        /// Alternatives in priority order
        alternatives: Vec<ExprId>,
    },

    /// Greedy `e*`
    ZeroOrMore {
        /// Repeated operand
        expr: ExprId,
    },

    /// Greedy `e+`
    OneOrMore {
        /// Repeated operand
        expr: ExprId,
    },

    /// `e?`
    Optional {
        /// Optional operand
        expr: ExprId,
    },

    /// Positive lookahead `&e`
    And {
        /// Lookahead operand
        expr: ExprId,
    },

    /// Negative lookahead `!e`
    Not {
        /// Lookahead operand
        expr: ExprId,
    },

    /// Parenthesized expression
    Grouping {
        /// Grouped operand
        expr: ExprId,
    },

    /// Match `expr`, render `output` in rewritten text (`$0` is the matched text)
    Rewriting {
        /// Matched operand
        expr: ExprId,
        /// Replacement template
        output: String,
    },

    /// `left:right` - right matches and left matches exactly the same span
    Colon {
        /// Constraint operand
        left: ExprId,
        /// Primary operand
        right: ExprId,
    },

    /// `left:!right` - right matches and left does not match exactly that span
    ColonNot {
        /// Constraint operand
        left: ExprId,
        /// Primary operand
        right: ExprId,
    },

    /// `<<e>>` - islands of `e` floating in water
    Lake {
        /// Island operand
        expr: ExprId,
        /// Set by the lake rewriter
        water: Option<LakeWater>,
    },
}

impl Expr {
    /// Short name of the operator
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Nonterminal { .. } => "nonterminal",
            Expr::Terminal { .. } => "terminal",
            Expr::Sequence { .. } => "sequence",
            Expr::Choice { .. } => "choice",
            Expr::ZeroOrMore { .. } => "zero_or_more",
            Expr::OneOrMore { .. } => "one_or_more",
            Expr::Optional { .. } => "optional",
            Expr::And { .. } => "and",
            Expr::Not { .. } => "not",
            Expr::Grouping { .. } => "grouping",
            Expr::Rewriting { .. } => "rewriting",
            Expr::Colon { .. } => "colon",
            Expr::ColonNot { .. } => "colon_not",
            Expr::Lake { .. } => "lake",
        }
    }

    /// Direct operands, not following rule references
    ///
    /// A rewritten lake lists its water nonterminal after the island operand.
    pub fn operands(&self) -> Vec<ExprId> {
        match self {
            Expr::Nonterminal { .. } | Expr::Terminal { .. } => Vec::new(),
            Expr::Sequence { items } => items.clone(),
            Expr::Choice { alternatives } => alternatives.clone(),
            Expr::ZeroOrMore { expr }
            | Expr::OneOrMore { expr }
            | Expr::Optional { expr }
            | Expr::And { expr }
            | Expr::Not { expr }
            | Expr::Grouping { expr }
            | Expr::Rewriting { expr, .. } => vec![*expr],
            Expr::Colon { left, right } | Expr::ColonNot { left, right } => vec![*left, *right],
            Expr::Lake { expr, water } => match water {
                Some(w) => vec![*expr, w.water],
                None => vec![*expr],
            },
        }
    }
}

/// A named rule `symbol <- rhs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule name
    pub symbol: String,
    /// Right-hand side
    pub rhs: ExprId,
    /// Usable as lake water filler
    #[serde(default)]
    pub water: bool,
    /// Synthesized by the lake rewriter
    #[serde(default)]
    pub generated: bool,
}

/// A complete grammar
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Grammar {
    exprs: Vec<Expr>,
    rules: Vec<Rule>,
    symbols: HashMap<String, RuleId>,
    top_level: Vec<RuleId>,
}

impl Grammar {
    /// Create a new empty grammar
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expression to the arena
    #[inline]
    pub fn add_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId::from_index(self.exprs.len());
        self.exprs.push(expr);
        id
    }

    /// Get an expression
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this grammar.
    #[inline]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    /// Get an expression mutably
    #[inline]
    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.index()]
    }

    /// Number of expressions in the arena
    #[inline]
    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    /// Iterate over all expressions with their ids
    pub fn exprs(&self) -> impl Iterator<Item = (ExprId, &Expr)> {
        self.exprs
            .iter()
            .enumerate()
            .map(|(i, e)| (ExprId::from_index(i), e))
    }

    /// Add a rule; symbols must be unique
    pub fn add_rule(
        &mut self,
        symbol: impl Into<String>,
        rhs: ExprId,
        water: bool,
    ) -> Result<RuleId, GrammarError> {
        let symbol = symbol.into();
        if self.symbols.contains_key(symbol.as_str()) {
            return Err(GrammarError::DuplicateRule { symbol });
        }
        let id = RuleId::from_index(self.rules.len());
        self.symbols.insert(symbol.clone(), id);
        self.rules.push(Rule {
            symbol,
            rhs,
            water,
            generated: false,
        });
        Ok(id)
    }

    /// Replace a rule's right-hand side (forward reference fix-up)
    pub fn set_rhs(&mut self, rule: RuleId, rhs: ExprId) {
        self.rules[rule.index()].rhs = rhs;
    }

    /// Get a rule
    #[inline]
    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    /// Get a rule mutably
    #[inline]
    pub fn rule_mut(&mut self, id: RuleId) -> &mut Rule {
        &mut self.rules[id.index()]
    }

    /// Number of rules
    #[inline]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Iterate over rules in insertion order
    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, r)| (RuleId::from_index(i), r))
    }

    /// Look up a rule by symbol
    #[inline]
    pub fn rule_by_symbol(&self, symbol: &str) -> Option<RuleId> {
        self.symbols.get(symbol).copied()
    }

    /// Declare a top-level (start) rule
    pub fn add_top_level(&mut self, symbol: &str) -> Result<RuleId, GrammarError> {
        let id = self
            .rule_by_symbol(symbol)
            .ok_or_else(|| GrammarError::UnresolvedNonterminal {
                symbol: symbol.to_string(),
            })?;
        if !self.top_level.contains(&id) {
            self.top_level.push(id);
        }
        Ok(id)
    }

    /// Explicitly declared top-level rules
    #[inline]
    pub fn declared_top_level(&self) -> &[RuleId] {
        &self.top_level
    }

    /// Top-level rules; the first inserted rule when none were declared
    pub fn top_level(&self) -> Vec<RuleId> {
        if !self.top_level.is_empty() {
            self.top_level.clone()
        } else if self.rules.is_empty() {
            Vec::new()
        } else {
            vec![RuleId::from_index(0)]
        }
    }

    /// Resolve the start rule: an explicit symbol, else the first top-level rule
    pub fn start_rule(&self, start: Option<&str>) -> Option<RuleId> {
        match start {
            Some(symbol) => self.rule_by_symbol(symbol),
            None => self.top_level().first().copied(),
        }
    }

    /// Bind every nonterminal to its rule by symbol
    ///
    /// Nonterminals inside a lake operand may remain unresolved; anywhere
    /// else an unknown symbol is an error.
    pub fn resolve(&mut self) -> Result<(), GrammarError> {
        if self.rules.is_empty() {
            return Err(GrammarError::EmptyGrammar);
        }
        let lake_scoped = self.lake_operand_exprs();
        for (index, expr) in self.exprs.iter_mut().enumerate() {
            if let Expr::Nonterminal { symbol, rule, .. } = expr {
                *rule = self.symbols.get(symbol.as_str()).copied();
                if rule.is_none() && !lake_scoped.contains(&ExprId::from_index(index)) {
                    return Err(GrammarError::UnresolvedNonterminal {
                        symbol: symbol.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Expressions below some lake operand (not following rules)
    fn lake_operand_exprs(&self) -> HashSet<ExprId> {
        let mut scoped = HashSet::new();
        let mut stack: Vec<ExprId> = self
            .exprs
            .iter()
            .filter_map(|e| match e {
                Expr::Lake { expr, .. } => Some(*expr),
                _ => None,
            })
            .collect();
        while let Some(id) = stack.pop() {
            if scoped.insert(id) {
                stack.extend(self.expr(id).operands());
            }
        }
        scoped
    }

    /// True if some lake has not been through the lake rewriter
    pub fn has_unrewritten_lakes(&self) -> bool {
        self.exprs
            .iter()
            .any(|e| matches!(e, Expr::Lake { water: None, .. }))
    }

    /// Serialize to JSON
    #[inline]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON
    #[inline]
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Count expressions by operator over everything reachable from the rules
    pub fn stats(&self) -> ExprStats {
        let mut stats = ExprStats::default();
        self.walk(&mut stats);
        stats
    }
}

// ============================================================================
// Visitor
// ============================================================================

/// Visitor over expression variants
///
/// Every method defaults to [`ExprVisitor::visit_any`], which defaults to a
/// no-op, so a visitor only overrides what it cares about.
pub trait ExprVisitor {
    /// Fallback for every variant
    fn visit_any(&mut self, _id: ExprId) {}

    /// Visit a nonterminal
    fn visit_nonterminal(
        &mut self,
        id: ExprId,
        _symbol: &str,
        _rule: Option<RuleId>,
        _binding: Option<&str>,
    ) {
        self.visit_any(id)
    }

    /// Visit a terminal
    fn visit_terminal(&mut self, id: ExprId, _pattern: &str, _source: &str) {
        self.visit_any(id)
    }

    /// Visit a sequence
    fn visit_sequence(&mut self, id: ExprId, _items: &[ExprId]) {
        self.visit_any(id)
    }

    /// Visit an ordered choice
    fn visit_choice(&mut self, id: ExprId, _alternatives: &[ExprId]) {
        self.visit_any(id)
    }

    /// Visit `e*`
    fn visit_zero_or_more(&mut self, id: ExprId, _expr: ExprId) {
        self.visit_any(id)
    }

    /// Visit `e+`
    fn visit_one_or_more(&mut self, id: ExprId, _expr: ExprId) {
        self.visit_any(id)
    }

    /// Visit `e?`
    fn visit_optional(&mut self, id: ExprId, _expr: ExprId) {
        self.visit_any(id)
    }

    /// Visit `&e`
    fn visit_and(&mut self, id: ExprId, _expr: ExprId) {
        self.visit_any(id)
    }

    /// Visit `!e`
    fn visit_not(&mut self, id: ExprId, _expr: ExprId) {
        self.visit_any(id)
    }

    /// Visit `(e)`
    fn visit_grouping(&mut self, id: ExprId, _expr: ExprId) {
        self.visit_any(id)
    }

    /// Visit `e -> 'out'`
    fn visit_rewriting(&mut self, id: ExprId, _expr: ExprId, _output: &str) {
        self.visit_any(id)
    }

    /// Visit `l:r`
    fn visit_colon(&mut self, id: ExprId, _left: ExprId, _right: ExprId) {
        self.visit_any(id)
    }

    /// Visit `l:!r`
    fn visit_colon_not(&mut self, id: ExprId, _left: ExprId, _right: ExprId) {
        self.visit_any(id)
    }

    /// Visit `<<e>>`
    fn visit_lake(&mut self, id: ExprId, _expr: ExprId, _water: Option<&LakeWater>) {
        self.visit_any(id)
    }
}

impl Grammar {
    /// Dispatch a single expression to the matching visitor method
    pub fn accept<V: ExprVisitor + ?Sized>(&self, id: ExprId, visitor: &mut V) {
        match self.expr(id) {
            Expr::Nonterminal {
                symbol,
                rule,
                binding,
            } => visitor.visit_nonterminal(id, symbol, *rule, binding.as_deref()),
            Expr::Terminal { pattern, source } => visitor.visit_terminal(id, pattern, source),
            Expr::Sequence { items } => visitor.visit_sequence(id, items),
            Expr::Choice { alternatives } => visitor.visit_choice(id, alternatives),
            Expr::ZeroOrMore { expr } => visitor.visit_zero_or_more(id, *expr),
            Expr::OneOrMore { expr } => visitor.visit_one_or_more(id, *expr),
            Expr::Optional { expr } => visitor.visit_optional(id, *expr),
            Expr::And { expr } => visitor.visit_and(id, *expr),
            Expr::Not { expr } => visitor.visit_not(id, *expr),
            Expr::Grouping { expr } => visitor.visit_grouping(id, *expr),
            Expr::Rewriting { expr, output } => visitor.visit_rewriting(id, *expr, output),
            Expr::Colon { left, right } => visitor.visit_colon(id, *left, *right),
            Expr::ColonNot { left, right } => visitor.visit_colon_not(id, *left, *right),
            Expr::Lake { expr, water } => visitor.visit_lake(id, *expr, water.as_ref()),
        }
    }

    /// Visit every expression reachable from the rule right-hand sides once,
    /// operands before their containers, rules in insertion order
    ///
    /// Rule references are not followed; each rule's rhs is a root of its own.
    pub fn walk<V: ExprVisitor + ?Sized>(&self, visitor: &mut V) {
        let mut seen = vec![false; self.exprs.len()];
        for rule in &self.rules {
            // Explicit stack: (expr, operands already pushed)
            let mut stack = vec![(rule.rhs, false)];
            while let Some((id, expanded)) = stack.pop() {
                if expanded {
                    self.accept(id, visitor);
                    continue;
                }
                if seen[id.index()] {
                    continue;
                }
                seen[id.index()] = true;
                stack.push((id, true));
                for child in self.expr(id).operands().into_iter().rev() {
                    if !seen[child.index()] {
                        stack.push((child, false));
                    }
                }
            }
        }
    }
}

/// Operator counts gathered by [`Grammar::stats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExprStats {
    /// Nonterminal occurrences
    pub nonterminals: usize,
    /// Terminal occurrences
    pub terminals: usize,
    /// Sequences and choices
    pub composites: usize,
    /// `*`, `+` and `?`
    pub repetitions: usize,
    /// `&` and `!`
    pub lookaheads: usize,
    /// Lakes
    pub lakes: usize,
    /// Every visited expression
    pub total: usize,
}

impl ExprVisitor for ExprStats {
    fn visit_any(&mut self, _id: ExprId) {
        self.total += 1;
    }

    fn visit_nonterminal(&mut self, id: ExprId, _: &str, _: Option<RuleId>, _: Option<&str>) {
        self.nonterminals += 1;
        self.visit_any(id);
    }

    fn visit_terminal(&mut self, id: ExprId, _pattern: &str, _source: &str) {
        self.terminals += 1;
        self.visit_any(id);
    }

    fn visit_sequence(&mut self, id: ExprId, _items: &[ExprId]) {
        self.composites += 1;
        self.visit_any(id);
    }

    fn visit_choice(&mut self, id: ExprId, _alternatives: &[ExprId]) {
        self.composites += 1;
        self.visit_any(id);
    }

    fn visit_zero_or_more(&mut self, id: ExprId, _expr: ExprId) {
        self.repetitions += 1;
        self.visit_any(id);
    }

    fn visit_one_or_more(&mut self, id: ExprId, _expr: ExprId) {
        self.repetitions += 1;
        self.visit_any(id);
    }

    fn visit_optional(&mut self, id: ExprId, _expr: ExprId) {
        self.repetitions += 1;
        self.visit_any(id);
    }

    fn visit_and(&mut self, id: ExprId, _expr: ExprId) {
        self.lookaheads += 1;
        self.visit_any(id);
    }

    fn visit_not(&mut self, id: ExprId, _expr: ExprId) {
        self.lookaheads += 1;
        self.visit_any(id);
    }

    fn visit_lake(&mut self, id: ExprId, _expr: ExprId, _water: Option<&LakeWater>) {
        self.lakes += 1;
        self.visit_any(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminal(g: &mut Grammar, text: &str) -> ExprId {
        g.add_expr(Expr::Terminal {
            pattern: regex::escape(text),
            source: format!("'{}'", text),
        })
    }

    fn nonterminal(g: &mut Grammar, symbol: &str) -> ExprId {
        g.add_expr(Expr::Nonterminal {
            symbol: symbol.to_string(),
            rule: None,
            binding: None,
        })
    }

    #[test]
    fn test_grammar_new() {
        let grammar = Grammar::new();
        assert_eq!(grammar.expr_count(), 0);
        assert_eq!(grammar.rule_count(), 0);
        assert!(grammar.top_level().is_empty());
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let mut g = Grammar::new();
        let a = terminal(&mut g, "a");
        g.add_rule("x", a, false).unwrap();
        let err = g.add_rule("x", a, false).unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateRule { ref symbol } if symbol == "x"));
    }

    #[test]
    fn test_resolve_forward_reference() {
        let mut g = Grammar::new();
        let y = nonterminal(&mut g, "y");
        g.add_rule("x", y, false).unwrap();
        let b = terminal(&mut g, "b");
        let y_rule = g.add_rule("y", b, false).unwrap();
        g.resolve().unwrap();
        match g.expr(y) {
            Expr::Nonterminal { rule, .. } => assert_eq!(*rule, Some(y_rule)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_resolve_unknown_symbol_fails() {
        let mut g = Grammar::new();
        let z = nonterminal(&mut g, "z");
        g.add_rule("x", z, false).unwrap();
        assert!(matches!(
            g.resolve(),
            Err(GrammarError::UnresolvedNonterminal { .. })
        ));
    }

    #[test]
    fn test_resolve_allows_unknown_island() {
        let mut g = Grammar::new();
        let island = nonterminal(&mut g, "missing");
        let lake = g.add_expr(Expr::Lake {
            expr: island,
            water: None,
        });
        g.add_rule("doc", lake, false).unwrap();
        g.resolve().unwrap();
        assert!(g.has_unrewritten_lakes());
    }

    #[test]
    fn test_empty_grammar_does_not_resolve() {
        assert!(matches!(
            Grammar::new().resolve(),
            Err(GrammarError::EmptyGrammar)
        ));
    }

    #[test]
    fn test_start_rule_defaults_to_first() {
        let mut g = Grammar::new();
        let a = terminal(&mut g, "a");
        let first = g.add_rule("first", a, false).unwrap();
        let second = g.add_rule("second", a, false).unwrap();
        assert_eq!(g.start_rule(None), Some(first));
        g.add_top_level("second").unwrap();
        assert_eq!(g.start_rule(None), Some(second));
        assert_eq!(g.start_rule(Some("first")), Some(first));
        assert_eq!(g.start_rule(Some("nope")), None);
    }

    #[test]
    fn test_walk_visits_shared_expression_once() {
        let mut g = Grammar::new();
        let a = terminal(&mut g, "a");
        let seq = g.add_expr(Expr::Sequence { items: vec![a, a] });
        g.add_rule("x", seq, false).unwrap();
        g.add_rule("y", a, false).unwrap();

        let stats = g.stats();
        assert_eq!(stats.terminals, 1);
        assert_eq!(stats.composites, 1);
        assert_eq!(stats.total, 2);
    }

    #[test]
    fn test_grammar_json_roundtrip() {
        let mut g = Grammar::new();
        let a = terminal(&mut g, "a");
        let star = g.add_expr(Expr::ZeroOrMore { expr: a });
        g.add_rule("as", star, false).unwrap();

        let json = g.to_json().unwrap();
        let parsed = Grammar::from_json(&json).unwrap();
        assert_eq!(parsed.expr_count(), 2);
        assert_eq!(parsed.rule_by_symbol("as"), Some(RuleId::from_index(0)));
        assert_eq!(parsed.expr(star), g.expr(star));
    }
}
