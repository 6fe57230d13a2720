//! Rule dependency analysis
//!
//! Everything here is derived from the Beginning sets:
//!
//! - [`RuleGraph`]: which rules a rule can call without consuming input,
//!   ranked so callees come before callers. The bottom-up parser schedules
//!   rule evaluations with it.
//! - [`GrammarAnalyzer`]: a small report of left-recursive rules and rules
//!   that can never match.
//!
//! # Example
//!
//! ```
//! use lakepeg::peg::loader;
//! use lakepeg::peg::analysis::{GrammarAnalyzer, WarningKind};
//!
//! let grammar = loader::load("expr <- expr '-' num / num\nnum <- [0-9]").unwrap();
//! let warnings = GrammarAnalyzer::new(&grammar).analyze();
//! assert_eq!(warnings.len(), 1);
//! assert_eq!(warnings[0].kind, WarningKind::LeftRecursion);
//! ```

use crate::peg::grammar::{Expr, ExprId, Grammar, RuleId};
use crate::peg::sets::{compute_parse_beginning, Marker, SetMap};
use ahash::AHashSet;
use hashbrown::HashMap;
use std::collections::VecDeque;

/// Kind of grammar warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// Direct or indirect left recursion
    ///
    /// All three strategies accept it, but a left-recursive rule without a
    /// non-recursive alternative never matches.
    LeftRecursion,

    /// The rule's Beginning set is empty, so no input can match it
    ///
    /// Example: an ordered choice with no alternatives.
    NeverMatches,
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LeftRecursion => write!(f, "left recursion"),
            Self::NeverMatches => write!(f, "never matches"),
        }
    }
}

/// A grammar warning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarWarning {
    /// The kind of warning
    pub kind: WarningKind,
    /// The rule where the warning was detected
    pub rule: RuleId,
    /// Human-readable message
    pub message: String,
    /// Related rules (the recursion chain for left recursion)
    pub related_rules: Vec<RuleId>,
}

impl GrammarWarning {
    /// Create a new warning
    pub fn new(kind: WarningKind, rule: RuleId, message: impl Into<String>) -> Self {
        Self {
            kind,
            rule,
            message: message.into(),
            related_rules: Vec::new(),
        }
    }

    /// Add related rules to the warning
    pub fn with_related(mut self, rules: Vec<RuleId>) -> Self {
        self.related_rules = rules;
        self
    }
}

impl std::fmt::Display for GrammarWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[rule {}] {}: {}", self.rule, self.kind, self.message)?;
        if !self.related_rules.is_empty() {
            let related: Vec<String> = self.related_rules.iter().map(ToString::to_string).collect();
            write!(f, " (related rules: {})", related.join(", "))?;
        }
        Ok(())
    }
}

// ============================================================================
// Rule graph
// ============================================================================

/// Rule call graph restricted to calls made before any input is consumed
#[derive(Debug, Clone)]
pub struct RuleGraph {
    callees: Vec<Vec<RuleId>>,
    parents: Vec<Vec<RuleId>>,
    rank: Vec<usize>,
    bottom: Vec<bool>,
}

impl RuleGraph {
    /// Build the graph from Beginning sets, usually [`compute_parse_beginning`]
    ///
    /// A rule's entry calls are the nonterminals its body may apply at its
    /// own start position: sequence items up to and including the first
    /// non-nullable one, every alternative, lookahead and colon operands,
    /// and lake islands and water.
    pub fn new(grammar: &Grammar, beginning: &SetMap) -> Self {
        let rule_count = grammar.rule_count();
        let callees: Vec<Vec<RuleId>> = grammar
            .rules()
            .map(|(_, rule)| entry_calls(grammar, beginning, rule.rhs))
            .collect();

        let mut parents = vec![Vec::new(); rule_count];
        for (caller, calls) in callees.iter().enumerate() {
            for callee in calls {
                parents[callee.index()].push(RuleId::from_index(caller));
            }
        }

        let rank = postorder_ranks(&callees);

        let bottom = grammar
            .rules()
            .map(|(_, rule)| {
                beginning.get(rule.rhs).iter().any(|marker| match marker {
                    Marker::Epsilon => true,
                    Marker::Symbol(id) => matches!(grammar.expr(*id), Expr::Terminal { .. }),
                })
            })
            .collect::<Vec<_>>();

        log_debug!(
            "rule graph: {} rules, {} bottom",
            rule_count,
            bottom.iter().filter(|b| **b).count()
        );

        Self {
            callees,
            parents,
            rank,
            bottom,
        }
    }

    /// Rules `rule` may call at its own start position
    #[inline]
    pub fn callees(&self, rule: RuleId) -> &[RuleId] {
        &self.callees[rule.index()]
    }

    /// Rules that call `rule` at their own start position
    #[inline]
    pub fn parents(&self, rule: RuleId) -> &[RuleId] {
        &self.parents[rule.index()]
    }

    /// DFS postorder rank; callees rank below their callers except on cycles
    #[inline]
    pub fn rank(&self, rule: RuleId) -> usize {
        self.rank[rule.index()]
    }

    /// True if the rule can start with a terminal or match the empty string
    #[inline]
    pub fn is_bottom(&self, rule: RuleId) -> bool {
        self.bottom[rule.index()]
    }

    /// Bottom rules, lowest rank first
    pub fn bottom_rules(&self) -> Vec<RuleId> {
        let mut rules: Vec<RuleId> = (0..self.bottom.len())
            .filter(|&i| self.bottom[i])
            .map(RuleId::from_index)
            .collect();
        rules.sort_by_key(|rule| self.rank(*rule));
        rules
    }

    /// Number of rules
    #[inline]
    pub fn len(&self) -> usize {
        self.callees.len()
    }

    /// True if the grammar had no rules
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.callees.is_empty()
    }
}

fn entry_calls(grammar: &Grammar, beginning: &SetMap, rhs: ExprId) -> Vec<RuleId> {
    let mut calls = Vec::new();
    let mut seen = AHashSet::new();
    let mut stack = vec![rhs];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        match grammar.expr(id) {
            Expr::Nonterminal {
                rule: Some(rule), ..
            } => {
                if !calls.contains(rule) {
                    calls.push(*rule);
                }
            }
            Expr::Nonterminal { rule: None, .. } | Expr::Terminal { .. } => {}
            Expr::Sequence { items } => {
                let prefix = items
                    .iter()
                    .position(|item| !beginning.nullable(*item))
                    .map_or(items.len(), |i| i + 1);
                stack.extend(items[..prefix].iter().rev());
            }
            other => stack.extend(other.operands().into_iter().rev()),
        }
    }
    calls
}

/// Postorder numbering over the call graph, roots in rule order
fn postorder_ranks(callees: &[Vec<RuleId>]) -> Vec<usize> {
    let mut rank = vec![0; callees.len()];
    let mut visited = vec![false; callees.len()];
    let mut next = 0;
    for root in 0..callees.len() {
        if visited[root] {
            continue;
        }
        visited[root] = true;
        let mut stack = vec![(root, 0usize)];
        while let Some(top) = stack.last_mut() {
            let (rule, child) = *top;
            match callees[rule].get(child) {
                Some(callee) => {
                    top.1 += 1;
                    let callee = callee.index();
                    if !visited[callee] {
                        visited[callee] = true;
                        stack.push((callee, 0));
                    }
                }
                None => {
                    rank[rule] = next;
                    next += 1;
                    stack.pop();
                }
            }
        }
    }
    rank
}

// ============================================================================
// Analyzer
// ============================================================================

/// Grammar analyzer
pub struct GrammarAnalyzer<'g> {
    grammar: &'g Grammar,
    beginning: SetMap,
}

impl<'g> GrammarAnalyzer<'g> {
    /// Create a new analyzer over the Beginning sets the table strategies use
    pub fn new(grammar: &'g Grammar) -> Self {
        Self::with_beginning(grammar, compute_parse_beginning(grammar))
    }

    /// Create an analyzer over Beginning sets computed elsewhere
    pub fn with_beginning(grammar: &'g Grammar, beginning: SetMap) -> Self {
        Self { grammar, beginning }
    }

    /// The Beginning sets in use
    pub fn beginning(&self) -> &SetMap {
        &self.beginning
    }

    /// Build the rule dependency graph
    pub fn graph(&self) -> RuleGraph {
        RuleGraph::new(self.grammar, &self.beginning)
    }

    /// Analyze the grammar and return all warnings
    pub fn analyze(&self) -> Vec<GrammarWarning> {
        let mut warnings = Vec::new();
        for (id, rule) in self.grammar.rules() {
            if rule.generated {
                continue;
            }
            if let Some(cycle) = self.left_recursion(id) {
                let names: Vec<&str> = cycle
                    .iter()
                    .chain(std::iter::once(&id))
                    .map(|r| self.grammar.rule(*r).symbol.as_str())
                    .collect();
                warnings.push(
                    GrammarWarning::new(
                        WarningKind::LeftRecursion,
                        id,
                        format!("'{}' is left recursive ({})", rule.symbol, names.join(" -> ")),
                    )
                    .with_related(cycle),
                );
            }
            if self.beginning.get(rule.rhs).is_empty() {
                warnings.push(GrammarWarning::new(
                    WarningKind::NeverMatches,
                    id,
                    format!("'{}' cannot match any input", rule.symbol),
                ));
            }
        }
        warnings
    }

    /// Rules whose Beginning set contains a call of themselves, directly or
    /// through other rules
    pub fn left_recursive_rules(&self) -> Vec<RuleId> {
        self.grammar
            .rules()
            .map(|(id, _)| id)
            .filter(|id| self.left_recursion(*id).is_some())
            .collect()
    }

    /// Shortest chain of left calls leading from `rule` back to itself
    ///
    /// The chain starts with `rule`; the closing call back to `rule` is
    /// implied.
    pub fn left_recursion(&self, rule: RuleId) -> Option<Vec<RuleId>> {
        let mut via: HashMap<RuleId, RuleId> = HashMap::new();
        let mut queue = VecDeque::from([rule]);
        while let Some(current) = queue.pop_front() {
            for next in self.left_calls(current) {
                if next == rule {
                    let mut chain = vec![current];
                    let mut at = current;
                    while at != rule {
                        match via.get(&at) {
                            Some(&prev) => {
                                chain.push(prev);
                                at = prev;
                            }
                            None => break,
                        }
                    }
                    chain.reverse();
                    return Some(chain);
                }
                if !via.contains_key(&next) {
                    via.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Rules referenced by a nonterminal marker in the Beginning set of
    /// `rule`'s right-hand side
    fn left_calls(&self, rule: RuleId) -> Vec<RuleId> {
        let rhs = self.grammar.rule(rule).rhs;
        self.beginning
            .symbols(rhs)
            .filter_map(|id| match self.grammar.expr(id) {
                Expr::Nonterminal { rule, .. } => *rule,
                _ => None,
            })
            .collect()
    }
}
