//! Beginning, Succeed and Alt set calculators
//!
//! All three are least fixed points over the flattened expression list:
//!
//! - **Beginning(e)**: terminal, nonterminal and lake occurrences that can
//!   start a match of `e`, plus `ε` if `e` can match the empty string.
//! - **Succeed(e)**: occurrences that can start whatever follows `e`.
//! - **Alt(e)**: `Succeed(e)` plus everything an ordered choice would try
//!   instead of `e`, i.e. every symbol a parser could be looking at where
//!   `e` is being attempted.
//!
//! Beginning is computed operands-first (postorder); Succeed and Alt flow
//! from containers to operands (reverse postorder). Sets only grow, so a
//! sweep that leaves the total element count unchanged ends the iteration.
//!
//! [`Mode::Lake`] widens a few rules so the lake rewriter sees symbols that
//! only appear behind lookaheads or colon constraints.
//!
//! The table strategies schedule work from Beginning sets in which a terminal
//! whose pattern matches the empty string (`` `[ ]*` ``) is nullable too; see
//! [`compute_parse_beginning`].

use crate::peg::grammar::{Expr, ExprId, ExprVisitor, Grammar};
use crate::peg::regex_cache;
use std::collections::BTreeSet;

/// Element of a Beginning / Succeed / Alt set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Marker {
    /// The empty string
    Epsilon,
    /// A nonterminal, terminal or lake occurrence
    Symbol(ExprId),
}

/// Ordered set of markers
pub type MarkerSet = BTreeSet<Marker>;

/// Calculator mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Plain PEG semantics
    #[default]
    Ordinary,
    /// Widened rules used by the lake rewriter
    Lake,
}

/// One marker set per expression, indexed by [`ExprId`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetMap {
    sets: Vec<MarkerSet>,
}

impl SetMap {
    fn with_len(len: usize) -> Self {
        Self {
            sets: vec![MarkerSet::new(); len],
        }
    }

    /// Set of one expression
    #[inline]
    pub fn get(&self, id: ExprId) -> &MarkerSet {
        &self.sets[id.index()]
    }

    /// True if the set contains `ε`
    #[inline]
    pub fn nullable(&self, id: ExprId) -> bool {
        self.sets[id.index()].contains(&Marker::Epsilon)
    }

    /// Symbol markers of one expression, without `ε`
    pub fn symbols(&self, id: ExprId) -> impl Iterator<Item = ExprId> + '_ {
        self.sets[id.index()].iter().filter_map(|m| match m {
            Marker::Symbol(s) => Some(*s),
            Marker::Epsilon => None,
        })
    }

    /// Sum of all set sizes
    pub fn total_len(&self) -> usize {
        self.sets.iter().map(BTreeSet::len).sum()
    }

    /// Number of expressions covered
    #[inline]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// True if no expressions are covered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    fn extend(&mut self, id: ExprId, markers: impl IntoIterator<Item = Marker>) {
        self.sets[id.index()].extend(markers);
    }
}

/// All three sets of one grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarSets {
    /// Beginning sets
    pub beginning: SetMap,
    /// Succeed sets
    pub succeed: SetMap,
    /// Alt sets
    pub alt: SetMap,
}

/// Every expression reachable from the rule right-hand sides, once, in
/// postorder (operands before containers)
pub fn flatten(grammar: &Grammar) -> Vec<ExprId> {
    struct Collect(Vec<ExprId>);

    impl ExprVisitor for Collect {
        fn visit_any(&mut self, id: ExprId) {
            self.0.push(id);
        }
    }

    let mut collect = Collect(Vec::with_capacity(grammar.expr_count()));
    grammar.walk(&mut collect);
    collect.0
}

/// Beginning sets of every expression
pub fn compute_beginning(grammar: &Grammar, mode: Mode) -> SetMap {
    SetCalculator::new(grammar, mode).beginning()
}

/// Succeed sets of every expression
pub fn compute_succeed(grammar: &Grammar, beginning: &SetMap, mode: Mode) -> SetMap {
    SetCalculator::new(grammar, mode).succeed(beginning)
}

/// Ordinary Beginning sets with empty-matching terminals counted as nullable
pub fn compute_parse_beginning(grammar: &Grammar) -> SetMap {
    SetCalculator::new(grammar, Mode::Ordinary)
        .with_empty_terminals()
        .beginning()
}

/// Alt sets of every expression
pub fn compute_alt(grammar: &Grammar, beginning: &SetMap, succeed: &SetMap, mode: Mode) -> SetMap {
    SetCalculator::new(grammar, mode).alt(beginning, succeed)
}

/// Runs the three fixed points over one flattened grammar
#[derive(Debug)]
pub struct SetCalculator<'g> {
    grammar: &'g Grammar,
    mode: Mode,
    order: Vec<ExprId>,
    empty_terminals: bool,
}

impl<'g> SetCalculator<'g> {
    /// Flatten `grammar` for calculation in `mode`
    pub fn new(grammar: &'g Grammar, mode: Mode) -> Self {
        Self {
            grammar,
            mode,
            order: flatten(grammar),
            empty_terminals: false,
        }
    }

    /// Give `ε` to terminals whose pattern matches the empty string
    pub fn with_empty_terminals(mut self) -> Self {
        self.empty_terminals = true;
        self
    }

    /// The flattened expression list, postorder
    pub fn order(&self) -> &[ExprId] {
        &self.order
    }

    /// Beginning, Succeed and Alt in one go
    pub fn analyze(&self) -> GrammarSets {
        let beginning = self.beginning();
        let succeed = self.succeed(&beginning);
        let alt = self.alt(&beginning, &succeed);
        GrammarSets {
            beginning,
            succeed,
            alt,
        }
    }

    /// Beginning fixed point
    pub fn beginning(&self) -> SetMap {
        let mut map = SetMap::with_len(self.grammar.expr_count());
        let _sweeps = fixed_point(&mut map, |map| {
            for &id in &self.order {
                let update = self.beginning_of(map, id);
                map.extend(id, update);
            }
        });
        log_debug!(
            "beginning sets ({:?}) converged after {} sweeps",
            self.mode,
            _sweeps
        );
        map
    }

    fn beginning_of(&self, map: &SetMap, id: ExprId) -> MarkerSet {
        let mut set = MarkerSet::new();
        match self.grammar.expr(id) {
            Expr::Terminal { pattern, .. } => {
                set.insert(Marker::Symbol(id));
                if self.empty_terminals && matches_empty(pattern) {
                    set.insert(Marker::Epsilon);
                }
            }
            Expr::Nonterminal { rule, .. } => {
                set.insert(Marker::Symbol(id));
                if let Some(rule) = rule {
                    if map.nullable(self.grammar.rule(*rule).rhs) {
                        set.insert(Marker::Epsilon);
                    }
                }
            }
            Expr::Sequence { items } => {
                set = first_of(map, items);
            }
            Expr::Choice { alternatives } => {
                for &alt in alternatives {
                    set.extend(map.get(alt).iter().copied());
                }
            }
            Expr::ZeroOrMore { expr } | Expr::Optional { expr } => {
                set.extend(map.get(*expr).iter().copied());
                set.insert(Marker::Epsilon);
            }
            Expr::OneOrMore { expr } | Expr::Grouping { expr } | Expr::Rewriting { expr, .. } => {
                set.extend(map.get(*expr).iter().copied());
            }
            Expr::And { .. } => {
                set.insert(Marker::Epsilon);
            }
            Expr::Not { expr } => {
                if self.mode == Mode::Lake {
                    set.extend(map.get(*expr).iter().copied());
                }
                set.insert(Marker::Epsilon);
            }
            Expr::Colon { left, right } | Expr::ColonNot { left, right } => {
                if self.mode == Mode::Lake {
                    set.extend(map.get(*left).iter().copied());
                }
                set.extend(map.get(*right).iter().copied());
            }
            Expr::Lake { expr, .. } => {
                set.insert(Marker::Symbol(id));
                set.extend(map.get(*expr).iter().copied());
                set.insert(Marker::Epsilon);
            }
        }
        set
    }

    /// Succeed fixed point
    pub fn succeed(&self, beginning: &SetMap) -> SetMap {
        let mut map = SetMap::with_len(self.grammar.expr_count());
        let _sweeps = fixed_point(&mut map, |map| {
            for &id in self.order.iter().rev() {
                self.propagate_succeed(beginning, map, id);
            }
        });
        log_debug!(
            "succeed sets ({:?}) converged after {} sweeps",
            self.mode,
            _sweeps
        );
        map
    }

    fn propagate_succeed(&self, beginning: &SetMap, map: &mut SetMap, id: ExprId) {
        let outer = map.get(id).clone();
        match self.grammar.expr(id) {
            Expr::Nonterminal {
                rule: Some(rule), ..
            } => map.extend(self.grammar.rule(*rule).rhs, outer),
            Expr::Sequence { items } => {
                for (i, &item) in items.iter().enumerate() {
                    let mut follow = first_of(beginning, &items[i + 1..]);
                    if follow.remove(&Marker::Epsilon) {
                        follow.extend(outer.iter().copied());
                    }
                    map.extend(item, follow);
                }
            }
            Expr::Choice { alternatives } => {
                for (i, &alt) in alternatives.iter().enumerate() {
                    map.extend(alt, outer.iter().copied());
                    for &later in &alternatives[i + 1..] {
                        map.extend(alt, without_epsilon(beginning.get(later)));
                    }
                }
            }
            Expr::ZeroOrMore { expr } | Expr::OneOrMore { expr } | Expr::Optional { expr } => {
                map.extend(*expr, outer);
                map.extend(*expr, without_epsilon(beginning.get(id)));
            }
            Expr::Grouping { expr } | Expr::Rewriting { expr, .. } | Expr::Lake { expr, .. } => {
                map.extend(*expr, outer)
            }
            Expr::Colon { left, right } | Expr::ColonNot { left, right } => {
                if self.mode == Mode::Lake {
                    map.extend(*left, outer.iter().copied());
                }
                map.extend(*right, outer);
            }
            Expr::Nonterminal { rule: None, .. }
            | Expr::Terminal { .. }
            | Expr::And { .. }
            | Expr::Not { .. } => {}
        }
    }

    /// Alt fixed point, seeded with the Succeed sets
    pub fn alt(&self, beginning: &SetMap, succeed: &SetMap) -> SetMap {
        let mut map = succeed.clone();
        let _sweeps = fixed_point(&mut map, |map| {
            for &id in self.order.iter().rev() {
                self.propagate_alt(beginning, map, id);
            }
        });
        log_debug!("alt sets ({:?}) converged after {} sweeps", self.mode, _sweeps);
        map
    }

    fn propagate_alt(&self, beginning: &SetMap, map: &mut SetMap, id: ExprId) {
        let outer = map.get(id).clone();
        match self.grammar.expr(id) {
            Expr::Nonterminal {
                rule: Some(rule), ..
            } => map.extend(self.grammar.rule(*rule).rhs, outer),
            Expr::Sequence { items } => {
                for &item in items {
                    map.extend(item, outer.iter().copied());
                    if !beginning.nullable(item) {
                        break;
                    }
                }
            }
            Expr::Choice { alternatives } => {
                for (i, &alt) in alternatives.iter().enumerate() {
                    let mut set = outer.clone();
                    for &later in &alternatives[i + 1..] {
                        set.extend(without_epsilon(beginning.get(later)));
                    }
                    map.extend(alt, set);
                }
            }
            Expr::ZeroOrMore { expr }
            | Expr::OneOrMore { expr }
            | Expr::Optional { expr }
            | Expr::Grouping { expr }
            | Expr::Rewriting { expr, .. }
            | Expr::Lake { expr, .. } => map.extend(*expr, outer),
            Expr::Colon { left, right } | Expr::ColonNot { left, right } => {
                if self.mode == Mode::Lake {
                    map.extend(*left, outer.iter().copied());
                }
                map.extend(*right, outer);
            }
            Expr::Nonterminal { rule: None, .. }
            | Expr::Terminal { .. }
            | Expr::And { .. }
            | Expr::Not { .. } => {}
        }
    }
}

/// Repeat `sweep` until the total set size stops changing; returns the
/// number of sweeps
fn fixed_point(map: &mut SetMap, mut sweep: impl FnMut(&mut SetMap)) -> usize {
    let mut sweeps = 0;
    loop {
        let before = map.total_len();
        sweep(map);
        sweeps += 1;
        if map.total_len() == before {
            return sweeps;
        }
    }
}

/// Beginning of a sequence of operands: `ε` only if all are nullable
fn first_of(map: &SetMap, items: &[ExprId]) -> MarkerSet {
    let mut set = MarkerSet::new();
    for &item in items {
        set.extend(without_epsilon(map.get(item)));
        if !map.nullable(item) {
            return set;
        }
    }
    set.insert(Marker::Epsilon);
    set
}

fn matches_empty(pattern: &str) -> bool {
    regex_cache::get_or_compile_anchored(pattern).map_or(false, |regex| regex.is_match(""))
}

fn without_epsilon(set: &MarkerSet) -> impl Iterator<Item = Marker> + '_ {
    set.iter().copied().filter(|m| *m != Marker::Epsilon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peg::builder::*;

    fn terminal(grammar: &Grammar, source: &str) -> ExprId {
        grammar
            .exprs()
            .find(|(_, e)| matches!(e, Expr::Terminal { source: s, .. } if s == source))
            .map(|(id, _)| id)
            .unwrap()
    }

    fn nonterminals(grammar: &Grammar, symbol: &str) -> Vec<ExprId> {
        grammar
            .exprs()
            .filter(|(_, e)| matches!(e, Expr::Nonterminal { symbol: s, .. } if s == symbol))
            .map(|(id, _)| id)
            .collect()
    }

    fn rhs(grammar: &Grammar, symbol: &str) -> ExprId {
        grammar.rule(grammar.rule_by_symbol(symbol).unwrap()).rhs
    }

    #[test]
    fn test_beginning_left_recursive_rule() {
        let g = GrammarBuilder::new()
            .rule("expr", (nt("expr") >> lit("-") >> nt("num")) | nt("num"))
            .rule("num", class("0-9"))
            .build()
            .unwrap();
        let beg = compute_beginning(&g, Mode::Ordinary);

        let expr_ref = nonterminals(&g, "expr")[0];
        let nums = nonterminals(&g, "num");
        let set = beg.get(rhs(&g, "expr"));
        assert!(set.contains(&Marker::Symbol(expr_ref)));
        for n in nums {
            assert!(set.contains(&Marker::Symbol(n)));
        }
        assert!(!beg.nullable(rhs(&g, "expr")));
        assert!(!set.contains(&Marker::Symbol(terminal(&g, "'-'"))));
    }

    #[test]
    fn test_beginning_nullable_propagates_through_rules() {
        let g = GrammarBuilder::new()
            .rule("s", nt("opt") >> lit("x"))
            .rule("opt", lit("a").star())
            .build()
            .unwrap();
        let beg = compute_beginning(&g, Mode::Ordinary);

        let opt_ref = nonterminals(&g, "opt")[0];
        assert!(beg.nullable(opt_ref));
        let set = beg.get(rhs(&g, "s"));
        assert!(set.contains(&Marker::Symbol(opt_ref)));
        assert!(set.contains(&Marker::Symbol(terminal(&g, "'x'"))));
        assert!(!set.contains(&Marker::Epsilon));
    }

    #[test]
    fn test_beginning_empty_sequence_is_epsilon() {
        let g = GrammarBuilder::new().rule("e", seq([])).build().unwrap();
        let beg = compute_beginning(&g, Mode::Ordinary);
        let expected: MarkerSet = [Marker::Epsilon].into_iter().collect();
        assert_eq!(beg.get(rhs(&g, "e")), &expected);
    }

    #[test]
    fn test_beginning_is_idempotent() {
        let g = GrammarBuilder::new()
            .rule("a", nt("b").opt() >> nt("a") | lit("x"))
            .rule("b", and(lit("y")) >> lit("y"))
            .build()
            .unwrap();
        let first = compute_beginning(&g, Mode::Ordinary);
        let second = compute_beginning(&g, Mode::Ordinary);
        assert_eq!(first, second);
    }

    #[test]
    fn test_lookahead_beginning_by_mode() {
        let g = GrammarBuilder::new()
            .rule("s", not(lit("a")) >> lit("b"))
            .build()
            .unwrap();
        let a = terminal(&g, "'a'");
        let not_expr = g
            .exprs()
            .find(|(_, e)| matches!(e, Expr::Not { .. }))
            .map(|(id, _)| id)
            .unwrap();

        let ordinary = compute_beginning(&g, Mode::Ordinary);
        assert!(!ordinary.get(not_expr).contains(&Marker::Symbol(a)));
        assert!(!ordinary.get(rhs(&g, "s")).contains(&Marker::Symbol(a)));

        let lake = compute_beginning(&g, Mode::Lake);
        assert!(lake.get(not_expr).contains(&Marker::Symbol(a)));
        assert!(lake.get(rhs(&g, "s")).contains(&Marker::Symbol(a)));
    }

    #[test]
    fn test_colon_beginning_by_mode() {
        let g = GrammarBuilder::new()
            .rule("s", colon_not(lit("if"), class("a-z").plus()))
            .build()
            .unwrap();
        let keyword = terminal(&g, "'if'");
        let ordinary = compute_beginning(&g, Mode::Ordinary);
        assert!(!ordinary.get(rhs(&g, "s")).contains(&Marker::Symbol(keyword)));
        let lake = compute_beginning(&g, Mode::Lake);
        assert!(lake.get(rhs(&g, "s")).contains(&Marker::Symbol(keyword)));
    }

    #[test]
    fn test_lake_beginning_contains_itself() {
        let g = GrammarBuilder::new()
            .rule("doc", lake(nt("island")))
            .rule("island", lit("x"))
            .build()
            .unwrap();
        let beg = compute_beginning(&g, Mode::Lake);
        let lake_id = rhs(&g, "doc");
        let set = beg.get(lake_id);
        assert!(set.contains(&Marker::Symbol(lake_id)));
        assert!(set.contains(&Marker::Symbol(nonterminals(&g, "island")[0])));
        assert!(set.contains(&Marker::Epsilon));
    }

    #[test]
    fn test_succeed_skips_nullable_operands() {
        let g = GrammarBuilder::new()
            .rule("s", lit("a") >> lit("b").opt() >> lit("c"))
            .build()
            .unwrap();
        let sets = SetCalculator::new(&g, Mode::Ordinary).analyze();
        let a = terminal(&g, "'a'");
        let b = terminal(&g, "'b'");
        let c = terminal(&g, "'c'");

        let succ_a = sets.succeed.get(a);
        assert!(succ_a.contains(&Marker::Symbol(b)));
        assert!(succ_a.contains(&Marker::Symbol(c)));
        assert!(!succ_a.contains(&Marker::Epsilon));
        assert!(sets.succeed.get(b).contains(&Marker::Symbol(c)));
    }

    #[test]
    fn test_succeed_flows_into_rule_body() {
        let g = GrammarBuilder::new()
            .rule("s", nt("word") >> lit(";"))
            .rule("word", class("a-z").plus())
            .build()
            .unwrap();
        let sets = SetCalculator::new(&g, Mode::Ordinary).analyze();
        let semi = terminal(&g, "';'");
        let class_expr = terminal(&g, "[a-z]");
        assert!(sets.succeed.get(rhs(&g, "word")).contains(&Marker::Symbol(semi)));
        // the repeated class is followed by ';' or by itself
        let succ = sets.succeed.get(class_expr);
        assert!(succ.contains(&Marker::Symbol(semi)));
        assert!(succ.contains(&Marker::Symbol(class_expr)));
    }

    #[test]
    fn test_succeed_of_optional_operand_includes_itself() {
        let g = GrammarBuilder::new()
            .rule("s", lit("a").opt() >> lit("b"))
            .build()
            .unwrap();
        let sets = SetCalculator::new(&g, Mode::Ordinary).analyze();
        let a = terminal(&g, "'a'");
        let b = terminal(&g, "'b'");
        let expected: MarkerSet = [Marker::Symbol(a), Marker::Symbol(b)].into_iter().collect();
        assert_eq!(sets.succeed.get(a), &expected);
    }

    #[test]
    fn test_succeed_of_choice_alternative_includes_later_ones() {
        let g = GrammarBuilder::new()
            .rule("s", (lit("a") | lit("b") | lit("c")) >> lit(";"))
            .build()
            .unwrap();
        let succeed = compute_succeed(&g, &compute_beginning(&g, Mode::Ordinary), Mode::Ordinary);
        let a = terminal(&g, "'a'");
        let b = terminal(&g, "'b'");
        let c = terminal(&g, "'c'");
        let semi = terminal(&g, "';'");

        let expected: MarkerSet = [b, c, semi].into_iter().map(Marker::Symbol).collect();
        assert_eq!(succeed.get(a), &expected);
        let expected: MarkerSet = [c, semi].into_iter().map(Marker::Symbol).collect();
        assert_eq!(succeed.get(b), &expected);
        let expected: MarkerSet = [semi].into_iter().map(Marker::Symbol).collect();
        assert_eq!(succeed.get(c), &expected);
    }

    #[test]
    fn test_empty_matching_terminal_is_nullable_for_parsing() {
        let g = GrammarBuilder::new()
            .rule("s", nt("ws") >> lit("t"))
            .rule("ws", re("[ ]*"))
            .build()
            .unwrap();
        let ws = terminal(&g, "`[ ]*`");
        assert!(!compute_beginning(&g, Mode::Ordinary).nullable(ws));

        let beg = compute_parse_beginning(&g);
        assert!(beg.nullable(ws));
        assert!(beg.nullable(rhs(&g, "ws")));
        assert!(beg
            .get(rhs(&g, "s"))
            .contains(&Marker::Symbol(terminal(&g, "'t'"))));
        assert!(!beg.nullable(rhs(&g, "s")));
    }

    #[test]
    fn test_alt_includes_later_alternatives() {
        let g = GrammarBuilder::new()
            .rule("s", (lit("a") | lit("b") | lit("c")) >> lit(";"))
            .build()
            .unwrap();
        let sets = SetCalculator::new(&g, Mode::Ordinary).analyze();
        let a = terminal(&g, "'a'");
        let b = terminal(&g, "'b'");
        let c = terminal(&g, "'c'");
        let semi = terminal(&g, "';'");

        let alt_a = sets.alt.get(a);
        assert!(alt_a.contains(&Marker::Symbol(b)));
        assert!(alt_a.contains(&Marker::Symbol(c)));
        assert!(alt_a.contains(&Marker::Symbol(semi)));

        let alt_c = sets.alt.get(c);
        assert!(!alt_c.contains(&Marker::Symbol(a)));
        assert!(alt_c.contains(&Marker::Symbol(semi)));
    }

    #[test]
    fn test_alt_contains_succeed() {
        let g = GrammarBuilder::new()
            .rule("s", (nt("x") | lit("y")).star() >> lit("z"))
            .rule("x", lit("x") >> nt("s").opt())
            .build()
            .unwrap();
        let sets = SetCalculator::new(&g, Mode::Ordinary).analyze();
        for id in flatten(&g) {
            assert!(sets.succeed.get(id).is_subset(sets.alt.get(id)));
        }
    }

    #[test]
    fn test_flatten_is_postorder() {
        let g = GrammarBuilder::new()
            .rule("s", lit("a") >> lit("b"))
            .build()
            .unwrap();
        let order = flatten(&g);
        assert_eq!(order.len(), 3);
        assert_eq!(*order.last().unwrap(), rhs(&g, "s"));
    }
}
