//! Pika parser
//!
//! Expression-level dynamic programming from the end of the input towards the
//! start (Hutchison, "Pika parsing: reformulating packrat parsing as a dynamic
//! programming algorithm solves the left recursion and error recovery
//! problems", 2020).
//!
//! Every expression gets a memo entry per position. At each position an
//! agenda, ordered by expression index, is seeded with the expressions that
//! can match without help from an operand at that position: terminals,
//! `e*`, `e?`, `!e`, the empty sequence, and lakes. When an entry changes,
//! every expression that may consult it at the same position is queued again:
//!
//! - a sequence, for its operands up to and including the first non-nullable
//!   one;
//! - a choice, for every alternative;
//! - wrappers, lookaheads and colon expressions, for their operands;
//! - every nonterminal referencing a rule, for that rule's right-hand side;
//! - a lake, for its island and water.
//!
//! Indices come from a postorder walk starting at the top-level rules and
//! following nonterminals, so operands are evaluated before the expressions
//! that contain them. The walk's back edges mark cycle heads, the expressions
//! where left recursion re-enters itself. A head entry only ever grows (first
//! match, or strictly longer), which is what ends the growth; every other
//! entry follows its operands, and is replaced or dropped when a
//! re-evaluation gives a different answer.
//!
//! Entries are computed in a fresh binding scope. When a memoized match
//! conflicts with a binding of the caller, the expression is evaluated again
//! in the caller's scope, so an ordered choice can still fall through to a
//! later alternative.

use crate::peg::cache::MemoTable;
use crate::peg::error::ParseError;
use crate::peg::eval::{self, EvalContext, Evaluate, MatchNode, MatchRef, Origin, Replay};
use crate::peg::grammar::{Expr, ExprId, Grammar, RuleId};
use crate::peg::parser::ParserConfig;
use crate::peg::sets::{compute_parse_beginning, SetMap};
use crate::peg::tree::ParseTree;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;

/// Scheduling data derived from the grammar
#[derive(Debug)]
struct Agenda {
    parents: Vec<Vec<ExprId>>,
    index: Vec<usize>,
    heads: Vec<bool>,
    seeds: Vec<ExprId>,
}

impl Agenda {
    fn new(grammar: &Grammar, beginning: &SetMap) -> Self {
        let count = grammar.expr_count();
        let (order, heads) = index_order(grammar);
        let mut index = vec![usize::MAX; count];
        for (i, id) in order.iter().enumerate() {
            index[id.index()] = i;
        }

        let mut parents: Vec<Vec<ExprId>> = vec![Vec::new(); count];
        let mut link = |operand: ExprId, parent: ExprId| {
            let list = &mut parents[operand.index()];
            if !list.contains(&parent) {
                list.push(parent);
            }
        };
        for &id in &order {
            match grammar.expr(id) {
                Expr::Nonterminal {
                    rule: Some(rule), ..
                } => link(grammar.rule(*rule).rhs, id),
                Expr::Nonterminal { rule: None, .. } | Expr::Terminal { .. } => {}
                Expr::Sequence { items } => {
                    for &item in items {
                        link(item, id);
                        if !beginning.nullable(item) {
                            break;
                        }
                    }
                }
                other => {
                    for operand in other.operands() {
                        link(operand, id);
                    }
                }
            }
        }

        let seeds = order
            .iter()
            .copied()
            .filter(|&id| match grammar.expr(id) {
                Expr::Terminal { .. }
                | Expr::ZeroOrMore { .. }
                | Expr::Optional { .. }
                | Expr::Not { .. }
                | Expr::Lake { .. } => true,
                Expr::Sequence { items } => items.is_empty(),
                _ => false,
            })
            .collect();

        Self {
            parents,
            index,
            heads,
            seeds,
        }
    }
}

/// Postorder over expressions, starting from the top-level rules, then the
/// remaining rules; nonterminals are followed into their rule bodies
///
/// Also returns the cycle heads: expressions reached again while still on
/// the walk's stack.
fn index_order(grammar: &Grammar) -> (Vec<ExprId>, Vec<bool>) {
    let mut order = Vec::with_capacity(grammar.expr_count());
    let mut visited = vec![false; grammar.expr_count()];
    let mut on_stack = vec![false; grammar.expr_count()];
    let mut heads = vec![false; grammar.expr_count()];
    let roots = grammar
        .top_level()
        .into_iter()
        .chain(grammar.rules().map(|(id, _)| id))
        .map(|rule| grammar.rule(rule).rhs)
        .collect::<Vec<_>>();

    for root in roots {
        if visited[root.index()] {
            continue;
        }
        visited[root.index()] = true;
        on_stack[root.index()] = true;
        let mut stack: Vec<(ExprId, Vec<ExprId>, usize)> =
            vec![(root, successors(grammar, root), 0)];
        while let Some(top) = stack.last_mut() {
            match top.1.get(top.2).copied() {
                Some(next) => {
                    top.2 += 1;
                    if on_stack[next.index()] {
                        heads[next.index()] = true;
                    } else if !visited[next.index()] {
                        visited[next.index()] = true;
                        on_stack[next.index()] = true;
                        stack.push((next, successors(grammar, next), 0));
                    }
                }
                None => {
                    on_stack[top.0.index()] = false;
                    order.push(top.0);
                    stack.pop();
                }
            }
        }
    }
    (order, heads)
}

fn successors(grammar: &Grammar, id: ExprId) -> Vec<ExprId> {
    match grammar.expr(id) {
        Expr::Nonterminal {
            rule: Some(rule), ..
        } => vec![grammar.rule(*rule).rhs],
        other => other.operands(),
    }
}

/// State of one pika parse
pub(crate) struct PikaSession<'g> {
    ctx: EvalContext<'g>,
    config: ParserConfig,
    agenda: Agenda,
    memo: MemoTable<ExprId, MatchRef>,
}

impl<'g> PikaSession<'g> {
    pub(crate) fn new(
        grammar: &'g Grammar,
        input: &'g str,
        config: &ParserConfig,
    ) -> Result<Self, ParseError> {
        let ctx = EvalContext::new(grammar, input, config)?;
        let beginning = compute_parse_beginning(grammar);
        Ok(Self {
            ctx,
            config: config.clone(),
            agenda: Agenda::new(grammar, &beginning),
            memo: MemoTable::for_input(input.len()),
        })
    }

    pub(crate) fn run(
        mut self,
        start: RuleId,
        require_full: bool,
    ) -> Result<ParseTree, ParseError> {
        let grammar = self.ctx.grammar;
        let input = self.ctx.input;
        log_debug!(
            "pika: parsing {} bytes from '{}', {} seed expressions",
            input.len(),
            grammar.rule(start).symbol,
            self.agenda.seeds.len()
        );

        let mut queue: BinaryHeap<Reverse<(usize, ExprId)>> = BinaryHeap::new();
        let mut queued = vec![false; grammar.expr_count()];

        for pos in (0..=input.len()).rev() {
            if !input.is_char_boundary(pos) {
                continue;
            }
            for &seed in &self.agenda.seeds {
                queued[seed.index()] = true;
                queue.push(Reverse((self.agenda.index[seed.index()], seed)));
            }
            while let Some(Reverse((_, expr))) = queue.pop() {
                queued[expr.index()] = false;
                let found = self.step(expr, pos);
                if !self.store(pos, expr, found) {
                    continue;
                }
                for &parent in &self.agenda.parents[expr.index()] {
                    if !queued[parent.index()] {
                        queued[parent.index()] = true;
                        queue.push(Reverse((self.agenda.index[parent.index()], parent)));
                    }
                }
            }
            if let Some(err) = self.ctx.take_abort() {
                return Err(err);
            }
        }

        log_debug!("pika: {} table entries", self.memo.len());

        let result = self.memo.peek(0, grammar.rule(start).rhs).cloned();
        let memo = &self.memo;
        let lookup =
            move |rule: RuleId, pos: usize| memo.peek(pos, grammar.rule(rule).rhs).cloned();
        let config = &self.config;
        eval::finish(grammar, input, start, result, require_full, |min_offset| {
            Replay::new(EvalContext::new(grammar, input, config)?, &lookup)
                .diagnose(start, min_offset)
        })
    }

    /// Evaluate one expression at `pos` from its operands' entries
    fn step(&mut self, expr: ExprId, pos: usize) -> Option<MatchRef> {
        self.ctx.push_scope();
        let result = self.eval(expr, pos);
        self.ctx.pop_scope();
        result
    }

    /// Record a re-evaluation; true if the entry changed
    fn store(&mut self, pos: usize, expr: ExprId, found: Option<MatchRef>) -> bool {
        let head = self.agenda.heads[expr.index()];
        let changed = match (self.memo.peek(pos, expr), &found) {
            (None, None) => false,
            (None, Some(_)) => true,
            (Some(old), found) if head => found.as_ref().map_or(false, |m| m.next > old.next),
            (Some(_), None) => true,
            (Some(old), Some(new)) => !same_match(old, new),
        };
        if changed {
            match found {
                Some(m) => {
                    self.memo.insert(pos, expr, m);
                }
                None => {
                    self.memo.remove(pos, expr);
                }
            }
        }
        changed
    }

    /// Re-establish the bindings a memoized match made in the current rule
    /// scope; false if one conflicts with an earlier binding
    fn replay_bindings(&mut self, m: &MatchNode) -> bool {
        let grammar = self.ctx.grammar;
        let input = self.ctx.input;
        let mut stack = vec![m];
        while let Some(node) = stack.pop() {
            match node.origin {
                Origin::Rule {
                    site: Some(site), ..
                } => {
                    if let Expr::Nonterminal {
                        binding: Some(name),
                        ..
                    } = grammar.expr(site)
                    {
                        if !self.ctx.bind(name, &input[node.start..node.end]) {
                            return false;
                        }
                    }
                    // bindings below belong to the callee's scope
                    continue;
                }
                Origin::Expr(id)
                    if matches!(grammar.expr(id), Expr::And { .. } | Expr::Not { .. }) =>
                {
                    continue;
                }
                _ => {}
            }
            stack.extend(node.children.iter().rev().map(|c| c.as_ref()));
        }
        true
    }
}

impl<'g> Evaluate<'g> for PikaSession<'g> {
    fn ctx(&mut self) -> &mut EvalContext<'g> {
        &mut self.ctx
    }

    fn call_rule(&mut self, rule: RuleId, pos: usize) -> Option<MatchRef> {
        let rhs = self.ctx.grammar.rule(rule).rhs;
        self.memo.peek(pos, rhs).cloned()
    }

    /// Operands are answered from the table; a memoized match whose
    /// bindings conflict with the caller's is evaluated again in the
    /// caller's scope
    fn sub(&mut self, expr: ExprId, pos: usize) -> Option<MatchRef> {
        let found = self.memo.peek(pos, expr).cloned()?;
        let mark = self.ctx.binding_mark();
        if self.replay_bindings(&found) {
            return Some(found);
        }
        self.ctx.reset_bindings(mark);
        self.eval(expr, pos)
    }
}

/// Same node over the same operand entries
fn same_match(old: &MatchNode, new: &MatchNode) -> bool {
    old.origin == new.origin
        && old.start == new.start
        && old.end == new.end
        && old.next == new.next
        && old.children.len() == new.children.len()
        && old
            .children
            .iter()
            .zip(&new.children)
            .all(|(a, b)| Rc::ptr_eq(a, b))
}

/// Parse the whole input with the pika strategy and the default configuration
pub fn parse(grammar: &Grammar, input: &str, start: Option<&str>) -> Result<ParseTree, ParseError> {
    parse_with_config(grammar, input, start, &ParserConfig::default())
}

/// Parse the whole input with the pika strategy
pub fn parse_with_config(
    grammar: &Grammar,
    input: &str,
    start: Option<&str>,
    config: &ParserConfig,
) -> Result<ParseTree, ParseError> {
    run(grammar, input, start, config, true)
}

pub(crate) fn run(
    grammar: &Grammar,
    input: &str,
    start: Option<&str>,
    config: &ParserConfig,
    require_full: bool,
) -> Result<ParseTree, ParseError> {
    let start = eval::start_rule(grammar, start)?;
    PikaSession::new(grammar, input, config)?.run(start, require_full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peg::builder::*;
    use crate::peg::tree::NodeKind;

    fn minus_grammar() -> Grammar {
        GrammarBuilder::new()
            .rule("expr", (nt("expr") >> lit("-") >> nt("num")) | nt("num"))
            .rule("num", class("0-9"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_index_order_puts_operands_first() {
        let g = minus_grammar();
        let (order, _) = index_order(&g);
        let position = |id: ExprId| order.iter().position(|e| *e == id).unwrap();
        for &id in &order {
            if let Expr::Nonterminal { .. } | Expr::Terminal { .. } = g.expr(id) {
                continue;
            }
            for operand in g.expr(id).operands() {
                assert!(position(operand) < position(id));
            }
        }
        assert_eq!(order.len(), g.expr_count());
    }

    #[test]
    fn test_index_order_marks_left_recursive_body_as_head() {
        let g = minus_grammar();
        let (_, heads) = index_order(&g);
        let rhs = g.rule(g.rule_by_symbol("expr").unwrap()).rhs;
        assert!(heads[rhs.index()]);
        assert_eq!(heads.iter().filter(|h| **h).count(), 1);
    }

    #[test]
    fn test_direct_left_recursion() {
        let tree = parse(&minus_grammar(), "1-1-1", None).unwrap();
        assert_eq!(tree.node(tree.root()).range.end.offset, 5);
        let choice = tree.children(tree.root())[0];
        assert_eq!(tree.node(choice).kind, NodeKind::OrderedChoice { index: 0 });
    }

    #[test]
    fn test_indirect_left_recursion() {
        let g = GrammarBuilder::new()
            .rule("expr", (nt("x") >> lit("-") >> nt("num")) | nt("num"))
            .rule("x", nt("expr"))
            .rule("num", class("0-9"))
            .build()
            .unwrap();
        let tree = parse(&g, "1-1-1", None).unwrap();
        assert_eq!(tree.node(tree.root()).range.end.offset, 5);
    }

    #[test]
    fn test_left_recursion_through_choice_in_other_rule() {
        let g = GrammarBuilder::new()
            .rule(
                "x",
                (nt("expr") >> lit("[") >> nt("number") >> lit("]")) | nt("expr"),
            )
            .rule("expr", (nt("x") >> lit("-") >> nt("number")) | nt("number"))
            .rule("number", class("0-9").plus())
            .build()
            .unwrap();
        let tree = parse(&g, "1-1[2]-1", None).unwrap();
        assert_eq!(tree.node(tree.root()).range.end.offset, 8);
        assert!(parse(&g, "1[2]-1-1", None).is_ok());
        assert!(parse(&g, "1-1[2", None).is_err());
    }

    #[test]
    fn test_leading_empty_matching_terminal() {
        let g = GrammarBuilder::new()
            .rule("s", nt("ws") >> nt("t"))
            .rule("ws", re("[ ]*"))
            .rule("t", lit("b"))
            .build()
            .unwrap();
        assert!(parse(&g, "b", None).is_ok());
        assert!(parse(&g, "   b", None).is_ok());
        assert!(parse(&g, " ", None).is_err());
    }

    #[test]
    fn test_ordered_choice_prefix() {
        let g = GrammarBuilder::new()
            .rule("s", lit("a") | lit("ab"))
            .build()
            .unwrap();
        let tree = run(&g, "ab", None, &ParserConfig::default(), false).unwrap();
        assert_eq!(tree.text(tree.root()), "a");
    }

    #[test]
    fn test_back_reference() {
        let g = GrammarBuilder::new()
            .rule("s", bind("x", "word") >> lit(" ") >> bind("x", "word"))
            .rule("word", class("a-z").plus())
            .build()
            .unwrap();
        assert!(parse(&g, "abc abc", None).is_ok());
        assert!(parse(&g, "abc abd", None).is_err());
    }

    #[test]
    fn test_binding_inside_choice_uses_callers_scope() {
        let g = GrammarBuilder::new()
            .rule(
                "s",
                bind("x", "w") >> lit(" ") >> (bind("x", "w") | (nt("w") >> lit("!"))),
            )
            .rule("w", class("a-z").plus())
            .build()
            .unwrap();
        assert!(parse(&g, "abc abc", None).is_ok());
        assert!(parse(&g, "abc abd!", None).is_ok());
        assert!(parse(&g, "abc abd", None).is_err());
    }

    #[test]
    fn test_not_lookahead() {
        let g = GrammarBuilder::new()
            .rule("s", (not(lit("x")) >> any()).plus())
            .build()
            .unwrap();
        assert!(parse(&g, "abc", None).is_ok());
        assert!(parse(&g, "abx", None).is_err());
    }

    #[test]
    fn test_multibyte_input() {
        let g = GrammarBuilder::new()
            .rule("s", any().star())
            .build()
            .unwrap();
        let tree = parse(&g, "héllo", None).unwrap();
        assert_eq!(tree.text(tree.root()), "héllo");
    }

    #[test]
    fn test_failure_reports_deepest_offset() {
        let g = GrammarBuilder::new()
            .rule("s", nt("num") >> lit("-") >> nt("num"))
            .rule("num", class("0-9"))
            .build()
            .unwrap();
        match parse(&g, "1-x", None).unwrap_err() {
            ParseError::Failed(diagnostic) => {
                assert_eq!(diagnostic.offset, 2);
                assert_eq!(diagnostic.expected, vec!["[0-9]".to_string()]);
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }
}
