//! Shared expression evaluator
//!
//! The three strategies differ only in how a rule call (and, for pika, an
//! operand) is answered. Everything else - operator semantics, binding
//! scopes, terminal matching, deepest-failure tracking, the recursion guard -
//! lives here, in [`EvalContext`] and the default methods of [`Evaluate`].
//!
//! Matches are built as reference-counted [`MatchNode`]s so memo tables can
//! share sub-results freely; the final tree is copied out into a strict
//! [`ParseTree`] arena once parsing is done.

use crate::peg::error::{Diagnostic, ParseError, StackFrame};
use crate::peg::grammar::{Expr, ExprId, Grammar, RuleId};
use crate::peg::parser::ParserConfig;
use crate::peg::printer;
use crate::peg::regex_cache;
use crate::peg::source_location::Position;
use crate::peg::tree::{self, ParseTree};
use hashbrown::HashSet;
use regex::Regex;
use std::rc::Rc;

pub(crate) type MatchRef = Rc<MatchNode>;

/// What produced a match node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// The expression itself
    Expr(ExprId),
    /// A rule application; `site` is the invoking nonterminal (None at the root)
    Rule { rule: RuleId, site: Option<ExprId> },
    /// An ordered choice that took alternative `index`
    Choice { expr: ExprId, index: usize },
}

#[derive(Debug)]
pub(crate) struct MatchNode {
    pub origin: Origin,
    pub start: usize,
    pub end: usize,
    /// Position after the match; equals `start` for positive lookahead
    pub next: usize,
    pub children: Vec<MatchRef>,
}

impl MatchNode {
    pub fn new(origin: Origin, start: usize, end: usize, children: Vec<MatchRef>) -> MatchRef {
        Rc::new(Self {
            origin,
            start,
            end,
            next: end,
            children,
        })
    }

    /// Node spanning `start..end` that consumes nothing
    pub fn lookahead(
        origin: Origin,
        start: usize,
        end: usize,
        children: Vec<MatchRef>,
    ) -> MatchRef {
        Rc::new(Self {
            origin,
            start,
            end,
            next: start,
            children,
        })
    }

    /// Single-child node covering exactly its child
    pub fn wrap(origin: Origin, child: MatchRef) -> MatchRef {
        Rc::new(Self {
            origin,
            start: child.start,
            end: child.end,
            next: child.next,
            children: vec![child],
        })
    }

    /// Rule application around a rule body match
    pub fn rule(rule: RuleId, site: Option<ExprId>, body: MatchRef) -> MatchRef {
        Self::wrap(Origin::Rule { rule, site }, body)
    }
}

/// Per-session evaluation state
pub(crate) struct EvalContext<'g> {
    pub grammar: &'g Grammar,
    pub input: &'g str,
    terminals: Vec<Option<Regex>>,
    scopes: Vec<Vec<(&'g str, &'g str)>>,
    trail: Vec<ExprId>,
    farthest: Option<usize>,
    farthest_trail: Vec<ExprId>,
    expected: Vec<ExprId>,
    depth: usize,
    max_depth: usize,
    aborted: Option<ParseError>,
}

impl<'g> EvalContext<'g> {
    /// Validate the grammar and input and compile the terminals
    pub fn new(
        grammar: &'g Grammar,
        input: &'g str,
        config: &ParserConfig,
    ) -> Result<Self, ParseError> {
        if input.len() > config.max_input_size {
            return Err(ParseError::InputTooLarge {
                input_size: input.len(),
                max_size: config.max_input_size,
            });
        }
        if grammar.rule_count() == 0 {
            return Err(ParseError::InvalidGrammar {
                reason: "grammar has no rules".to_string(),
            });
        }
        if grammar.has_unrewritten_lakes() {
            return Err(ParseError::InvalidGrammar {
                reason: "grammar contains lakes that have not been rewritten".to_string(),
            });
        }

        let mut terminals = Vec::with_capacity(grammar.expr_count());
        for (_, expr) in grammar.exprs() {
            let compiled = match expr {
                Expr::Terminal { pattern, .. } => Some(
                    regex_cache::get_or_compile_anchored(pattern).map_err(|e| {
                        ParseError::InvalidGrammar {
                            reason: format!("invalid terminal pattern `{}`: {}", pattern, e),
                        }
                    })?,
                ),
                _ => None,
            };
            terminals.push(compiled);
        }

        Ok(Self {
            grammar,
            input,
            terminals,
            scopes: Vec::new(),
            trail: Vec::new(),
            farthest: None,
            farthest_trail: Vec::new(),
            expected: Vec::new(),
            depth: 0,
            max_depth: config.max_recursion_depth,
            aborted: None,
        })
    }

    // ------------------------------------------------------------------
    // Recursion guard and expression trail
    // ------------------------------------------------------------------

    /// Enter an expression; false once the parse has been aborted
    pub fn enter(&mut self, id: ExprId) -> bool {
        if self.aborted.is_some() {
            return false;
        }
        if self.max_depth > 0 && self.depth >= self.max_depth {
            log_debug!("recursion limit {} reached at {}", self.max_depth, id);
            self.aborted = Some(ParseError::RecursionLimitExceeded {
                depth: self.depth + 1,
                max_depth: self.max_depth,
            });
            return false;
        }
        self.depth += 1;
        self.trail.push(id);
        true
    }

    /// Leave the expression entered last
    pub fn leave(&mut self) {
        self.depth -= 1;
        self.trail.pop();
    }

    /// The error that aborted the parse, if any
    pub fn take_abort(&mut self) -> Option<ParseError> {
        self.aborted.take()
    }

    // ------------------------------------------------------------------
    // Terminals
    // ------------------------------------------------------------------

    pub fn match_terminal(&mut self, id: ExprId, pos: usize) -> Option<MatchRef> {
        let input = self.input;
        let found = self.terminals[id.index()]
            .as_ref()
            .and_then(|regex| regex.find(&input[pos..]))
            .map(|m| m.end());
        self.note_terminal(id, pos, found.is_some());
        let len = found?;
        Some(MatchNode::new(Origin::Expr(id), pos, pos + len, Vec::new()))
    }

    fn note_terminal(&mut self, id: ExprId, pos: usize, matched: bool) {
        match self.farthest {
            Some(farthest) if pos < farthest => return,
            Some(farthest) if pos == farthest => {}
            _ => {
                self.farthest = Some(pos);
                self.farthest_trail.clone_from(&self.trail);
                self.expected.clear();
            }
        }
        if !matched && !self.expected.contains(&id) {
            self.expected.push(id);
        }
    }

    /// Deepest failure, reported no earlier than `min_offset`
    pub fn diagnostic(&self, min_offset: usize) -> Diagnostic {
        let farthest = self.farthest.unwrap_or(0);
        let (offset, expected, trail): (usize, &[ExprId], &[ExprId]) = if farthest < min_offset {
            (min_offset, &[], &[])
        } else {
            (farthest, &self.expected, &self.farthest_trail)
        };
        Diagnostic {
            offset,
            position: Position::from_offset(self.input, offset),
            expected: expected
                .iter()
                .map(|&id| printer::describe(self.grammar, id))
                .collect(),
            stack: trail
                .iter()
                .map(|&expr| StackFrame {
                    expr,
                    description: printer::describe(self.grammar, expr),
                })
                .collect(),
        }
    }

    // ------------------------------------------------------------------
    // Binding scopes
    // ------------------------------------------------------------------

    pub fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn binding_mark(&self) -> usize {
        self.scopes.last().map_or(0, Vec::len)
    }

    pub fn reset_bindings(&mut self, mark: usize) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.truncate(mark);
        }
    }

    /// Record `name` = `text` in the innermost scope, or check it against
    /// the text recorded earlier. Surrounding whitespace is ignored.
    pub fn bind(&mut self, name: &'g str, text: &'g str) -> bool {
        let text = text.trim();
        let Some(scope) = self.scopes.last_mut() else {
            return true;
        };
        match scope.iter().find(|(bound, _)| *bound == name) {
            Some((_, earlier)) => *earlier == text,
            None => {
                scope.push((name, text));
                true
            }
        }
    }
}

/// Resolve the start rule of a parse
pub(crate) fn start_rule(grammar: &Grammar, start: Option<&str>) -> Result<RuleId, ParseError> {
    grammar
        .start_rule(start)
        .ok_or_else(|| ParseError::InvalidGrammar {
            reason: match start {
                Some(symbol) => format!("unknown start symbol '{}'", symbol),
                None => "grammar has no rules".to_string(),
            },
        })
}

/// Operator semantics shared by every strategy
pub(crate) trait Evaluate<'g> {
    fn ctx(&mut self) -> &mut EvalContext<'g>;

    /// Answer a rule call with the rule body's match at `pos`
    fn call_rule(&mut self, rule: RuleId, pos: usize) -> Option<MatchRef>;

    /// Evaluate an operand
    fn sub(&mut self, expr: ExprId, pos: usize) -> Option<MatchRef> {
        self.eval(expr, pos)
    }

    /// Evaluate one expression, discarding its bindings on failure
    fn eval(&mut self, id: ExprId, pos: usize) -> Option<MatchRef> {
        if !self.ctx().enter(id) {
            return None;
        }
        let mark = self.ctx().binding_mark();
        let result = self.eval_expr(id, pos);
        if result.is_none() {
            self.ctx().reset_bindings(mark);
        }
        self.ctx().leave();
        result
    }

    /// Evaluate a rule body in a fresh binding scope
    fn eval_rule_body(&mut self, rule: RuleId, pos: usize) -> Option<MatchRef> {
        let rhs = self.ctx().grammar.rule(rule).rhs;
        self.ctx().push_scope();
        let result = self.sub(rhs, pos);
        self.ctx().pop_scope();
        result
    }

    fn eval_expr(&mut self, id: ExprId, pos: usize) -> Option<MatchRef> {
        let grammar = self.ctx().grammar;
        let input = self.ctx().input;
        match grammar.expr(id) {
            Expr::Nonterminal { rule, binding, .. } => {
                // Unresolved island symbols never match
                let rule = (*rule)?;
                let body = self.call_rule(rule, pos)?;
                if let Some(name) = binding.as_deref() {
                    if !self.ctx().bind(name, &input[body.start..body.end]) {
                        return None;
                    }
                }
                Some(MatchNode::rule(rule, Some(id), body))
            }
            Expr::Terminal { .. } => self.ctx().match_terminal(id, pos),
            Expr::Sequence { items } => {
                let mut children = Vec::with_capacity(items.len());
                let mut at = pos;
                for &item in items {
                    let m = self.sub(item, at)?;
                    at = m.next;
                    children.push(m);
                }
                Some(MatchNode::new(Origin::Expr(id), pos, at, children))
            }
            Expr::Choice { alternatives } => {
                for (index, &alt) in alternatives.iter().enumerate() {
                    if let Some(m) = self.sub(alt, pos) {
                        return Some(MatchNode::wrap(Origin::Choice { expr: id, index }, m));
                    }
                }
                None
            }
            Expr::ZeroOrMore { expr } => {
                let children = self.repeat(*expr, pos);
                let end = children.last().map_or(pos, |m| m.next);
                Some(MatchNode::new(Origin::Expr(id), pos, end, children))
            }
            Expr::OneOrMore { expr } => {
                let children = self.repeat(*expr, pos);
                let end = children.last()?.next;
                Some(MatchNode::new(Origin::Expr(id), pos, end, children))
            }
            Expr::Optional { expr } => Some(match self.sub(*expr, pos) {
                Some(m) => MatchNode::wrap(Origin::Expr(id), m),
                None => MatchNode::new(Origin::Expr(id), pos, pos, Vec::new()),
            }),
            Expr::And { expr } => {
                let m = self.lookahead(*expr, pos)?;
                let end = m.end;
                Some(MatchNode::lookahead(Origin::Expr(id), pos, end, vec![m]))
            }
            Expr::Not { expr } => match self.lookahead(*expr, pos) {
                Some(_) => None,
                None => Some(MatchNode::new(Origin::Expr(id), pos, pos, Vec::new())),
            },
            Expr::Grouping { expr } | Expr::Rewriting { expr, .. } => self
                .sub(*expr, pos)
                .map(|m| MatchNode::wrap(Origin::Expr(id), m)),
            Expr::Colon { left, right } => {
                let r = self.sub(*right, pos)?;
                let l = self.sub(*left, pos)?;
                if l.next != r.next {
                    return None;
                }
                let (end, next) = (r.end, r.next);
                Some(Rc::new(MatchNode {
                    origin: Origin::Expr(id),
                    start: pos,
                    end,
                    next,
                    children: vec![l, r],
                }))
            }
            Expr::ColonNot { left, right } => {
                let r = self.sub(*right, pos)?;
                if let Some(l) = self.lookahead(*left, pos) {
                    if l.next == r.next {
                        return None;
                    }
                }
                Some(MatchNode::wrap(Origin::Expr(id), r))
            }
            Expr::Lake { expr, water } => {
                let water = water.as_ref()?.water;
                let mut islands = Vec::new();
                let mut at = pos;
                loop {
                    if let Some(island) = self.sub(*expr, at) {
                        if island.next > at {
                            at = island.next;
                            islands.push(island);
                            continue;
                        }
                    }
                    match self.sub(water, at) {
                        Some(w) if w.next > at => at = w.next,
                        _ => break,
                    }
                }
                Some(MatchNode::new(Origin::Expr(id), pos, at, islands))
            }
        }
    }

    /// Evaluate without keeping any bindings made
    fn lookahead(&mut self, expr: ExprId, pos: usize) -> Option<MatchRef> {
        let mark = self.ctx().binding_mark();
        let result = self.sub(expr, pos);
        self.ctx().reset_bindings(mark);
        result
    }

    /// Greedy repetition; stops at the first match that consumes nothing
    fn repeat(&mut self, expr: ExprId, pos: usize) -> Vec<MatchRef> {
        let mut children = Vec::new();
        let mut at = pos;
        while let Some(m) = self.sub(expr, at) {
            if m.next == at {
                if children.is_empty() {
                    children.push(m);
                }
                break;
            }
            at = m.next;
            children.push(m);
        }
        children
    }
}

/// Turn the start rule's outcome into a tree or an error
pub(crate) fn finish(
    grammar: &Grammar,
    input: &str,
    start: RuleId,
    result: Option<MatchRef>,
    require_full: bool,
    diagnose: impl FnOnce(usize) -> Result<Diagnostic, ParseError>,
) -> Result<ParseTree, ParseError> {
    match result {
        None => Err(ParseError::Failed(diagnose(0)?)),
        Some(body) if require_full && body.next < input.len() => Err(ParseError::Incomplete {
            consumed: body.next,
            diagnostic: diagnose(body.next)?,
        }),
        Some(body) => Ok(tree::build(
            grammar,
            input,
            &MatchNode::rule(start, None, body),
        )),
    }
}

/// Top-down re-evaluation over a filled memo table, used to recover
/// deepest-failure diagnostics for the table-driven strategies
///
/// Each `(rule, position)` is expanded once; repeated calls are answered
/// from the table.
pub(crate) struct Replay<'g, 'a> {
    ctx: EvalContext<'g>,
    expanded: HashSet<(RuleId, usize)>,
    lookup: &'a dyn Fn(RuleId, usize) -> Option<MatchRef>,
}

impl<'g, 'a> Replay<'g, 'a> {
    pub fn new(
        ctx: EvalContext<'g>,
        lookup: &'a dyn Fn(RuleId, usize) -> Option<MatchRef>,
    ) -> Self {
        Self {
            ctx,
            expanded: HashSet::new(),
            lookup,
        }
    }

    /// Replay the start rule and report the deepest failure
    pub fn diagnose(mut self, start: RuleId, min_offset: usize) -> Result<Diagnostic, ParseError> {
        self.call_rule(start, 0);
        if let Some(err) = self.ctx.take_abort() {
            return Err(err);
        }
        Ok(self.ctx.diagnostic(min_offset))
    }
}

impl<'g, 'a> Evaluate<'g> for Replay<'g, 'a> {
    fn ctx(&mut self) -> &mut EvalContext<'g> {
        &mut self.ctx
    }

    fn call_rule(&mut self, rule: RuleId, pos: usize) -> Option<MatchRef> {
        if self.expanded.insert((rule, pos)) {
            self.eval_rule_body(rule, pos)
        } else {
            (self.lookup)(rule, pos)
        }
    }
}
