//! Packrat interpreter with left recursion
//!
//! Recursive descent with a memo table per `(rule, position)`, extended with
//! the grow-the-seed algorithm of Warth, Douglass and Millstein ("Packrat
//! Parsers Can Support Left Recursion", 2008):
//!
//! 1. A rule call first stores an LR record (seed = failure) in the memo.
//! 2. A recursive call that hits the LR record marks it as left recursive,
//!    installs a head for the rule, and records every rule on the LR stack
//!    between the two calls as involved.
//! 3. When the outermost call returns with a seed, the body is re-evaluated
//!    with the seed in the memo. Each round that consumes more input becomes
//!    the new seed. Growth stops at the first round that fails or consumes
//!    less. A round that consumes exactly as much replaces the stored result
//!    and then stops.
//!
//! While a head is growing at some position, calls of rules involved in it
//! are re-evaluated once per round (the head's eval set) instead of being
//! answered from stale memo entries, and rules not involved fail outright.

use crate::peg::cache::MemoTable;
use crate::peg::error::ParseError;
use crate::peg::eval::{self, EvalContext, Evaluate, MatchRef};
use crate::peg::grammar::{Grammar, RuleId};
use crate::peg::parser::ParserConfig;
use crate::peg::tree::ParseTree;
use ahash::AHashSet;
use hashbrown::HashMap;

type LrId = usize;
type HeadId = usize;

#[derive(Debug)]
struct LrRecord {
    seed: Option<MatchRef>,
    rule: RuleId,
    head: Option<HeadId>,
}

#[derive(Debug)]
struct Head {
    rule: RuleId,
    involved: AHashSet<RuleId>,
    eval: AHashSet<RuleId>,
}

#[derive(Debug, Clone)]
enum MemoEntry {
    /// Call in progress
    Lr(LrId),
    /// Finished (None = failed)
    Done(Option<MatchRef>),
}

/// State of one packrat parse
pub(crate) struct PackratSession<'g> {
    ctx: EvalContext<'g>,
    memo: MemoTable<RuleId, MemoEntry>,
    lrs: Vec<LrRecord>,
    lr_stack: Vec<LrId>,
    heads: Vec<Head>,
    head_at: HashMap<usize, HeadId>,
}

impl<'g> PackratSession<'g> {
    pub(crate) fn new(
        grammar: &'g Grammar,
        input: &'g str,
        config: &ParserConfig,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            ctx: EvalContext::new(grammar, input, config)?,
            memo: MemoTable::for_input(input.len()),
            lrs: Vec::new(),
            lr_stack: Vec::new(),
            heads: Vec::new(),
            head_at: HashMap::new(),
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
            "packrat: parsing {} bytes from '{}'",
            input.len(),
            grammar.rule(start).symbol
        );

        let result = self.apply_rule(start, 0);
        if let Some(err) = self.ctx.take_abort() {
            return Err(err);
        }

        log_debug!(
            "packrat: {} memo entries, {:.1}% hit rate, {} LR heads",
            self.memo.len(),
            self.memo.stats().2 * 100.0,
            self.heads.len()
        );

        let ctx = &self.ctx;
        eval::finish(grammar, input, start, result, require_full, |min_offset| {
            Ok(ctx.diagnostic(min_offset))
        })
    }

    fn apply_rule(&mut self, rule: RuleId, pos: usize) -> Option<MatchRef> {
        match self.recall(rule, pos) {
            None => {
                let lr = self.lrs.len();
                self.lrs.push(LrRecord {
                    seed: None,
                    rule,
                    head: None,
                });
                self.lr_stack.push(lr);
                self.memo.insert(pos, rule, MemoEntry::Lr(lr));

                let answer = self.eval_rule_body(rule, pos);
                self.lr_stack.pop();

                if self.lrs[lr].head.is_some() {
                    self.lrs[lr].seed = answer;
                    self.lr_answer(rule, pos, lr)
                } else {
                    self.memo.insert(pos, rule, MemoEntry::Done(answer.clone()));
                    answer
                }
            }
            Some(MemoEntry::Lr(lr)) => {
                self.setup_lr(rule, lr);
                self.lrs[lr].seed.clone()
            }
            Some(MemoEntry::Done(answer)) => answer,
        }
    }

    /// Mark `lr` as left recursive and collect the involved rules
    fn setup_lr(&mut self, rule: RuleId, lr: LrId) {
        let head = match self.lrs[lr].head {
            Some(head) => head,
            None => {
                let head = self.heads.len();
                self.heads.push(Head {
                    rule,
                    involved: AHashSet::new(),
                    eval: AHashSet::new(),
                });
                self.lrs[lr].head = Some(head);
                log_trace!("packrat: left recursion on '{}'", self.ctx.grammar.rule(rule).symbol);
                head
            }
        };
        for &record in self.lr_stack.iter().rev() {
            if self.lrs[record].head == Some(head) {
                break;
            }
            self.lrs[record].head = Some(head);
            let involved = self.lrs[record].rule;
            self.heads[head].involved.insert(involved);
        }
    }

    fn lr_answer(&mut self, rule: RuleId, pos: usize, lr: LrId) -> Option<MatchRef> {
        let seed = self.lrs[lr].seed.clone();
        let Some(head) = self.lrs[lr].head else {
            return seed;
        };
        if self.heads[head].rule != rule {
            // Involved but not the head: the memo keeps the LR record
            return seed;
        }
        self.memo.insert(pos, rule, MemoEntry::Done(seed.clone()));
        let seed = seed?;
        Some(self.grow_lr(rule, pos, head, seed))
    }

    fn recall(&mut self, rule: RuleId, pos: usize) -> Option<MemoEntry> {
        let memoized = self.memo.get(pos, rule).cloned();
        let Some(&head) = self.head_at.get(&pos) else {
            return memoized;
        };

        let involved = {
            let h = &self.heads[head];
            h.rule == rule || h.involved.contains(&rule)
        };
        if memoized.is_none() && !involved {
            return Some(MemoEntry::Done(None));
        }
        if self.heads[head].eval.remove(&rule) {
            let answer = self.eval_rule_body(rule, pos);
            let entry = MemoEntry::Done(answer);
            self.memo.insert(pos, rule, entry.clone());
            return Some(entry);
        }
        memoized
    }

    fn grow_lr(&mut self, rule: RuleId, pos: usize, head: HeadId, seed: MatchRef) -> MatchRef {
        let outer = self.head_at.insert(pos, head);
        let mut best = seed;
        loop {
            self.heads[head].eval = self.heads[head].involved.clone();
            let Some(answer) = self.eval_rule_body(rule, pos) else {
                break;
            };
            if answer.next < best.next {
                break;
            }
            let grew = answer.next > best.next;
            best = answer;
            self.memo
                .insert(pos, rule, MemoEntry::Done(Some(best.clone())));
            if !grew {
                break;
            }
            log_trace!(
                "packrat: '{}' at {} grew to {}",
                self.ctx.grammar.rule(rule).symbol,
                pos,
                best.next
            );
        }
        match outer {
            Some(outer) => self.head_at.insert(pos, outer),
            None => self.head_at.remove(&pos),
        };
        best
    }
}

impl<'g> Evaluate<'g> for PackratSession<'g> {
    fn ctx(&mut self) -> &mut EvalContext<'g> {
        &mut self.ctx
    }

    fn call_rule(&mut self, rule: RuleId, pos: usize) -> Option<MatchRef> {
        self.apply_rule(rule, pos)
    }
}

/// Parse the whole input with the default configuration
///
/// `start` names the start rule; `None` uses the grammar's first top-level
/// rule.
pub fn parse(grammar: &Grammar, input: &str, start: Option<&str>) -> Result<ParseTree, ParseError> {
    parse_with_config(grammar, input, start, &ParserConfig::default())
}

/// Parse the whole input
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
    PackratSession::new(grammar, input, config)?.run(start, require_full)
}
