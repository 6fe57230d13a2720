//! Bottom-up parser
//!
//! Fills a `(rule, position)` table from the end of the input towards the
//! start. At each position a priority queue, ordered by [`RuleGraph`] rank,
//! holds the rules that may have a (better) match there. It is seeded with
//! the rules whose Beginning set contains a terminal or `ε`; whenever a rule's
//! entry improves, the rules calling it at the same position are queued again.
//!
//! Rule bodies are evaluated with the shared evaluator, but every nonterminal
//! is answered from the table only. Entries at later positions are final by
//! the time they are read; entries at the current position may still improve,
//! which is what lets left recursion grow.

use crate::peg::analysis::RuleGraph;
use crate::peg::cache::MemoTable;
use crate::peg::error::ParseError;
use crate::peg::eval::{self, EvalContext, Evaluate, MatchRef, Replay};
use crate::peg::grammar::{Grammar, RuleId};
use crate::peg::parser::ParserConfig;
use crate::peg::sets::compute_parse_beginning;
use crate::peg::tree::ParseTree;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// State of one bottom-up parse
pub(crate) struct BottomUpSession<'g> {
    ctx: EvalContext<'g>,
    config: ParserConfig,
    graph: RuleGraph,
    memo: MemoTable<RuleId, MatchRef>,
}

impl<'g> BottomUpSession<'g> {
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
            graph: RuleGraph::new(grammar, &beginning),
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
            "bottom-up: parsing {} bytes from '{}'",
            input.len(),
            grammar.rule(start).symbol
        );

        let seeds = self.graph.bottom_rules();
        let mut queue: BinaryHeap<Reverse<(usize, RuleId)>> = BinaryHeap::new();
        let mut queued = vec![false; grammar.rule_count()];

        for pos in (0..=input.len()).rev() {
            if !input.is_char_boundary(pos) {
                continue;
            }
            for &rule in &seeds {
                queued[rule.index()] = true;
                queue.push(Reverse((self.graph.rank(rule), rule)));
            }
            while let Some(Reverse((_, rule))) = queue.pop() {
                queued[rule.index()] = false;
                let Some(found) = self.eval_rule_body(rule, pos) else {
                    continue;
                };
                let improved = self
                    .memo
                    .peek(pos, rule)
                    .map_or(true, |old| found.next > old.next);
                if !improved {
                    continue;
                }
                self.memo.insert(pos, rule, found);
                for &parent in self.graph.parents(rule) {
                    if !queued[parent.index()] {
                        queued[parent.index()] = true;
                        queue.push(Reverse((self.graph.rank(parent), parent)));
                    }
                }
            }
            if let Some(err) = self.ctx.take_abort() {
                return Err(err);
            }
        }

        log_debug!("bottom-up: {} table entries", self.memo.len());

        let result = self.memo.peek(0, start).cloned();
        let memo = &self.memo;
        let lookup = move |rule: RuleId, pos: usize| memo.peek(pos, rule).cloned();
        let config = &self.config;
        eval::finish(grammar, input, start, result, require_full, |min_offset| {
            Replay::new(EvalContext::new(grammar, input, config)?, &lookup)
                .diagnose(start, min_offset)
        })
    }
}

impl<'g> Evaluate<'g> for BottomUpSession<'g> {
    fn ctx(&mut self) -> &mut EvalContext<'g> {
        &mut self.ctx
    }

    fn call_rule(&mut self, rule: RuleId, pos: usize) -> Option<MatchRef> {
        self.memo.peek(pos, rule).cloned()
    }
}

/// Parse the whole input bottom-up with the default configuration
pub fn parse(grammar: &Grammar, input: &str, start: Option<&str>) -> Result<ParseTree, ParseError> {
    parse_with_config(grammar, input, start, &ParserConfig::default())
}

/// Parse the whole input bottom-up
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
    BottomUpSession::new(grammar, input, config)?.run(start, require_full)
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
    fn test_simple_sequence() {
        let g = GrammarBuilder::new()
            .rule("greeting", nt("word") >> lit(" ") >> nt("word"))
            .rule("word", class("a-z").plus())
            .build()
            .unwrap();
        let tree = parse(&g, "hello world", None).unwrap();
        assert_eq!(tree.text(tree.root()), "hello world");
        assert_eq!(tree.find_all("word").len(), 2);
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
    fn test_nullable_start_rule() {
        let g = GrammarBuilder::new()
            .rule("s", lit("x").star())
            .build()
            .unwrap();
        assert_eq!(parse(&g, "", None).unwrap().len(), 2);
        let tree = parse(&g, "xxx", None).unwrap();
        assert_eq!(tree.text(tree.root()), "xxx");
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

    #[test]
    fn test_incomplete_input() {
        match parse(&minus_grammar(), "1-1-", None).unwrap_err() {
            ParseError::Incomplete {
                consumed,
                diagnostic,
            } => {
                assert_eq!(consumed, 3);
                assert_eq!(diagnostic.offset, 4);
            }
            other => panic!("expected Incomplete, got {:?}", other),
        }
    }

    #[test]
    fn test_lookahead_rule() {
        let g = GrammarBuilder::new()
            .rule("s", and(nt("kw")) >> nt("ident"))
            .rule("kw", lit("if"))
            .rule("ident", class("a-z").plus())
            .build()
            .unwrap();
        assert!(parse(&g, "iffy", None).is_ok());
        assert!(parse(&g, "else", None).is_err());
    }
}
