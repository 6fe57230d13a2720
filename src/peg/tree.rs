//! Parse tree arena
//!
//! Nodes live in one vector and refer to each other by [`NodeId`]. Every
//! node knows its parent, so the tree can be walked in both directions
//! without shared ownership.

use crate::peg::eval::{MatchNode, MatchRef, Origin};
use crate::peg::grammar::{Expr, ExprId, Grammar};
use crate::peg::source_location::{LineIndex, Range};
use std::fmt;

/// Index of a node in a [`ParseTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Raw arena index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a node matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Rule application
    Nonterminal {
        /// Rule symbol
        symbol: String,
        /// Back-reference name of the invoking occurrence
        binding: Option<String>,
    },
    /// Terminal match
    Terminal {
        /// Matched text
        text: String,
        /// Terminal regex
        pattern: String,
    },
    /// Sequence
    Sequence,
    /// Ordered choice; `index` is the alternative that matched
    OrderedChoice {
        /// Zero-based alternative index
        index: usize,
    },
    /// `e*`
    ZeroOrMore,
    /// `e+`
    OneOrMore,
    /// `e?`
    Optional,
    /// `&e`
    And,
    /// `!e`
    Not,
    /// `(e)`
    Grouping,
    /// `e -> 'output'`
    Rewriting {
        /// Replacement template
        output: String,
    },
    /// `l:r`
    Colon,
    /// `l:!r`
    ColonNot,
    /// `<<e>>`; children are the islands only
    Lake,
}

impl NodeKind {
    fn is_lookahead(&self) -> bool {
        matches!(self, NodeKind::And | NodeKind::Not)
    }
}

/// One node of a parse tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// What matched
    pub kind: NodeKind,
    /// Matched span
    pub range: Range,
    /// Children in input order
    pub children: Vec<NodeId>,
    /// Parent (None for the root)
    pub parent: Option<NodeId>,
    /// Expression that produced the node (None for the root rule node)
    pub expr: Option<ExprId>,
}

/// Result of a successful parse
#[derive(Debug, Clone)]
pub struct ParseTree {
    nodes: Vec<Node>,
    source: String,
}

impl ParseTree {
    /// The root node: the start rule's application
    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Get a node
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Parent of a node
    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Children of a node
    #[inline]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Number of nodes
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a tree has at least its root
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The parsed input
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Text matched by a node
    pub fn text(&self, id: NodeId) -> &str {
        &self.source[self.node(id).range.offsets()]
    }

    /// Depth-first, parents before children, children in order
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: vec![self.root()],
        }
    }

    /// Rule application nodes of `symbol`, in preorder
    pub fn find_all(&self, symbol: &str) -> Vec<NodeId> {
        self.preorder()
            .filter(|&id| {
                matches!(
                    &self.node(id).kind,
                    NodeKind::Nonterminal { symbol: s, .. } if s == symbol
                )
            })
            .collect()
    }

    /// Chain of symbols from the root down to `id`
    pub fn symbol_path(&self, id: NodeId) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if let NodeKind::Nonterminal { symbol, .. } = &self.node(node).kind {
                path.push(symbol.as_str());
            }
            current = self.parent(node);
        }
        path.reverse();
        path
    }

    /// The input with every `Rewriting` node replaced by its output
    /// template (`$0` expands to the node's matched text)
    ///
    /// Text not covered by any node is copied through, lookaheads
    /// contribute nothing.
    pub fn rewritten(&self) -> String {
        enum Task {
            Node(NodeId),
            Text(usize, usize),
        }

        let mut out = String::with_capacity(self.source.len());
        let mut tasks = vec![Task::Node(self.root())];
        while let Some(task) = tasks.pop() {
            let id = match task {
                Task::Text(start, end) => {
                    out.push_str(&self.source[start..end]);
                    continue;
                }
                Task::Node(id) => id,
            };
            let node = self.node(id);
            if let NodeKind::Rewriting { output } = &node.kind {
                out.push_str(&output.replace("$0", self.text(id)));
                continue;
            }

            let range = node.range.offsets();
            let kids: &[NodeId] = match node.kind {
                // The constraint operand spans the same text as the primary one
                NodeKind::Colon => &node.children[1..],
                _ => &node.children,
            };
            let mut pending = Vec::new();
            let mut cursor = range.start;
            for &child in kids {
                let child_node = self.node(child);
                let child_range = child_node.range.offsets();
                if child_node.kind.is_lookahead() || child_range.start < cursor {
                    continue;
                }
                pending.push(Task::Text(cursor, child_range.start));
                pending.push(Task::Node(child));
                cursor = child_range.end;
            }
            if cursor < range.end {
                pending.push(Task::Text(cursor, range.end));
            }
            tasks.extend(pending.into_iter().rev());
        }
        out
    }

    fn label(&self, id: NodeId) -> String {
        match &self.node(id).kind {
            NodeKind::Nonterminal {
                symbol,
                binding: Some(name),
            } => format!("{}@{}", name, symbol),
            NodeKind::Nonterminal { symbol, .. } => symbol.clone(),
            NodeKind::Terminal { text, .. } => format!("{:?}", text),
            NodeKind::Sequence => "sequence".to_string(),
            NodeKind::OrderedChoice { index } => format!("choice #{}", index),
            NodeKind::ZeroOrMore => "*".to_string(),
            NodeKind::OneOrMore => "+".to_string(),
            NodeKind::Optional => "?".to_string(),
            NodeKind::And => "&".to_string(),
            NodeKind::Not => "!".to_string(),
            NodeKind::Grouping => "group".to_string(),
            NodeKind::Rewriting { output } => format!("-> {:?}", output),
            NodeKind::Colon => ":".to_string(),
            NodeKind::ColonNot => ":!".to_string(),
            NodeKind::Lake => "lake".to_string(),
        }
    }
}

impl fmt::Display for ParseTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![(self.root(), 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let range = self.node(id).range;
            writeln!(
                f,
                "{}{} {}..{}",
                "  ".repeat(depth),
                self.label(id),
                range.start.offset,
                range.end.offset
            )?;
            for &child in self.children(id).iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        Ok(())
    }
}

/// Preorder iterator over node ids
pub struct Preorder<'t> {
    tree: &'t ParseTree,
    stack: Vec<NodeId>,
}

impl Iterator for Preorder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.children(id).iter().rev().copied());
        Some(id)
    }
}

/// Copy a match graph out into a strict tree
pub(crate) fn build(grammar: &Grammar, input: &str, root: &MatchRef) -> ParseTree {
    let index = LineIndex::new(input);
    let mut nodes: Vec<Node> = Vec::new();
    let mut stack: Vec<(&MatchNode, Option<NodeId>)> = vec![(root.as_ref(), None)];

    while let Some((m, parent)) = stack.pop() {
        let id = NodeId(nodes.len() as u32);
        nodes.push(Node {
            kind: kind_of(grammar, input, m),
            range: index.range(input, m.start, m.end),
            children: Vec::with_capacity(m.children.len()),
            parent,
            expr: expr_of(m.origin),
        });
        if let Some(parent) = parent {
            nodes[parent.index()].children.push(id);
        }
        for child in m.children.iter().rev() {
            stack.push((child.as_ref(), Some(id)));
        }
    }

    ParseTree {
        nodes,
        source: input.to_string(),
    }
}

fn expr_of(origin: Origin) -> Option<ExprId> {
    match origin {
        Origin::Expr(id) => Some(id),
        Origin::Rule { site, .. } => site,
        Origin::Choice { expr, .. } => Some(expr),
    }
}

fn kind_of(grammar: &Grammar, input: &str, m: &MatchNode) -> NodeKind {
    match m.origin {
        Origin::Rule { rule, site } => NodeKind::Nonterminal {
            symbol: grammar.rule(rule).symbol.clone(),
            binding: site.and_then(|site| match grammar.expr(site) {
                Expr::Nonterminal { binding, .. } => binding.clone(),
                _ => None,
            }),
        },
        Origin::Choice { index, .. } => NodeKind::OrderedChoice { index },
        Origin::Expr(id) => match grammar.expr(id) {
            Expr::Nonterminal {
                symbol, binding, ..
            } => NodeKind::Nonterminal {
                symbol: symbol.clone(),
                binding: binding.clone(),
            },
            Expr::Terminal { pattern, .. } => NodeKind::Terminal {
                text: input[m.start..m.end].to_string(),
                pattern: pattern.clone(),
            },
            Expr::Sequence { .. } => NodeKind::Sequence,
            Expr::Choice { .. } => NodeKind::OrderedChoice { index: 0 },
            Expr::ZeroOrMore { .. } => NodeKind::ZeroOrMore,
            Expr::OneOrMore { .. } => NodeKind::OneOrMore,
            Expr::Optional { .. } => NodeKind::Optional,
            Expr::And { .. } => NodeKind::And,
            Expr::Not { .. } => NodeKind::Not,
            Expr::Grouping { .. } => NodeKind::Grouping,
            Expr::Rewriting { output, .. } => NodeKind::Rewriting {
                output: output.clone(),
            },
            Expr::Colon { .. } => NodeKind::Colon,
            Expr::ColonNot { .. } => NodeKind::ColonNot,
            Expr::Lake { .. } => NodeKind::Lake,
        },
    }
}
