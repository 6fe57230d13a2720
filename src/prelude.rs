//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and functions from
//! lakepeg. Importing this module with a wildcard import brings the core
//! types into scope:
//!
//! ```
//! use lakepeg::prelude::*;
//!
//! let mut grammar = GrammarBuilder::new()
//!     .rule("doc", lake(nt("num")).star())
//!     .rule("num", class("0-9").plus())
//!     .build()
//!     .unwrap();
//! rewrite_lakes(&mut grammar, &[]).unwrap();
//! let tree = Parser::new(&grammar).parse("ab12cd3", None).unwrap();
//! assert_eq!(tree.find_all("num").len(), 2);
//! ```
//!
//! # Re-exported Items
//!
//! ## Core Types
//! - [`Grammar`], [`Expr`], [`ExprId`], [`Rule`], [`RuleId`] - Expression model
//! - [`Parser`], [`ParserConfig`], [`Strategy`] - Parsing entry point
//! - [`ParseTree`], [`Node`], [`NodeId`], [`NodeKind`] - Parse results
//!
//! ## Grammar DSL
//! - [`GrammarBuilder`], [`Pattern`] and the combinator functions
//! - [`load`] - Read grammar text
//!
//! ## Analysis
//! - [`compute_beginning`], [`compute_succeed`], [`compute_alt`], [`Mode`]
//! - [`GrammarAnalyzer`] - Left-recursion report
//! - [`rewrite_lakes`] - Lake rewriter
//!
//! ## Error Handling
//! - [`GrammarError`], [`ParseError`], [`Diagnostic`]

// ============================================================================
// Core Types
// ============================================================================

pub use crate::peg::grammar::{Expr, ExprId, Grammar, Rule, RuleId};
pub use crate::peg::parser::{Parser, ParserConfig, Strategy};
pub use crate::peg::tree::{Node, NodeId, NodeKind, ParseTree};

// ============================================================================
// Grammar DSL
// ============================================================================

pub use crate::peg::builder::{
    and, any, bind, choice, class, colon, colon_not, lake, lit, not, nt, re, seq, GrammarBuilder,
    Pattern,
};
pub use crate::peg::loader::load;

// ============================================================================
// Analysis
// ============================================================================

pub use crate::peg::analysis::GrammarAnalyzer;
pub use crate::peg::lake::{rewrite_lakes, LakeReport};
pub use crate::peg::sets::{compute_alt, compute_beginning, compute_succeed, Marker, Mode, SetMap};

// ============================================================================
// Error Handling
// ============================================================================

pub use crate::peg::error::{Diagnostic, GrammarError, ParseError};
pub use crate::peg::source_location::{Position, Range};
