//! PEG engine module for lakepeg
//!
//! # Module Organization
//!
//! ## Expression Model
//! - [`grammar`] - Expression arena, rules and the grammar container
//! - [`builder`] - Combinator DSL for assembling grammars in code
//! - [`loader`] - Textual grammar loader
//! - [`printer`] - Textual grammar printer (inverse of the loader)
//!
//! ## Static Analysis
//! - [`sets`] - Beginning / Succeed / Alt set calculators
//! - [`analysis`] - Rule dependency graph and left-recursion report
//! - [`lake`] - Lake rewriter (water rule synthesis)
//!
//! ## Evaluation Strategies
//! - [`packrat`] - Recursive descent with memoized left recursion
//! - [`bottom_up`] - Rule-level, position-descending scheduler
//! - [`pika`] - Expression-level, position-descending scheduler
//! - [`parser`] - Configuration and strategy façade
//!
//! ## Results
//! - [`tree`] - Parse tree arena
//! - [`error`] - Grammar and parse errors
//! - [`source_location`] - Line/column tracking

// ============================================================================
// Module Declarations
// ============================================================================

pub mod analysis;
pub mod bottom_up;
pub mod builder;
pub mod cache;
pub mod error;
pub(crate) mod eval;
pub mod grammar;
pub mod lake;
pub mod loader;
pub mod packrat;
pub mod parser;
pub mod pika;
pub mod printer;
pub mod regex_cache;
pub mod sets;
pub mod source_location;
pub mod tree;

// ============================================================================
// Core Types
// ============================================================================

pub use grammar::{Expr, ExprId, ExprVisitor, Grammar, LakeWater, Rule, RuleId};
pub use parser::{Parser, ParserConfig, Strategy};
pub use tree::{Node, NodeId, NodeKind, ParseTree};

// ============================================================================
// Error Handling
// ============================================================================

pub use error::{Diagnostic, GrammarError, ParseError, StackFrame};

// ============================================================================
// Analysis
// ============================================================================

pub use analysis::{GrammarAnalyzer, GrammarWarning, RuleGraph, WarningKind};
pub use lake::{rewrite_lakes, LakeGroup, LakeReport};
pub use sets::{
    compute_alt, compute_beginning, compute_parse_beginning, compute_succeed, flatten, GrammarSets,
    Marker, MarkerSet, Mode, SetCalculator, SetMap,
};

// ============================================================================
// Source Location
// ============================================================================

pub use source_location::{LineIndex, Position, Range};
