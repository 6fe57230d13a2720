//! lakepeg - PEG engine with left recursion and lake symbols
//!
//! This is a parsing-expression-grammar library built around three
//! interchangeable evaluation strategies over one shared expression model:
//! - Packrat interpreter with memoized left recursion (grow-the-seed)
//! - Bottom-up parser scheduling whole rules per input position
//! - Pika parser scheduling individual expressions per input position
//!
//! On top of the engine sit the static set analyses (Beginning, Succeed and
//! Alt sets) and the lake rewriter, which turns `<<island>>` lakes into
//! ordinary ordered-choice / negative-lookahead machinery so that free-form
//! text ("water") can surround structured regions ("islands").
//!
//! ## Quick Start
//!
//! ```rust
//! use lakepeg::peg::{loader, packrat};
//!
//! let grammar = loader::load("expr <- expr '-' num / num\nnum <- [0-9]").unwrap();
//! let tree = packrat::parse(&grammar, "1-1-1", None).unwrap();
//! assert_eq!(tree.node(tree.root()).range.end.offset, 5);
//! ```
//!
//! ## Using the Builder
//!
//! ```rust
//! use lakepeg::peg::builder::*;
//!
//! let grammar = GrammarBuilder::new()
//!     .rule("greeting", lit("hello").then(lit(" ")).then(nt("name")))
//!     .rule("name", class("a-z").plus())
//!     .build()
//!     .unwrap();
//! assert_eq!(grammar.rule_count(), 2);
//! ```
//!
//! ## Feature Flags
//!
//! - `logging` - Enable debug logging using the `log` crate

// Lint configuration for production quality
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]
#![allow(clippy::module_inception)]

/// Logging macros - no-op when logging feature is disabled
#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

/// Logging macros - use log crate when logging feature is enabled
#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_trace {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
macro_rules! log_trace {
    ($($arg:tt)*) => { log::trace!($($arg)*) };
}

// Prelude module for convenient imports
pub mod prelude;

pub mod peg;

/// Re-export commonly used types for convenience
pub use peg::{
    builder::{
        and, any, bind, choice, class, colon, colon_not, lake, lit, not, nt, re, seq,
        GrammarBuilder, Pattern,
    },
    error::{Diagnostic, GrammarError, ParseError},
    grammar::{Expr, ExprId, Grammar, Rule, RuleId},
    lake::{rewrite_lakes, LakeReport},
    parser::{Parser, ParserConfig, Strategy},
    sets::{compute_alt, compute_beginning, compute_succeed, Marker, MarkerSet, Mode, SetMap},
    source_location::{Position, Range},
    tree::{Node, NodeId, NodeKind, ParseTree},
};
