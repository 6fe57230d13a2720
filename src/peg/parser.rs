//! Parser façade and configuration
//!
//! [`Parser`] binds a grammar to a [`ParserConfig`] and dispatches each call
//! to one of the three evaluation strategies. Every call builds its own
//! session (memo tables, queues, binding scopes) and drops it on return, so a
//! `Parser` can be reused and shared freely.
//!
//! # Example
//!
//! ```
//! use lakepeg::{Parser, ParserConfig, Strategy};
//! use lakepeg::peg::loader;
//!
//! let grammar = loader::load("list <- item (',' item)*\nitem <- [a-z]+").unwrap();
//! let parser = Parser::new(&grammar).with_config(
//!     ParserConfig::default()
//!         .with_strategy(Strategy::Pika)
//!         .with_max_input_size(1024),
//! );
//! let tree = parser.parse("a,bc,d", None).unwrap();
//! assert_eq!(tree.find_all("item").len(), 3);
//! ```

use crate::peg::error::ParseError;
use crate::peg::grammar::Grammar;
use crate::peg::tree::ParseTree;
use crate::peg::{bottom_up, packrat, pika};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default maximum input size (100 MB)
pub const DEFAULT_MAX_INPUT_SIZE: usize = 100 * 1024 * 1024;

/// Default maximum recursion depth, in nested expressions
///
/// A parse that reaches it still fits in an 8 MiB thread stack.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

/// Evaluation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Memoized recursive descent with left-recursion support
    #[default]
    Packrat,
    /// Rule-level table filled from the end of the input
    BottomUp,
    /// Expression-level table filled from the end of the input
    Pika,
}

impl Strategy {
    /// All strategies, in declaration order
    pub const ALL: [Strategy; 3] = [Strategy::Packrat, Strategy::BottomUp, Strategy::Pika];

    /// Name as accepted by [`FromStr`]
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Packrat => "packrat",
            Strategy::BottomUp => "bottom_up",
            Strategy::Pika => "pika",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "packrat" => Ok(Strategy::Packrat),
            "bottom_up" | "bottom-up" => Ok(Strategy::BottomUp),
            "pika" => Ok(Strategy::Pika),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

/// Configuration for parser resource limits and strategy
///
/// # Example
///
/// ```
/// use lakepeg::ParserConfig;
///
/// let config = ParserConfig::from_json(r#"{"max_recursion_depth": 500, "strategy": "bottom_up"}"#)
///     .unwrap();
/// assert_eq!(config.max_recursion_depth, 500);
/// assert_eq!(config.max_input_size, 100 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum allowed input size in bytes
    pub max_input_size: usize,

    /// Maximum allowed recursion depth (0 = no limit)
    pub max_recursion_depth: usize,

    /// Evaluation strategy
    pub strategy: Strategy,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            strategy: Strategy::default(),
        }
    }
}

impl ParserConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum input size
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// Set the maximum recursion depth
    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    /// Set the evaluation strategy
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Deserialize from JSON; missing fields take their defaults
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Grammar bound to a configuration
#[derive(Debug, Clone)]
pub struct Parser<'g> {
    grammar: &'g Grammar,
    config: ParserConfig,
}

impl<'g> Parser<'g> {
    /// Create a parser with the default configuration
    pub fn new(grammar: &'g Grammar) -> Self {
        Self {
            grammar,
            config: ParserConfig::default(),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    /// Switch the evaluation strategy
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// The configuration in use
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// The grammar in use
    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    /// Parse the whole input
    ///
    /// `start` names the start rule; `None` uses the grammar's first
    /// top-level rule. Input left over after the start rule matched is an
    /// [`ParseError::Incomplete`] error.
    pub fn parse(&self, input: &str, start: Option<&str>) -> Result<ParseTree, ParseError> {
        self.run(input, start, true)
    }

    /// Parse a prefix of the input
    ///
    /// Succeeds as soon as the start rule matches at offset 0, however much
    /// input it consumed.
    pub fn parse_prefix(&self, input: &str, start: Option<&str>) -> Result<ParseTree, ParseError> {
        self.run(input, start, false)
    }

    fn run(
        &self,
        input: &str,
        start: Option<&str>,
        require_full: bool,
    ) -> Result<ParseTree, ParseError> {
        match self.config.strategy {
            Strategy::Packrat => {
                packrat::run(self.grammar, input, start, &self.config, require_full)
            }
            Strategy::BottomUp => {
                bottom_up::run(self.grammar, input, start, &self.config, require_full)
            }
            Strategy::Pika => pika::run(self.grammar, input, start, &self.config, require_full),
        }
    }
}
