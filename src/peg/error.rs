//! Error types for lakepeg
//!
//! Two families: [`GrammarError`] for problems with a grammar itself (found
//! while building, loading or rewriting it) and [`ParseError`] for a parse
//! call that did not produce a tree. A failing match inside a parse is never
//! an error; only the top-level outcome is.
//!
//! # Example Output
//!
//! ```text
//! Parse failed at line 1, column 3:
//! 1 | 1-x
//!   |   ^
//! expected one of [0-9]
//! `- expr
//!    `- expr '-' num
//!       `- num
//! ```

use crate::peg::grammar::ExprId;
use crate::peg::source_location::Position;
use std::fmt;

/// Error raised while constructing, loading or rewriting a grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// A nonterminal names a rule that does not exist
    UnresolvedNonterminal {
        /// The unknown symbol
        symbol: String,
    },

    /// Two rules share a symbol
    DuplicateRule {
        /// The repeated symbol
        symbol: String,
    },

    /// A terminal pattern is not a valid regular expression
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Message from the regex compiler
        message: String,
    },

    /// A water symbol passed to the lake rewriter is not a rule
    UnknownWaterSymbol {
        /// The unknown symbol
        symbol: String,
    },

    /// The grammar has no rules
    EmptyGrammar,

    /// Grammar text could not be read
    Syntax {
        /// Byte offset into the grammar text
        offset: usize,
        /// Line (1-based)
        line: usize,
        /// Column (1-based)
        column: usize,
        /// What went wrong
        message: String,
    },
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::UnresolvedNonterminal { symbol } => {
                write!(f, "Unresolved nonterminal '{}'", symbol)
            }
            GrammarError::DuplicateRule { symbol } => {
                write!(f, "Rule '{}' is defined more than once", symbol)
            }
            GrammarError::InvalidPattern { pattern, message } => {
                write!(f, "Invalid terminal pattern `{}`: {}", pattern, message)
            }
            GrammarError::UnknownWaterSymbol { symbol } => {
                write!(f, "Water symbol '{}' is not a rule", symbol)
            }
            GrammarError::EmptyGrammar => write!(f, "Grammar has no rules"),
            GrammarError::Syntax {
                line,
                column,
                message,
                ..
            } => write!(
                f,
                "Grammar syntax error at line {}, column {}: {}",
                line, column, message
            ),
        }
    }
}

impl std::error::Error for GrammarError {}

/// One active expression at the deepest failure point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// The expression
    pub expr: ExprId,
    /// Its grammar-text form
    pub description: String,
}

/// Where and why a parse stopped making progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Deepest offset at which a terminal was attempted
    pub offset: usize,
    /// Line/column of `offset`
    pub position: Position,
    /// Terminals that failed at `offset`, in grammar-text form
    pub expected: Vec<String>,
    /// Expressions active when `offset` was first reached, outermost first
    pub stack: Vec<StackFrame>,
}

impl Diagnostic {
    /// Render a caret snippet of `input` with the expected terminals and
    /// the active expression stack
    pub fn render(&self, input: &str) -> String {
        let mut out = format!("Parse failed at {}:\n", self.position);

        let index = crate::peg::source_location::LineIndex::new(input);
        let line = index.line_text(input, self.offset);
        let gutter = self.position.line.to_string();
        out.push_str(&format!("{} | {}\n", gutter, line));
        out.push_str(&format!(
            "{} | {}^\n",
            " ".repeat(gutter.len()),
            " ".repeat(self.position.column.saturating_sub(1))
        ));

        if !self.expected.is_empty() {
            out.push_str(&format!("expected one of {}\n", self.expected.join(", ")));
        }
        for (depth, frame) in self.stack.iter().enumerate() {
            out.push_str(&format!(
                "{}`- {}\n",
                "   ".repeat(depth),
                frame.description
            ));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.position)?;
        if !self.expected.is_empty() {
            write!(f, ", expected one of {}", self.expected.join(", "))?;
        }
        Ok(())
    }
}

/// Error type for parse operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The start rule did not match
    Failed(Diagnostic),

    /// The start rule matched but did not consume the whole input
    Incomplete {
        /// Bytes consumed by the start rule
        consumed: usize,
        /// Deepest failure seen while trying to go further
        diagnostic: Diagnostic,
    },

    /// The grammar cannot be used for parsing
    InvalidGrammar {
        /// Reason why the grammar is invalid
        reason: String,
    },

    /// Input exceeds maximum allowed size
    InputTooLarge {
        /// Size of the input in bytes
        input_size: usize,
        /// Maximum allowed size
        max_size: usize,
    },

    /// Recursion depth limit exceeded
    RecursionLimitExceeded {
        /// Depth reached
        depth: usize,
        /// Maximum allowed depth
        max_depth: usize,
    },
}

impl ParseError {
    /// The failure diagnostic, when the error has one
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            ParseError::Failed(diagnostic) | ParseError::Incomplete { diagnostic, .. } => {
                Some(diagnostic)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Failed(diagnostic) => write!(f, "Parse failed at {}", diagnostic),
            ParseError::Incomplete {
                consumed,
                diagnostic,
            } => write!(
                f,
                "Parse incomplete: consumed {} bytes, stopped at {}",
                consumed, diagnostic
            ),
            ParseError::InvalidGrammar { reason } => write!(f, "Invalid grammar: {}", reason),
            ParseError::InputTooLarge {
                input_size,
                max_size,
            } => write!(
                f,
                "Input too large: {} bytes exceeds limit of {} bytes",
                input_size, max_size
            ),
            ParseError::RecursionLimitExceeded { depth, max_depth } => write!(
                f,
                "Recursion limit exceeded: depth {} exceeds limit of {}",
                depth, max_depth
            ),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<GrammarError> for ParseError {
    fn from(err: GrammarError) -> Self {
        ParseError::InvalidGrammar {
            reason: err.to_string(),
        }
    }
}
