//! Source Location Utilities
//!
//! Positions carry the byte offset together with a 1-based line and a
//! 1-based column counted in characters. Converting many offsets of the same
//! input goes through a [`LineIndex`], built once per input with `memchr`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Byte offset from start of input
    pub offset: usize,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based, in characters)
    pub column: usize,
}

impl Position {
    /// Create a new position
    #[inline]
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    /// Position at the start of input
    #[inline]
    pub fn start() -> Self {
        Self::new(0, 1, 1)
    }

    /// Compute the position of `offset` without an index
    pub fn from_offset(input: &str, offset: usize) -> Self {
        LineIndex::new(input).position(input, offset)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A half-open range of the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    /// Start position (inclusive)
    pub start: Position,
    /// End position (exclusive)
    pub end: Position,
}

impl Range {
    /// Create a new range
    #[inline]
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }

    /// True for zero-width ranges
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start.offset >= self.end.offset
    }

    /// Byte offsets as a std range
    #[inline]
    pub fn offsets(&self) -> std::ops::Range<usize> {
        self.start.offset..self.end.offset
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(
                f,
                "line {}, columns {}-{}",
                self.start.line, self.start.column, self.end.column
            )
        } else {
            write!(
                f,
                "line {}, column {} to line {}, column {}",
                self.start.line, self.start.column, self.end.line, self.end.column
            )
        }
    }
}

/// Byte offsets of line starts, for repeated offset-to-position lookups
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Index the line starts of `input`
    pub fn new(input: &str) -> Self {
        let mut line_starts = Vec::with_capacity(input.len() / 32 + 1);
        line_starts.push(0);
        line_starts.extend(memchr::memchr_iter(b'\n', input.as_bytes()).map(|nl| nl + 1));
        Self { line_starts }
    }

    /// Number of lines
    #[inline]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Position of `offset`; offsets past the end clamp to the end
    pub fn position(&self, input: &str, offset: usize) -> Position {
        let mut offset = offset.min(input.len());
        while !input.is_char_boundary(offset) {
            offset -= 1;
        }
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self.line_starts[line - 1];
        let column = input[line_start..offset].chars().count() + 1;
        Position::new(offset, line, column)
    }

    /// Range between two offsets
    #[inline]
    pub fn range(&self, input: &str, start: usize, end: usize) -> Range {
        Range::new(self.position(input, start), self.position(input, end))
    }

    /// Text of the line containing `offset`, without its terminator
    pub fn line_text<'a>(&self, input: &'a str, offset: usize) -> &'a str {
        let position = self.position(input, offset);
        let start = self.line_starts[position.line - 1];
        let end = self
            .line_starts
            .get(position.line)
            .map(|next| next - 1)
            .unwrap_or(input.len());
        input[start..end].trim_end_matches('\r')
    }
}
