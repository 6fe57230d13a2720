//! Grammar printer
//!
//! Renders expressions and whole grammars in the text form read by
//! [`loader`](crate::peg::loader). Parentheses are only added where the
//! operator precedence needs them, so printing a loaded grammar and loading
//! the result again gives the same text.
//!
//! Precedence, loosest first:
//!
//! | level | form |
//! |-------|------|
//! | choice | `a / b` |
//! | rewrite | `a b -> 'out'` |
//! | sequence | `a b` |
//! | prefix | `&a`, `!a` |
//! | colon | `a:b`, `a:!b` |
//! | suffix | `a*`, `a+`, `a?` |
//! | primary | `name`, `x@name`, `'lit'`, `[a-z]`, `.`, `` `re` ``, `(a)`, `<<a>>`, `()` |

use crate::peg::grammar::{Expr, ExprId, Grammar};
use std::fmt;

const CHOICE: u8 = 0;
const REWRITE: u8 = 1;
const SEQUENCE: u8 = 2;
const PREFIX: u8 = 3;
const COLON: u8 = 4;
const SUFFIX: u8 = 5;
const PRIMARY: u8 = 6;

const DESCRIBE_LIMIT: usize = 60;

/// Single-quoted literal with `\\`, `\'`, `\n`, `\r` and `\t` escaped
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Short human-readable form of one expression for diagnostics
///
/// Nonterminals are shown by symbol; anything longer than a line is cut.
pub fn describe(grammar: &Grammar, id: ExprId) -> String {
    if let Expr::Nonterminal {
        symbol, binding, ..
    } = grammar.expr(id)
    {
        return match binding {
            Some(name) => format!("{}@{}", name, symbol),
            None => symbol.clone(),
        };
    }
    let text = expr_to_peg(grammar, id);
    if text.chars().count() <= DESCRIBE_LIMIT {
        return text;
    }
    let mut cut: String = text.chars().take(DESCRIBE_LIMIT - 3).collect();
    cut.push_str("...");
    cut
}

/// Grammar text of one expression
pub fn expr_to_peg(grammar: &Grammar, id: ExprId) -> String {
    let mut out = String::new();
    write_expr(grammar, id, CHOICE, &mut out);
    out
}

fn level(grammar: &Grammar, id: ExprId) -> u8 {
    match grammar.expr(id) {
        Expr::Choice { alternatives } => match alternatives.as_slice() {
            [] => PREFIX,
            [only] => level(grammar, *only),
            _ => CHOICE,
        },
        Expr::Rewriting { .. } => REWRITE,
        Expr::Sequence { items } => match items.as_slice() {
            [] => PRIMARY,
            [only] => level(grammar, *only),
            _ => SEQUENCE,
        },
        Expr::And { .. } | Expr::Not { .. } => PREFIX,
        Expr::Colon { .. } | Expr::ColonNot { .. } => COLON,
        Expr::ZeroOrMore { .. } | Expr::OneOrMore { .. } | Expr::Optional { .. } => SUFFIX,
        Expr::Nonterminal { .. }
        | Expr::Terminal { .. }
        | Expr::Grouping { .. }
        | Expr::Lake { .. } => PRIMARY,
    }
}

fn write_expr(grammar: &Grammar, id: ExprId, min: u8, out: &mut String) {
    if level(grammar, id) < min {
        out.push('(');
        write_expr(grammar, id, CHOICE, out);
        out.push(')');
        return;
    }
    match grammar.expr(id) {
        Expr::Nonterminal {
            symbol, binding, ..
        } => {
            if let Some(name) = binding {
                out.push_str(name);
                out.push('@');
            }
            out.push_str(symbol);
        }
        Expr::Terminal { pattern, source } => {
            if source.is_empty() {
                out.push('`');
                out.push_str(pattern);
                out.push('`');
            } else {
                out.push_str(source);
            }
        }
        Expr::Sequence { items } => match items.as_slice() {
            [] => out.push_str("()"),
            [only] => write_expr(grammar, *only, min, out),
            _ => write_list(grammar, items, " ", PREFIX, out),
        },
        Expr::Choice { alternatives } => match alternatives.as_slice() {
            // never matches
            [] => out.push_str("!()"),
            [only] => write_expr(grammar, *only, min, out),
            _ => write_list(grammar, alternatives, " / ", REWRITE, out),
        },
        Expr::ZeroOrMore { expr } => {
            write_expr(grammar, *expr, SUFFIX, out);
            out.push('*');
        }
        Expr::OneOrMore { expr } => {
            write_expr(grammar, *expr, SUFFIX, out);
            out.push('+');
        }
        Expr::Optional { expr } => {
            write_expr(grammar, *expr, SUFFIX, out);
            out.push('?');
        }
        Expr::And { expr } => {
            out.push('&');
            write_expr(grammar, *expr, COLON, out);
        }
        Expr::Not { expr } => {
            out.push('!');
            write_expr(grammar, *expr, COLON, out);
        }
        Expr::Grouping { expr } => {
            out.push('(');
            write_expr(grammar, *expr, CHOICE, out);
            out.push(')');
        }
        Expr::Rewriting { expr, output } => {
            write_expr(grammar, *expr, SEQUENCE, out);
            out.push_str(" -> ");
            out.push_str(&quote(output));
        }
        Expr::Colon { left, right } => {
            write_expr(grammar, *left, SUFFIX, out);
            out.push(':');
            write_expr(grammar, *right, SUFFIX, out);
        }
        Expr::ColonNot { left, right } => {
            write_expr(grammar, *left, SUFFIX, out);
            out.push_str(":!");
            write_expr(grammar, *right, SUFFIX, out);
        }
        Expr::Lake { expr, .. } => {
            out.push_str("<<");
            write_expr(grammar, *expr, CHOICE, out);
            out.push_str(">>");
        }
    }
}

fn write_list(grammar: &Grammar, ids: &[ExprId], separator: &str, min: u8, out: &mut String) {
    for (i, &id) in ids.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        write_expr(grammar, id, min, out);
    }
}

impl Grammar {
    /// Grammar text, one rule per line
    ///
    /// Declared top-level rules come first as `%top` lines; water rules are
    /// prefixed with `%water`. Rules synthesized by the lake rewriter are
    /// left out, so the output loads back into the grammar as it was before
    /// rewriting.
    pub fn to_peg(&self) -> String {
        let mut out = String::new();
        for &rule in self.declared_top_level() {
            out.push_str("%top ");
            out.push_str(&self.rule(rule).symbol);
            out.push('\n');
        }
        for (_, rule) in self.rules() {
            if rule.generated {
                continue;
            }
            if rule.water {
                out.push_str("%water ");
            }
            out.push_str(&rule.symbol);
            out.push_str(" <- ");
            write_expr(self, rule.rhs, CHOICE, &mut out);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_peg())
    }
}
