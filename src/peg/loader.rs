//! Grammar text loader
//!
//! Reads the text form written by [`Grammar::to_peg`]:
//!
//! ```text
//! # comment
//! %top doc                      declare a top-level (start) rule
//! doc   <- <<stmt>> ';'         rule; the trailing ';' is optional
//! stmt  <- key '=' val -> '$0'  rewriting
//! key   <- [a-z]+
//! val   <- k@key ':' k@key / `[0-9]+`
//! %water ws <- [ \t\n]+         rule usable as lake water
//! ```
//!
//! Operators, loosest first: `/`, `->`, juxtaposition, prefix `&` `!`,
//! `:` `:!`, suffix `*` `+` `?`. Primaries are rule names (optionally
//! `binding@Rule`), `'...'` or `"..."` literals, `[...]` classes, `.`,
//! `` `...` `` regular expressions, `(...)` groups (`()` is the empty
//! sequence) and `<<...>>` lakes.
//!
//! Rules may reference rules defined further down. A name directly
//! followed by `<-` starts the next rule, so rules need no terminator.

use crate::peg::builder::{self, GrammarBuilder, Pattern};
use crate::peg::error::GrammarError;
use crate::peg::grammar::Grammar;
use crate::peg::source_location::Position;

/// Load a grammar from text
///
/// # Example
///
/// ```
/// use lakepeg::peg::loader;
///
/// let grammar = loader::load("sum <- sum '+' num / num\nnum <- [0-9]+").unwrap();
/// assert_eq!(grammar.rule_count(), 2);
/// assert_eq!(grammar.to_peg(), "sum <- sum '+' num / num\nnum <- [0-9]+\n");
/// ```
pub fn load(text: &str) -> Result<Grammar, GrammarError> {
    let builder = Reader::new(text).grammar()?;
    builder.build()
}

struct Reader<'t> {
    text: &'t str,
    pos: usize,
}

impl<'t> Reader<'t> {
    fn new(text: &'t str) -> Self {
        Self { text, pos: 0 }
    }

    fn grammar(mut self) -> Result<GrammarBuilder, GrammarError> {
        let mut builder = GrammarBuilder::new();
        loop {
            self.skip_ws();
            if self.at_end() {
                break;
            }
            if self.eat("%top") {
                self.skip_ws();
                let symbol = self
                    .ident()
                    .ok_or_else(|| self.error("expected a rule name after %top"))?;
                builder = builder.top_level(symbol);
                continue;
            }
            let water = self.eat("%water");
            self.skip_ws();
            let symbol = self.ident().ok_or_else(|| self.error("expected a rule name"))?;
            self.skip_ws();
            if !self.eat("<-") {
                return Err(self.error("expected '<-'"));
            }
            let pattern = self.choice()?;
            self.skip_ws();
            self.eat(";");
            log_trace!("loaded rule '{}'", symbol);
            builder = if water {
                builder.water_rule(symbol, pattern)
            } else {
                builder.rule(symbol, pattern)
            };
        }
        Ok(builder)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn choice(&mut self) -> Result<Pattern, GrammarError> {
        let mut alternatives = vec![self.alternative()?];
        loop {
            self.skip_ws();
            if !self.eat("/") {
                break;
            }
            alternatives.push(self.alternative()?);
        }
        Ok(match alternatives.len() {
            1 => alternatives.remove(0),
            _ => Pattern::Choice(alternatives),
        })
    }

    fn alternative(&mut self) -> Result<Pattern, GrammarError> {
        let sequence = self.sequence()?;
        self.skip_ws();
        if self.eat("->") {
            self.skip_ws();
            let output = self.quoted()?;
            return Ok(Pattern::Rewrite(Box::new(sequence), output));
        }
        Ok(sequence)
    }

    fn sequence(&mut self) -> Result<Pattern, GrammarError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.at_sequence_end() {
                break;
            }
            items.push(self.prefixed()?);
        }
        Ok(match items.len() {
            1 => items.remove(0),
            _ => Pattern::Seq(items),
        })
    }

    fn at_sequence_end(&self) -> bool {
        let rest = self.rest();
        rest.is_empty()
            || rest.starts_with(&['/', ')', ';', '%'][..])
            || rest.starts_with(">>")
            || rest.starts_with("->")
            || self.at_rule_head()
    }

    /// True at `name <-`
    fn at_rule_head(&self) -> bool {
        let mut probe = Reader {
            text: self.text,
            pos: self.pos,
        };
        if probe.ident().is_none() {
            return false;
        }
        probe.skip_ws();
        probe.rest().starts_with("<-")
    }

    fn prefixed(&mut self) -> Result<Pattern, GrammarError> {
        if self.eat("&") {
            self.skip_ws();
            return Ok(builder::and(self.colon()?));
        }
        if self.eat("!") {
            self.skip_ws();
            return Ok(builder::not(self.colon()?));
        }
        self.colon()
    }

    fn colon(&mut self) -> Result<Pattern, GrammarError> {
        let left = self.suffixed()?;
        if !self.eat(":") {
            return Ok(left);
        }
        let negated = self.eat("!");
        let right = self.suffixed()?;
        Ok(if negated {
            builder::colon_not(left, right)
        } else {
            builder::colon(left, right)
        })
    }

    fn suffixed(&mut self) -> Result<Pattern, GrammarError> {
        let mut pattern = self.primary()?;
        loop {
            pattern = if self.eat("*") {
                pattern.star()
            } else if self.eat("+") {
                pattern.plus()
            } else if self.eat("?") {
                pattern.opt()
            } else {
                return Ok(pattern);
            };
        }
    }

    fn primary(&mut self) -> Result<Pattern, GrammarError> {
        self.skip_ws();
        let Some(c) = self.peek() else {
            return Err(self.error("unexpected end of grammar"));
        };
        match c {
            '(' => {
                self.pos += 1;
                self.skip_ws();
                if self.eat(")") {
                    return Ok(Pattern::Seq(Vec::new()));
                }
                let inner = self.choice()?;
                self.skip_ws();
                if !self.eat(")") {
                    return Err(self.error("expected ')'"));
                }
                Ok(inner.group())
            }
            '<' if self.rest().starts_with("<<") => {
                self.pos += 2;
                let inner = self.choice()?;
                self.skip_ws();
                if !self.eat(">>") {
                    return Err(self.error("expected '>>'"));
                }
                Ok(builder::lake(inner))
            }
            '\'' | '"' => Ok(builder::lit(&self.quoted()?)),
            '[' => self.class(),
            '.' => {
                self.pos += 1;
                Ok(builder::any())
            }
            '`' => {
                let start = self.pos + 1;
                match self.text[start..].find('`') {
                    Some(len) => {
                        self.pos = start + len + 1;
                        Ok(builder::re(&self.text[start..start + len]))
                    }
                    None => Err(self.error("unterminated regular expression")),
                }
            }
            _ => {
                let Some(name) = self.ident() else {
                    return Err(self.error(&format!("unexpected character '{}'", c)));
                };
                if self.eat("@") {
                    let symbol = self
                        .ident()
                        .ok_or_else(|| self.error("expected a rule name after '@'"))?;
                    return Ok(builder::bind(name, symbol));
                }
                Ok(builder::nt(name))
            }
        }
    }

    // ------------------------------------------------------------------
    // Tokens
    // ------------------------------------------------------------------

    fn class(&mut self) -> Result<Pattern, GrammarError> {
        let start = self.pos;
        let body_start = start + 1;
        let text = self.text;
        let mut escaped = false;
        for (i, c) in text[body_start..].char_indices() {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                ']' => {
                    self.pos = body_start + i + 1;
                    return Ok(builder::class(&text[body_start..body_start + i]));
                }
                _ => {}
            }
        }
        Err(self.error("unterminated character class"))
    }

    /// Quoted literal with its escapes resolved
    fn quoted(&mut self) -> Result<String, GrammarError> {
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected a quoted string")),
        };
        let start = self.pos;
        self.pos += 1;
        let text = self.text;
        let mut value = String::new();
        let mut chars = text[self.pos..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                c if c == quote => {
                    self.pos += i + 1;
                    return Ok(value);
                }
                '\\' => {
                    let escaped = match chars.next() {
                        Some((_, 'n')) => '\n',
                        Some((_, 'r')) => '\r',
                        Some((_, 't')) => '\t',
                        Some((_, e @ ('\\' | '\'' | '"'))) => e,
                        Some((j, e)) => {
                            self.pos += j;
                            return Err(self.error(&format!("unknown escape '\\{}'", e)));
                        }
                        None => break,
                    };
                    value.push(escaped);
                }
                c => value.push(c),
            }
        }
        self.pos = start;
        Err(self.error("unterminated string"))
    }

    fn ident(&mut self) -> Option<&'t str> {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return None,
        }
        let len = chars
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$'))
            .map_or(rest.len(), |(i, _)| i);
        self.pos += len;
        Some(&rest[..len])
    }

    fn skip_ws(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();
            if !trimmed.starts_with('#') {
                return;
            }
            self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn rest(&self) -> &'t str {
        &self.text[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn error(&self, message: &str) -> GrammarError {
        let position = Position::from_offset(self.text, self.pos);
        GrammarError::Syntax {
            offset: self.pos,
            line: position.line,
            column: position.column,
            message: message.to_string(),
        }
    }
}
