//! Single-pass placeholder scanner.

use super::span::Span;
use super::token::{PlaceholderContext, PlaceholderToken};

/// Byte ranges the placeholder scanner must never match inside: string
/// literals and `regexp_replace(...)` calls, whose `%` and `?` characters
/// belong to patterns, not parameters.
#[derive(Debug, Clone, Default)]
pub struct ProtectedRanges {
    /// Single- or double-quoted string literals (quote characters included),
    /// excluding literals that sit inside a `regexp_replace(...)` call.
    pub literals: Vec<Span>,
    /// Whole `regexp_replace(...)` calls, parenthesis-balanced.
    pub calls: Vec<Span>,
}

impl ProtectedRanges {
    /// Computes the protected ranges of a statement in one pass.
    #[must_use]
    pub fn compute(sql: &str) -> Self {
        let mut ranges = Self::default();
        let mut scanner = Scanner::new(sql);

        while let Some(c) = scanner.peek() {
            match c {
                '\'' | '"' => {
                    let start = scanner.pos;
                    scanner.consume_literal(c);
                    ranges.literals.push(Span::new(start, scanner.pos));
                }
                _ if scanner.at_regexp_replace() => {
                    let start = scanner.pos;
                    if scanner.consume_call() {
                        ranges.calls.push(Span::new(start, scanner.pos));
                    }
                }
                _ => {
                    scanner.advance();
                }
            }
        }
        ranges
    }

    /// Returns true if the byte offset is inside any protected range.
    #[must_use]
    pub fn is_protected(&self, pos: usize) -> bool {
        self.in_literal(pos) || self.in_call(pos)
    }

    /// Returns true if the byte offset is inside a string literal that is
    /// not itself part of a `regexp_replace(...)` call.
    #[must_use]
    pub fn in_literal(&self, pos: usize) -> bool {
        self.literals.iter().any(|span| span.contains(pos))
    }

    /// Returns true if the byte offset is inside a `regexp_replace(...)` call.
    #[must_use]
    pub fn in_call(&self, pos: usize) -> bool {
        self.calls.iter().any(|span| span.contains(pos))
    }
}

/// A minimal cursor over the statement text.
struct Scanner<'a> {
    /// The statement text.
    input: &'a str,
    /// The current byte position.
    pos: usize,
}

impl<'a> Scanner<'a> {
    const fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns the current character without advancing.
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    /// Returns the next character without advancing.
    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    /// Returns the character just before the current position.
    fn prev(&self) -> Option<char> {
        self.input[..self.pos].chars().next_back()
    }

    /// Advances to the next character and returns it.
    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Consumes a quoted literal starting at the current position,
    /// honoring doubled-quote escapes. Unterminated literals run to the
    /// end of the input.
    fn consume_literal(&mut self, quote: char) {
        self.advance(); // opening quote
        loop {
            match self.peek() {
                Some(c) if c == quote => {
                    if self.peek_next() == Some(quote) {
                        self.advance();
                        self.advance();
                    } else {
                        self.advance(); // closing quote
                        break;
                    }
                }
                Some(_) => {
                    self.advance();
                }
                None => break,
            }
        }
    }

    /// Returns true when the text at the current position starts a
    /// `regexp_replace` call name at a word boundary.
    fn at_regexp_replace(&self) -> bool {
        const NAME: &str = "regexp_replace";
        let Some(candidate) = self.input.get(self.pos..self.pos + NAME.len()) else {
            return false;
        };
        if !candidate.eq_ignore_ascii_case(NAME) {
            return false;
        }
        !self.prev().is_some_and(is_word_char)
    }

    /// Consumes `regexp_replace ( ... )` through the matching closing
    /// parenthesis, skipping over literals inside the argument list.
    /// Returns false (leaving the name consumed) when no argument list
    /// follows.
    fn consume_call(&mut self) -> bool {
        self.pos += "regexp_replace".len();
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
        if self.peek() != Some('(') {
            return false;
        }
        self.advance();
        let mut depth = 1_usize;
        while depth > 0 {
            match self.peek() {
                Some(q @ ('\'' | '"')) => self.consume_literal(q),
                Some('(') => {
                    depth += 1;
                    self.advance();
                }
                Some(')') => {
                    depth -= 1;
                    self.advance();
                }
                Some(_) => {
                    self.advance();
                }
                None => break,
            }
        }
        true
    }
}

/// Scans a statement and returns its placeholder tokens in left-to-right
/// order. Malformed SQL yields no or partial tokens; this never fails.
#[must_use]
pub fn scan_placeholders(sql: &str) -> Vec<PlaceholderToken> {
    let ranges = ProtectedRanges::compute(sql);
    let mut tokens = Vec::new();
    let mut scanner = Scanner::new(sql);

    while let Some(c) = scanner.peek() {
        let start = scanner.pos;
        if ranges.is_protected(start) {
            scanner.advance();
            continue;
        }
        match c {
            '%' => match scanner.peek_next() {
                // %% is an escaped percent, not a placeholder.
                Some('%') => {
                    scanner.advance();
                    scanner.advance();
                }
                Some('s') => {
                    scanner.advance();
                    scanner.advance();
                    tokens.push(make_token(sql, start, scanner.pos, None));
                }
                Some('(') => {
                    if let Some((name, end)) = scan_named(sql, start) {
                        scanner.pos = end;
                        tokens.push(make_token(sql, start, end, Some(name)));
                    } else {
                        scanner.advance();
                    }
                }
                _ => {
                    scanner.advance();
                }
            },
            '?' => {
                let prev = scanner.prev();
                scanner.advance();
                let next = scanner.peek();
                // A ? glued to word characters (e.g. inside an operator
                // soup or an identifier) is not a placeholder.
                if !prev.is_some_and(is_word_char) && !next.is_some_and(is_word_char) {
                    tokens.push(make_token(sql, start, scanner.pos, None));
                }
            }
            _ => {
                scanner.advance();
            }
        }
    }
    tokens
}

/// Parses a `%(name)s` placeholder starting at `start`, returning the name
/// and the end offset.
fn scan_named(sql: &str, start: usize) -> Option<(String, usize)> {
    let inner = sql[start..].strip_prefix("%(")?;
    let close = inner.find(')')?;
    if close == 0 {
        return None;
    }
    if !inner[close + 1..].starts_with('s') {
        return None;
    }
    Some((inner[..close].to_string(), start + close + 4))
}

fn make_token(sql: &str, start: usize, end: usize, name: Option<String>) -> PlaceholderToken {
    let (context, parenthesized) = classify_context(sql, start);
    PlaceholderToken {
        span: Span::new(start, end),
        name,
        context,
        parenthesized,
    }
}

/// Classifies a token by the upper-cased, right-trimmed text preceding it:
/// a trailing `IN` keyword (optionally through one already-open
/// parenthesis) yields `In`, trailing `IS NOT` yields `IsNot`, trailing
/// `IS` yields `Is`, anything else yields `Value`.
fn classify_context(sql: &str, start: usize) -> (PlaceholderContext, bool) {
    let before = sql[..start].trim_end();
    let (head, open_paren) = match before.strip_suffix('(') {
        Some(h) => (h.trim_end(), true),
        None => (before, false),
    };

    if strip_trailing_keyword(head, "in").is_some() {
        return (PlaceholderContext::In, open_paren);
    }
    if !open_paren {
        if let Some(rest) = strip_trailing_keyword(head, "not") {
            if strip_trailing_keyword(rest, "is").is_some() {
                return (PlaceholderContext::IsNot, false);
            }
        }
        if strip_trailing_keyword(head, "is").is_some() {
            return (PlaceholderContext::Is, false);
        }
    }
    (PlaceholderContext::Value, false)
}

/// Strips a trailing keyword (case-insensitive, at a word boundary) and
/// returns the remaining head text.
fn strip_trailing_keyword<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let s = s.trim_end();
    if s.len() < keyword.len() {
        return None;
    }
    let split = s.len() - keyword.len();
    if !s.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = s.split_at(split);
    if !tail.eq_ignore_ascii_case(keyword) {
        return None;
    }
    match head.chars().next_back() {
        Some(c) if is_word_char(c) => None,
        _ => Some(head),
    }
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
