//! Placeholder tokens produced by the scanner.

use super::span::Span;

/// The syntactic context a placeholder appears in, derived from the text
/// immediately preceding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderContext {
    /// Ordinary value position.
    Value,
    /// Right-hand side of an `IN` keyword.
    In,
    /// Right-hand side of an `IS` keyword.
    Is,
    /// Right-hand side of an `IS NOT` keyword pair.
    IsNot,
}

/// One placeholder occurrence in the statement text.
///
/// Tokens are reported in left-to-right order, which for positional
/// placeholders must match the parameter order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderToken {
    /// Byte range of the placeholder text itself.
    pub span: Span,
    /// Parameter name for `%(name)s` placeholders, `None` for positional.
    pub name: Option<String>,
    /// Syntactic context.
    pub context: PlaceholderContext,
    /// True when an `IN` placeholder is already wrapped in parentheses
    /// (`IN (%s)`), so expansion must not add a second pair.
    pub parenthesized: bool,
}

impl PlaceholderToken {
    /// Returns true for named (`%(name)s`) placeholders.
    #[must_use]
    pub const fn is_named(&self) -> bool {
        self.name.is_some()
    }
}
