//! Placeholder discovery.
//!
//! A single-pass character scanner finds every placeholder occurrence in a
//! statement (`%(name)s`, `%s`, `?`), classifies its syntactic context
//! (plain value, `IN`, `IS`, `IS NOT`) and records whether it already sits
//! inside parentheses. String literals and `regexp_replace(...)` calls are
//! protected ranges: nothing inside them is ever reported as a placeholder.

mod scanner;
mod span;
mod token;

pub use scanner::{scan_placeholders, ProtectedRanges};
pub(crate) use scanner::is_word_char;
pub use span::Span;
pub use token::{PlaceholderContext, PlaceholderToken};
