//! Percent-sign escaping inside string literals.

use crate::scan::ProtectedRanges;

/// Doubles literal percent signs inside string literals so that a
/// `%`-formatting driver does not read them as directives. A `%` already
/// followed by `%`, `s` or `(` is left alone, as is the second half of an
/// existing `%%` pair. `regexp_replace(...)` calls are never touched.
#[must_use]
pub(crate) fn escape_percent_in_literals(sql: &str) -> String {
    if !sql.contains('%') {
        return sql.to_string();
    }
    let ranges = ProtectedRanges::compute(sql);
    let mut out = String::with_capacity(sql.len() + 8);
    let mut prev: Option<char> = None;

    for (pos, c) in sql.char_indices() {
        if c == '%' && ranges.in_literal(pos) {
            let next = sql[pos + 1..].chars().next();
            let already_escaped =
                matches!(next, Some('%' | 's' | '(')) || prev == Some('%');
            if already_escaped {
                out.push('%');
            } else {
                out.push_str("%%");
            }
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}
