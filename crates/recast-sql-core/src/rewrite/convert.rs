//! Placeholder marker conversion for argument-free statements.

use crate::dialect::SqlDialect;
use crate::scan::{is_word_char, ProtectedRanges};

/// Converts bare positional markers to the dialect's marker style without
/// touching named placeholders, string literals or `regexp_replace(...)`
/// calls. Intended for maintenance/DDL statements that carry no call-site
/// arguments; the pass is idempotent.
#[must_use]
pub fn convert_placeholders(sql: &str, dialect: SqlDialect) -> String {
    let ranges = ProtectedRanges::compute(sql);
    let mut out = String::with_capacity(sql.len());
    let mut pos = 0;

    while pos < sql.len() {
        let rest = &sql[pos..];
        let Some(c) = rest.chars().next() else { break };
        if ranges.is_protected(pos) {
            out.push(c);
            pos += c.len_utf8();
            continue;
        }
        match dialect {
            SqlDialect::Postgres => {
                let prev = sql[..pos].chars().next_back();
                let next = rest[c.len_utf8()..].chars().next();
                if c == '?'
                    && !prev.is_some_and(is_word_char)
                    && !next.is_some_and(is_word_char)
                {
                    out.push_str("%s");
                    pos += 1;
                    continue;
                }
            }
            SqlDialect::Sqlite | SqlDialect::SqlServer => {
                if c == '%' {
                    if rest.starts_with("%%") {
                        out.push_str("%%");
                        pos += 2;
                        continue;
                    }
                    if rest.starts_with("%s") {
                        out.push('?');
                        pos += 2;
                        continue;
                    }
                    // %(name)s stays untouched; copying the % verbatim is
                    // enough since the rest of the token has no bare %s.
                }
            }
        }
        out.push(c);
        pos += c.len_utf8();
    }
    out
}
