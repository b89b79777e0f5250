//! Statement rewriting.
//!
//! [`prepare`] is the main entry point: it scans a statement for
//! placeholders, normalizes the supplied parameters, expands IN clauses,
//! collapses `IS %s` against NULL into literal SQL, and escapes stray
//! percent signs for `%`-formatting drivers. [`convert_placeholders`]
//! is the lightweight sibling for statements that carry no parameters.

mod convert;
mod escape;

pub use convert::convert_placeholders;

use std::collections::BTreeMap;

use crate::dialect::SqlDialect;
use crate::error::{PrepareError, Result};
use crate::params::{normalize, Param, Params};
use crate::scan::{scan_placeholders, PlaceholderContext, PlaceholderToken};

use escape::escape_percent_in_literals;

/// Rewrites a statement and its parameters into the exact form the driver
/// will receive.
///
/// * IN placeholders expand to one marker per element; an empty sequence
///   becomes `(NULL)`, which matches no row.
/// * `IS %s` / `IS NOT %s` against a NULL parameter collapses to literal
///   `IS NULL` / `IS NOT NULL` and the parameter is dropped.
/// * For PostgreSQL-family dialects, percent signs inside string literals
///   are doubled so the driver's `%`-formatting pass keeps them intact.
/// * Named and positional placeholders cannot be mixed, and positional
///   counts must match exactly.
///
/// A statement without placeholders returns unchanged with an empty
/// parameter set. An empty statement or empty parameter set short-circuits.
///
/// # Errors
///
/// Returns [`PrepareError::ParamStyleMismatch`] when placeholder style and
/// parameter shape disagree, and [`PrepareError::ParamCountMismatch`] when
/// positional counts differ.
pub fn prepare(sql: &str, params: Params, dialect: SqlDialect) -> Result<(String, Params)> {
    if sql.is_empty() || params.is_empty() {
        return Ok((sql.to_string(), params));
    }

    let mut sql = sql.to_string();
    let mut tokens = scan_placeholders(&sql);
    if tokens.is_empty() {
        return Ok((sql, Params::none()));
    }

    // Escaping can shift byte offsets, so rescan afterwards.
    if dialect.is_postgres_family() {
        let escaped = escape_percent_in_literals(&sql);
        if escaped != sql {
            sql = escaped;
            tokens = scan_placeholders(&sql);
        }
    }

    let named_tokens = tokens.iter().filter(|t| t.is_named()).count();
    if named_tokens != 0 && named_tokens != tokens.len() {
        return Err(PrepareError::ParamStyleMismatch {
            placeholders: "mixed",
            parameters: params_style(&params),
        });
    }

    let params = normalize(&tokens, params);
    match (named_tokens == tokens.len(), params) {
        (true, Params::Named(map)) => splice_named(&sql, &tokens, map),
        (false, Params::Positional(args)) => splice_positional(&sql, &tokens, args, dialect),
        (true, params @ Params::Positional(_)) => Err(PrepareError::ParamStyleMismatch {
            placeholders: "named",
            parameters: params_style(&params),
        }),
        (false, params @ Params::Named(_)) => Err(PrepareError::ParamStyleMismatch {
            placeholders: "positional",
            parameters: params_style(&params),
        }),
    }
}

const fn params_style(params: &Params) -> &'static str {
    match params {
        Params::Positional(_) => "positional",
        Params::Named(_) => "named",
    }
}

/// Renders `n` markers joined by commas, parenthesized unless the
/// surrounding text already carries the parentheses.
fn marker_group(n: usize, marker: &str, parenthesized: bool) -> String {
    let body = vec![marker; n].join(", ");
    if parenthesized {
        body
    } else {
        format!("({body})")
    }
}

fn null_group(parenthesized: bool) -> &'static str {
    if parenthesized {
        "NULL"
    } else {
        "(NULL)"
    }
}

/// Unwraps the historical `[( … )]` nesting around an IN payload.
fn unwrap_in_payload(mut items: Vec<Param>) -> Vec<Param> {
    if items.len() == 1 && items[0].is_list() {
        if let Param::List(inner) = items.remove(0) {
            return inner;
        }
    }
    items
}

fn splice_positional(
    sql: &str,
    tokens: &[PlaceholderToken],
    args: Vec<Param>,
    dialect: SqlDialect,
) -> Result<(String, Params)> {
    if tokens.len() != args.len() {
        return Err(PrepareError::ParamCountMismatch {
            expected: tokens.len(),
            supplied: args.len(),
        });
    }

    let marker = dialect.marker();
    let mut out = String::with_capacity(sql.len());
    let mut out_args = Vec::with_capacity(args.len());
    let mut cursor = 0;

    for (token, arg) in tokens.iter().zip(args) {
        out.push_str(&sql[cursor..token.span.start]);
        cursor = token.span.end;

        match token.context {
            PlaceholderContext::Is | PlaceholderContext::IsNot if arg.is_null() => {
                out.push_str("NULL");
            }
            PlaceholderContext::In => match arg {
                Param::List(items) => {
                    let items = unwrap_in_payload(items);
                    if items.is_empty() {
                        out.push_str(null_group(token.parenthesized));
                    } else {
                        out.push_str(&marker_group(items.len(), marker, token.parenthesized));
                        out_args.extend(items);
                    }
                }
                scalar => {
                    out.push_str(&marker_group(1, marker, token.parenthesized));
                    out_args.push(scalar);
                }
            },
            _ => {
                out.push_str(marker);
                out_args.push(arg);
            }
        }
    }
    out.push_str(&sql[cursor..]);

    Ok((out, Params::Positional(out_args)))
}

fn splice_named(
    sql: &str,
    tokens: &[PlaceholderToken],
    mut map: BTreeMap<String, Param>,
) -> Result<(String, Params)> {
    let mut out = String::with_capacity(sql.len());
    let mut cursor = 0;

    for token in tokens {
        out.push_str(&sql[cursor..token.span.start]);
        let original = &sql[token.span.start..token.span.end];
        cursor = token.span.end;

        let Some(name) = token.name.as_deref() else {
            out.push_str(original);
            continue;
        };
        // A placeholder with no matching parameter passes through; the
        // driver reports it if it is genuinely unbound.
        if !map.contains_key(name) {
            out.push_str(original);
            continue;
        }

        match token.context {
            PlaceholderContext::Is | PlaceholderContext::IsNot
                if map.get(name).is_some_and(Param::is_null) =>
            {
                map.remove(name);
                out.push_str("NULL");
            }
            PlaceholderContext::In if map.get(name).is_some_and(Param::is_list) => {
                let Some(Param::List(items)) = map.remove(name) else {
                    continue;
                };
                let items = unwrap_in_payload(items);
                if items.is_empty() {
                    out.push_str(null_group(token.parenthesized));
                } else {
                    let markers: Vec<String> = (0..items.len())
                        .map(|i| format!("%({name}_{i})s"))
                        .collect();
                    let body = markers.join(", ");
                    if token.parenthesized {
                        out.push_str(&body);
                    } else {
                        out.push('(');
                        out.push_str(&body);
                        out.push(')');
                    }
                    for (i, item) in items.into_iter().enumerate() {
                        map.insert(format!("{name}_{i}"), item);
                    }
                }
            }
            _ => out.push_str(original),
        }
    }
    out.push_str(&sql[cursor..]);

    Ok((out, Params::Named(map)))
}
