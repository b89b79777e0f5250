//! Canonical statement parameters and the argument normalizer.
//!
//! Callers supply parameters in a handful of historically-accepted shapes
//! (a flat sequence, a sequence wrapped one level too deep, a bare list for
//! a single IN clause). [`normalize`] resolves them into the one canonical
//! shape the rewriter assumes.

use std::collections::BTreeMap;

use crate::scan::{PlaceholderContext, PlaceholderToken};
use crate::value::{SqlValue, ToSqlValue};

/// One statement parameter: a single value, or a sequence destined for an
/// IN clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// A single bound value.
    Value(SqlValue),
    /// A sequence of parameters, expanded by IN-clause rewriting.
    List(Vec<Param>),
}

impl Param {
    /// Creates a single-value parameter.
    pub fn value(v: impl ToSqlValue) -> Self {
        Self::Value(v.to_sql_value())
    }

    /// Creates a NULL parameter.
    #[must_use]
    pub const fn null() -> Self {
        Self::Value(SqlValue::Null)
    }

    /// Creates a list parameter from an iterator of values.
    pub fn list<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToSqlValue,
    {
        Self::List(values.into_iter().map(Self::value).collect())
    }

    /// Returns true for a NULL value parameter.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Value(SqlValue::Null))
    }

    /// Returns true for a list parameter.
    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

/// The canonical parameter collection for one statement: either an ordered
/// positional sequence or a name-to-value map, never a mixture.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Ordered parameters for `%s` / `?` placeholders.
    Positional(Vec<Param>),
    /// Named parameters for `%(name)s` placeholders.
    Named(BTreeMap<String, Param>),
}

impl Params {
    /// Creates positional parameters.
    #[must_use]
    pub const fn positional(params: Vec<Param>) -> Self {
        Self::Positional(params)
    }

    /// Creates named parameters from (name, param) pairs.
    pub fn named<I, K>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, Param)>,
        K: Into<String>,
    {
        Self::Named(params.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// An empty positional parameter set.
    #[must_use]
    pub const fn none() -> Self {
        Self::Positional(Vec::new())
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(p) => p.len(),
            Self::Named(m) => m.len(),
        }
    }

    /// Returns true when no parameters were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::none()
    }
}

/// Resolves legacy parameter shapes into the canonical form, using the
/// scanned token list to disambiguate. Rules apply in order; the first
/// match wins:
///
/// 1. Named parameters pass through untouched.
/// 2. A statement with exactly one token, that token an IN placeholder,
///    given a flat sequence of plain values, treats the whole sequence as
///    the single IN payload (so `[1, 2, 3]` works without extra nesting).
/// 3. A one-element sequence wrapping one nested sequence unwraps to the
///    flat positional tuple when the nested length matches the token
///    count; a doubly-nested single element unwraps to a single IN payload.
/// 4. Anything else passes through unchanged.
///
/// Count mismatches are not resolved here; the rewriter reports them.
#[must_use]
pub fn normalize(tokens: &[PlaceholderToken], params: Params) -> Params {
    let Params::Positional(mut args) = params else {
        return params;
    };

    // Rule 2: bare sequence for a lone IN placeholder.
    let single_in = tokens.len() == 1 && tokens[0].context == PlaceholderContext::In;
    if single_in && !args.is_empty() && args.iter().all(|p| !p.is_list()) {
        return Params::Positional(vec![Param::List(args)]);
    }

    // Rule 3: one extra level of nesting around the real parameters.
    if args.len() == 1 && args[0].is_list() {
        return match args.remove(0) {
            Param::List(mut inner) => {
                if inner.len() == tokens.len() {
                    Params::Positional(inner)
                } else if inner.len() == 1 && inner[0].is_list() {
                    Params::Positional(vec![inner.remove(0)])
                } else {
                    Params::Positional(vec![Param::List(inner)])
                }
            }
            other => Params::Positional(vec![other]),
        };
    }

    Params::Positional(args)
}
