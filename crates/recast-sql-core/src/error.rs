//! Error types for statement preparation.

/// Errors raised while preparing a statement for execution.
///
/// These are programmer errors: the statement and its parameters disagree in
/// a way that no amount of rewriting can fix, so they are surfaced
/// immediately and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrepareError {
    /// The number of positional placeholders does not match the number of
    /// supplied parameters. Covers multi-statement strings as well, since
    /// the count is taken over the whole text.
    #[error("statement expects {expected} parameters but {supplied} were supplied")]
    ParamCountMismatch {
        /// Positional placeholders found in the statement.
        expected: usize,
        /// Parameters supplied by the caller.
        supplied: usize,
    },

    /// The dialect name is not one this crate knows how to emit SQL for.
    #[error("unknown SQL dialect: {0}")]
    UnknownDialect(String),

    /// The statement uses one placeholder style (named or positional) but
    /// the parameters were supplied in the other.
    #[error("statement uses {placeholders} placeholders but {parameters} parameters were supplied")]
    ParamStyleMismatch {
        /// Placeholder style found in the statement.
        placeholders: &'static str,
        /// Parameter style supplied by the caller.
        parameters: &'static str,
    },
}

/// Result type for statement preparation.
pub type Result<T> = std::result::Result<T, PrepareError>;
