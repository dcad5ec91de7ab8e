//! Engine error definitions.

use strata_types::TypeError;
use thiserror::Error;

/// Errors raised while building or compiling backing-table expressions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("unbound variable: {0}")]
    UnboundVariable(String),

    #[error("unknown column '{name}', available: {available:?}")]
    UnknownColumn {
        name: String,
        available: Vec<String>,
    },

    #[error("duplicate output column: {0}")]
    DuplicateColumn(String),

    #[error("invalid window for {op}: {reason}")]
    InvalidWindow { op: String, reason: String },

    #[error("{0} is not an aggregate expression")]
    NotAnAggregate(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}
