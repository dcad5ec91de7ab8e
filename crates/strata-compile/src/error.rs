//! Compiler error definitions.

use strata_engine::EngineError;
use strata_types::TypeError;
use thiserror::Error;

/// Errors raised while building nodes or emitting them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("duplicate column id: {0}")]
    DuplicateColumn(String),

    #[error("ids are both visible and hidden: {0:?}")]
    HiddenColumnOverlap(Vec<String>),

    #[error("ordering references unknown columns: {0:?}")]
    IllegalOrdering(Vec<String>),

    #[error("unsupported emission: {0}")]
    UnsupportedMode(String),

    #[error("column '{id}' not in set of values: {valid:?}")]
    ColumnNotFound { id: String, valid: Vec<String> },

    #[error("cannot reduce an empty list of predicates")]
    EmptyPredicates,

    #[error("expected a direct column reference, found {0}")]
    NotColumnReference(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<TypeError> for CompileError {
    fn from(err: TypeError) -> Self {
        CompileError::Engine(err.into())
    }
}
