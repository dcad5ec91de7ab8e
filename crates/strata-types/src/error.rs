//! Type error definitions.

use thiserror::Error;

use crate::types::DataType;

/// A type checking error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: DataType, found: DataType },

    #[error("cannot apply operator {op} to types {left} and {right}")]
    InvalidOperator {
        op: String,
        left: DataType,
        right: DataType,
    },

    #[error("cannot apply {op} to type {ty}")]
    InvalidOperand { op: String, ty: DataType },

    #[error("no common type for {types:?}")]
    NoCommonType { types: Vec<DataType> },

    #[error("expected an array, found {found}")]
    NotAnArray { found: DataType },

    #[error("non-boolean condition: expected bool, found {found}")]
    NonBooleanCondition { found: DataType },

    #[error("cannot cast {from} to {to}")]
    InvalidCast { from: DataType, to: DataType },

    #[error("wrong number of arguments to {op}: expected {expected}, found {found}")]
    WrongArity {
        op: String,
        expected: usize,
        found: usize,
    },
}
