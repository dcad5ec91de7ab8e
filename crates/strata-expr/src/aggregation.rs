//! Aggregate and analytic operations.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::expression::Expression;

/// Aggregate operators. Most are usable both as grouped aggregates and as
/// window (analytic) operations; the ranking and offset ops are window-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggOp {
    Sum,
    Mean,
    Min,
    Max,
    Count,
    Size,
    Std,
    Var,
    All,
    Any,
    Nunique,
    First,
    Last,
    Rank,
    DenseRank,
    RowNumber,
    Shift(i64),
    Diff(i64),
}

impl AggOp {
    /// Whether NULL inputs are ignored by the op.
    pub fn skips_nulls(&self) -> bool {
        !matches!(
            self,
            AggOp::Count
                | AggOp::Size
                | AggOp::First
                | AggOp::Last
                | AggOp::RowNumber
                | AggOp::Shift(_)
                | AggOp::Diff(_)
        )
    }

    /// Ops whose result is defined by ties in the ordering rather than by a
    /// single row position. Windows for these must not get a tie-break.
    pub fn handles_ties(&self) -> bool {
        matches!(self, AggOp::Rank | AggOp::DenseRank)
    }

    /// Ops that only make sense over an ordered window.
    pub fn requires_ordering(&self) -> bool {
        matches!(
            self,
            AggOp::Rank | AggOp::DenseRank | AggOp::RowNumber | AggOp::Shift(_) | AggOp::Diff(_)
        )
    }

    /// Ops that take no input column.
    pub fn is_nullary(&self) -> bool {
        matches!(self, AggOp::Size | AggOp::RowNumber)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggOp::Sum => "sum",
            AggOp::Mean => "mean",
            AggOp::Min => "min",
            AggOp::Max => "max",
            AggOp::Count => "count",
            AggOp::Size => "size",
            AggOp::Std => "std",
            AggOp::Var => "var",
            AggOp::All => "all",
            AggOp::Any => "any",
            AggOp::Nunique => "nunique",
            AggOp::First => "first",
            AggOp::Last => "last",
            AggOp::Rank => "rank",
            AggOp::DenseRank => "dense_rank",
            AggOp::RowNumber => "row_number",
            AggOp::Shift(_) => "shift",
            AggOp::Diff(_) => "diff",
        }
    }
}

/// An aggregation applied to zero or one input expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Nullary(AggOp),
    Unary(AggOp, Expression),
}

impl Aggregation {
    pub fn nullary(op: AggOp) -> Self {
        Aggregation::Nullary(op)
    }

    pub fn unary(op: AggOp, column: impl Into<String>) -> Self {
        Aggregation::Unary(op, Expression::var(column))
    }

    pub fn op(&self) -> AggOp {
        match self {
            Aggregation::Nullary(op) | Aggregation::Unary(op, _) => *op,
        }
    }

    pub fn input(&self) -> Option<&Expression> {
        match self {
            Aggregation::Nullary(_) => None,
            Aggregation::Unary(_, expr) => Some(expr),
        }
    }

    pub fn free_vars(&self) -> BTreeSet<String> {
        self.input().map(Expression::free_vars).unwrap_or_default()
    }
}
