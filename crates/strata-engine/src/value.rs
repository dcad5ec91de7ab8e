//! Value expressions over a backing table.

use std::collections::BTreeSet;

use strata_types::inference::{
    common_supertype_of, ensure_bool, ensure_castable, ensure_comparable, infer_arithmetic,
};
use strata_types::{DataType, Scalar, TypeError};

use crate::error::EngineError;

/// Scalar engine functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Func {
    Add,
    Sub,
    Mul,
    /// Float division; x/0 yields ±inf or NaN instead of an error.
    Div,
    Mod,
    Neg,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    IsNull,
    IsNotNull,
    Coalesce,
    Abs,
    Length,
    Upper,
    Lower,
    Concat,
    ArrayLength,
    /// `GENERATE_ARRAY(start, end)`, inclusive.
    GenerateArray,
    /// `arr[SAFE_OFFSET(i)]`: NULL when out of range.
    SafeOffset,
    /// `LPAD(str, len, pad)`.
    Lpad,
    Greatest,
    Least,
}

impl Func {
    pub fn sql_name(&self) -> &'static str {
        match self {
            Func::Add => "+",
            Func::Sub => "-",
            Func::Mul => "*",
            Func::Div => "IEEE_DIVIDE",
            Func::Mod => "MOD",
            Func::Neg => "-",
            Func::Eq => "=",
            Func::Ne => "!=",
            Func::Lt => "<",
            Func::Le => "<=",
            Func::Gt => ">",
            Func::Ge => ">=",
            Func::And => "AND",
            Func::Or => "OR",
            Func::Not => "NOT",
            Func::IsNull => "IS NULL",
            Func::IsNotNull => "IS NOT NULL",
            Func::Coalesce => "COALESCE",
            Func::Abs => "ABS",
            Func::Length => "LENGTH",
            Func::Upper => "UPPER",
            Func::Lower => "LOWER",
            Func::Concat => "CONCAT",
            Func::ArrayLength => "ARRAY_LENGTH",
            Func::GenerateArray => "GENERATE_ARRAY",
            Func::SafeOffset => "SAFE_OFFSET",
            Func::Lpad => "LPAD",
            Func::Greatest => "GREATEST",
            Func::Least => "LEAST",
        }
    }

    fn arity(&self) -> Option<usize> {
        match self {
            Func::Neg
            | Func::Not
            | Func::IsNull
            | Func::IsNotNull
            | Func::Abs
            | Func::Length
            | Func::Upper
            | Func::Lower
            | Func::ArrayLength => Some(1),
            Func::Lpad => Some(3),
            Func::Coalesce | Func::Concat | Func::Greatest | Func::Least => None,
            _ => Some(2),
        }
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggFunc {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    CountStar,
    CountDistinct,
    StddevSamp,
    VarSamp,
    LogicalAnd,
    LogicalOr,
    AnyValue,
}

impl AggFunc {
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggFunc::Sum => "SUM",
            AggFunc::Avg => "AVG",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
            AggFunc::Count | AggFunc::CountStar | AggFunc::CountDistinct => "COUNT",
            AggFunc::StddevSamp => "STDDEV_SAMP",
            AggFunc::VarSamp => "VAR_SAMP",
            AggFunc::LogicalAnd => "LOGICAL_AND",
            AggFunc::LogicalOr => "LOGICAL_OR",
            AggFunc::AnyValue => "ANY_VALUE",
        }
    }

    fn result_type(&self, arg: Option<&DataType>) -> Result<DataType, EngineError> {
        let numeric_arg = |arg: Option<&DataType>| -> Result<DataType, EngineError> {
            match arg {
                Some(ty) if ty.is_numeric() || ty.is_null() => Ok(ty.clone()),
                Some(ty) => Err(TypeError::InvalidOperand {
                    op: self.sql_name().to_string(),
                    ty: ty.clone(),
                }
                .into()),
                None => Err(EngineError::Unsupported(format!(
                    "{} without an argument",
                    self.sql_name()
                ))),
            }
        };
        match self {
            AggFunc::Sum => numeric_arg(arg),
            AggFunc::Avg | AggFunc::StddevSamp | AggFunc::VarSamp => {
                numeric_arg(arg).map(|_| DataType::Float64)
            }
            AggFunc::Count | AggFunc::CountStar | AggFunc::CountDistinct => Ok(DataType::Int64),
            AggFunc::LogicalAnd | AggFunc::LogicalOr => {
                if let Some(ty) = arg {
                    ensure_bool(ty)?;
                }
                Ok(DataType::Bool)
            }
            AggFunc::Min | AggFunc::Max | AggFunc::AnyValue => arg.cloned().ok_or_else(|| {
                EngineError::Unsupported(format!("{} without an argument", self.sql_name()))
            }),
        }
    }
}

/// Window-only functions and aggregates evaluated over a window.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyticFunc {
    Aggregate(AggFunc, Option<Box<ValueExpr>>),
    /// Zero-based row number within the partition.
    RowNumber,
    Rank,
    DenseRank,
    FirstValue(Box<ValueExpr>),
    LastValue(Box<ValueExpr>),
    Lag(Box<ValueExpr>, u64),
    Lead(Box<ValueExpr>, u64),
}

impl AnalyticFunc {
    /// Whether a frame clause applies to the function.
    pub fn accepts_frame(&self) -> bool {
        matches!(
            self,
            AnalyticFunc::Aggregate(..) | AnalyticFunc::FirstValue(_) | AnalyticFunc::LastValue(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnalyticFunc::Aggregate(func, _) => func.sql_name(),
            AnalyticFunc::RowNumber => "ROW_NUMBER",
            AnalyticFunc::Rank => "RANK",
            AnalyticFunc::DenseRank => "DENSE_RANK",
            AnalyticFunc::FirstValue(_) => "FIRST_VALUE",
            AnalyticFunc::LastValue(_) => "LAST_VALUE",
            AnalyticFunc::Lag(..) => "LAG",
            AnalyticFunc::Lead(..) => "LEAD",
        }
    }
}

/// One `ORDER BY` key of a window. NULLs sort first ascending, last descending.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub expr: ValueExpr,
    pub ascending: bool,
}

/// `ROWS BETWEEN` bounds relative to the current row; `None` is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Frame {
    pub preceding: Option<u64>,
    pub following: Option<u64>,
}

/// Partitioning, ordering and frame of an analytic function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Window {
    pub partition_by: Vec<ValueExpr>,
    pub order_by: Vec<SortKey>,
    pub frame: Option<Frame>,
}

impl Window {
    pub fn is_ordered(&self) -> bool {
        !self.order_by.is_empty()
    }

    fn values(&self) -> impl Iterator<Item = &ValueExpr> {
        self.partition_by
            .iter()
            .chain(self.order_by.iter().map(|key| &key.expr))
    }
}

/// A typed expression evaluated against the rows of a single input table.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    Column { name: String, dtype: DataType },
    Literal { value: Scalar, dtype: DataType },
    Call { func: Func, args: Vec<ValueExpr> },
    Cast { expr: Box<ValueExpr>, to: DataType },
    Case {
        branches: Vec<(ValueExpr, ValueExpr)>,
        otherwise: Box<ValueExpr>,
    },
    Aggregate {
        func: AggFunc,
        arg: Option<Box<ValueExpr>>,
    },
    Analytic { func: AnalyticFunc, window: Window },
    /// Uniform random float in [0, 1).
    Random,
}

impl ValueExpr {
    pub fn column(name: impl Into<String>, dtype: DataType) -> Self {
        ValueExpr::Column {
            name: name.into(),
            dtype,
        }
    }

    /// A literal typed by its value.
    pub fn literal(value: impl Into<Scalar>) -> Self {
        let value = value.into();
        let dtype = value.data_type();
        ValueExpr::Literal { value, dtype }
    }

    pub fn typed_null(dtype: DataType) -> Self {
        ValueExpr::Literal {
            value: Scalar::Null,
            dtype,
        }
    }

    pub fn call(func: Func, args: Vec<ValueExpr>) -> Self {
        ValueExpr::Call { func, args }
    }

    pub fn cast(self, to: DataType) -> Self {
        ValueExpr::Cast {
            expr: Box::new(self),
            to,
        }
    }

    pub fn is_null(self) -> Self {
        ValueExpr::call(Func::IsNull, vec![self])
    }

    pub fn is_not_null(self) -> Self {
        ValueExpr::call(Func::IsNotNull, vec![self])
    }

    pub fn and(self, other: ValueExpr) -> Self {
        ValueExpr::call(Func::And, vec![self, other])
    }

    /// `CASE WHEN cond THEN self ELSE NULL END`.
    pub fn when(self, cond: ValueExpr) -> Result<Self, EngineError> {
        let dtype = self.dtype()?;
        Ok(ValueExpr::Case {
            branches: vec![(cond, self)],
            otherwise: Box::new(ValueExpr::typed_null(dtype)),
        })
    }

    pub fn over(func: AnalyticFunc, window: Window) -> Self {
        ValueExpr::Analytic { func, window }
    }

    pub fn as_column(&self) -> Option<&str> {
        match self {
            ValueExpr::Column { name, .. } => Some(name),
            _ => None,
        }
    }

    /// True for expressions that reference no columns and are deterministic.
    pub fn is_constant(&self) -> bool {
        match self {
            ValueExpr::Literal { .. } => true,
            ValueExpr::Call { args, .. } => args.iter().all(ValueExpr::is_constant),
            ValueExpr::Cast { expr, .. } => expr.is_constant(),
            ValueExpr::Case {
                branches,
                otherwise,
            } => {
                branches
                    .iter()
                    .all(|(cond, value)| cond.is_constant() && value.is_constant())
                    && otherwise.is_constant()
            }
            _ => false,
        }
    }

    /// Whether evaluating the expression needs a whole group of rows.
    pub fn is_aggregate(&self) -> bool {
        match self {
            ValueExpr::Aggregate { .. } => true,
            ValueExpr::Column { .. }
            | ValueExpr::Literal { .. }
            | ValueExpr::Analytic { .. }
            | ValueExpr::Random => false,
            ValueExpr::Call { args, .. } => args.iter().any(ValueExpr::is_aggregate),
            ValueExpr::Cast { expr, .. } => expr.is_aggregate(),
            ValueExpr::Case {
                branches,
                otherwise,
            } => {
                branches
                    .iter()
                    .any(|(cond, value)| cond.is_aggregate() || value.is_aggregate())
                    || otherwise.is_aggregate()
            }
        }
    }

    /// Input columns referenced by the expression.
    pub fn referenced_columns(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut BTreeSet<String>) {
        match self {
            ValueExpr::Column { name, .. } => {
                out.insert(name.clone());
            }
            ValueExpr::Literal { .. } | ValueExpr::Random => {}
            ValueExpr::Call { args, .. } => args.iter().for_each(|arg| arg.collect_columns(out)),
            ValueExpr::Cast { expr, .. } => expr.collect_columns(out),
            ValueExpr::Case {
                branches,
                otherwise,
            } => {
                for (cond, value) in branches {
                    cond.collect_columns(out);
                    value.collect_columns(out);
                }
                otherwise.collect_columns(out);
            }
            ValueExpr::Aggregate { arg, .. } => {
                if let Some(arg) = arg {
                    arg.collect_columns(out);
                }
            }
            ValueExpr::Analytic { func, window } => {
                match func {
                    AnalyticFunc::Aggregate(_, Some(arg))
                    | AnalyticFunc::FirstValue(arg)
                    | AnalyticFunc::LastValue(arg)
                    | AnalyticFunc::Lag(arg, _)
                    | AnalyticFunc::Lead(arg, _) => arg.collect_columns(out),
                    _ => {}
                }
                window.values().for_each(|value| value.collect_columns(out));
            }
        }
    }

    /// Result type, checking operand types along the way.
    pub fn dtype(&self) -> Result<DataType, EngineError> {
        match self {
            ValueExpr::Column { dtype, .. } | ValueExpr::Literal { dtype, .. } => Ok(dtype.clone()),
            ValueExpr::Random => Ok(DataType::Float64),
            ValueExpr::Cast { expr, to } => {
                ensure_castable(&expr.dtype()?, to)?;
                Ok(to.clone())
            }
            ValueExpr::Case {
                branches,
                otherwise,
            } => {
                let mut types = Vec::with_capacity(branches.len() + 1);
                for (cond, value) in branches {
                    ensure_bool(&cond.dtype()?)?;
                    types.push(value.dtype()?);
                }
                types.push(otherwise.dtype()?);
                Ok(common_supertype_of(&types)?)
            }
            ValueExpr::Call { func, args } => call_type(*func, args),
            ValueExpr::Aggregate { func, arg } => {
                let arg_type = arg.as_ref().map(|arg| arg.dtype()).transpose()?;
                func.result_type(arg_type.as_ref())
            }
            ValueExpr::Analytic { func, window } => {
                for value in window.values() {
                    value.dtype()?;
                }
                match func {
                    AnalyticFunc::Aggregate(agg, arg) => {
                        let arg_type = arg.as_ref().map(|arg| arg.dtype()).transpose()?;
                        agg.result_type(arg_type.as_ref())
                    }
                    AnalyticFunc::RowNumber | AnalyticFunc::Rank | AnalyticFunc::DenseRank => {
                        Ok(DataType::Int64)
                    }
                    AnalyticFunc::FirstValue(arg)
                    | AnalyticFunc::LastValue(arg)
                    | AnalyticFunc::Lag(arg, _)
                    | AnalyticFunc::Lead(arg, _) => arg.dtype(),
                }
            }
        }
    }
}

fn call_type(func: Func, args: &[ValueExpr]) -> Result<DataType, EngineError> {
    let found = args.len();
    let arity_ok = match func.arity() {
        Some(expected) => expected == found,
        None => found >= 1,
    };
    if !arity_ok {
        return Err(TypeError::WrongArity {
            op: func.sql_name().to_string(),
            expected: func.arity().unwrap_or(1),
            found,
        }
        .into());
    }
    let types = args
        .iter()
        .map(ValueExpr::dtype)
        .collect::<Result<Vec<_>, _>>()?;
    let op = func.sql_name();
    let invalid_operand = |ty: &DataType| -> EngineError {
        TypeError::InvalidOperand {
            op: op.to_string(),
            ty: ty.clone(),
        }
        .into()
    };

    match func {
        Func::Add | Func::Sub | Func::Mul => Ok(infer_arithmetic(op, &types[0], &types[1])?),
        Func::Mod => Ok(infer_arithmetic(op, &types[0], &types[1])?),
        Func::Div => {
            infer_arithmetic(op, &types[0], &types[1])?;
            Ok(DataType::Float64)
        }
        Func::Neg | Func::Abs => {
            if types[0].is_numeric() || types[0].is_null() {
                Ok(types[0].clone())
            } else {
                Err(invalid_operand(&types[0]))
            }
        }
        Func::Eq | Func::Ne | Func::Lt | Func::Le | Func::Gt | Func::Ge => {
            ensure_comparable(op, &types[0], &types[1])?;
            Ok(DataType::Bool)
        }
        Func::And | Func::Or | Func::Not => {
            for ty in &types {
                ensure_bool(ty)?;
            }
            Ok(DataType::Bool)
        }
        Func::IsNull | Func::IsNotNull => Ok(DataType::Bool),
        Func::Coalesce | Func::Greatest | Func::Least => Ok(common_supertype_of(&types)?),
        Func::Length => match &types[0] {
            DataType::String | DataType::Null => Ok(DataType::Int64),
            other => Err(invalid_operand(other)),
        },
        Func::Upper | Func::Lower => match &types[0] {
            DataType::String | DataType::Null => Ok(DataType::String),
            other => Err(invalid_operand(other)),
        },
        Func::Concat => {
            for ty in &types {
                if !matches!(ty, DataType::String | DataType::Null) {
                    return Err(invalid_operand(ty));
                }
            }
            Ok(DataType::String)
        }
        Func::ArrayLength => match &types[0] {
            DataType::Array(_) | DataType::Null => Ok(DataType::Int64),
            other => Err(TypeError::NotAnArray {
                found: other.clone(),
            }
            .into()),
        },
        Func::GenerateArray => {
            for ty in &types {
                if !matches!(ty, DataType::Int64 | DataType::Null) {
                    return Err(invalid_operand(ty));
                }
            }
            Ok(DataType::Array(Box::new(DataType::Int64)))
        }
        Func::SafeOffset => {
            let elem = types[0]
                .element_type()
                .cloned()
                .ok_or_else(|| TypeError::NotAnArray {
                    found: types[0].clone(),
                })?;
            if !matches!(types[1], DataType::Int64 | DataType::Null) {
                return Err(invalid_operand(&types[1]));
            }
            Ok(elem)
        }
        Func::Lpad => {
            if !matches!(types[0], DataType::String | DataType::Null)
                || !matches!(types[1], DataType::Int64)
                || !matches!(types[2], DataType::String)
            {
                return Err(invalid_operand(&types[0]));
            }
            Ok(DataType::String)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, dtype: DataType) -> ValueExpr {
        ValueExpr::column(name, dtype)
    }

    #[test]
    fn test_arithmetic_types() {
        let sum = ValueExpr::call(
            Func::Add,
            vec![col("a", DataType::Int64), col("b", DataType::Float64)],
        );
        assert_eq!(sum.dtype().unwrap(), DataType::Float64);

        let div = ValueExpr::call(
            Func::Div,
            vec![col("a", DataType::Int64), col("a", DataType::Int64)],
        );
        assert_eq!(div.dtype().unwrap(), DataType::Float64);
    }

    #[test]
    fn test_bad_operand() {
        let bad = ValueExpr::call(
            Func::Add,
            vec![col("s", DataType::String), ValueExpr::literal(1i64)],
        );
        assert!(matches!(bad.dtype(), Err(EngineError::Type(_))));
    }

    #[test]
    fn test_safe_offset_type() {
        let arr = col("arr", DataType::Array(Box::new(DataType::String)));
        let item = ValueExpr::call(Func::SafeOffset, vec![arr, ValueExpr::literal(0i64)]);
        assert_eq!(item.dtype().unwrap(), DataType::String);
    }

    #[test]
    fn test_case_unifies_null() {
        let masked = col("x", DataType::Int64)
            .when(ValueExpr::literal(true))
            .unwrap();
        assert_eq!(masked.dtype().unwrap(), DataType::Int64);
    }

    #[test]
    fn test_referenced_columns_includes_window() {
        let expr = ValueExpr::over(
            AnalyticFunc::RowNumber,
            Window {
                partition_by: vec![col("g", DataType::String)],
                order_by: vec![SortKey {
                    expr: col("o", DataType::Int64),
                    ascending: true,
                }],
                frame: None,
            },
        );
        let cols: Vec<_> = expr.referenced_columns().into_iter().collect();
        assert_eq!(cols, vec!["g".to_string(), "o".to_string()]);
        assert!(!expr.is_constant());
    }

    #[test]
    fn test_constant_detection() {
        let expr = ValueExpr::call(
            Func::Add,
            vec![ValueExpr::literal(1i64), ValueExpr::literal(2i64)],
        );
        assert!(expr.is_constant());
        assert!(!ValueExpr::Random.is_constant());
    }
}
