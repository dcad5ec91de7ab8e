//! Compilation of engine-independent expressions to engine values.

use std::collections::HashMap;

use strata_expr::{AggOp, Aggregation, Expression, ScalarOp};
use strata_types::{DataType, TypeError};

use crate::error::EngineError;
use crate::value::{AggFunc, AnalyticFunc, Func, ValueExpr, Window};

/// Column id to the engine value it stands for.
pub type Bindings = HashMap<String, ValueExpr>;

/// Translates scalar expressions and aggregations into engine values.
pub trait ExprCompiler {
    fn compile_expression(
        &self,
        expr: &Expression,
        bindings: &Bindings,
    ) -> Result<ValueExpr, EngineError>;

    /// A grouped aggregate.
    fn compile_aggregate(
        &self,
        agg: &Aggregation,
        bindings: &Bindings,
    ) -> Result<ValueExpr, EngineError>;

    /// An aggregate or window-only operation evaluated over `window`.
    fn compile_analytic(
        &self,
        agg: &Aggregation,
        window: &Window,
        bindings: &Bindings,
    ) -> Result<ValueExpr, EngineError>;
}

/// The standard compiler for the BigQuery backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCompiler;

impl ExprCompiler for DefaultCompiler {
    fn compile_expression(
        &self,
        expr: &Expression,
        bindings: &Bindings,
    ) -> Result<ValueExpr, EngineError> {
        let value = match expr {
            Expression::Const(value) => ValueExpr::literal(value.clone()),
            Expression::Var(id) => bindings
                .get(id)
                .cloned()
                .ok_or_else(|| EngineError::UnboundVariable(id.clone()))?,
            Expression::Op(op, args) => {
                check_arity(op, args.len())?;
                let args = args
                    .iter()
                    .map(|arg| self.compile_expression(arg, bindings))
                    .collect::<Result<Vec<_>, _>>()?;
                scalar_op(op, args)
            }
        };
        value.dtype()?;
        Ok(value)
    }

    fn compile_aggregate(
        &self,
        agg: &Aggregation,
        bindings: &Bindings,
    ) -> Result<ValueExpr, EngineError> {
        let op = agg.op();
        let arg = self.compile_input(agg, bindings)?;
        let value = match op {
            AggOp::Size => ValueExpr::Aggregate {
                func: AggFunc::CountStar,
                arg: None,
            },
            AggOp::Sum | AggOp::All | AggOp::Any => {
                let func = plain_agg_func(op).ok_or_else(|| window_only(op))?;
                let arg = require_input(op, arg)?;
                let zero = zero_for(op, &arg.dtype()?);
                let total = ValueExpr::Aggregate {
                    func,
                    arg: Some(Box::new(arg)),
                };
                ValueExpr::call(Func::Coalesce, vec![total, zero])
            }
            _ => {
                let func = plain_agg_func(op).ok_or_else(|| window_only(op))?;
                ValueExpr::Aggregate {
                    func,
                    arg: Some(Box::new(require_input(op, arg)?)),
                }
            }
        };
        value.dtype()?;
        Ok(value)
    }

    fn compile_analytic(
        &self,
        agg: &Aggregation,
        window: &Window,
        bindings: &Bindings,
    ) -> Result<ValueExpr, EngineError> {
        let op = agg.op();
        if op.requires_ordering() && op != AggOp::RowNumber && !window.is_ordered() {
            return Err(EngineError::InvalidWindow {
                op: op.name().to_string(),
                reason: "an ordered window is required".to_string(),
            });
        }
        let arg = self.compile_input(agg, bindings)?;
        let over = |func: AnalyticFunc| ValueExpr::over(func, window.clone());

        let value = match op {
            AggOp::RowNumber => over(AnalyticFunc::RowNumber),
            AggOp::Rank => over(AnalyticFunc::Rank),
            AggOp::DenseRank => over(AnalyticFunc::DenseRank),
            AggOp::Size => over(AnalyticFunc::Aggregate(AggFunc::CountStar, None)),
            AggOp::First => over(AnalyticFunc::FirstValue(Box::new(require_input(op, arg)?))),
            AggOp::Last => over(AnalyticFunc::LastValue(Box::new(require_input(op, arg)?))),
            AggOp::Shift(periods) => shifted(require_input(op, arg)?, periods, window),
            AggOp::Diff(periods) => {
                let value = require_input(op, arg)?;
                let previous = shifted(value.clone(), periods, window);
                ValueExpr::call(Func::Sub, vec![value, previous])
            }
            AggOp::Nunique if window.is_ordered() => {
                return Err(EngineError::InvalidWindow {
                    op: op.name().to_string(),
                    reason: "distinct counts cannot be ordered".to_string(),
                });
            }
            AggOp::Sum | AggOp::All | AggOp::Any => {
                let func = plain_agg_func(op).ok_or_else(|| window_only(op))?;
                let arg = require_input(op, arg)?;
                let zero = zero_for(op, &arg.dtype()?);
                let total = over(AnalyticFunc::Aggregate(func, Some(Box::new(arg))));
                ValueExpr::call(Func::Coalesce, vec![total, zero])
            }
            _ => {
                let func = plain_agg_func(op).ok_or_else(|| window_only(op))?;
                let arg = require_input(op, arg)?;
                over(AnalyticFunc::Aggregate(func, Some(Box::new(arg))))
            }
        };
        value.dtype()?;
        Ok(value)
    }
}

impl DefaultCompiler {
    fn compile_input(
        &self,
        agg: &Aggregation,
        bindings: &Bindings,
    ) -> Result<Option<ValueExpr>, EngineError> {
        agg.input()
            .map(|expr| self.compile_expression(expr, bindings))
            .transpose()
    }
}

/// Compile with the [`DefaultCompiler`].
pub fn compile_expression(expr: &Expression, bindings: &Bindings) -> Result<ValueExpr, EngineError> {
    DefaultCompiler.compile_expression(expr, bindings)
}

/// Compile a grouped aggregate with the [`DefaultCompiler`].
pub fn compile_aggregate(agg: &Aggregation, bindings: &Bindings) -> Result<ValueExpr, EngineError> {
    DefaultCompiler.compile_aggregate(agg, bindings)
}

/// Compile a window operation with the [`DefaultCompiler`].
pub fn compile_analytic(
    agg: &Aggregation,
    window: &Window,
    bindings: &Bindings,
) -> Result<ValueExpr, EngineError> {
    DefaultCompiler.compile_analytic(agg, window, bindings)
}

fn check_arity(op: &ScalarOp, found: usize) -> Result<(), EngineError> {
    let ok = match op.arity() {
        Some(expected) => expected == found,
        None => found >= 1,
    };
    if ok {
        Ok(())
    } else {
        Err(TypeError::WrongArity {
            op: op.name().to_string(),
            expected: op.arity().unwrap_or(1),
            found,
        }
        .into())
    }
}

fn scalar_op(op: &ScalarOp, mut args: Vec<ValueExpr>) -> ValueExpr {
    let func = match op {
        ScalarOp::Add => Func::Add,
        ScalarOp::Sub => Func::Sub,
        ScalarOp::Mul => Func::Mul,
        ScalarOp::Div => Func::Div,
        ScalarOp::Mod => Func::Mod,
        ScalarOp::Neg => Func::Neg,
        ScalarOp::Eq => Func::Eq,
        ScalarOp::Ne => Func::Ne,
        ScalarOp::Lt => Func::Lt,
        ScalarOp::Le => Func::Le,
        ScalarOp::Gt => Func::Gt,
        ScalarOp::Ge => Func::Ge,
        ScalarOp::And => Func::And,
        ScalarOp::Or => Func::Or,
        ScalarOp::Not => Func::Not,
        ScalarOp::IsNull => Func::IsNull,
        ScalarOp::NotNull => Func::IsNotNull,
        ScalarOp::Coalesce => Func::Coalesce,
        ScalarOp::Abs => Func::Abs,
        ScalarOp::StrLen => Func::Length,
        ScalarOp::Upper => Func::Upper,
        ScalarOp::Lower => Func::Lower,
        ScalarOp::StrConcat => Func::Concat,
        ScalarOp::ArrayLen => Func::ArrayLength,
        ScalarOp::AsType(to) => {
            let expr = args.remove(0);
            return expr.cast(to.clone());
        }
        ScalarOp::Where => {
            let otherwise = args.remove(2);
            let then = args.remove(1);
            let cond = args.remove(0);
            return ValueExpr::Case {
                branches: vec![(cond, then)],
                otherwise: Box::new(otherwise),
            };
        }
    };
    ValueExpr::call(func, args)
}

fn plain_agg_func(op: AggOp) -> Option<AggFunc> {
    match op {
        AggOp::Sum => Some(AggFunc::Sum),
        AggOp::Mean => Some(AggFunc::Avg),
        AggOp::Min => Some(AggFunc::Min),
        AggOp::Max => Some(AggFunc::Max),
        AggOp::Count => Some(AggFunc::Count),
        AggOp::Size => Some(AggFunc::CountStar),
        AggOp::Std => Some(AggFunc::StddevSamp),
        AggOp::Var => Some(AggFunc::VarSamp),
        AggOp::All => Some(AggFunc::LogicalAnd),
        AggOp::Any => Some(AggFunc::LogicalOr),
        AggOp::Nunique => Some(AggFunc::CountDistinct),
        AggOp::First
        | AggOp::Last
        | AggOp::Rank
        | AggOp::DenseRank
        | AggOp::RowNumber
        | AggOp::Shift(_)
        | AggOp::Diff(_) => None,
    }
}

/// Value substituted when an aggregate sees no non-null input.
fn zero_for(op: AggOp, input: &DataType) -> ValueExpr {
    match op {
        AggOp::All => ValueExpr::literal(true),
        AggOp::Any => ValueExpr::literal(false),
        _ if input.is_float() => ValueExpr::literal(0.0),
        _ => ValueExpr::literal(0i64),
    }
}

fn shifted(value: ValueExpr, periods: i64, window: &Window) -> ValueExpr {
    // Shifts address neighbouring rows, so any frame on the window is moot.
    let window = Window {
        frame: None,
        ..window.clone()
    };
    match periods {
        0 => value,
        n if n > 0 => ValueExpr::over(AnalyticFunc::Lag(Box::new(value), n as u64), window),
        n => ValueExpr::over(
            AnalyticFunc::Lead(Box::new(value), n.unsigned_abs()),
            window,
        ),
    }
}

fn require_input(op: AggOp, arg: Option<ValueExpr>) -> Result<ValueExpr, EngineError> {
    arg.ok_or_else(|| EngineError::Unsupported(format!("{} requires an input column", op.name())))
}

fn window_only(op: AggOp) -> EngineError {
    EngineError::Unsupported(format!("{} is only valid as a window operation", op.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::SortKey;

    fn bindings() -> Bindings {
        HashMap::from([
            ("x".to_string(), ValueExpr::column("x", DataType::Int64)),
            ("f".to_string(), ValueExpr::column("f", DataType::Float64)),
            ("b".to_string(), ValueExpr::column("b", DataType::Bool)),
        ])
    }

    fn ordered() -> Window {
        Window {
            partition_by: vec![],
            order_by: vec![SortKey {
                expr: ValueExpr::column("x", DataType::Int64),
                ascending: true,
            }],
            frame: None,
        }
    }

    #[test]
    fn test_unbound_variable() {
        let err = compile_expression(&Expression::var("nope"), &bindings()).unwrap_err();
        assert_eq!(err, EngineError::UnboundVariable("nope".to_string()));
    }

    #[test]
    fn test_where_becomes_case() {
        let expr = Expression::op(
            ScalarOp::Where,
            vec![
                Expression::var("b"),
                Expression::var("x"),
                Expression::lit(0i64),
            ],
        );
        let value = compile_expression(&expr, &bindings()).unwrap();
        assert!(matches!(value, ValueExpr::Case { .. }));
        assert_eq!(value.dtype().unwrap(), DataType::Int64);
    }

    #[test]
    fn test_wrong_arity() {
        let expr = Expression::op(ScalarOp::Add, vec![Expression::var("x")]);
        assert!(compile_expression(&expr, &bindings()).is_err());
    }

    #[test]
    fn test_sum_fills_zero() {
        let value = compile_aggregate(&Aggregation::unary(AggOp::Sum, "f"), &bindings()).unwrap();
        match value {
            ValueExpr::Call {
                func: Func::Coalesce,
                args,
            } => assert_eq!(args[1], ValueExpr::literal(0.0)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_size_is_count_star() {
        let value = compile_aggregate(&Aggregation::nullary(AggOp::Size), &bindings()).unwrap();
        assert_eq!(
            value,
            ValueExpr::Aggregate {
                func: AggFunc::CountStar,
                arg: None
            }
        );
    }

    #[test]
    fn test_ranking_not_aggregate() {
        let err = compile_aggregate(&Aggregation::unary(AggOp::Rank, "x"), &bindings()).unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(_)));
    }

    #[test]
    fn test_shift_requires_order() {
        let err = compile_analytic(
            &Aggregation::unary(AggOp::Shift(1), "x"),
            &Window::default(),
            &bindings(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidWindow { .. }));
    }

    #[test]
    fn test_shift_direction() {
        let lag = compile_analytic(&Aggregation::unary(AggOp::Shift(2), "x"), &ordered(), &bindings())
            .unwrap();
        assert!(matches!(
            lag,
            ValueExpr::Analytic {
                func: AnalyticFunc::Lag(_, 2),
                ..
            }
        ));
        let lead = compile_analytic(
            &Aggregation::unary(AggOp::Shift(-1), "x"),
            &ordered(),
            &bindings(),
        )
        .unwrap();
        assert!(matches!(
            lead,
            ValueExpr::Analytic {
                func: AnalyticFunc::Lead(_, 1),
                ..
            }
        ));
    }

    #[test]
    fn test_diff_subtracts_lag() {
        let value = compile_analytic(&Aggregation::unary(AggOp::Diff(1), "x"), &ordered(), &bindings())
            .unwrap();
        assert!(matches!(value, ValueExpr::Call { func: Func::Sub, .. }));
    }

    #[test]
    fn test_row_number_unordered_allowed() {
        let value = compile_analytic(
            &Aggregation::nullary(AggOp::RowNumber),
            &Window::default(),
            &bindings(),
        )
        .unwrap();
        assert_eq!(value.dtype().unwrap(), DataType::Int64);
    }
}
