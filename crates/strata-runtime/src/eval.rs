//! Expression evaluation.

use std::cmp::Ordering;

use strata_engine::{AggFunc, AnalyticFunc, Func, ValueExpr, Window};
use strata_types::{DataType, Scalar};

use crate::batch::Batch;
use crate::executor::{group_rows, ExecutorError};

/// Evaluate `value` for every row of `batch`.
pub fn eval_vector(value: &ValueExpr, batch: &Batch) -> Result<Vec<Scalar>, ExecutorError> {
    let n = batch.num_rows();
    match value {
        ValueExpr::Column { name, .. } => batch.column(name),
        ValueExpr::Literal { value, dtype } => {
            let value = cast_value(value, dtype)?;
            Ok(vec![value; n])
        }
        ValueExpr::Random => Err(ExecutorError::Unsupported("RAND()".to_string())),
        ValueExpr::Call { func, args } => {
            let args = args
                .iter()
                .map(|arg| eval_vector(arg, batch))
                .collect::<Result<Vec<_>, _>>()?;
            (0..n)
                .map(|i| {
                    let row: Vec<Scalar> = args.iter().map(|arg| arg[i].clone()).collect();
                    apply_func(*func, &row)
                })
                .collect()
        }
        ValueExpr::Cast { expr, to } => eval_vector(expr, batch)?
            .iter()
            .map(|value| cast_value(value, to))
            .collect(),
        ValueExpr::Case {
            branches,
            otherwise,
        } => {
            let branches = branches
                .iter()
                .map(|(cond, then)| Ok((eval_vector(cond, batch)?, eval_vector(then, batch)?)))
                .collect::<Result<Vec<_>, ExecutorError>>()?;
            let otherwise = eval_vector(otherwise, batch)?;
            Ok((0..n)
                .map(|i| {
                    branches
                        .iter()
                        .find(|(cond, _)| matches!(cond[i], Scalar::Bool(true)))
                        .map(|(_, then)| then[i].clone())
                        .unwrap_or_else(|| otherwise[i].clone())
                })
                .collect())
        }
        ValueExpr::Aggregate { .. } => Err(ExecutorError::Execution(
            "aggregate outside of a grouped context".to_string(),
        )),
        ValueExpr::Analytic { func, window } => eval_analytic(func, window, batch),
    }
}

/// Evaluate an aggregate expression over all rows of `group`.
pub fn eval_grouped(value: &ValueExpr, group: &Batch) -> Result<Scalar, ExecutorError> {
    match value {
        ValueExpr::Aggregate { func, arg } => {
            let values = match arg {
                Some(arg) => eval_vector(arg, group)?,
                None => vec![Scalar::Bool(true); group.num_rows()],
            };
            aggregate(*func, &values)
        }
        ValueExpr::Literal { value, dtype } => cast_value(value, dtype),
        ValueExpr::Call { func, args } => {
            let args = args
                .iter()
                .map(|arg| eval_grouped(arg, group))
                .collect::<Result<Vec<_>, _>>()?;
            apply_func(*func, &args)
        }
        ValueExpr::Cast { expr, to } => cast_value(&eval_grouped(expr, group)?, to),
        ValueExpr::Case {
            branches,
            otherwise,
        } => {
            for (cond, then) in branches {
                if matches!(eval_grouped(cond, group)?, Scalar::Bool(true)) {
                    return eval_grouped(then, group);
                }
            }
            eval_grouped(otherwise, group)
        }
        other => Err(ExecutorError::Execution(format!(
            "non-aggregate expression in grouped context: {:?}",
            other
        ))),
    }
}

fn eval_analytic(
    func: &AnalyticFunc,
    window: &Window,
    batch: &Batch,
) -> Result<Vec<Scalar>, ExecutorError> {
    let n = batch.num_rows();
    let partition_keys = window
        .partition_by
        .iter()
        .map(|key| eval_vector(key, batch))
        .collect::<Result<Vec<_>, _>>()?;
    let order_keys = window
        .order_by
        .iter()
        .map(|key| Ok((eval_vector(&key.expr, batch)?, key.ascending)))
        .collect::<Result<Vec<_>, ExecutorError>>()?;
    let arg = match func {
        AnalyticFunc::Aggregate(_, Some(arg))
        | AnalyticFunc::FirstValue(arg)
        | AnalyticFunc::LastValue(arg)
        | AnalyticFunc::Lag(arg, _)
        | AnalyticFunc::Lead(arg, _) => Some(eval_vector(arg, batch)?),
        _ => None,
    };

    let compare = |a: usize, b: usize| -> Ordering { compare_keys(&order_keys, a, b) };
    let mut out = vec![Scalar::Null; n];
    for mut partition in group_rows(&partition_keys, n) {
        partition.sort_by(|&a, &b| compare(a, b).then(a.cmp(&b)));
        for (pos, &row) in partition.iter().enumerate() {
            out[row] = match func {
                AnalyticFunc::RowNumber => Scalar::Int64(pos as i64),
                AnalyticFunc::Rank => {
                    let first_peer = (0..=pos)
                        .find(|&p| compare(partition[p], row) == Ordering::Equal)
                        .unwrap_or(pos);
                    Scalar::Int64(first_peer as i64 + 1)
                }
                AnalyticFunc::DenseRank => {
                    let distinct_before = (1..=pos)
                        .filter(|&p| compare(partition[p - 1], partition[p]) != Ordering::Equal)
                        .count();
                    Scalar::Int64(distinct_before as i64 + 1)
                }
                AnalyticFunc::Lag(_, offset) => offset_value(&partition, &arg, pos as i64 - *offset as i64),
                AnalyticFunc::Lead(_, offset) => offset_value(&partition, &arg, pos as i64 + *offset as i64),
                AnalyticFunc::Aggregate(agg, _) => {
                    let (start, end) = frame_bounds(window, &partition, pos, &compare);
                    let values: Vec<Scalar> = match &arg {
                        Some(arg) => partition[start..end].iter().map(|&r| arg[r].clone()).collect(),
                        None => vec![Scalar::Bool(true); end - start],
                    };
                    aggregate(*agg, &values)?
                }
                AnalyticFunc::FirstValue(_) | AnalyticFunc::LastValue(_) => {
                    let (start, end) = frame_bounds(window, &partition, pos, &compare);
                    let pick = if matches!(func, AnalyticFunc::FirstValue(_)) {
                        (start < end).then_some(start)
                    } else {
                        (start < end).then(|| end - 1)
                    };
                    match (pick, &arg) {
                        (Some(p), Some(arg)) => arg[partition[p]].clone(),
                        _ => Scalar::Null,
                    }
                }
            };
        }
    }
    Ok(out)
}

fn offset_value(partition: &[usize], arg: &Option<Vec<Scalar>>, pos: i64) -> Scalar {
    match arg {
        Some(arg) if pos >= 0 && (pos as usize) < partition.len() => arg[partition[pos as usize]].clone(),
        _ => Scalar::Null,
    }
}

/// Half-open range of partition positions in the frame of the row at `pos`.
fn frame_bounds(
    window: &Window,
    partition: &[usize],
    pos: usize,
    compare: &dyn Fn(usize, usize) -> Ordering,
) -> (usize, usize) {
    let len = partition.len();
    if !window.is_ordered() {
        return (0, len);
    }
    match window.frame {
        Some(frame) => {
            let start = match frame.preceding {
                None => 0,
                Some(p) => pos.saturating_sub(p as usize),
            };
            let end = match frame.following {
                None => len,
                Some(f) => (pos + f as usize + 1).min(len),
            };
            (start, end.max(start))
        }
        None => {
            // Default frame: everything up to the last peer of the current row.
            let mut end = pos + 1;
            while end < len && compare(partition[end], partition[pos]) == Ordering::Equal {
                end += 1;
            }
            (0, end)
        }
    }
}

fn compare_keys(keys: &[(Vec<Scalar>, bool)], a: usize, b: usize) -> Ordering {
    for (values, ascending) in keys {
        let ord = values[a].sort_cmp(&values[b]);
        let ord = if *ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn aggregate(func: AggFunc, values: &[Scalar]) -> Result<Scalar, ExecutorError> {
    let non_null: Vec<&Scalar> = values.iter().filter(|v| !v.is_null()).collect();
    let result = match func {
        AggFunc::CountStar => Scalar::Int64(values.len() as i64),
        AggFunc::Count => Scalar::Int64(non_null.len() as i64),
        AggFunc::CountDistinct => {
            let mut sorted = non_null.clone();
            sorted.sort_by(|a, b| a.sort_cmp(b));
            sorted.dedup_by(|a, b| a.sort_cmp(b) == Ordering::Equal);
            Scalar::Int64(sorted.len() as i64)
        }
        _ if non_null.is_empty() => Scalar::Null,
        AggFunc::Sum => {
            if non_null.iter().all(|v| matches!(v, Scalar::Int64(_))) {
                let mut total: i64 = 0;
                for v in &non_null {
                    if let Scalar::Int64(n) = v {
                        total = total
                            .checked_add(*n)
                            .ok_or_else(|| ExecutorError::Execution("integer overflow".to_string()))?;
                    }
                }
                Scalar::Int64(total)
            } else {
                Scalar::Float64(floats(&non_null)?.iter().sum())
            }
        }
        AggFunc::Avg => {
            let xs = floats(&non_null)?;
            Scalar::Float64(xs.iter().sum::<f64>() / xs.len() as f64)
        }
        AggFunc::StddevSamp | AggFunc::VarSamp => {
            let xs = floats(&non_null)?;
            if xs.len() < 2 {
                Scalar::Null
            } else {
                let mean = xs.iter().sum::<f64>() / xs.len() as f64;
                let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
                if func == AggFunc::VarSamp {
                    Scalar::Float64(var)
                } else {
                    Scalar::Float64(var.sqrt())
                }
            }
        }
        AggFunc::Min => non_null
            .iter()
            .min_by(|a, b| a.sort_cmp(b))
            .map(|v| (*v).clone())
            .unwrap_or(Scalar::Null),
        AggFunc::Max => non_null
            .iter()
            .max_by(|a, b| a.sort_cmp(b))
            .map(|v| (*v).clone())
            .unwrap_or(Scalar::Null),
        AggFunc::LogicalAnd => Scalar::Bool(non_null.iter().all(|v| v.as_bool() == Some(true))),
        AggFunc::LogicalOr => Scalar::Bool(non_null.iter().any(|v| v.as_bool() == Some(true))),
        AggFunc::AnyValue => non_null[0].clone(),
    };
    Ok(result)
}

fn floats(values: &[&Scalar]) -> Result<Vec<f64>, ExecutorError> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| ExecutorError::Execution(format!("expected a number, found {}", v)))
        })
        .collect()
}

fn apply_func(func: Func, args: &[Scalar]) -> Result<Scalar, ExecutorError> {
    // Logic and null tests see NULLs; everything else propagates them.
    match func {
        Func::And => return Ok(and(&args[0], &args[1])),
        Func::Or => return Ok(or(&args[0], &args[1])),
        Func::IsNull => return Ok(Scalar::Bool(args[0].is_null())),
        Func::IsNotNull => return Ok(Scalar::Bool(!args[0].is_null())),
        Func::Coalesce => {
            return Ok(args
                .iter()
                .find(|v| !v.is_null())
                .cloned()
                .unwrap_or(Scalar::Null))
        }
        _ => {}
    }
    if args.iter().any(Scalar::is_null) {
        return Ok(Scalar::Null);
    }
    let overflow = || ExecutorError::Execution(format!("integer overflow in {}", func.sql_name()));
    let result = match func {
        Func::Add | Func::Sub | Func::Mul => match (&args[0], &args[1]) {
            (Scalar::Int64(a), Scalar::Int64(b)) => {
                let result = match func {
                    Func::Add => a.checked_add(*b),
                    Func::Sub => a.checked_sub(*b),
                    _ => a.checked_mul(*b),
                };
                Scalar::Int64(result.ok_or_else(overflow)?)
            }
            (a, b) => {
                let (a, b) = (number(a)?, number(b)?);
                Scalar::Float64(match func {
                    Func::Add => a + b,
                    Func::Sub => a - b,
                    _ => a * b,
                })
            }
        },
        Func::Div => Scalar::Float64(number(&args[0])? / number(&args[1])?),
        Func::Mod => match (&args[0], &args[1]) {
            (Scalar::Int64(_), Scalar::Int64(0)) => {
                return Err(ExecutorError::Execution("division by zero".to_string()))
            }
            (Scalar::Int64(a), Scalar::Int64(b)) => Scalar::Int64(a % b),
            (a, b) => Scalar::Float64(number(a)? % number(b)?),
        },
        Func::Neg => match &args[0] {
            Scalar::Int64(n) => Scalar::Int64(n.checked_neg().ok_or_else(overflow)?),
            other => Scalar::Float64(-number(other)?),
        },
        Func::Abs => match &args[0] {
            Scalar::Int64(n) => Scalar::Int64(n.checked_abs().ok_or_else(overflow)?),
            other => Scalar::Float64(number(other)?.abs()),
        },
        Func::Eq | Func::Ne | Func::Lt | Func::Le | Func::Gt | Func::Ge => {
            let ord = args[0].sort_cmp(&args[1]);
            Scalar::Bool(match func {
                Func::Eq => ord == Ordering::Equal,
                Func::Ne => ord != Ordering::Equal,
                Func::Lt => ord == Ordering::Less,
                Func::Le => ord != Ordering::Greater,
                Func::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            })
        }
        Func::Not => Scalar::Bool(!boolean(&args[0])?),
        Func::Length => Scalar::Int64(string(&args[0])?.chars().count() as i64),
        Func::Upper => Scalar::String(string(&args[0])?.to_uppercase()),
        Func::Lower => Scalar::String(string(&args[0])?.to_lowercase()),
        Func::Concat => {
            let mut out = String::new();
            for arg in args {
                out.push_str(string(arg)?);
            }
            Scalar::String(out)
        }
        Func::ArrayLength => Scalar::Int64(array(&args[0])?.len() as i64),
        Func::GenerateArray => {
            let (start, end) = (integer(&args[0])?, integer(&args[1])?);
            Scalar::Array((start..=end).map(Scalar::Int64).collect())
        }
        Func::SafeOffset => {
            let items = array(&args[0])?;
            let index = integer(&args[1])?;
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or(Scalar::Null)
        }
        Func::Lpad => {
            let s = string(&args[0])?;
            let width = usize::try_from(integer(&args[1])?).unwrap_or(0);
            let pad: Vec<char> = string(&args[2])?.chars().collect();
            let chars: Vec<char> = s.chars().collect();
            if chars.len() >= width || pad.is_empty() {
                Scalar::String(chars.into_iter().take(width).collect())
            } else {
                let fill = width - chars.len();
                let mut out: String = pad.iter().cycle().take(fill).collect();
                out.extend(chars);
                Scalar::String(out)
            }
        }
        Func::Greatest => args
            .iter()
            .max_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Scalar::Null),
        Func::Least => args
            .iter()
            .min_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Scalar::Null),
        Func::And | Func::Or | Func::IsNull | Func::IsNotNull | Func::Coalesce => Scalar::Null,
    };
    Ok(result)
}

fn and(a: &Scalar, b: &Scalar) -> Scalar {
    match (a.as_bool(), b.as_bool()) {
        (Some(false), _) | (_, Some(false)) => Scalar::Bool(false),
        (Some(true), Some(true)) => Scalar::Bool(true),
        _ => Scalar::Null,
    }
}

fn or(a: &Scalar, b: &Scalar) -> Scalar {
    match (a.as_bool(), b.as_bool()) {
        (Some(true), _) | (_, Some(true)) => Scalar::Bool(true),
        (Some(false), Some(false)) => Scalar::Bool(false),
        _ => Scalar::Null,
    }
}

/// Convert a value to `to` with the warehouse's cast rules.
pub fn cast_value(value: &Scalar, to: &DataType) -> Result<Scalar, ExecutorError> {
    if value.is_null() || to.is_null() || &value.data_type() == to {
        return Ok(value.clone());
    }
    let fail = || ExecutorError::Execution(format!("cannot cast {} to {}", value, to));
    let result = match (value, to) {
        (Scalar::Array(items), DataType::Array(elem)) => Scalar::Array(
            items
                .iter()
                .map(|item| cast_value(item, elem))
                .collect::<Result<_, _>>()?,
        ),
        (_, DataType::String) => Scalar::String(format_value(value)),
        (Scalar::Int64(n), DataType::Float64) => Scalar::Float64(*n as f64),
        (Scalar::Float64(f), DataType::Int64) => {
            if !f.is_finite() {
                return Err(fail());
            }
            Scalar::Int64(f.round() as i64)
        }
        (Scalar::Bool(b), DataType::Int64) => Scalar::Int64(i64::from(*b)),
        (Scalar::Int64(n), DataType::Bool) => Scalar::Bool(*n != 0),
        (Scalar::Int64(n), DataType::Timestamp) => Scalar::Timestamp(*n),
        (Scalar::Timestamp(n), DataType::Int64) => Scalar::Int64(*n),
        (Scalar::String(s), DataType::Int64) => Scalar::Int64(s.trim().parse().map_err(|_| fail())?),
        (Scalar::String(s), DataType::Float64) => {
            Scalar::Float64(s.trim().parse().map_err(|_| fail())?)
        }
        (Scalar::String(s), DataType::Bool) => match s.to_lowercase().as_str() {
            "true" => Scalar::Bool(true),
            "false" => Scalar::Bool(false),
            _ => return Err(fail()),
        },
        (Scalar::String(s), DataType::Geography) => Scalar::Geography(s.clone()),
        _ => return Err(fail()),
    };
    Ok(result)
}

fn format_value(value: &Scalar) -> String {
    match value {
        Scalar::Float64(f) if f.is_nan() => "nan".to_string(),
        Scalar::Float64(f) if f.is_infinite() && *f > 0.0 => "inf".to_string(),
        Scalar::Float64(f) if f.is_infinite() => "-inf".to_string(),
        other => other.to_string(),
    }
}

fn number(value: &Scalar) -> Result<f64, ExecutorError> {
    value
        .as_f64()
        .ok_or_else(|| ExecutorError::Execution(format!("expected a number, found {}", value)))
}

fn integer(value: &Scalar) -> Result<i64, ExecutorError> {
    match value {
        Scalar::Int64(n) => Ok(*n),
        other => Err(ExecutorError::Execution(format!(
            "expected an integer, found {}",
            other
        ))),
    }
}

fn boolean(value: &Scalar) -> Result<bool, ExecutorError> {
    value
        .as_bool()
        .ok_or_else(|| ExecutorError::Execution(format!("expected a boolean, found {}", value)))
}

fn string(value: &Scalar) -> Result<&str, ExecutorError> {
    match value {
        Scalar::String(s) => Ok(s),
        other => Err(ExecutorError::Execution(format!(
            "expected a string, found {}",
            other
        ))),
    }
}

fn array(value: &Scalar) -> Result<&[Scalar], ExecutorError> {
    match value {
        Scalar::Array(items) => Ok(items),
        other => Err(ExecutorError::Execution(format!(
            "expected an array, found {}",
            other
        ))),
    }
}
