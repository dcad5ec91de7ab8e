//! Table executor.

use std::cmp::Ordering;
use std::collections::HashMap;

use strata_engine::{EngineError, Schema, Table};
use strata_types::Scalar;
use tracing::debug;

use crate::batch::Batch;
use crate::eval::{eval_grouped, eval_vector};

/// Execution error.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("source '{name}' registered with a different schema")]
    SchemaMismatch { name: String },

    #[error("unsupported in the reference executor: {0}")]
    Unsupported(String),

    #[error("execution error: {0}")]
    Execution(String),
}

/// Evaluates tables against a catalog of named in-memory sources.
#[derive(Debug, Default)]
pub struct Executor {
    sources: HashMap<String, Batch>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register rows for a named source table.
    pub fn register(&mut self, name: impl Into<String>, batch: Batch) {
        self.sources.insert(name.into(), batch);
    }

    /// Evaluate `table` to a batch.
    pub fn execute(&self, table: &Table) -> Result<Batch, ExecutorError> {
        let batch = self.run(table)?;
        debug!(rows = batch.num_rows(), "executed table");
        Ok(batch)
    }

    fn run(&self, table: &Table) -> Result<Batch, ExecutorError> {
        match table {
            Table::Source { name, schema } => {
                let batch = self
                    .sources
                    .get(name)
                    .ok_or_else(|| ExecutorError::SourceNotFound(name.clone()))?;
                if &batch.schema != schema {
                    return Err(ExecutorError::SchemaMismatch { name: name.clone() });
                }
                Ok(batch.clone())
            }

            Table::Memtable { schema, rows } => Ok(Batch::new(schema.clone(), rows.clone())),

            Table::Select { input, columns } => {
                let input = self.run(input)?;
                let mut schema = Schema::new();
                let mut vectors = Vec::with_capacity(columns.len());
                for (name, value) in columns {
                    schema.push(name.clone(), value.dtype()?)?;
                    vectors.push(eval_vector(value, &input)?);
                }
                let rows = (0..input.num_rows())
                    .map(|i| vectors.iter().map(|vector| vector[i].clone()).collect())
                    .collect();
                Ok(Batch::new(schema, rows))
            }

            Table::Filter { input, predicate } => {
                let input = self.run(input)?;
                let mask = eval_vector(predicate, &input)?;
                let keep: Vec<usize> = mask
                    .iter()
                    .enumerate()
                    .filter(|(_, value)| matches!(value, Scalar::Bool(true)))
                    .map(|(i, _)| i)
                    .collect();
                Ok(input.take(&keep))
            }

            Table::Aggregate { input, by, metrics } => {
                let schema = table.schema()?;
                let input = self.run(input)?;
                let keys = by
                    .iter()
                    .map(|key| input.column(key))
                    .collect::<Result<Vec<_>, _>>()?;
                let groups = if by.is_empty() {
                    // A scalar aggregate produces one row even over no input.
                    vec![(0..input.num_rows()).collect()]
                } else {
                    group_rows(&keys, input.num_rows())
                };
                let mut rows = Vec::with_capacity(groups.len());
                for group in groups {
                    let sub = input.take(&group);
                    let mut row: Vec<Scalar> = keys.iter().map(|key| key[group[0]].clone()).collect();
                    for (_, value) in metrics {
                        row.push(eval_grouped(value, &sub)?);
                    }
                    rows.push(row);
                }
                Ok(Batch::new(schema, rows))
            }

            Table::Unnest { input, column } => {
                let schema = table.schema()?;
                let input = self.run(input)?;
                let index = input
                    .schema
                    .index_of(column)
                    .ok_or_else(|| ExecutorError::ColumnNotFound(column.clone()))?;
                let mut rows = Vec::new();
                for row in &input.rows {
                    match &row[index] {
                        Scalar::Array(items) => {
                            for item in items {
                                let mut out = row.clone();
                                out[index] = item.clone();
                                rows.push(out);
                            }
                        }
                        Scalar::Null => {}
                        other => {
                            return Err(ExecutorError::Execution(format!(
                                "cannot unnest non-array value {}",
                                other
                            )))
                        }
                    }
                }
                Ok(Batch::new(schema, rows))
            }

            Table::Limit { input, count } => {
                let mut batch = self.run(input)?;
                let count = usize::try_from(*count).unwrap_or(usize::MAX);
                batch.rows.truncate(count);
                Ok(batch)
            }
        }
    }
}

/// Row indices grouped by equal key tuples. Groups come out in key order.
pub(crate) fn group_rows(keys: &[Vec<Scalar>], num_rows: usize) -> Vec<Vec<usize>> {
    let compare = |a: usize, b: usize| -> Ordering {
        keys.iter()
            .map(|key| key[a].sort_cmp(&key[b]))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    };
    let mut indices: Vec<usize> = (0..num_rows).collect();
    indices.sort_by(|&a, &b| compare(a, b));

    let mut groups: Vec<Vec<usize>> = Vec::new();
    for i in indices {
        match groups.last_mut() {
            Some(group) if compare(group[0], i) == Ordering::Equal => group.push(i),
            _ => groups.push(vec![i]),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use strata_engine::{AggFunc, Func, ValueExpr};
    use strata_types::DataType;

    fn executor() -> (Executor, Arc<Table>) {
        let schema = Schema::from_fields([
            ("g", DataType::String),
            ("x", DataType::Int64),
            ("arr", DataType::Array(Box::new(DataType::Int64))),
        ])
        .unwrap();
        let batch = Batch::new(
            schema.clone(),
            vec![
                vec![
                    Scalar::from("a"),
                    Scalar::Int64(1),
                    Scalar::Array(vec![Scalar::Int64(10), Scalar::Int64(11)]),
                ],
                vec![Scalar::from("b"), Scalar::Null, Scalar::Array(vec![])],
                vec![Scalar::from("a"), Scalar::Int64(3), Scalar::Null],
            ],
        );
        let mut executor = Executor::new();
        executor.register("t", batch);
        (executor, Arc::new(Table::source("t", schema)))
    }

    #[test]
    fn test_filter_drops_null_predicate() {
        let (executor, t) = executor();
        let pred = ValueExpr::call(
            Func::Gt,
            vec![ValueExpr::column("x", DataType::Int64), ValueExpr::literal(0i64)],
        );
        let result = executor.execute(&Table::filter(t, pred).unwrap()).unwrap();
        assert_eq!(result.num_rows(), 2);
    }

    #[test]
    fn test_grouped_sum() {
        let (executor, t) = executor();
        let sum = ValueExpr::Aggregate {
            func: AggFunc::Sum,
            arg: Some(Box::new(ValueExpr::column("x", DataType::Int64))),
        };
        let table = Table::aggregate(t, vec!["g".to_string()], vec![("s".to_string(), sum)]).unwrap();
        let result = executor.execute(&table).unwrap();
        assert_eq!(
            result.rows,
            vec![
                vec![Scalar::from("a"), Scalar::Int64(4)],
                vec![Scalar::from("b"), Scalar::Null],
            ]
        );
    }

    #[test]
    fn test_scalar_aggregate_over_empty_input() {
        let (executor, t) = executor();
        let none = Table::filter(t, ValueExpr::literal(false)).unwrap();
        let count = ValueExpr::Aggregate {
            func: AggFunc::CountStar,
            arg: None,
        };
        let table = Table::aggregate(Arc::new(none), vec![], vec![("n".to_string(), count)]).unwrap();
        let result = executor.execute(&table).unwrap();
        assert_eq!(result.rows, vec![vec![Scalar::Int64(0)]]);
    }

    #[test]
    fn test_unnest_skips_empty_and_null() {
        let (executor, t) = executor();
        let result = executor.execute(&Table::unnest(t, "arr").unwrap()).unwrap();
        assert_eq!(
            result.column("arr").unwrap(),
            vec![Scalar::Int64(10), Scalar::Int64(11)]
        );
    }

    #[test]
    fn test_missing_source() {
        let executor = Executor::new();
        let table = Table::source("nope", Schema::new());
        assert!(matches!(
            executor.execute(&table),
            Err(ExecutorError::SourceNotFound(_))
        ));
    }
}
