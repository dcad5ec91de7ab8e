//! Backing-table relations.
//!
//! A [`Table`] is an immutable relation tree. Subtrees are shared through
//! `Arc`, so deriving a new table from an existing one never copies it.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strata_types::inference::ensure_bool;
use strata_types::{DataType, Scalar, TypeError};

use crate::error::EngineError;
use crate::value::ValueExpr;

/// Ordered column names and types of a relation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: IndexMap<String, DataType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields<I, S>(fields: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = (S, DataType)>,
        S: Into<String>,
    {
        let mut schema = Schema::new();
        for (name, dtype) in fields {
            schema.push(name.into(), dtype)?;
        }
        Ok(schema)
    }

    pub fn push(&mut self, name: String, dtype: DataType) -> Result<(), EngineError> {
        if self.fields.contains_key(&name) {
            return Err(EngineError::DuplicateColumn(name));
        }
        self.fields.insert(name, dtype);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DataType> {
        self.fields.get(name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.get_index_of(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DataType)> {
        self.fields.iter()
    }

    /// A column reference expression for `name`.
    pub fn column(&self, name: &str) -> Result<ValueExpr, EngineError> {
        let dtype = self.get(name).ok_or_else(|| EngineError::UnknownColumn {
            name: name.to_string(),
            available: self.names(),
        })?;
        Ok(ValueExpr::column(name, dtype.clone()))
    }
}

/// A relation the backend can render as SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Table {
    /// A named warehouse table.
    Source { name: String, schema: Schema },
    /// Inline rows.
    Memtable { schema: Schema, rows: Vec<Vec<Scalar>> },
    Select {
        input: Arc<Table>,
        columns: Vec<(String, ValueExpr)>,
    },
    Filter {
        input: Arc<Table>,
        predicate: ValueExpr,
    },
    /// Grouped aggregation. Output is the `by` columns, then the metrics.
    Aggregate {
        input: Arc<Table>,
        by: Vec<String>,
        metrics: Vec<(String, ValueExpr)>,
    },
    /// Replace an array column by its elements, one row per element.
    /// Rows with empty or NULL arrays disappear.
    Unnest { input: Arc<Table>, column: String },
    Limit { input: Arc<Table>, count: u64 },
}

impl Table {
    pub fn source(name: impl Into<String>, schema: Schema) -> Self {
        Table::Source {
            name: name.into(),
            schema,
        }
    }

    pub fn memtable(schema: Schema, rows: Vec<Vec<Scalar>>) -> Result<Self, EngineError> {
        for row in &rows {
            if row.len() != schema.len() {
                return Err(EngineError::Unsupported(format!(
                    "row of width {} for a schema of width {}",
                    row.len(),
                    schema.len()
                )));
            }
        }
        Ok(Table::Memtable { schema, rows })
    }

    /// A relation with no columns and no rows.
    pub fn empty() -> Self {
        Table::Memtable {
            schema: Schema::new(),
            rows: Vec::new(),
        }
    }

    /// Output schema, checking expression types along the way.
    pub fn schema(&self) -> Result<Schema, EngineError> {
        match self {
            Table::Source { schema, .. } | Table::Memtable { schema, .. } => Ok(schema.clone()),
            Table::Select { columns, .. } => {
                let mut schema = Schema::new();
                for (name, value) in columns {
                    schema.push(name.clone(), value.dtype()?)?;
                }
                Ok(schema)
            }
            Table::Filter { input, .. } | Table::Limit { input, .. } => input.schema(),
            Table::Aggregate { input, by, metrics } => {
                let input_schema = input.schema()?;
                let mut schema = Schema::new();
                for key in by {
                    schema.push(key.clone(), input_schema.column(key)?.dtype()?)?;
                }
                for (name, value) in metrics {
                    schema.push(name.clone(), value.dtype()?)?;
                }
                Ok(schema)
            }
            Table::Unnest { input, column } => {
                let input_schema = input.schema()?;
                let mut schema = Schema::new();
                for (name, dtype) in input_schema.iter() {
                    if name == column {
                        let elem = dtype.element_type().cloned().ok_or_else(|| {
                            TypeError::NotAnArray {
                                found: dtype.clone(),
                            }
                        })?;
                        schema.push(name.clone(), elem)?;
                    } else {
                        schema.push(name.clone(), dtype.clone())?;
                    }
                }
                Ok(schema)
            }
        }
    }

    /// Reference to one of this table's output columns.
    pub fn column(&self, name: &str) -> Result<ValueExpr, EngineError> {
        self.schema()?.column(name)
    }

    /// Project `columns` from `input`.
    pub fn select(
        input: Arc<Table>,
        columns: Vec<(String, ValueExpr)>,
    ) -> Result<Table, EngineError> {
        let input_schema = input.schema()?;
        let mut seen = HashSet::new();
        for (name, value) in &columns {
            if !seen.insert(name.as_str()) {
                return Err(EngineError::DuplicateColumn(name.clone()));
            }
            check_columns(&input_schema, value)?;
            if value.is_aggregate() {
                return Err(EngineError::Unsupported(format!(
                    "aggregate expression in projection of '{}'",
                    name
                )));
            }
            value.dtype()?;
        }
        Ok(Table::Select { input, columns })
    }

    pub fn filter(input: Arc<Table>, predicate: ValueExpr) -> Result<Table, EngineError> {
        let input_schema = input.schema()?;
        check_columns(&input_schema, &predicate)?;
        ensure_bool(&predicate.dtype()?)?;
        Ok(Table::Filter { input, predicate })
    }

    pub fn aggregate(
        input: Arc<Table>,
        by: Vec<String>,
        metrics: Vec<(String, ValueExpr)>,
    ) -> Result<Table, EngineError> {
        let input_schema = input.schema()?;
        for key in &by {
            let dtype = input_schema.column(key)?.dtype()?;
            if !dtype.is_groupable() {
                return Err(EngineError::Unsupported(format!(
                    "grouping by {} column '{}'",
                    dtype, key
                )));
            }
        }
        for (name, value) in &metrics {
            check_columns(&input_schema, value)?;
            if !value.is_aggregate() && !value.is_constant() {
                return Err(EngineError::NotAnAggregate(name.clone()));
            }
        }
        let table = Table::Aggregate { input, by, metrics };
        table.schema()?;
        Ok(table)
    }

    pub fn unnest(input: Arc<Table>, column: &str) -> Result<Table, EngineError> {
        let dtype = input.column(column)?.dtype()?;
        if dtype.element_type().is_none() {
            return Err(TypeError::NotAnArray { found: dtype }.into());
        }
        Ok(Table::Unnest {
            input,
            column: column.to_string(),
        })
    }

    pub fn limit(input: Arc<Table>, count: u64) -> Table {
        Table::Limit { input, count }
    }

    /// Project the named columns unchanged.
    pub fn project(input: Arc<Table>, names: &[String]) -> Result<Table, EngineError> {
        let schema = input.schema()?;
        let columns = names
            .iter()
            .map(|name| Ok((name.clone(), schema.column(name)?)))
            .collect::<Result<Vec<_>, EngineError>>()?;
        Table::select(input, columns)
    }

    /// Rename columns found in `mapping`; others keep their names.
    pub fn rename(
        input: Arc<Table>,
        mapping: &IndexMap<String, String>,
    ) -> Result<Table, EngineError> {
        let schema = input.schema()?;
        let columns = schema
            .iter()
            .map(|(name, dtype)| {
                let target = mapping.get(name).cloned().unwrap_or_else(|| name.clone());
                (target, ValueExpr::column(name.clone(), dtype.clone()))
            })
            .collect();
        Table::select(input, columns)
    }

    /// All columns except `names`.
    pub fn drop(input: Arc<Table>, names: &[String]) -> Result<Table, EngineError> {
        let schema = input.schema()?;
        let columns = schema
            .iter()
            .filter(|(name, _)| !names.contains(*name))
            .map(|(name, dtype)| (name.clone(), ValueExpr::column(name.clone(), dtype.clone())))
            .collect();
        Table::select(input, columns)
    }
}

fn check_columns(schema: &Schema, value: &ValueExpr) -> Result<(), EngineError> {
    for name in value.referenced_columns() {
        if !schema.contains(&name) {
            return Err(EngineError::UnknownColumn {
                name,
                available: schema.names(),
            });
        }
    }
    Ok(())
}
