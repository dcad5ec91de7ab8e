//! Emission of nodes as backing tables and SQL text.

use std::sync::Arc;

use indexmap::IndexMap;
use strata_engine::{quote_ident, Backend, BigQueryBackend, Func, Table, ValueExpr};
use strata_expr::{OrderingExpression, DEFAULT_ORDERING_ID_LENGTH};
use strata_types::DataType;
use tracing::trace;

use crate::error::CompileError;
use crate::{ORDER_ID_COLUMN, PREDICATE_COLUMN};

/// How the row ordering is represented in an emitted table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderingMode {
    /// Value columns only.
    #[default]
    Unordered,
    /// Adds zero-based row offsets. Rows are not sorted.
    OffsetColumn,
    /// Adds a string column whose lexical order is the row order.
    StringEncoded,
}

/// Options for turning a node into a table.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitOptions {
    pub mode: OrderingMode,
    /// Keep hidden columns and the predicate column. Only valid with
    /// [`OrderingMode::Unordered`].
    pub expose_hidden: bool,
    /// Keep each row with this probability.
    pub fraction: Option<f64>,
    /// Output names for column ids.
    pub col_id_overrides: IndexMap<String, String>,
    /// Name of the offset or string ordering column.
    pub order_col_name: String,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            mode: OrderingMode::Unordered,
            expose_hidden: false,
            fraction: None,
            col_id_overrides: IndexMap::new(),
            order_col_name: ORDER_ID_COLUMN.to_string(),
        }
    }
}

impl EmitOptions {
    pub fn with_mode(mode: OrderingMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn exposing_hidden() -> Self {
        Self {
            expose_hidden: true,
            ..Self::default()
        }
    }

    pub fn with_overrides(mut self, overrides: IndexMap<String, String>) -> Self {
        self.col_id_overrides = overrides;
        self
    }

    pub fn with_fraction(mut self, fraction: f64) -> Self {
        self.fraction = Some(fraction);
        self
    }

    pub fn with_order_col_name(mut self, name: impl Into<String>) -> Self {
        self.order_col_name = name.into();
        self
    }
}

/// Build the emitted table: value columns, the reduced predicate and
/// ordering support columns selected from `base`, then filtered, trimmed,
/// renamed and sampled as `options` ask.
pub(crate) fn finish_table(
    base: &Arc<Table>,
    columns: Vec<(String, ValueExpr)>,
    predicate: Option<ValueExpr>,
    order_columns: Vec<(String, ValueExpr)>,
    options: &EmitOptions,
) -> Result<Table, CompileError> {
    let mut selection = columns;
    let has_predicate = predicate.is_some();
    if let Some(predicate) = predicate {
        selection.push((PREDICATE_COLUMN.to_string(), predicate));
    }
    selection.extend(order_columns);

    // A projection needs at least one column.
    if selection.is_empty() {
        return Ok(Table::empty());
    }

    let mut table = Table::select(base.clone(), selection)?;
    if has_predicate {
        let condition = table.column(PREDICATE_COLUMN)?;
        table = Table::filter(Arc::new(table), condition)?;
        if !options.expose_hidden {
            table = Table::drop(Arc::new(table), &[PREDICATE_COLUMN.to_string()])?;
        }
    }
    if !options.col_id_overrides.is_empty() {
        table = Table::rename(Arc::new(table), &options.col_id_overrides)?;
    }
    if let Some(fraction) = options.fraction {
        let sample = ValueExpr::call(Func::Lt, vec![ValueExpr::Random, ValueExpr::literal(fraction)]);
        table = Table::filter(Arc::new(table), sample)?;
    }
    Ok(table)
}

/// Render a table as BigQuery SQL.
pub(crate) fn compile_sql(table: &Table) -> Result<String, CompileError> {
    Ok(BigQueryBackend.compile(table)?)
}

/// `ORDER BY` clause over bare column keys, with explicit null placement.
/// Constant keys are skipped; the clause is empty when no key remains.
pub(crate) fn ordering_clause(
    keys: &[OrderingExpression],
    overrides: &IndexMap<String, String>,
) -> Result<String, CompileError> {
    let mut parts = Vec::with_capacity(keys.len());
    for key in keys {
        if key.scalar_expression.is_const() {
            continue;
        }
        let id = key
            .column_id()
            .ok_or_else(|| CompileError::NotColumnReference(key.scalar_expression.to_string()))?;
        let name = overrides.get(id).map(String::as_str).unwrap_or(id);
        let direction = if key.direction.is_ascending() { "ASC" } else { "DESC" };
        let nulls = if key.na_last { "NULLS LAST" } else { "NULLS FIRST" };
        parts.push(format!("{} {} {}", quote_ident(name), direction, nulls));
    }
    if parts.is_empty() {
        return Ok(String::new());
    }
    Ok(format!("ORDER BY {}", parts.join(", ")))
}

/// Wrap `sql` so rows come back in the order of `clause`.
pub(crate) fn sorted_sql(sql: &str, output_columns: &[String], clause: &str) -> String {
    let selection = output_columns
        .iter()
        .map(|id| quote_ident(id))
        .collect::<Vec<_>>()
        .join(", ");
    let wrapped = format!("SELECT {}\nFROM (\n{}\n)\n{}\n", selection, sql, clause);
    trace!(sql = %wrapped, "sorted output");
    wrapped
}

/// Fixed-width, zero-padded decimal text of a non-negative integer, so that
/// string order matches numeric order.
pub fn encode_order_string(value: ValueExpr) -> ValueExpr {
    ValueExpr::call(
        Func::Lpad,
        vec![
            value.cast(DataType::String),
            ValueExpr::literal(DEFAULT_ORDERING_ID_LENGTH as i64),
            ValueExpr::literal("0"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_engine::Schema;
    use strata_expr::{Expression, OrderingDirection, ScalarOp};

    fn base() -> Arc<Table> {
        let schema = Schema::from_fields([("a", DataType::Int64), ("b", DataType::Int64)]).unwrap();
        Arc::new(Table::source("t", schema))
    }

    fn refs(names: &[&str]) -> Vec<(String, ValueExpr)> {
        names
            .iter()
            .map(|name| (name.to_string(), ValueExpr::column(*name, DataType::Int64)))
            .collect()
    }

    #[test]
    fn test_predicate_dropped_after_filter() {
        let pred = ValueExpr::call(
            Func::Gt,
            vec![ValueExpr::column("a", DataType::Int64), ValueExpr::literal(0i64)],
        );
        let table = finish_table(&base(), refs(&["a"]), Some(pred.clone()), vec![], &EmitOptions::default())
            .unwrap();
        assert_eq!(table.schema().unwrap().names(), vec!["a"]);

        let exposed = finish_table(&base(), refs(&["a"]), Some(pred), vec![], &EmitOptions::exposing_hidden())
            .unwrap();
        assert_eq!(exposed.schema().unwrap().names(), vec!["a", PREDICATE_COLUMN]);
    }

    #[test]
    fn test_overrides_and_empty() {
        let mut overrides = IndexMap::new();
        overrides.insert("a".to_string(), "renamed".to_string());
        let options = EmitOptions::default().with_overrides(overrides);
        let table = finish_table(&base(), refs(&["a", "b"]), None, vec![], &options).unwrap();
        assert_eq!(table.schema().unwrap().names(), vec!["renamed", "b"]);

        let empty = finish_table(&base(), vec![], None, vec![], &EmitOptions::default()).unwrap();
        assert_eq!(empty, Table::empty());
    }

    #[test]
    fn test_ordering_clause() {
        let keys = vec![
            OrderingExpression::asc_column("a"),
            OrderingExpression::new(Expression::var("b"), OrderingDirection::Desc, false),
            OrderingExpression::asc(Expression::lit(1i64)),
        ];
        let mut overrides = IndexMap::new();
        overrides.insert("b".to_string(), "bee".to_string());
        assert_eq!(
            ordering_clause(&keys, &overrides).unwrap(),
            "ORDER BY `a` ASC NULLS LAST, `bee` DESC NULLS FIRST"
        );

        let computed = vec![OrderingExpression::asc(Expression::binary(
            ScalarOp::Add,
            Expression::var("a"),
            Expression::lit(1i64),
        ))];
        assert!(matches!(
            ordering_clause(&computed, &IndexMap::new()),
            Err(CompileError::NotColumnReference(_))
        ));
        assert_eq!(ordering_clause(&[], &IndexMap::new()).unwrap(), "");
    }

    #[test]
    fn test_encode_order_string_type() {
        let encoded = encode_order_string(ValueExpr::column("a", DataType::Int64));
        assert_eq!(encoded.dtype().unwrap(), DataType::String);
    }
}
