//! State and behavior shared by ordered and unordered nodes.

use std::sync::Arc;

use indexmap::IndexMap;
use strata_engine::{compile_expression, Bindings, Func, Table, ValueExpr};
use strata_expr::{generate_guid, Expression};
use strata_types::inference::ensure_bool;
use strata_types::DataType;

use crate::columns::ColumnSet;
use crate::error::CompileError;

/// Backing table, visible columns and pending predicates of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeCore {
    table: Arc<Table>,
    columns: ColumnSet,
    predicates: Vec<ValueExpr>,
}

impl NodeCore {
    pub fn new(table: Arc<Table>, columns: ColumnSet, predicates: Vec<ValueExpr>) -> Self {
        Self {
            table,
            columns,
            predicates,
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn predicates(&self) -> &[ValueExpr] {
        &self.predicates
    }

    pub fn column_ids(&self) -> Vec<String> {
        self.columns.ids()
    }

    pub fn get_column(&self, id: &str) -> Result<&ValueExpr, CompileError> {
        self.columns
            .get(id)
            .ok_or_else(|| CompileError::ColumnNotFound {
                id: id.to_string(),
                valid: self.columns.ids(),
            })
    }

    /// Visible column ids bound to their values.
    pub fn bindings(&self) -> Bindings {
        self.columns
            .iter()
            .map(|(id, value)| (id.clone(), value.clone()))
            .collect()
    }

    /// All pending predicates ANDed together, if there are any.
    pub fn reduced_predicate(&self) -> Result<Option<ValueExpr>, CompileError> {
        if self.predicates.is_empty() {
            return Ok(None);
        }
        reduce_predicates(&self.predicates).map(Some)
    }

    /// Compile a filter condition against the visible columns.
    pub(crate) fn compile_predicate(&self, predicate: &Expression) -> Result<ValueExpr, CompileError> {
        let value = compile_expression(predicate, &self.bindings())?;
        ensure_bool(&value.dtype()?)?;
        Ok(value)
    }
}

/// Capabilities common to ordered and unordered nodes.
///
/// Every method returns a new node; the receiver is never modified.
pub trait RelationalNode: Sized {
    fn core(&self) -> &NodeCore;

    fn column_ids(&self) -> Vec<String> {
        self.core().column_ids()
    }

    /// The value of a visible column.
    fn get_column(&self, id: &str) -> Result<&ValueExpr, CompileError> {
        self.core().get_column(id)
    }

    fn get_column_type(&self, id: &str) -> Result<DataType, CompileError> {
        Ok(self.get_column(id)?.dtype()?)
    }

    /// Keep only rows where `predicate` holds.
    fn filter(&self, predicate: &Expression) -> Result<Self, CompileError>;

    /// Replace the visible columns with `values`.
    fn select(&self, values: Vec<(String, ValueExpr)>) -> Result<Self, CompileError>;

    /// Overwrite column `id` in place, or append it when absent.
    fn set_or_replace_by_id(&self, id: &str, value: ValueExpr) -> Result<Self, CompileError>;

    /// Emit the node and rebuild it over the emitted table, so that every
    /// visible column is a plain column reference.
    fn reproject_to_table(&self) -> Result<Self, CompileError>;

    fn to_sql(&self, overrides: &IndexMap<String, String>, sorted: bool) -> Result<String, CompileError>;

    /// Compute each expression over the visible columns; the results become
    /// the node's columns.
    fn projection(&self, expressions: &[(Expression, String)]) -> Result<Self, CompileError> {
        let bindings = self.core().bindings();
        let values = expressions
            .iter()
            .map(|(expr, id)| Ok((id.clone(), compile_expression(expr, &bindings)?)))
            .collect::<Result<Vec<_>, CompileError>>()?;
        let node = self.select(values)?;
        if expressions.iter().any(|(expr, _)| expr.is_const()) {
            node.reproject_to_table()
        } else {
            Ok(node)
        }
    }
}

/// AND a non-empty list of predicates into one.
pub fn reduce_predicates(predicates: &[ValueExpr]) -> Result<ValueExpr, CompileError> {
    let (first, rest) = predicates
        .split_first()
        .ok_or(CompileError::EmptyPredicates)?;
    Ok(rest
        .iter()
        .fold(first.clone(), |acc, pred| acc.and(pred.clone())))
}

/// Rows of an explode over `table`.
pub(crate) struct Exploded {
    pub table: Arc<Table>,
    /// Id of the column holding each output row's position in its source
    /// row's arrays.
    pub offset_id: String,
}

/// Replicate each row of `table` once per position of the longest array in
/// `exploded`, indexing those arrays by position. `carried` lists every
/// column to keep; rows whose arrays are all empty or NULL yield one row of
/// NULLs.
pub(crate) fn explode_table(
    table: Arc<Table>,
    carried: &[String],
    exploded: &[String],
) -> Result<Exploded, CompileError> {
    let schema = table.schema()?;
    let mut upper = vec![ValueExpr::literal(0i64)];
    for id in exploded {
        if !carried.contains(id) {
            return Err(CompileError::ColumnNotFound {
                id: id.clone(),
                valid: carried.to_vec(),
            });
        }
        let length = ValueExpr::call(
            Func::Coalesce,
            vec![
                ValueExpr::call(Func::ArrayLength, vec![schema.column(id)?]),
                ValueExpr::literal(0i64),
            ],
        );
        upper.push(ValueExpr::call(Func::Sub, vec![length, ValueExpr::literal(1i64)]));
    }
    let offsets = ValueExpr::call(
        Func::GenerateArray,
        vec![ValueExpr::literal(0i64), ValueExpr::call(Func::Greatest, upper)],
    );

    let offset_id = generate_guid("strata_unnest_offset_");
    let mut with_array = vec![(offset_id.clone(), offsets)];
    for id in carried {
        with_array.push((id.clone(), schema.column(id)?));
    }
    let with_array = Arc::new(Table::select(table, with_array)?);
    let unnested = Arc::new(Table::unnest(with_array, &offset_id)?);

    let unnested_schema = unnested.schema()?;
    let position = unnested_schema.column(&offset_id)?;
    let mut columns = vec![(offset_id.clone(), position.clone())];
    for id in carried {
        let value = unnested_schema.column(id)?;
        let value = if exploded.contains(id) {
            ValueExpr::call(Func::SafeOffset, vec![value, position.clone()])
        } else {
            value
        };
        columns.push((id.clone(), value));
    }
    Ok(Exploded {
        table: Arc::new(Table::select(unnested, columns)?),
        offset_id,
    })
}

/// Plain column references to `ids` of `table`.
pub(crate) fn column_refs(table: &Table, ids: &[String]) -> Result<Vec<(String, ValueExpr)>, CompileError> {
    let schema = table.schema()?;
    ids.iter()
        .map(|id| Ok((id.clone(), schema.column(id)?)))
        .collect()
}
