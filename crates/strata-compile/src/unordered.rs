//! Nodes without a row ordering.

use std::sync::Arc;

use indexmap::IndexMap;
use strata_engine::{compile_aggregate, AggFunc, Bindings, Table, ValueExpr};
use strata_expr::{Aggregation, Expression, ExpressionOrdering, OrderingExpression};
use tracing::debug;

use crate::builder::UnorderedBuilder;
use crate::columns::ColumnSet;
use crate::emit::{compile_sql, finish_table, EmitOptions, OrderingMode};
use crate::error::CompileError;
use crate::node::{column_refs, explode_table, NodeCore, RelationalNode};
use crate::ordered::OrderedNode;
use crate::ORDER_ID_COLUMN;

/// A relation whose row order is unspecified.
#[derive(Debug, Clone, PartialEq)]
pub struct UnorderedNode {
    core: NodeCore,
}

impl UnorderedNode {
    pub fn new(
        table: Arc<Table>,
        columns: Vec<(String, ValueExpr)>,
        predicates: Vec<ValueExpr>,
    ) -> Result<Self, CompileError> {
        let columns = ColumnSet::from_pairs(columns)?;
        Ok(Self {
            core: NodeCore::new(table, columns, predicates),
        })
    }

    /// Every column of `table`, unfiltered.
    pub fn from_table(table: Arc<Table>) -> Result<Self, CompileError> {
        let columns = column_refs(&table, &table.schema()?.names())?;
        Self::new(table, columns, Vec::new())
    }

    pub fn builder(&self) -> UnorderedBuilder {
        UnorderedBuilder {
            table: self.core.table().clone(),
            columns: self.core.columns().to_pairs(),
            predicates: self.core.predicates().to_vec(),
        }
    }

    /// The node as a backing table. Only [`OrderingMode::Unordered`] applies.
    pub fn to_table(&self, options: &EmitOptions) -> Result<Table, CompileError> {
        if options.mode != OrderingMode::Unordered {
            return Err(CompileError::UnsupportedMode(
                "unordered nodes cannot produce ordering columns".to_string(),
            ));
        }
        finish_table(
            self.core.table(),
            self.core.columns().to_pairs(),
            self.core.reduced_predicate()?,
            Vec::new(),
            options,
        )
    }

    /// SQL for at most `n` arbitrary rows.
    pub fn peek_sql(&self, n: u64) -> Result<String, CompileError> {
        let table = self.to_table(&EmitOptions::default())?;
        compile_sql(&Table::limit(Arc::new(table), n))
    }

    /// Single-row node holding the number of rows in `count`.
    pub fn row_count(&self) -> Result<OrderedNode, CompileError> {
        let table = Arc::new(self.to_table(&EmitOptions::default())?);
        let count = ValueExpr::Aggregate {
            func: AggFunc::CountStar,
            arg: None,
        };
        let result = Arc::new(Table::aggregate(table, Vec::new(), vec![("count".to_string(), count)])?);
        let columns = column_refs(&result, &["count".to_string()])?;
        OrderedNode::new(
            result,
            columns,
            Vec::new(),
            ExpressionOrdering::ascending_over("count"),
            Vec::new(),
        )
    }

    /// Apply `aggregations`, grouped by `by`.
    ///
    /// Grouped results are ordered by the grouping keys, which also form the
    /// total order; with `dropna`, groups with a NULL key are dropped. Without
    /// keys the result is a single row with an empty ordering.
    pub fn aggregate(
        &self,
        aggregations: &[(Aggregation, String)],
        by: &[String],
        dropna: bool,
    ) -> Result<OrderedNode, CompileError> {
        let table = Arc::new(self.to_table(&EmitOptions::default())?);
        let bindings: Bindings = column_refs(&table, &self.column_ids())?.into_iter().collect();
        let mut stats = aggregations
            .iter()
            .map(|(agg, id)| Ok((id.clone(), compile_aggregate(agg, &bindings)?)))
            .collect::<Result<Vec<_>, CompileError>>()?;

        if by.is_empty() {
            let ids: Vec<String> = stats.iter().map(|(id, _)| id.clone()).collect();
            stats.push((ORDER_ID_COLUMN.to_string(), ValueExpr::literal(0i64)));
            let result = Arc::new(Table::aggregate(table, Vec::new(), stats)?);
            let columns = column_refs(&result, &ids)?;
            let hidden = column_refs(&result, &[ORDER_ID_COLUMN.to_string()])?;
            return OrderedNode::new(result, columns, hidden, ExpressionOrdering::empty(), Vec::new());
        }

        let result = Arc::new(Table::aggregate(table, by.to_vec(), stats)?);
        let columns = column_refs(&result, &result.schema()?.names())?;
        let ordering = ExpressionOrdering::new(
            by.iter()
                .map(|id| OrderingExpression::asc_column(id.clone()))
                .collect(),
            by.iter().cloned().collect(),
        );
        let mut node = OrderedNode::new(result, columns, Vec::new(), ordering, Vec::new())?;
        if dropna {
            for id in by {
                let key = node.get_column(id)?.clone();
                node = node.filter_value(key.is_not_null())?;
            }
        }
        debug!(keys = ?by, dropna, "grouped aggregate");
        node.project_offsets()
    }

    /// Keep each row with probability `fraction`.
    pub fn uniform_sampling(&self, fraction: f64) -> Result<Self, CompileError> {
        let table = Arc::new(self.to_table(&EmitOptions::default().with_fraction(fraction))?);
        let columns = column_refs(&table, &self.column_ids())?;
        Self::new(table, columns, Vec::new())
    }

    /// One row per array position in `column_ids`; other columns repeat.
    pub fn explode(&self, column_ids: &[String]) -> Result<Self, CompileError> {
        let table = Arc::new(self.to_table(&EmitOptions::default())?);
        let ids = self.column_ids();
        let exploded = explode_table(table, &ids, column_ids)?;
        let columns = column_refs(&exploded.table, &ids)?;
        Self::new(exploded.table, columns, Vec::new())
    }
}

impl RelationalNode for UnorderedNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn filter(&self, predicate: &Expression) -> Result<Self, CompileError> {
        let condition = self.core.compile_predicate(predicate)?;
        let mut builder = self.builder();
        builder.predicates.push(condition);
        builder.build()
    }

    fn select(&self, values: Vec<(String, ValueExpr)>) -> Result<Self, CompileError> {
        let mut builder = self.builder();
        builder.columns = values;
        builder.build()
    }

    fn set_or_replace_by_id(&self, id: &str, value: ValueExpr) -> Result<Self, CompileError> {
        let mut builder = self.builder();
        builder.columns = self.core.columns().with_value(id, value).to_pairs();
        builder.build()
    }

    fn reproject_to_table(&self) -> Result<Self, CompileError> {
        let table = Arc::new(self.to_table(&EmitOptions::default())?);
        let columns = column_refs(&table, &self.column_ids())?;
        Self::new(table, columns, Vec::new())
    }

    fn to_sql(&self, overrides: &IndexMap<String, String>, sorted: bool) -> Result<String, CompileError> {
        if sorted {
            return Err(CompileError::UnsupportedMode(
                "unordered nodes cannot produce sorted output".to_string(),
            ));
        }
        let options = EmitOptions::default().with_overrides(overrides.clone());
        compile_sql(&self.to_table(&options)?)
    }
}
