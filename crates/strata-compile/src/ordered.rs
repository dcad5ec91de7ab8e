//! Nodes carrying a logical row ordering.
//!
//! The warehouse returns rows in no particular order, so an [`OrderedNode`]
//! keeps its ordering as data: an [`ExpressionOrdering`] over visible and
//! hidden columns. Hidden columns exist only to support the ordering. Any
//! visible column the ordering depends on is copied into a hidden column
//! before it is dropped or overwritten, so later transformations never
//! change the row order by accident.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use indexmap::IndexMap;
use strata_engine::{
    compile_analytic, compile_expression, AnalyticFunc, Bindings, Frame, Func, Schema,
    SortKey, Table, ValueExpr, Window,
};
use strata_expr::{
    generate_guid, AggOp, Aggregation, Expression, ExpressionOrdering, IntegerEncoding,
    OrderingExpression, WindowSpec,
};
use strata_types::{DataType, Scalar};
use tracing::{debug, trace};

use crate::builder::OrderedBuilder;
use crate::columns::ColumnSet;
use crate::emit::{
    compile_sql, encode_order_string, finish_table, ordering_clause, sorted_sql, EmitOptions,
    OrderingMode,
};
use crate::error::CompileError;
use crate::node::{column_refs, explode_table, NodeCore, RelationalNode};
use crate::unordered::UnorderedNode;
use crate::{HIDDEN_COLUMN_PREFIX, ORDER_ID_COLUMN};

/// Prefix of hidden columns holding computed ordering keys.
const BAKED_COLUMN_PREFIX: &str = "strata_baked_";

/// Binding name for the non-null mask counted by `min_periods` checks.
const DENULLED_BINDING: &str = "strata_denulled";

/// Options of [`OrderedNode::project_window_op`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowOpOptions {
    /// Id of the result column; the input column is replaced when unset.
    pub output: Option<String>,
    /// Evaluate null-skipping operations on NULL inputs too.
    pub never_skip_nulls: bool,
    /// Leave the analytic expression in place instead of reprojecting.
    /// The caller must then reproject before nesting window operations or
    /// using the result as a filter, join or grouping key.
    pub skip_reproject_unsafe: bool,
}

impl WindowOpOptions {
    pub fn output(id: impl Into<String>) -> Self {
        Self {
            output: Some(id.into()),
            ..Self::default()
        }
    }
}

/// A relation with a logical row ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedNode {
    core: NodeCore,
    hidden: ColumnSet,
    ordering: ExpressionOrdering,
}

impl OrderedNode {
    pub fn new(
        table: Arc<Table>,
        columns: Vec<(String, ValueExpr)>,
        hidden_columns: Vec<(String, ValueExpr)>,
        ordering: ExpressionOrdering,
        predicates: Vec<ValueExpr>,
    ) -> Result<Self, CompileError> {
        let columns = ColumnSet::from_pairs(columns)?;
        let hidden = ColumnSet::from_pairs(hidden_columns)?;

        let overlap: Vec<String> = columns
            .ids()
            .into_iter()
            .filter(|id| hidden.contains(id))
            .collect();
        if !overlap.is_empty() {
            return Err(CompileError::HiddenColumnOverlap(overlap));
        }
        let unknown: Vec<String> = ordering
            .referenced_columns()
            .into_iter()
            .filter(|id| !columns.contains(id) && !hidden.contains(id))
            .collect();
        if !unknown.is_empty() {
            return Err(CompileError::IllegalOrdering(unknown));
        }

        Ok(Self {
            core: NodeCore::new(table, columns, predicates),
            hidden,
            ordering,
        })
    }

    /// Every column of `table`; `hidden` ids are kept out of the visible set.
    pub fn from_table(
        table: Arc<Table>,
        hidden: &[String],
        ordering: ExpressionOrdering,
    ) -> Result<Self, CompileError> {
        let visible: Vec<String> = table
            .schema()?
            .names()
            .into_iter()
            .filter(|id| !hidden.contains(id))
            .collect();
        let columns = column_refs(&table, &visible)?;
        let hidden = column_refs(&table, hidden)?;
        Self::new(table, columns, hidden, ordering, Vec::new())
    }

    /// Inline rows, ordered as given.
    pub fn from_rows(schema: Schema, rows: Vec<Vec<Scalar>>) -> Result<Self, CompileError> {
        let ids = schema.names();
        let mut full = schema;
        full.push(ORDER_ID_COLUMN.to_string(), DataType::Int64)?;
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, mut row)| {
                row.push(Scalar::Int64(i as i64));
                row
            })
            .collect();
        let table = Arc::new(Table::memtable(full, rows)?);
        let ordering = ExpressionOrdering::ascending_over(ORDER_ID_COLUMN)
            .with_integer_encoding(IntegerEncoding::sequential());
        let columns = column_refs(&table, &ids)?;
        let hidden = column_refs(&table, &[ORDER_ID_COLUMN.to_string()])?;
        Self::new(table, columns, hidden, ordering, Vec::new())
    }

    pub fn ordering(&self) -> &ExpressionOrdering {
        &self.ordering
    }

    pub fn hidden_column_ids(&self) -> Vec<String> {
        self.hidden.ids()
    }

    pub fn builder(&self) -> OrderedBuilder {
        OrderedBuilder {
            table: self.core.table().clone(),
            columns: self.core.columns().to_pairs(),
            hidden_columns: self.hidden.to_pairs(),
            ordering: self.ordering.clone(),
            predicates: self.core.predicates().to_vec(),
        }
    }

    /// The same rows with the ordering forgotten.
    pub fn to_unordered(&self) -> Result<UnorderedNode, CompileError> {
        UnorderedNode::new(
            self.core.table().clone(),
            self.core.columns().to_pairs(),
            self.core.predicates().to_vec(),
        )
    }

    /// Sort by `keys`, keeping the current order among ties.
    pub fn order_by(&self, keys: Vec<OrderingExpression>) -> Result<Self, CompileError> {
        let mut builder = self.builder();
        builder.ordering = self.ordering.with_ordering_columns(keys);
        builder.build()
    }

    pub fn reversed(&self) -> Result<Self, CompileError> {
        let mut builder = self.builder();
        builder.ordering = self.ordering.with_reverse();
        builder.build()
    }

    /// Keep each row with probability `fraction`. Offsets of the result are
    /// not stable between executions.
    pub fn uniform_sampling(&self, fraction: f64) -> Result<Self, CompileError> {
        let options = EmitOptions::exposing_hidden().with_fraction(fraction);
        let table = Arc::new(self.to_table(&options)?);
        let columns = column_refs(&table, &self.column_ids())?;
        let hidden = column_refs(&table, &self.hidden.ids())?;
        // Dropped rows leave gaps in any row numbering.
        Self::new(table, columns, hidden, self.ordering.with_non_sequential(), Vec::new())
    }

    /// One row per array position in `column_ids`; other columns repeat.
    /// Rows keep their order, and rows from one source row are ordered by
    /// array position.
    pub fn explode(&self, column_ids: &[String]) -> Result<Self, CompileError> {
        for id in column_ids {
            self.get_column(id)?;
        }
        let table = Arc::new(self.to_table(&EmitOptions::exposing_hidden())?);
        let visible = self.column_ids();
        let hidden = self.hidden.ids();
        let carried: Vec<String> = visible.iter().chain(hidden.iter()).cloned().collect();
        let exploded = explode_table(table, &carried, column_ids)?;

        let columns = column_refs(&exploded.table, &visible)?;
        let mut hidden_ids = hidden;
        hidden_ids.push(exploded.offset_id.clone());
        let hidden_columns = column_refs(&exploded.table, &hidden_ids)?;

        let mut keys = self.ordering.all_ordering_columns();
        keys.push(OrderingExpression::asc_column(exploded.offset_id.clone()));
        let mut total = self.ordering.total_ordering_columns.clone();
        total.insert(exploded.offset_id);
        let ordering = ExpressionOrdering::new(keys, total);

        Self::new(exploded.table, columns, hidden_columns, ordering, Vec::new())
    }

    /// Expose the row offsets as visible column `id`, placed first.
    pub fn promote_offsets(&self, id: &str) -> Result<Self, CompileError> {
        let node = match self.ordering.total_order_col() {
            Some(_) if self.ordering.is_sequential() => self.clone(),
            _ => self.materialize_offsets()?,
        };
        let key = node
            .ordering
            .total_order_col()
            .ok_or_else(|| CompileError::UnsupportedMode("offsets have no total order column".to_string()))?;
        let offsets = compile_expression(&key.scalar_expression, &node.all_bindings())?;
        let mut builder = node.builder();
        builder.columns.insert(0, (id.to_string(), offsets));
        builder.build()
    }

    /// Apply a window operation to `column_id` over `spec`.
    ///
    /// For operations that skip NULLs, rows with a NULL input get NULL. Rows
    /// whose window holds fewer than `spec.min_periods` observations get
    /// NULL; observations are non-NULL inputs for null-skipping operations
    /// and all rows otherwise.
    pub fn project_window_op(
        &self,
        column_id: &str,
        op: AggOp,
        spec: &WindowSpec,
        options: &WindowOpOptions,
    ) -> Result<Self, CompileError> {
        let column = self.get_column(column_id)?.clone();
        let window = if op.requires_ordering() && spec.ordering.is_empty() && !spec.is_row_bounded() {
            // Positional operations fall back to the node's own order.
            let spec = spec.clone().with_ordering(self.ordering.all_ordering_columns());
            self.window_from_spec(&spec, true)?
        } else {
            self.window_from_spec(spec, op.handles_ties())?
        };
        let bindings = self.core.bindings();

        let mut value = compile_analytic(&Aggregation::unary(op, column_id), &window, &bindings)?;

        let mut masks = Vec::new();
        if op.skips_nulls() && !options.never_skip_nulls {
            masks.push(column.clone().is_null());
        }
        if spec.min_periods > 0 {
            let observations = if op.skips_nulls() {
                compile_analytic(&Aggregation::unary(AggOp::Count, column_id), &window, &bindings)?
            } else {
                // Counting a never-NULL mask counts every row.
                let mut bindings = bindings.clone();
                bindings.insert(DENULLED_BINDING.to_string(), column.clone().is_not_null());
                compile_analytic(
                    &Aggregation::unary(AggOp::Count, DENULLED_BINDING),
                    &window,
                    &bindings,
                )?
            };
            let min_periods = i64::try_from(spec.min_periods).unwrap_or(i64::MAX);
            masks.push(ValueExpr::call(
                Func::Lt,
                vec![observations, ValueExpr::literal(min_periods)],
            ));
        }
        if !masks.is_empty() {
            let dtype = value.dtype()?;
            value = ValueExpr::Case {
                branches: masks
                    .into_iter()
                    .map(|mask| (mask, ValueExpr::typed_null(dtype.clone())))
                    .collect(),
                otherwise: Box::new(value),
            };
        }

        let output = options.output.as_deref().unwrap_or(column_id);
        let result = self.set_or_replace_by_id(output, value)?;
        if options.skip_reproject_unsafe {
            Ok(result)
        } else {
            result.reproject_to_table()
        }
    }

    /// Materialize zero-based offsets as the ordering. No-op when the
    /// ordering already is a sequential integer column.
    pub fn project_offsets(&self) -> Result<Self, CompileError> {
        if self.ordering.is_sequential() {
            return Ok(self.clone());
        }
        self.materialize_offsets()
    }

    fn materialize_offsets(&self) -> Result<Self, CompileError> {
        debug!(columns = self.core.columns().len(), "projecting offsets");
        let options = EmitOptions::with_mode(OrderingMode::OffsetColumn).with_order_col_name(ORDER_ID_COLUMN);
        let table = Arc::new(self.to_table(&options)?);
        let columns = column_refs(&table, &self.column_ids())?;
        let hidden = column_refs(&table, &[ORDER_ID_COLUMN.to_string()])?;
        let ordering = ExpressionOrdering::ascending_over(ORDER_ID_COLUMN)
            .with_integer_encoding(IntegerEncoding::sequential());
        Self::new(table, columns, hidden, ordering, Vec::new())
    }

    /// The node as a backing table, with the ordering represented per
    /// `options.mode`.
    pub fn to_table(&self, options: &EmitOptions) -> Result<Table, CompileError> {
        if options.expose_hidden && options.mode != OrderingMode::Unordered {
            return Err(CompileError::UnsupportedMode(format!(
                "cannot expose hidden columns with {:?} ordering",
                options.mode
            )));
        }
        let order_columns = match options.mode {
            OrderingMode::OffsetColumn => {
                vec![(options.order_col_name.clone(), self.create_offset_column()?)]
            }
            OrderingMode::StringEncoded => {
                vec![(options.order_col_name.clone(), self.create_string_ordering_column()?)]
            }
            OrderingMode::Unordered if options.expose_hidden => self.hidden.to_pairs(),
            OrderingMode::Unordered => Vec::new(),
        };
        finish_table(
            self.core.table(),
            self.core.columns().to_pairs(),
            self.core.reduced_predicate()?,
            order_columns,
            options,
        )
    }

    /// Filter on an already compiled condition.
    pub(crate) fn filter_value(&self, condition: ValueExpr) -> Result<Self, CompileError> {
        let mut builder = self.builder();
        builder.ordering = self.ordering.with_non_sequential();
        builder.predicates.push(condition);
        builder.build()
    }

    /// Visible and hidden columns bound to their values.
    fn all_bindings(&self) -> Bindings {
        self.core
            .columns()
            .iter()
            .chain(self.hidden.iter())
            .map(|(id, value)| (id.clone(), value.clone()))
            .collect()
    }

    fn get_any_column(&self, id: &str) -> Result<&ValueExpr, CompileError> {
        self.core
            .columns()
            .get(id)
            .or_else(|| self.hidden.get(id))
            .ok_or_else(|| CompileError::ColumnNotFound {
                id: id.to_string(),
                valid: self
                    .core
                    .column_ids()
                    .into_iter()
                    .chain(self.hidden.ids())
                    .collect(),
            })
    }

    /// Copy column `id` into a fresh hidden column and point the ordering at
    /// the copy.
    fn hide_column(&self, id: &str) -> Result<Self, CompileError> {
        let value = self.get_any_column(id)?.clone();
        let hidden_id = generate_guid(HIDDEN_COLUMN_PREFIX);
        debug!(column = id, hidden = %hidden_id, "hiding ordering column");

        let mut builder = self.builder();
        // A hidden id about to be reused must not linger next to its copy.
        builder.hidden_columns = self.hidden.without(id).to_pairs();
        builder.hidden_columns.push((hidden_id.clone(), value));
        builder.ordering = self
            .ordering
            .with_column_remap(&HashMap::from([(id.to_string(), hidden_id)]));
        builder.build()
    }

    /// Move computed ordering keys into hidden columns so every key is a
    /// bare column reference. Baked ids depend only on the node, so repeated
    /// emission yields identical SQL.
    fn bake_ordering(&self) -> Result<Self, CompileError> {
        let bindings = self.all_bindings();
        let mut keys = Vec::new();
        let mut baked = Vec::new();
        let mut next = 0usize;
        for key in self.ordering.all_ordering_columns() {
            if let Expression::Op(..) = key.scalar_expression {
                let value = compile_expression(&key.scalar_expression, &bindings)?;
                let id = loop {
                    let candidate = format!("{}{}", BAKED_COLUMN_PREFIX, next);
                    next += 1;
                    if !bindings.contains_key(&candidate) {
                        break candidate;
                    }
                };
                keys.push(OrderingExpression::new(
                    Expression::var(id.clone()),
                    key.direction,
                    key.na_last,
                ));
                baked.push((id, value));
            } else {
                keys.push(key);
            }
        }
        let mut builder = self.builder();
        builder.hidden_columns.extend(baked);
        builder.ordering = self.ordering.with_ordering_columns(keys);
        builder.build()
    }

    fn create_offset_column(&self) -> Result<ValueExpr, CompileError> {
        if let Some(key) = self.ordering.total_order_col() {
            if self.ordering.is_sequential() {
                return compile_expression(&key.scalar_expression, &self.all_bindings())
                    .map_err(CompileError::from);
            }
        }
        self.row_numbers()
    }

    fn create_string_ordering_column(&self) -> Result<ValueExpr, CompileError> {
        if let Some(key) = self.ordering.total_order_col() {
            let value = compile_expression(&key.scalar_expression, &self.all_bindings())?;
            if self.ordering.string_encoding.is_encoded {
                return Ok(value);
            }
            if self.ordering.integer_encoding.is_encoded {
                return Ok(encode_order_string(value));
            }
        }
        Ok(encode_order_string(self.row_numbers()?))
    }

    /// Zero-based row numbers in ordering order, counted separately for rows
    /// that do and do not pass the pending predicates.
    fn row_numbers(&self) -> Result<ValueExpr, CompileError> {
        let window = Window {
            partition_by: self.core.reduced_predicate()?.into_iter().collect(),
            order_by: self.sort_keys(&self.ordering.all_ordering_columns())?,
            frame: None,
        };
        Ok(ValueExpr::over(AnalyticFunc::RowNumber, window))
    }

    /// Engine sort keys for `ordering`, with NULL placement made explicit
    /// where it differs from the engine's NULLs-smallest default.
    fn sort_keys(&self, ordering: &[OrderingExpression]) -> Result<Vec<SortKey>, CompileError> {
        let bindings = self.all_bindings();
        let mut keys = Vec::with_capacity(ordering.len());
        for key in ordering {
            let expr = compile_expression(&key.scalar_expression, &bindings)?;
            let ascending = key.direction.is_ascending();
            if key.na_last == ascending {
                keys.push(SortKey {
                    expr: expr.clone().is_null(),
                    ascending,
                });
            }
            keys.push(SortKey { expr, ascending });
        }
        Ok(keys)
    }

    /// Engine window for `spec`. Unless `allow_ties`, explicit ordering keys
    /// are followed by the node's full ordering so rows never tie.
    fn window_from_spec(&self, spec: &WindowSpec, allow_ties: bool) -> Result<Window, CompileError> {
        let mut partition_by = spec
            .grouping_keys
            .iter()
            .map(|id| Ok(as_identity(self.get_column(id)?.clone())?))
            .collect::<Result<Vec<_>, CompileError>>()?;
        if let Some(predicate) = self.core.reduced_predicate()? {
            partition_by.push(predicate);
        }

        let order_by = if !spec.ordering.is_empty() {
            let mut keys = self.sort_keys(&spec.ordering)?;
            if !allow_ties {
                keys.extend(self.sort_keys(&self.ordering.all_ordering_columns())?);
            }
            keys
        } else if spec.is_row_bounded() {
            // Row frames are meaningless without a deterministic order.
            self.sort_keys(&self.ordering.all_ordering_columns())?
        } else {
            Vec::new()
        };
        trace!(
            partitions = partition_by.len(),
            keys = order_by.len(),
            preceding = ?spec.preceding,
            following = ?spec.following,
            "resolved window"
        );

        Ok(Window {
            partition_by,
            order_by,
            frame: Some(Frame {
                preceding: spec.preceding,
                following: spec.following,
            }),
        })
    }

    /// Ids referenced by the ordering.
    fn ordering_ids(&self) -> BTreeSet<String> {
        self.ordering.referenced_columns()
    }
}

impl RelationalNode for OrderedNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn filter(&self, predicate: &Expression) -> Result<Self, CompileError> {
        let condition = self.core.compile_predicate(predicate)?;
        self.filter_value(condition)
    }

    fn select(&self, values: Vec<(String, ValueExpr)>) -> Result<Self, CompileError> {
        let mut node = self.clone();
        for id in self.ordering_ids() {
            let mapped = values.iter().find(|(out, _)| *out == id).map(|(_, value)| value);
            let visible = node.core.columns().contains(&id);
            let hide = match mapped {
                None => visible,
                Some(value) => node.get_any_column(&id)? != value,
            };
            if hide {
                node = node.hide_column(&id)?;
            }
        }
        let mut builder = node.builder();
        // Hidden columns the ordering no longer needs give way to new ids.
        builder
            .hidden_columns
            .retain(|(hidden, _)| !values.iter().any(|(out, _)| out == hidden));
        builder.columns = values;
        builder.build()
    }

    fn set_or_replace_by_id(&self, id: &str, value: ValueExpr) -> Result<Self, CompileError> {
        if self.ordering_ids().contains(id) {
            return self.hide_column(id)?.set_or_replace_by_id(id, value);
        }
        let mut builder = self.builder();
        builder.columns = self.core.columns().with_value(id, value).to_pairs();
        builder.hidden_columns = self.hidden.without(id).to_pairs();
        builder.build()
    }

    fn reproject_to_table(&self) -> Result<Self, CompileError> {
        let table = Arc::new(self.to_table(&EmitOptions::exposing_hidden())?);
        let ordering_ids = self.ordering_ids();
        let hidden_ids: Vec<String> = self
            .hidden
            .ids()
            .into_iter()
            .filter(|id| ordering_ids.contains(id))
            .collect();
        debug!(
            columns = self.core.columns().len(),
            hidden = hidden_ids.len(),
            "reprojecting"
        );
        let columns = column_refs(&table, &self.column_ids())?;
        let hidden = column_refs(&table, &hidden_ids)?;
        Self::new(table, columns, hidden, self.ordering.clone(), Vec::new())
    }

    /// Unsorted SQL leaves the ordering out. Sorted SQL wraps the query in an
    /// outer `ORDER BY` over the baked ordering keys.
    fn to_sql(&self, overrides: &IndexMap<String, String>, sorted: bool) -> Result<String, CompileError> {
        if !sorted || self.core.columns().is_empty() {
            let options = EmitOptions::default().with_overrides(overrides.clone());
            return compile_sql(&self.to_table(&options)?);
        }
        let baked = self.bake_ordering()?;
        let options = EmitOptions::exposing_hidden().with_overrides(overrides.clone());
        let sql = compile_sql(&baked.to_table(&options)?)?;
        let output: Vec<String> = baked
            .column_ids()
            .into_iter()
            .map(|id| overrides.get(&id).cloned().unwrap_or(id))
            .collect();
        let clause = ordering_clause(&baked.ordering.all_ordering_columns(), overrides)?;
        Ok(sorted_sql(&sql, &output, &clause))
    }
}

/// Grouping value for `value`. Float and geography keys group by their
/// string form.
fn as_identity(value: ValueExpr) -> Result<ValueExpr, CompileError> {
    let dtype = value.dtype()?;
    if dtype.is_float() || dtype.is_geospatial() {
        Ok(value.cast(DataType::String))
    } else {
        Ok(value)
    }
}
