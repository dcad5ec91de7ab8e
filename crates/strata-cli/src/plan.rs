//! JSON plans: a source table followed by node operations.

use std::sync::Arc;

use indexmap::IndexMap;
use miette::Diagnostic;
use serde::Deserialize;
use strata_compile::{
    CompileError, EmitOptions, OrderedNode, OrderingMode, RelationalNode, UnorderedNode,
    WindowOpOptions,
};
use strata_engine::{Backend, BigQueryBackend, Schema, Table};
use strata_expr::{AggOp, Aggregation, Expression, ExpressionOrdering, OrderingExpression, WindowSpec};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Diagnostic)]
pub enum PlanError {
    #[error("invalid plan: {0}")]
    #[diagnostic(code(strata::plan::parse))]
    Parse(#[from] serde_json::Error),

    #[error("step {step} ({op}): {source}")]
    #[diagnostic(code(strata::plan::step))]
    Step {
        step: usize,
        op: &'static str,
        #[source]
        source: CompileError,
    },

    #[error("step {step} ({op}) needs an ordered relation")]
    #[diagnostic(
        code(strata::plan::unordered),
        help("give the source an `ordering`, or drop the `unordered` step")
    )]
    NeedsOrdering { step: usize, op: &'static str },

    #[error("{0} output needs an ordered relation")]
    #[diagnostic(code(strata::plan::mode))]
    UnorderedOutput(&'static str),

    #[error(transparent)]
    #[diagnostic(code(strata::compile))]
    Compile(#[from] CompileError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Plan {
    pub source: SourceTable,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Output names for column ids.
    #[serde(default)]
    pub rename: IndexMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceTable {
    pub name: String,
    pub schema: Schema,
    /// Columns that order the table ascending and identify each row. The
    /// source is unordered without them.
    #[serde(default)]
    pub ordering: Vec<String>,
    /// Source columns kept out of the output.
    #[serde(default)]
    pub hidden: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Filter {
        predicate: Expression,
    },
    Projection {
        columns: Vec<(Expression, String)>,
    },
    OrderBy {
        keys: Vec<OrderingExpression>,
    },
    Reverse,
    Window {
        column: String,
        agg: AggOp,
        #[serde(default)]
        spec: WindowSpec,
        #[serde(default)]
        output: Option<String>,
        #[serde(default)]
        never_skip_nulls: bool,
    },
    Aggregate {
        aggregations: Vec<(Aggregation, String)>,
        #[serde(default)]
        by: Vec<String>,
        #[serde(default = "default_dropna")]
        dropna: bool,
    },
    Explode {
        columns: Vec<String>,
    },
    PromoteOffsets {
        id: String,
    },
    Sample {
        fraction: f64,
    },
    RowCount,
    Unordered,
}

fn default_dropna() -> bool {
    true
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Filter { .. } => "filter",
            Step::Projection { .. } => "projection",
            Step::OrderBy { .. } => "order_by",
            Step::Reverse => "reverse",
            Step::Window { .. } => "window",
            Step::Aggregate { .. } => "aggregate",
            Step::Explode { .. } => "explode",
            Step::PromoteOffsets { .. } => "promote_offsets",
            Step::Sample { .. } => "sample",
            Step::RowCount => "row_count",
            Step::Unordered => "unordered",
        }
    }

    fn apply(&self, index: usize, relation: Relation) -> Result<Relation, PlanError> {
        let op = self.name();
        let fail = move |source: CompileError| PlanError::Step {
            step: index,
            op,
            source,
        };
        let ordered = |relation: Relation| match relation {
            Relation::Ordered(node) => Ok(node),
            Relation::Unordered(_) => Err(PlanError::NeedsOrdering { step: index, op }),
        };

        let next = match (self, relation) {
            (Step::Filter { predicate }, Relation::Ordered(node)) => {
                Relation::Ordered(node.filter(predicate).map_err(fail)?)
            }
            (Step::Filter { predicate }, Relation::Unordered(node)) => {
                Relation::Unordered(node.filter(predicate).map_err(fail)?)
            }
            (Step::Projection { columns }, Relation::Ordered(node)) => {
                Relation::Ordered(node.projection(columns).map_err(fail)?)
            }
            (Step::Projection { columns }, Relation::Unordered(node)) => {
                Relation::Unordered(node.projection(columns).map_err(fail)?)
            }
            (Step::OrderBy { keys }, relation) => {
                Relation::Ordered(ordered(relation)?.order_by(keys.clone()).map_err(fail)?)
            }
            (Step::Reverse, relation) => Relation::Ordered(ordered(relation)?.reversed().map_err(fail)?),
            (
                Step::Window {
                    column,
                    agg,
                    spec,
                    output,
                    never_skip_nulls,
                },
                relation,
            ) => {
                let options = WindowOpOptions {
                    output: output.clone(),
                    never_skip_nulls: *never_skip_nulls,
                    ..WindowOpOptions::default()
                };
                let node = ordered(relation)?
                    .project_window_op(column, *agg, spec, &options)
                    .map_err(fail)?;
                Relation::Ordered(node)
            }
            (
                Step::Aggregate {
                    aggregations,
                    by,
                    dropna,
                },
                relation,
            ) => {
                let node = relation
                    .into_unordered()
                    .and_then(|node| node.aggregate(aggregations, by, *dropna))
                    .map_err(fail)?;
                Relation::Ordered(node)
            }
            (Step::Explode { columns }, Relation::Ordered(node)) => {
                Relation::Ordered(node.explode(columns).map_err(fail)?)
            }
            (Step::Explode { columns }, Relation::Unordered(node)) => {
                Relation::Unordered(node.explode(columns).map_err(fail)?)
            }
            (Step::PromoteOffsets { id }, relation) => {
                Relation::Ordered(ordered(relation)?.promote_offsets(id).map_err(fail)?)
            }
            (Step::Sample { fraction }, Relation::Ordered(node)) => {
                Relation::Ordered(node.uniform_sampling(*fraction).map_err(fail)?)
            }
            (Step::Sample { fraction }, Relation::Unordered(node)) => {
                Relation::Unordered(node.uniform_sampling(*fraction).map_err(fail)?)
            }
            (Step::RowCount, relation) => Relation::Ordered(
                relation
                    .into_unordered()
                    .and_then(|node| node.row_count())
                    .map_err(fail)?,
            ),
            (Step::Unordered, relation) => Relation::Unordered(relation.into_unordered().map_err(fail)?),
        };
        Ok(next)
    }
}

/// A plan's current node.
#[derive(Debug, Clone)]
pub enum Relation {
    Ordered(OrderedNode),
    Unordered(UnorderedNode),
}

impl Relation {
    pub fn column_ids(&self) -> Vec<String> {
        match self {
            Relation::Ordered(node) => node.column_ids(),
            Relation::Unordered(node) => node.column_ids(),
        }
    }

    fn into_unordered(self) -> Result<UnorderedNode, CompileError> {
        match self {
            Relation::Ordered(node) => node.to_unordered(),
            Relation::Unordered(node) => Ok(node),
        }
    }

    /// SQL text for the relation. `sorted` wraps the query in an outer
    /// `ORDER BY`; other modes add an ordering column instead.
    pub fn emit(
        &self,
        mode: OrderingMode,
        sorted: bool,
        rename: &IndexMap<String, String>,
    ) -> Result<String, PlanError> {
        match (self, mode) {
            (Relation::Ordered(node), OrderingMode::Unordered) => Ok(node.to_sql(rename, sorted)?),
            (Relation::Unordered(node), OrderingMode::Unordered) => {
                if sorted {
                    return Err(PlanError::UnorderedOutput("sorted"));
                }
                Ok(node.to_sql(rename, false)?)
            }
            (Relation::Ordered(node), mode) => {
                let options = EmitOptions::with_mode(mode).with_overrides(rename.clone());
                let table = node.to_table(&options)?;
                BigQueryBackend
                    .compile(&table)
                    .map_err(|err| PlanError::Compile(err.into()))
            }
            (Relation::Unordered(_), OrderingMode::OffsetColumn) => Err(PlanError::UnorderedOutput("offset")),
            (Relation::Unordered(_), OrderingMode::StringEncoded) => Err(PlanError::UnorderedOutput("string")),
        }
    }
}

impl Plan {
    pub fn from_json(text: &str) -> Result<Self, PlanError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Apply every step to the source node.
    pub fn build(&self) -> Result<Relation, PlanError> {
        let table = Arc::new(Table::source(&self.source.name, self.source.schema.clone()));
        let mut relation = if self.source.ordering.is_empty() {
            Relation::Unordered(UnorderedNode::from_table(table)?)
        } else {
            let keys = self
                .source
                .ordering
                .iter()
                .map(|id| OrderingExpression::asc_column(id.clone()))
                .collect();
            let ordering = ExpressionOrdering::new(keys, self.source.ordering.iter().cloned().collect());
            Relation::Ordered(OrderedNode::from_table(table, &self.source.hidden, ordering)?)
        };
        for (index, step) in self.steps.iter().enumerate() {
            debug!(step = index, op = step.name(), "applying plan step");
            relation = step.apply(index, relation)?;
        }
        Ok(relation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNNING_TOTAL: &str = r#"{
        "source": {
            "name": "shop.orders",
            "schema": {"id": "int64", "region": "string", "amount": "float64"},
            "ordering": ["id"]
        },
        "steps": [
            {"op": "filter", "predicate": {"op": ["gt", [{"var": "amount"}, {"const": {"float64": 0.0}}]]}},
            {
                "op": "window",
                "column": "amount",
                "agg": "sum",
                "spec": {"grouping_keys": ["region"], "following": 0},
                "output": "running"
            }
        ]
    }"#;

    #[test]
    fn test_build_plan() {
        let plan = Plan::from_json(RUNNING_TOTAL).unwrap();
        assert_eq!(plan.steps.len(), 2);
        let relation = plan.build().unwrap();
        assert!(matches!(relation, Relation::Ordered(_)));
        assert_eq!(relation.column_ids(), vec!["id", "region", "amount", "running"]);
    }

    #[test]
    fn test_emit_modes() {
        let relation = Plan::from_json(RUNNING_TOTAL).unwrap().build().unwrap();
        let rename = IndexMap::new();

        let sorted = relation.emit(OrderingMode::Unordered, true, &rename).unwrap();
        assert!(sorted.starts_with("SELECT `id`, `region`, `amount`, `running`\nFROM ("));
        assert!(sorted.contains("ORDER BY `id` ASC NULLS LAST"));

        let offsets = relation.emit(OrderingMode::OffsetColumn, false, &rename).unwrap();
        assert!(offsets.contains("ROW_NUMBER()"));
        assert!(offsets.contains("`strata_ordering_id`"));
    }

    #[test]
    fn test_window_needs_ordering() {
        let text = RUNNING_TOTAL.replace(r#""ordering": ["id"]"#, r#""ordering": []"#);
        let err = Plan::from_json(&text).unwrap().build().unwrap_err();
        assert!(matches!(err, PlanError::NeedsOrdering { step: 1, op: "window" }));
    }

    #[test]
    fn test_unordered_relation_rejects_ordered_output() {
        let plan = Plan::from_json(
            r#"{"source": {"name": "t", "schema": {"x": "int64"}}, "steps": [{"op": "unordered"}]}"#,
        )
        .unwrap();
        let relation = plan.build().unwrap();
        assert!(relation.emit(OrderingMode::Unordered, false, &plan.rename).is_ok());
        assert!(matches!(
            relation.emit(OrderingMode::OffsetColumn, false, &plan.rename),
            Err(PlanError::UnorderedOutput("offset"))
        ));
    }

    #[test]
    fn test_step_errors_name_the_step() {
        let plan = Plan::from_json(
            r#"{
                "source": {"name": "t", "schema": {"x": "int64"}, "ordering": ["x"]},
                "steps": [{"op": "reverse"}, {"op": "explode", "columns": ["y"]}]
            }"#,
        )
        .unwrap();
        let err = plan.build().unwrap_err();
        assert!(matches!(err, PlanError::Step { step: 1, op: "explode", .. }));
    }

    #[test]
    fn test_unknown_op_is_a_parse_error() {
        let err = Plan::from_json(r#"{"source": {"name": "t", "schema": {}}, "steps": [{"op": "pivot"}]}"#)
            .unwrap_err();
        assert!(matches!(err, PlanError::Parse(_)));
    }

    #[test]
    fn test_aggregate_step() {
        let plan = Plan::from_json(
            r#"{
                "source": {"name": "t", "schema": {"g": "string", "x": "int64"}},
                "steps": [{
                    "op": "aggregate",
                    "aggregations": [[{"unary": ["sum", {"var": "x"}]}, "total"]],
                    "by": ["g"]
                }]
            }"#,
        )
        .unwrap();
        let relation = plan.build().unwrap();
        assert_eq!(relation.column_ids(), vec!["g", "total"]);
        assert!(matches!(relation, Relation::Ordered(_)));
    }
}
