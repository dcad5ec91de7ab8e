//! Mutable staging structs for node construction.
//!
//! Nodes are immutable, so a transformation copies a node's state into a
//! builder, changes what it needs, and builds a fresh node. `build` runs the
//! same validation as the node constructors.

use std::sync::Arc;

use strata_engine::{Table, ValueExpr};
use strata_expr::ExpressionOrdering;

use crate::error::CompileError;
use crate::ordered::OrderedNode;
use crate::unordered::UnorderedNode;

#[derive(Debug, Clone)]
pub struct UnorderedBuilder {
    pub table: Arc<Table>,
    pub columns: Vec<(String, ValueExpr)>,
    pub predicates: Vec<ValueExpr>,
}

impl UnorderedBuilder {
    pub fn new(table: Arc<Table>) -> Self {
        Self {
            table,
            columns: Vec::new(),
            predicates: Vec::new(),
        }
    }

    pub fn build(self) -> Result<UnorderedNode, CompileError> {
        UnorderedNode::new(self.table, self.columns, self.predicates)
    }
}

#[derive(Debug, Clone)]
pub struct OrderedBuilder {
    pub table: Arc<Table>,
    pub columns: Vec<(String, ValueExpr)>,
    pub hidden_columns: Vec<(String, ValueExpr)>,
    pub ordering: ExpressionOrdering,
    pub predicates: Vec<ValueExpr>,
}

impl OrderedBuilder {
    pub fn new(table: Arc<Table>, ordering: ExpressionOrdering) -> Self {
        Self {
            table,
            columns: Vec::new(),
            hidden_columns: Vec::new(),
            ordering,
            predicates: Vec::new(),
        }
    }

    pub fn build(self) -> Result<OrderedNode, CompileError> {
        OrderedNode::new(
            self.table,
            self.columns,
            self.hidden_columns,
            self.ordering,
            self.predicates,
        )
    }
}
