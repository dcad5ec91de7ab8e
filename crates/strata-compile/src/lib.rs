//! Strata relational compiler
//!
//! Immutable relational nodes over a backing [`Table`](strata_engine::Table).
//! An [`OrderedNode`] carries a logical row ordering the warehouse does not
//! keep on its own; at emission time the ordering is either dropped,
//! materialized as zero-based offsets, or encoded as a sortable string.

pub mod error;
pub mod columns;
pub mod node;
pub mod builder;
pub mod emit;
pub mod unordered;
pub mod ordered;

pub use builder::{OrderedBuilder, UnorderedBuilder};
pub use columns::ColumnSet;
pub use emit::{encode_order_string, EmitOptions, OrderingMode};
pub use error::CompileError;
pub use node::{reduce_predicates, NodeCore, RelationalNode};
pub use ordered::{OrderedNode, WindowOpOptions};
pub use unordered::UnorderedNode;

/// Reserved id of generated ordering and offset columns.
pub const ORDER_ID_COLUMN: &str = "strata_ordering_id";

/// Reserved id of the reduced predicate in emitted tables.
pub const PREDICATE_COLUMN: &str = "strata_predicate";

/// Prefix of synthetic ids given to hidden copies of ordering columns.
pub const HIDDEN_COLUMN_PREFIX: &str = "strata_hidden_";
