//! Strata expression layer
//!
//! Engine-independent scalar expressions, aggregations, window specifications
//! and the ordering model that relational nodes carry.

pub mod expression;
pub mod aggregation;
pub mod ordering;
pub mod window_spec;
pub mod guid;

pub use aggregation::{AggOp, Aggregation};
pub use expression::{Expression, ScalarOp};
pub use guid::generate_guid;
pub use ordering::{
    ExpressionOrdering, IntegerEncoding, OrderingDirection, OrderingExpression, StringEncoding,
    DEFAULT_ORDERING_ID_LENGTH, ORDERING_ID_STRING_BASE,
};
pub use window_spec::WindowSpec;
