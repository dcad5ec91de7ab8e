//! Strata engine layer
//!
//! The expression language of backing tables (`Table`, `ValueExpr`), the
//! BigQuery text backend, and the default compilers from engine-independent
//! expressions to engine values.

pub mod error;
pub mod value;
pub mod table;
pub mod backend;
pub mod compiler;

pub use backend::{quote_ident, quote_string, Backend, BigQueryBackend};
pub use compiler::{
    compile_aggregate, compile_analytic, compile_expression, Bindings, DefaultCompiler,
    ExprCompiler,
};
pub use error::EngineError;
pub use table::{Schema, Table};
pub use value::{AggFunc, AnalyticFunc, Frame, Func, SortKey, ValueExpr, Window};
