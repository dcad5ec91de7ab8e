//! Strata runtime
//!
//! Evaluates backing tables in memory with the warehouse's semantics: NULLs
//! sort smallest, three-valued logic, scalar aggregates always yield one row,
//! and unnesting an empty array yields no rows.

pub mod batch;
pub mod eval;
pub mod executor;

pub use batch::Batch;
pub use executor::{Executor, ExecutorError};
