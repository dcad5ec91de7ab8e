//! Type system for the Strata relational compiler.
//!
//! This crate provides:
//! - Engine data types (`types`)
//! - Literal values (`scalar`)
//! - Result-type rules for operators (`inference`)
//! - Type errors (`error`)

pub mod types;
pub mod scalar;
pub mod error;
pub mod inference;

pub use error::TypeError;
pub use scalar::Scalar;
pub use types::DataType;
