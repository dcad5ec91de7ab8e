//! Type definitions for Strata.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Column types understood by the warehouse engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Int64,
    Float64,
    String,
    /// Microseconds since the unix epoch.
    Timestamp,
    /// Well-known-text geography.
    Geography,
    Array(Box<DataType>),
    /// Type of an untyped NULL literal.
    Null,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float64)
    }

    pub fn is_geospatial(&self) -> bool {
        matches!(self, DataType::Geography)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataType::Null)
    }

    /// Element type if this is an array type.
    pub fn element_type(&self) -> Option<&DataType> {
        match self {
            DataType::Array(inner) => Some(inner),
            _ => None,
        }
    }

    /// Whether the engine accepts values of this type as grouping keys.
    pub fn is_groupable(&self) -> bool {
        !matches!(
            self,
            DataType::Float64 | DataType::Geography | DataType::Array(_)
        )
    }

    /// Name of the type in the SQL dialect.
    pub fn sql_name(&self) -> String {
        match self {
            DataType::Bool => "BOOL".to_string(),
            DataType::Int64 => "INT64".to_string(),
            DataType::Float64 => "FLOAT64".to_string(),
            DataType::String => "STRING".to_string(),
            DataType::Timestamp => "TIMESTAMP".to_string(),
            DataType::Geography => "GEOGRAPHY".to_string(),
            DataType::Array(inner) => format!("ARRAY<{}>", inner.sql_name()),
            // An untyped NULL still needs a concrete type in DDL-like positions.
            DataType::Null => "INT64".to_string(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "bool"),
            DataType::Int64 => write!(f, "int64"),
            DataType::Float64 => write!(f, "float64"),
            DataType::String => write!(f, "string"),
            DataType::Timestamp => write!(f, "timestamp"),
            DataType::Geography => write!(f, "geography"),
            DataType::Array(inner) => write!(f, "array<{}>", inner),
            DataType::Null => write!(f, "null"),
        }
    }
}
