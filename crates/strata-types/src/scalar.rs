//! Literal values.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::DataType;

/// A single engine value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Timestamp(i64),
    Geography(String),
    Array(Vec<Scalar>),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// The natural type of this value. Arrays take the type of their first
    /// non-null element.
    pub fn data_type(&self) -> DataType {
        match self {
            Scalar::Null => DataType::Null,
            Scalar::Bool(_) => DataType::Bool,
            Scalar::Int64(_) => DataType::Int64,
            Scalar::Float64(_) => DataType::Float64,
            Scalar::String(_) => DataType::String,
            Scalar::Timestamp(_) => DataType::Timestamp,
            Scalar::Geography(_) => DataType::Geography,
            Scalar::Array(items) => {
                let elem = items
                    .iter()
                    .find(|item| !item.is_null())
                    .map(Scalar::data_type)
                    .unwrap_or(DataType::Null);
                DataType::Array(Box::new(elem))
            }
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int64(n) | Scalar::Timestamp(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int64(n) => Some(*n as f64),
            Scalar::Float64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) | Scalar::Geography(s) => Some(s),
            _ => None,
        }
    }

    /// Total order used for sorting: NULL sorts before everything, numbers
    /// compare across integer and float, mismatched kinds order by kind.
    pub fn sort_cmp(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => Ordering::Equal,
            (Scalar::Null, _) => Ordering::Less,
            (_, Scalar::Null) => Ordering::Greater,
            (Scalar::Bool(l), Scalar::Bool(r)) => l.cmp(r),
            (Scalar::Int64(l), Scalar::Int64(r)) => l.cmp(r),
            (Scalar::Timestamp(l), Scalar::Timestamp(r)) => l.cmp(r),
            (Scalar::String(l), Scalar::String(r)) => l.cmp(r),
            (Scalar::Geography(l), Scalar::Geography(r)) => l.cmp(r),
            (Scalar::Array(l), Scalar::Array(r)) => {
                for (a, b) in l.iter().zip(r.iter()) {
                    let ord = a.sort_cmp(b);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                l.len().cmp(&r.len())
            }
            (l, r) => match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => l.kind_rank().cmp(&r.kind_rank()),
            },
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Scalar::Null => 0,
            Scalar::Bool(_) => 1,
            Scalar::Int64(_) | Scalar::Float64(_) => 2,
            Scalar::Timestamp(_) => 3,
            Scalar::String(_) => 4,
            Scalar::Geography(_) => 5,
            Scalar::Array(_) => 6,
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int64(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float64(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Null)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int64(n) => write!(f, "{}", n),
            Scalar::Float64(n) => write!(f, "{}", n),
            Scalar::String(s) => write!(f, "{}", s),
            Scalar::Timestamp(n) => write!(f, "ts({})", n),
            Scalar::Geography(s) => write!(f, "{}", s),
            Scalar::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sorts_first() {
        assert_eq!(Scalar::Null.sort_cmp(&Scalar::Int64(-5)), Ordering::Less);
        assert_eq!(Scalar::Int64(-5).sort_cmp(&Scalar::Null), Ordering::Greater);
    }

    #[test]
    fn test_mixed_numeric_compare() {
        assert_eq!(
            Scalar::Int64(2).sort_cmp(&Scalar::Float64(2.5)),
            Ordering::Less
        );
        assert_eq!(
            Scalar::Float64(3.0).sort_cmp(&Scalar::Int64(3)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_array_type_from_first_non_null() {
        let value = Scalar::Array(vec![Scalar::Null, Scalar::Int64(1)]);
        assert_eq!(
            value.data_type(),
            DataType::Array(Box::new(DataType::Int64))
        );
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Scalar::from(None::<i64>), Scalar::Null);
        assert_eq!(Scalar::from(Some("a")), Scalar::String("a".to_string()));
    }
}
