//! Result-type rules for engine operators.

use crate::error::TypeError;
use crate::types::DataType;

/// Promote two numeric types to their common numeric type.
pub fn promote_numeric(left: &DataType, right: &DataType) -> DataType {
    match (left, right) {
        (DataType::Float64, _) | (_, DataType::Float64) => DataType::Float64,
        _ => DataType::Int64,
    }
}

/// Result type of an arithmetic operator.
pub fn infer_arithmetic(op: &str, left: &DataType, right: &DataType) -> Result<DataType, TypeError> {
    match (left, right) {
        (DataType::Null, DataType::Null) => Ok(DataType::Int64),
        (DataType::Null, other) | (other, DataType::Null) if other.is_numeric() => Ok(other.clone()),
        (l, r) if l.is_numeric() && r.is_numeric() => Ok(promote_numeric(l, r)),
        _ => Err(TypeError::InvalidOperator {
            op: op.to_string(),
            left: left.clone(),
            right: right.clone(),
        }),
    }
}

/// Smallest type both sides convert to, if any. NULL converts to anything.
pub fn common_supertype(left: &DataType, right: &DataType) -> Option<DataType> {
    if left == right {
        return Some(left.clone());
    }
    match (left, right) {
        (DataType::Null, other) | (other, DataType::Null) => Some(other.clone()),
        (l, r) if l.is_numeric() && r.is_numeric() => Some(promote_numeric(l, r)),
        (DataType::Array(l), DataType::Array(r)) => {
            common_supertype(l, r).map(|inner| DataType::Array(Box::new(inner)))
        }
        _ => None,
    }
}

/// Fold `common_supertype` over a list of types.
pub fn common_supertype_of(types: &[DataType]) -> Result<DataType, TypeError> {
    let mut result = DataType::Null;
    for ty in types {
        result = common_supertype(&result, ty).ok_or_else(|| TypeError::NoCommonType {
            types: types.to_vec(),
        })?;
    }
    Ok(result)
}

/// Check that values of the two types can be compared.
pub fn ensure_comparable(op: &str, left: &DataType, right: &DataType) -> Result<(), TypeError> {
    match common_supertype(left, right) {
        Some(DataType::Geography) | None => Err(TypeError::InvalidOperator {
            op: op.to_string(),
            left: left.clone(),
            right: right.clone(),
        }),
        Some(_) => Ok(()),
    }
}

/// Check that a condition evaluates to a boolean (or untyped NULL).
pub fn ensure_bool(ty: &DataType) -> Result<(), TypeError> {
    match ty {
        DataType::Bool | DataType::Null => Ok(()),
        other => Err(TypeError::NonBooleanCondition {
            found: other.clone(),
        }),
    }
}

/// Check that a cast between the two types is allowed.
pub fn ensure_castable(from: &DataType, to: &DataType) -> Result<(), TypeError> {
    let ok = match (from, to) {
        (DataType::Null, _) => true,
        (l, r) if l == r => true,
        (_, DataType::String) => !matches!(from, DataType::Array(_)),
        (DataType::String, _) => !matches!(to, DataType::Array(_)),
        (l, r) if l.is_numeric() && r.is_numeric() => true,
        (DataType::Bool, DataType::Int64) | (DataType::Int64, DataType::Bool) => true,
        (DataType::Int64, DataType::Timestamp) | (DataType::Timestamp, DataType::Int64) => true,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(TypeError::InvalidCast {
            from: from.clone(),
            to: to.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_promotion() {
        assert_eq!(promote_numeric(&DataType::Int64, &DataType::Int64), DataType::Int64);
        assert_eq!(promote_numeric(&DataType::Int64, &DataType::Float64), DataType::Float64);
    }

    #[test]
    fn test_arithmetic_rejects_strings() {
        let err = infer_arithmetic("+", &DataType::String, &DataType::Int64).unwrap_err();
        assert!(matches!(err, TypeError::InvalidOperator { .. }));
    }

    #[test]
    fn test_null_unifies_with_anything() {
        assert_eq!(
            common_supertype(&DataType::Null, &DataType::String),
            Some(DataType::String)
        );
        assert_eq!(
            common_supertype_of(&[DataType::Int64, DataType::Null, DataType::Float64]).unwrap(),
            DataType::Float64
        );
    }

    #[test]
    fn test_no_common_type() {
        assert!(common_supertype_of(&[DataType::Bool, DataType::String]).is_err());
    }

    #[test]
    fn test_casts() {
        assert!(ensure_castable(&DataType::Float64, &DataType::String).is_ok());
        assert!(ensure_castable(&DataType::Geography, &DataType::String).is_ok());
        assert!(ensure_castable(&DataType::Bool, &DataType::Geography).is_err());
    }
}
