//! Row ordering model.
//!
//! An [`ExpressionOrdering`] describes how the rows of a relation are ordered
//! without committing to a physical encoding. Nodes carry one lazily and only
//! materialize it (as offsets or as a sortable string) when asked to.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::expression::Expression;

/// Numeral base used when encoding an integer order key as a string.
pub const ORDERING_ID_STRING_BASE: u32 = 10;

/// Digits needed to print any non-negative 64-bit signed integer in base 10:
/// `ceil(63 * log10(2))`.
pub const DEFAULT_ORDERING_ID_LENGTH: usize = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingDirection {
    Asc,
    Desc,
}

impl OrderingDirection {
    pub fn is_ascending(&self) -> bool {
        matches!(self, OrderingDirection::Asc)
    }

    pub fn reverse(&self) -> Self {
        match self {
            OrderingDirection::Asc => OrderingDirection::Desc,
            OrderingDirection::Desc => OrderingDirection::Asc,
        }
    }
}

/// One sort key: an expression, a direction and a null placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingExpression {
    pub scalar_expression: Expression,
    pub direction: OrderingDirection,
    #[serde(default = "default_na_last")]
    pub na_last: bool,
}

fn default_na_last() -> bool {
    true
}

impl OrderingExpression {
    pub fn new(scalar_expression: Expression, direction: OrderingDirection, na_last: bool) -> Self {
        Self {
            scalar_expression,
            direction,
            na_last,
        }
    }

    /// Ascending with nulls last.
    pub fn asc(scalar_expression: Expression) -> Self {
        Self::new(scalar_expression, OrderingDirection::Asc, true)
    }

    /// Descending with nulls last.
    pub fn desc(scalar_expression: Expression) -> Self {
        Self::new(scalar_expression, OrderingDirection::Desc, true)
    }

    pub fn asc_column(id: impl Into<String>) -> Self {
        Self::asc(Expression::var(id))
    }

    pub fn with_reverse(&self) -> Self {
        Self::new(
            self.scalar_expression.clone(),
            self.direction.reverse(),
            !self.na_last,
        )
    }

    pub fn rename(&self, mapping: &HashMap<String, String>) -> Self {
        Self::new(
            self.scalar_expression.rename(mapping),
            self.direction,
            self.na_last,
        )
    }

    /// The column id when the key is a bare column reference.
    pub fn column_id(&self) -> Option<&str> {
        self.scalar_expression.as_var()
    }
}

/// Whether the ordering is backed by an integer column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegerEncoding {
    pub is_encoded: bool,
    /// Values are exactly `0..n` with no gaps.
    pub is_sequential: bool,
}

impl IntegerEncoding {
    pub fn sequential() -> Self {
        Self {
            is_encoded: true,
            is_sequential: true,
        }
    }

    pub fn encoded() -> Self {
        Self {
            is_encoded: true,
            is_sequential: false,
        }
    }
}

/// Whether the ordering is backed by a fixed-width sortable string column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringEncoding {
    pub is_encoded: bool,
    pub length: Option<usize>,
}

impl StringEncoding {
    pub fn with_length(length: usize) -> Self {
        Self {
            is_encoded: true,
            length: Some(length),
        }
    }
}

/// An ordering over a relation's rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpressionOrdering {
    pub ordering_value_columns: Vec<OrderingExpression>,
    /// Columns that together identify a row uniquely.
    pub total_ordering_columns: BTreeSet<String>,
    #[serde(default)]
    pub integer_encoding: IntegerEncoding,
    #[serde(default)]
    pub string_encoding: StringEncoding,
}

impl ExpressionOrdering {
    pub fn new(
        ordering_value_columns: Vec<OrderingExpression>,
        total_ordering_columns: BTreeSet<String>,
    ) -> Self {
        Self {
            ordering_value_columns,
            total_ordering_columns,
            integer_encoding: IntegerEncoding::default(),
            string_encoding: StringEncoding::default(),
        }
    }

    /// No keys at all. Only meaningful for relations of at most one row.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Ascending over a single column that is also the total order.
    pub fn ascending_over(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(
            vec![OrderingExpression::asc_column(id.clone())],
            BTreeSet::from([id]),
        )
    }

    /// Descending over a single column that is also the total order.
    pub fn descending_over(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(
            vec![OrderingExpression::desc(Expression::var(id.clone()))],
            BTreeSet::from([id]),
        )
    }

    pub fn with_integer_encoding(mut self, encoding: IntegerEncoding) -> Self {
        self.integer_encoding = encoding;
        self
    }

    pub fn with_string_encoding(mut self, encoding: StringEncoding) -> Self {
        self.string_encoding = encoding;
        self
    }

    pub fn is_sequential(&self) -> bool {
        self.integer_encoding.is_encoded && self.integer_encoding.is_sequential
    }

    pub fn is_empty(&self) -> bool {
        self.ordering_value_columns.is_empty() && self.total_ordering_columns.is_empty()
    }

    /// The single ascending column key, when the full ordering has exactly one.
    pub fn total_order_col(&self) -> Option<OrderingExpression> {
        let mut keys = self.all_ordering_columns();
        if keys.len() != 1 {
            return None;
        }
        let key = keys.remove(0);
        if key.direction.is_ascending() && key.column_id().is_some() {
            Some(key)
        } else {
            None
        }
    }

    /// Value keys followed by ascending keys for total-order columns the value
    /// keys do not already reference.
    pub fn all_ordering_columns(&self) -> Vec<OrderingExpression> {
        let mut keys = self.ordering_value_columns.clone();
        let referenced: BTreeSet<String> = self
            .ordering_value_columns
            .iter()
            .flat_map(|key| key.scalar_expression.free_vars())
            .collect();
        for id in &self.total_ordering_columns {
            if !referenced.contains(id) {
                keys.push(OrderingExpression::asc_column(id.clone()));
            }
        }
        keys
    }

    /// Every column the ordering depends on.
    pub fn referenced_columns(&self) -> BTreeSet<String> {
        let mut cols: BTreeSet<String> = self
            .ordering_value_columns
            .iter()
            .flat_map(|key| key.scalar_expression.free_vars())
            .collect();
        cols.extend(self.total_ordering_columns.iter().cloned());
        cols
    }

    /// Make `keys` the most significant keys. Encodings do not survive.
    pub fn with_ordering_columns(&self, keys: Vec<OrderingExpression>) -> Self {
        let mut combined: Vec<OrderingExpression> = Vec::new();
        for key in keys.into_iter().chain(self.ordering_value_columns.iter().cloned()) {
            if !combined
                .iter()
                .any(|existing| existing.scalar_expression == key.scalar_expression)
            {
                combined.push(key);
            }
        }
        let truncated = self.truncate(combined);
        Self::new(truncated, self.total_ordering_columns.clone())
    }

    /// Keys after the point where the total order is fully covered are dead.
    fn truncate(&self, keys: Vec<OrderingExpression>) -> Vec<OrderingExpression> {
        if self.total_ordering_columns.is_empty() {
            return keys;
        }
        let mut remaining = self.total_ordering_columns.clone();
        for (i, key) in keys.iter().enumerate() {
            if let Some(id) = key.column_id() {
                remaining.remove(id);
            }
            if remaining.is_empty() {
                return keys[..=i].to_vec();
            }
        }
        keys
    }

    /// Flip every key's direction and null placement.
    pub fn with_reverse(&self) -> Self {
        Self::new(
            self.ordering_value_columns
                .iter()
                .map(OrderingExpression::with_reverse)
                .collect(),
            self.total_ordering_columns.clone(),
        )
    }

    /// The same ordering, but the integer encoding no longer has gap-free values.
    pub fn with_non_sequential(&self) -> Self {
        let mut ordering = self.clone();
        ordering.integer_encoding.is_sequential = false;
        ordering
    }

    /// Rename column references. Encodings are kept since values are unchanged.
    pub fn with_column_remap(&self, mapping: &HashMap<String, String>) -> Self {
        Self {
            ordering_value_columns: self
                .ordering_value_columns
                .iter()
                .map(|key| key.rename(mapping))
                .collect(),
            total_ordering_columns: self
                .total_ordering_columns
                .iter()
                .map(|id| mapping.get(id).cloned().unwrap_or_else(|| id.clone()))
                .collect(),
            integer_encoding: self.integer_encoding,
            string_encoding: self.string_encoding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_key() -> ExpressionOrdering {
        ExpressionOrdering::new(
            vec![
                OrderingExpression::asc_column("a"),
                OrderingExpression::asc_column("id"),
            ],
            BTreeSet::from(["id".to_string()]),
        )
    }

    #[test]
    fn test_string_width_constant() {
        let width = (63.0 * 2f64.log10()).ceil() as usize;
        assert_eq!(width, DEFAULT_ORDERING_ID_LENGTH);
        assert_eq!(i64::MAX.to_string().len(), DEFAULT_ORDERING_ID_LENGTH);
    }

    #[test]
    fn test_all_ordering_columns_appends_total() {
        let ordering = ExpressionOrdering::new(
            vec![OrderingExpression::desc(Expression::var("a"))],
            BTreeSet::from(["id".to_string()]),
        );
        let keys = ordering.all_ordering_columns();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1], OrderingExpression::asc_column("id"));
    }

    #[test]
    fn test_total_order_col() {
        assert!(two_key().total_order_col().is_none());
        let single = ExpressionOrdering::ascending_over("id");
        assert_eq!(single.total_order_col().unwrap().column_id(), Some("id"));
        assert!(ExpressionOrdering::descending_over("id").total_order_col().is_none());

        // Total columns alone still count.
        let implicit = ExpressionOrdering::new(vec![], BTreeSet::from(["k".to_string()]));
        assert_eq!(implicit.total_order_col().unwrap().column_id(), Some("k"));
    }

    #[test]
    fn test_with_ordering_columns_prepends_and_truncates() {
        let reordered = two_key().with_ordering_columns(vec![OrderingExpression::asc_column("id")]);
        // `id` covers the whole total order, so `a` is dropped.
        assert_eq!(
            reordered.ordering_value_columns,
            vec![OrderingExpression::asc_column("id")]
        );

        let reordered = two_key().with_ordering_columns(vec![OrderingExpression::desc(
            Expression::var("b"),
        )]);
        assert_eq!(reordered.ordering_value_columns.len(), 3);
        assert_eq!(reordered.ordering_value_columns[0].column_id(), Some("b"));
    }

    #[test]
    fn test_with_ordering_columns_dedups() {
        let reordered = two_key().with_ordering_columns(vec![OrderingExpression::desc(
            Expression::var("a"),
        )]);
        assert_eq!(reordered.ordering_value_columns.len(), 2);
        assert_eq!(
            reordered.ordering_value_columns[0].direction,
            OrderingDirection::Desc
        );
    }

    #[test]
    fn test_encodings_reset() {
        let ordering =
            ExpressionOrdering::ascending_over("id").with_integer_encoding(IntegerEncoding::sequential());
        assert!(ordering.is_sequential());
        assert!(!ordering.with_reverse().is_sequential());
        assert!(!ordering
            .with_ordering_columns(vec![OrderingExpression::asc_column("x")])
            .integer_encoding
            .is_encoded);
    }

    #[test]
    fn test_non_sequential_keeps_encoding() {
        let ordering = ExpressionOrdering::ascending_over("id")
            .with_integer_encoding(IntegerEncoding::sequential())
            .with_non_sequential();
        assert!(ordering.integer_encoding.is_encoded);
        assert!(!ordering.is_sequential());
    }

    #[test]
    fn test_reverse_flips_nulls() {
        let reversed = two_key().with_reverse();
        assert_eq!(reversed.ordering_value_columns[0].direction, OrderingDirection::Desc);
        assert!(!reversed.ordering_value_columns[0].na_last);
    }

    #[test]
    fn test_column_remap() {
        let ordering =
            ExpressionOrdering::ascending_over("id").with_integer_encoding(IntegerEncoding::sequential());
        let mapping = HashMap::from([("id".to_string(), "hidden_0".to_string())]);
        let remapped = ordering.with_column_remap(&mapping);
        assert!(remapped.total_ordering_columns.contains("hidden_0"));
        assert_eq!(remapped.ordering_value_columns[0].column_id(), Some("hidden_0"));
        assert!(remapped.is_sequential());
        assert_eq!(
            remapped.referenced_columns(),
            BTreeSet::from(["hidden_0".to_string()])
        );
    }
}
