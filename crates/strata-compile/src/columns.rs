//! Ordered sets of named column values.

use indexmap::IndexMap;
use strata_engine::ValueExpr;

use crate::error::CompileError;

/// Output ids mapped to the values they stand for, in output order.
/// An id appears at most once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnSet {
    columns: IndexMap<String, ValueExpr>,
}

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I>(pairs: I) -> Result<Self, CompileError>
    where
        I: IntoIterator<Item = (String, ValueExpr)>,
    {
        let mut set = ColumnSet::new();
        for (id, value) in pairs {
            set.insert(id, value)?;
        }
        Ok(set)
    }

    /// Append a column. Fails if `id` is already present.
    pub fn insert(&mut self, id: String, value: ValueExpr) -> Result<(), CompileError> {
        if self.columns.contains_key(&id) {
            return Err(CompileError::DuplicateColumn(id));
        }
        self.columns.insert(id, value);
        Ok(())
    }

    /// Replace the value of `id` in place, or append it when absent.
    pub fn with_value(&self, id: &str, value: ValueExpr) -> ColumnSet {
        let mut columns = self.columns.clone();
        columns.insert(id.to_string(), value);
        ColumnSet { columns }
    }

    /// Drop `id` if present, keeping the order of the rest.
    pub fn without(&self, id: &str) -> ColumnSet {
        let mut columns = self.columns.clone();
        columns.shift_remove(id);
        ColumnSet { columns }
    }

    pub fn get(&self, id: &str) -> Option<&ValueExpr> {
        self.columns.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.columns.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ValueExpr)> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn to_pairs(&self) -> Vec<(String, ValueExpr)> {
        self.columns
            .iter()
            .map(|(id, value)| (id.clone(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::DataType;

    fn col(name: &str) -> ValueExpr {
        ValueExpr::column(name, DataType::Int64)
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = ColumnSet::from_pairs([("a".to_string(), col("a")), ("a".to_string(), col("b"))])
            .unwrap_err();
        assert_eq!(err, CompileError::DuplicateColumn("a".to_string()));
    }

    #[test]
    fn test_with_value_keeps_position() {
        let set = ColumnSet::from_pairs([
            ("a".to_string(), col("a")),
            ("b".to_string(), col("b")),
        ])
        .unwrap();
        let replaced = set.with_value("a", ValueExpr::literal(1i64));
        assert_eq!(replaced.ids(), vec!["a", "b"]);
        assert_eq!(replaced.get("a"), Some(&ValueExpr::literal(1i64)));

        let appended = set.with_value("c", col("c"));
        assert_eq!(appended.ids(), vec!["a", "b", "c"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_without() {
        let set = ColumnSet::from_pairs([
            ("a".to_string(), col("a")),
            ("b".to_string(), col("b")),
            ("c".to_string(), col("c")),
        ])
        .unwrap();
        assert_eq!(set.without("b").ids(), vec!["a", "c"]);
        assert_eq!(set.without("zzz").len(), 3);
    }
}
