//! Row batches.

use strata_engine::Schema;
use strata_types::Scalar;

use crate::executor::ExecutorError;

/// A materialized relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub schema: Schema,
    pub rows: Vec<Vec<Scalar>>,
}

impl Batch {
    pub fn new(schema: Schema, rows: Vec<Vec<Scalar>>) -> Self {
        Self { schema, rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<Scalar>, ExecutorError> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| ExecutorError::ColumnNotFound(name.to_string()))?;
        Ok(self.rows.iter().map(|row| row[index].clone()).collect())
    }

    /// A batch holding only the rows at `indices`, in that order.
    pub fn take(&self, indices: &[usize]) -> Batch {
        Batch {
            schema: self.schema.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Rows reordered so `key` is ascending (NULLs first).
    pub fn sorted_by(&self, key: &str) -> Result<Batch, ExecutorError> {
        let values = self.column(key)?;
        let mut indices: Vec<usize> = (0..self.rows.len()).collect();
        indices.sort_by(|&a, &b| values[a].sort_cmp(&values[b]));
        Ok(self.take(&indices))
    }
}
