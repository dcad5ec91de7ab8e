//! Window specifications for analytic operations.

use serde::{Deserialize, Serialize};

use crate::ordering::OrderingExpression;

/// Frame and partitioning of a window operation.
///
/// `preceding`/`following` are row counts relative to the current row;
/// `None` means unbounded on that side. A spec with both bounds `None` and
/// no ordering is an unordered, whole-partition window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    #[serde(default)]
    pub grouping_keys: Vec<String>,
    #[serde(default)]
    pub ordering: Vec<OrderingExpression>,
    #[serde(default)]
    pub preceding: Option<u64>,
    #[serde(default)]
    pub following: Option<u64>,
    #[serde(default)]
    pub min_periods: u64,
}

impl WindowSpec {
    /// Whole partition, no ordering requirement.
    pub fn unbound() -> Self {
        Self::default()
    }

    /// Row-bounded frame.
    pub fn rows(preceding: Option<u64>, following: Option<u64>) -> Self {
        Self {
            preceding,
            following,
            ..Self::default()
        }
    }

    /// From the start of the partition up to the current row.
    pub fn cumulative() -> Self {
        Self::rows(None, Some(0))
    }

    pub fn with_grouping(mut self, keys: Vec<String>) -> Self {
        self.grouping_keys = keys;
        self
    }

    pub fn with_ordering(mut self, ordering: Vec<OrderingExpression>) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_min_periods(mut self, min_periods: u64) -> Self {
        self.min_periods = min_periods;
        self
    }

    /// True when at least one side of the frame is bounded.
    pub fn is_row_bounded(&self) -> bool {
        self.preceding.is_some() || self.following.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let spec = WindowSpec::cumulative()
            .with_grouping(vec!["g".to_string()])
            .with_min_periods(2);
        assert_eq!(spec.preceding, None);
        assert_eq!(spec.following, Some(0));
        assert!(spec.is_row_bounded());
        assert!(!WindowSpec::unbound().is_row_bounded());
        assert_eq!(spec.min_periods, 2);
    }
}
