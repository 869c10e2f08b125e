//! Group transactions into the cohort matrix.
//!
//! # Architecture
//!
//! ```text
//! Transactions (one per row)            →  CohortMatrix (distinct customers)
//! ┌──────────────────────────────┐        ┌─────────┬───┬───┬───┐
//! │ C1  2023-01-05  (2023-01, 1) │        │ cohort  │ 1 │ 2 │ 3 │
//! │ C1  2023-01-20  (2023-01, 1) │   →    ├─────────┼───┼───┼───┤
//! │ C1  2023-03-02  (2023-01, 3) │        │ 2023-01 │ 2 │   │ 1 │
//! │ C2  2023-01-11  (2023-01, 1) │        └─────────┴───┴───┴───┘
//! └──────────────────────────────┘
//! ```
//!
//! Cells count distinct customers, not rows. Buckets with no transactions
//! are absent rather than zero.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::cohort::CohortAssignment;
use crate::error::{CohortError, CohortResult};
use crate::models::{CohortIndex, CustomerId, Transaction, YearMonth};

/// Sparse `(cohort, index) → distinct customer count` matrix.
///
/// Rows iterate in chronological order and cells in ascending index order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CohortMatrix {
    rows: BTreeMap<YearMonth, BTreeMap<CohortIndex, usize>>,
}

impl CohortMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a matrix from explicit cells.
    pub fn from_cells<I>(cells: I) -> Self
    where
        I: IntoIterator<Item = ((YearMonth, CohortIndex), usize)>,
    {
        let mut matrix = Self::new();
        for ((cohort, index), count) in cells {
            matrix.insert(cohort, index, count);
        }
        matrix
    }

    /// Set a cell, replacing any previous count.
    pub fn insert(&mut self, cohort: YearMonth, index: CohortIndex, count: usize) {
        self.rows.entry(cohort).or_default().insert(index, count);
    }

    pub fn get(&self, cohort: YearMonth, index: CohortIndex) -> Option<usize> {
        self.rows.get(&cohort)?.get(&index).copied()
    }

    /// Count at index 1 of a cohort.
    pub fn base(&self, cohort: YearMonth) -> Option<usize> {
        self.get(cohort, 1)
    }

    pub fn row(&self, cohort: YearMonth) -> Option<&BTreeMap<CohortIndex, usize>> {
        self.rows.get(&cohort)
    }

    pub fn rows(&self) -> impl Iterator<Item = (YearMonth, &BTreeMap<CohortIndex, usize>)> {
        self.rows.iter().map(|(k, v)| (*k, v))
    }

    /// Cohort keys in chronological order.
    pub fn cohort_keys(&self) -> Vec<YearMonth> {
        self.rows.keys().copied().collect()
    }

    /// Highest index present in any row.
    pub fn max_index(&self) -> Option<CohortIndex> {
        self.rows
            .values()
            .filter_map(|r| r.keys().next_back().copied())
            .max()
    }

    /// Column order for a pivoted rendering: `1..=max_index`.
    pub fn index_range(&self) -> Vec<CohortIndex> {
        self.max_index().map(|m| (1..=m).collect()).unwrap_or_default()
    }

    /// Every present cell as `(cohort, index, count)`.
    pub fn cells(&self) -> impl Iterator<Item = (YearMonth, CohortIndex, usize)> + '_ {
        self.rows
            .iter()
            .flat_map(|(k, r)| r.iter().map(move |(i, c)| (*k, *i, *c)))
    }

    /// Number of present cells.
    pub fn len(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Count distinct customers per `(cohort, index)` bucket.
///
/// Each complete row is bucketed by its customer's cohort in `assignment`.
/// Incomplete rows are skipped. A customer missing from `assignment`, or a
/// row dated before its customer's cohort, is an error.
pub fn aggregate(
    transactions: &[Transaction],
    assignment: &CohortAssignment,
) -> CohortResult<CohortMatrix> {
    let mut buckets: BTreeMap<(YearMonth, CohortIndex), BTreeSet<&CustomerId>> = BTreeMap::new();

    for t in transactions {
        let Some((customer, time)) = t.key() else {
            continue;
        };

        let cohort = assignment
            .cohort_of(customer)
            .ok_or_else(|| CohortError::MissingAssignment {
                row: t.row,
                customer: customer.to_string(),
            })?;

        let month = YearMonth::of(&time);
        let index = cohort
            .cohort_index(month)
            .ok_or_else(|| CohortError::PrecedesCohort {
                row: t.row,
                customer: customer.to_string(),
                month: month.to_string(),
                cohort: cohort.to_string(),
            })?;

        buckets.entry((cohort, index)).or_default().insert(customer);
    }

    Ok(CohortMatrix::from_cells(
        buckets.into_iter().map(|(key, customers)| (key, customers.len())),
    ))
}
