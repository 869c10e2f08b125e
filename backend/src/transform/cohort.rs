//! Cohort assignment.
//!
//! A customer's cohort is the month of their earliest transaction. Each
//! transaction then gets a cohort index: its month offset from that cohort,
//! counting the cohort month itself as 1.
//!
//! ```text
//! C1: 2023-12-03, 2024-01-15, 2024-02-20   →  cohort 2023-12, indices 1, 2, 3
//! C2: 2024-01-31                           →  cohort 2024-01, index 1
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{CohortIndex, CustomerId, Transaction, YearMonth};

/// Cohort of every customer and cohort index of every complete row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CohortAssignment {
    cohorts: BTreeMap<CustomerId, YearMonth>,
    /// Keyed by [`Transaction::row`].
    indices: BTreeMap<usize, CohortIndex>,
}

impl CohortAssignment {
    /// Cohort month of a customer.
    pub fn cohort_of(&self, customer: &CustomerId) -> Option<YearMonth> {
        self.cohorts.get(customer).copied()
    }

    /// Cohort index of a source row.
    pub fn index_of(&self, row: usize) -> Option<CohortIndex> {
        self.indices.get(&row).copied()
    }

    /// Customer to cohort map.
    pub fn cohorts(&self) -> &BTreeMap<CustomerId, YearMonth> {
        &self.cohorts
    }

    /// Row to cohort index map.
    pub fn indices(&self) -> &BTreeMap<usize, CohortIndex> {
        &self.indices
    }

    /// Distinct cohort months, ascending.
    pub fn cohort_keys(&self) -> BTreeSet<YearMonth> {
        self.cohorts.values().copied().collect()
    }

    /// Number of customers that received a cohort.
    pub fn customer_count(&self) -> usize {
        self.cohorts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cohorts.is_empty()
    }
}

/// Assign cohorts to customers and cohort indices to rows.
///
/// Rows lacking a customer id or invoice date are ignored.
pub fn assign_cohorts(transactions: &[Transaction]) -> CohortAssignment {
    let mut first_month: BTreeMap<CustomerId, YearMonth> = BTreeMap::new();

    for (customer, time) in transactions.iter().filter_map(Transaction::key) {
        let month = YearMonth::of(&time);
        first_month
            .entry(customer.clone())
            .and_modify(|m| *m = (*m).min(month))
            .or_insert(month);
    }

    let indices = transactions
        .iter()
        .filter_map(|t| {
            let (customer, time) = t.key()?;
            let cohort = first_month.get(customer)?;
            cohort
                .cohort_index(YearMonth::of(&time))
                .map(|index| (t.row, index))
        })
        .collect();

    CohortAssignment {
        cohorts: first_month,
        indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn txn(row: usize, customer: Option<&str>, date: Option<&str>) -> Transaction {
        Transaction {
            row,
            customer_id: customer.map(CustomerId::parse),
            invoice_time: date.map(|d| {
                NaiveDateTime::parse_from_str(&format!("{} 00:00:00", d), "%Y-%m-%d %H:%M:%S")
                    .unwrap()
            }),
            attributes: Default::default(),
        }
    }

    fn month(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    #[test]
    fn test_cohort_is_first_purchase_month() {
        let rows = vec![
            txn(0, Some("C1"), Some("2023-02-10")),
            txn(1, Some("C1"), Some("2023-01-05")),
            txn(2, Some("C2"), Some("2023-02-01")),
            txn(3, Some("C2"), Some("2023-02-20")),
        ];
        let a = assign_cohorts(&rows);

        assert_eq!(a.cohort_of(&CustomerId::parse("C1")), Some(month("2023-01")));
        assert_eq!(a.cohort_of(&CustomerId::parse("C2")), Some(month("2023-02")));
        assert_eq!(a.index_of(0), Some(2));
        assert_eq!(a.index_of(1), Some(1));
        assert_eq!(a.index_of(2), Some(1));
        assert_eq!(a.index_of(3), Some(1));
    }

    #[test]
    fn test_earliest_transaction_has_index_one() {
        let rows = vec![
            txn(0, Some("A"), Some("2022-06-30")),
            txn(1, Some("A"), Some("2021-03-01")),
            txn(2, Some("B"), Some("2024-01-01")),
            txn(3, Some("A"), Some("2021-03-31")),
        ];
        let a = assign_cohorts(&rows);

        assert_eq!(a.index_of(1), Some(1));
        assert_eq!(a.index_of(3), Some(1));
        assert_eq!(a.index_of(2), Some(1));
        assert_eq!(a.index_of(0), Some(16));
    }

    #[test]
    fn test_year_boundary() {
        let rows = vec![
            txn(0, Some("C"), Some("2023-12-15")),
            txn(1, Some("C"), Some("2024-02-01")),
        ];
        let a = assign_cohorts(&rows);

        assert_eq!(a.index_of(0), Some(1));
        assert_eq!(a.index_of(1), Some(3));
    }

    #[test]
    fn test_single_transaction_customer() {
        let a = assign_cohorts(&[txn(7, Some("solo"), Some("2020-05-05"))]);

        assert_eq!(a.customer_count(), 1);
        assert_eq!(a.indices().len(), 1);
        assert_eq!(a.index_of(7), Some(1));
    }

    #[test]
    fn test_incomplete_rows_ignored() {
        let rows = vec![
            txn(0, None, Some("2023-01-01")),
            txn(1, Some("X"), None),
            txn(2, Some("Y"), Some("2023-03-01")),
        ];
        let a = assign_cohorts(&rows);

        assert_eq!(a.customer_count(), 1);
        assert!(a.cohort_of(&CustomerId::parse("X")).is_none());
        assert!(a.index_of(0).is_none());
        assert!(a.index_of(1).is_none());
    }

    #[test]
    fn test_cohort_keys_sorted() {
        let rows = vec![
            txn(0, Some("a"), Some("2024-01-01")),
            txn(1, Some("b"), Some("2023-11-01")),
            txn(2, Some("c"), Some("2024-01-20")),
        ];
        let keys: Vec<_> = assign_cohorts(&rows).cohort_keys().into_iter().collect();
        assert_eq!(keys, vec![month("2023-11"), month("2024-01")]);
    }

    #[test]
    fn test_unbounded_index_range() {
        let rows = vec![
            txn(0, Some("old"), Some("1990-01-01")),
            txn(1, Some("old"), Some("2024-12-01")),
        ];
        let a = assign_cohorts(&rows);
        assert_eq!(a.index_of(1), Some(420));
    }
}
