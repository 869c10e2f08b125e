//! Retention rates from the cohort matrix.
//!
//! Every cell of a cohort row is divided by that row's index-1 count. Rates
//! are kept as exact `retained / base` pairs; converting to a float or a
//! percentage is left to the caller.
//!
//! A row whose base is absent or zero cannot be divided. Its cells become
//! [`RetentionCell::Undefined`], which is distinct from a 0% rate.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use super::aggregator::CohortMatrix;
use crate::models::{CohortIndex, YearMonth};

/// An exact retention ratio with a non-zero denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionRate {
    retained: usize,
    base: usize,
}

impl RetentionRate {
    /// `None` when `base` is zero.
    pub fn new(retained: usize, base: usize) -> Option<Self> {
        (base > 0).then_some(Self { retained, base })
    }

    pub fn retained(&self) -> usize {
        self.retained
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn as_f64(&self) -> f64 {
        self.retained as f64 / self.base as f64
    }

    /// Whole-number percentage, rounded half away from zero.
    ///
    /// Computed on the exact fraction so halves such as 57/200 round up.
    pub fn percent(&self) -> u64 {
        let retained = self.retained as u128;
        let base = self.base as u128;
        ((retained * 200 + base) / (2 * base)) as u64
    }
}

/// One cell of a retention row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionCell {
    /// The cohort's base count is absent or zero.
    Undefined,
    Rate(RetentionRate),
}

impl RetentionCell {
    pub fn rate(&self) -> Option<RetentionRate> {
        match self {
            RetentionCell::Rate(r) => Some(*r),
            RetentionCell::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, RetentionCell::Undefined)
    }
}

/// Undefined cells serialize as `null`, rates as floats.
impl Serialize for RetentionCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RetentionCell::Undefined => serializer.serialize_none(),
            RetentionCell::Rate(r) => serializer.serialize_f64(r.as_f64()),
        }
    }
}

/// Sparse `(cohort, index) → retention` matrix, with the same shape as the
/// [`CohortMatrix`] it was computed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RetentionMatrix {
    rows: BTreeMap<YearMonth, BTreeMap<CohortIndex, RetentionCell>>,
}

impl RetentionMatrix {
    pub fn get(&self, cohort: YearMonth, index: CohortIndex) -> Option<RetentionCell> {
        self.rows.get(&cohort)?.get(&index).copied()
    }

    /// Ratio as a float; `None` for absent and undefined cells alike.
    pub fn ratio(&self, cohort: YearMonth, index: CohortIndex) -> Option<f64> {
        self.get(cohort, index)?.rate().map(|r| r.as_f64())
    }

    pub fn row(&self, cohort: YearMonth) -> Option<&BTreeMap<CohortIndex, RetentionCell>> {
        self.rows.get(&cohort)
    }

    pub fn rows(&self) -> impl Iterator<Item = (YearMonth, &BTreeMap<CohortIndex, RetentionCell>)> {
        self.rows.iter().map(|(k, v)| (*k, v))
    }

    /// Whether a cohort row could not be computed.
    pub fn is_undefined(&self, cohort: YearMonth) -> bool {
        self.rows
            .get(&cohort)
            .is_some_and(|r| r.values().all(RetentionCell::is_undefined))
    }

    /// Cohorts whose rows are undefined, in chronological order.
    pub fn undefined_cohorts(&self) -> Vec<YearMonth> {
        self.rows
            .keys()
            .copied()
            .filter(|k| self.is_undefined(*k))
            .collect()
    }

    /// Cohort keys in chronological order.
    pub fn cohort_keys(&self) -> Vec<YearMonth> {
        self.rows.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Divide every cell by its cohort's index-1 count.
pub fn compute_retention(matrix: &CohortMatrix) -> RetentionMatrix {
    let rows = matrix
        .rows()
        .map(|(cohort, cells)| {
            let base = cells.get(&1).copied().unwrap_or(0);
            let row = cells
                .iter()
                .map(|(index, count)| {
                    let cell = RetentionRate::new(*count, base)
                        .map(RetentionCell::Rate)
                        .unwrap_or(RetentionCell::Undefined);
                    (*index, cell)
                })
                .collect();
            (cohort, row)
        })
        .collect();

    RetentionMatrix { rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    #[test]
    fn test_reference_scenario() {
        let matrix = CohortMatrix::from_cells([
            ((month("2023-01"), 1), 1),
            ((month("2023-01"), 2), 1),
            ((month("2023-02"), 1), 1),
        ]);
        let retention = compute_retention(&matrix);

        assert_eq!(retention.len(), 3);
        assert_eq!(retention.ratio(month("2023-01"), 1), Some(1.0));
        assert_eq!(retention.ratio(month("2023-01"), 2), Some(1.0));
        assert_eq!(retention.ratio(month("2023-02"), 1), Some(1.0));
        assert_eq!(retention.get(month("2023-02"), 2), None);
    }

    #[test]
    fn test_index_one_is_exactly_one() {
        let matrix = CohortMatrix::from_cells([
            ((month("2011-01"), 1), 7),
            ((month("2011-01"), 2), 3),
            ((month("2011-02"), 1), 13),
        ]);
        let retention = compute_retention(&matrix);

        for cohort in retention.cohort_keys() {
            assert_eq!(retention.ratio(cohort, 1), Some(1.0));
        }
    }

    #[test]
    fn test_exact_ratio_kept() {
        let matrix = CohortMatrix::from_cells([((month("2011-01"), 1), 3), ((month("2011-01"), 2), 1)]);
        let cell = compute_retention(&matrix).get(month("2011-01"), 2).unwrap();
        let rate = cell.rate().unwrap();

        assert_eq!((rate.retained(), rate.base()), (1, 3));
        assert_eq!(rate.percent(), 33);
    }

    #[test]
    fn test_missing_base_row_is_undefined() {
        let matrix = CohortMatrix::from_cells([
            ((month("2023-03"), 2), 4),
            ((month("2023-03"), 5), 1),
            ((month("2023-04"), 1), 2),
        ]);
        let retention = compute_retention(&matrix);

        assert_eq!(retention.get(month("2023-03"), 2), Some(RetentionCell::Undefined));
        assert_eq!(retention.get(month("2023-03"), 5), Some(RetentionCell::Undefined));
        assert_eq!(retention.get(month("2023-03"), 3), None);
        assert!(retention.is_undefined(month("2023-03")));
        assert!(!retention.is_undefined(month("2023-04")));
        assert_eq!(retention.undefined_cohorts(), vec![month("2023-03")]);
    }

    #[test]
    fn test_zero_base_row_is_undefined() {
        let matrix = CohortMatrix::from_cells([((month("2023-03"), 1), 0), ((month("2023-03"), 2), 0)]);
        let retention = compute_retention(&matrix);

        assert_eq!(retention.get(month("2023-03"), 1), Some(RetentionCell::Undefined));
        assert_eq!(retention.ratio(month("2023-03"), 2), None);
    }

    #[test]
    fn test_zero_retention_is_not_undefined() {
        let matrix = CohortMatrix::from_cells([((month("2023-03"), 1), 5), ((month("2023-03"), 2), 0)]);
        let cell = compute_retention(&matrix).get(month("2023-03"), 2).unwrap();

        assert!(!cell.is_undefined());
        assert_eq!(cell.rate().unwrap().as_f64(), 0.0);
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(RetentionRate::new(1, 8).unwrap().percent(), 13);
        assert_eq!(RetentionRate::new(2, 3).unwrap().percent(), 67);
        assert_eq!(RetentionRate::new(1, 1).unwrap().percent(), 100);
        assert_eq!(RetentionRate::new(57, 200).unwrap().percent(), 29);
        assert_eq!(RetentionRate::new(29, 200).unwrap().percent(), 15);
        assert_eq!(RetentionRate::new(1, 200).unwrap().percent(), 1);
        assert_eq!(RetentionRate::new(0, 7).unwrap().percent(), 0);
        assert!(RetentionRate::new(1, 0).is_none());
    }

    #[test]
    fn test_serialization() {
        let matrix = CohortMatrix::from_cells([
            ((month("2023-01"), 1), 4),
            ((month("2023-01"), 2), 1),
            ((month("2023-02"), 2), 1),
        ]);
        let json = serde_json::to_value(compute_retention(&matrix)).unwrap();

        assert_eq!(json["2023-01"]["1"], 1.0);
        assert_eq!(json["2023-01"]["2"], 0.25);
        assert!(json["2023-02"]["2"].is_null());
    }
}
