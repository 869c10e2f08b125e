//! Domain models for the retention analysis pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`CustomerId`] - Canonical customer identifier (with the `-1` sentinel)
//! - [`YearMonth`] - Month-granularity cohort key
//! - [`CohortIndex`] - 1-based month offset from a cohort key
//! - [`MissingValuePolicy`] - How rows with missing fields are handled
//! - [`AttrValue`] - Typed value of a passthrough column
//! - [`Transaction`] - A normalized transaction row

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Identifier given to rows whose customer id was missing under
/// [`MissingValuePolicy::FillDefaults`].
pub const UNKNOWN_CUSTOMER_ID: &str = "-1";

/// Value given to missing free-text fields under
/// [`MissingValuePolicy::FillDefaults`].
pub const DEFAULT_DESCRIPTION: &str = "No Description";

// =============================================================================
// Customer Identification
// =============================================================================

/// Canonical customer identifier.
///
/// Identifiers are opaque strings. Integral numbers written as floats
/// (`17850.0`, as spreadsheets export them) are canonicalised to their
/// integer form so both spellings name the same customer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    /// Build a canonical id from raw cell text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 && trimmed.contains('.') {
                return Self((n as i64).to_string());
            }
        }
        Self(trimmed.to_string())
    }

    /// The sentinel id shared by all anonymous transactions.
    pub fn unknown() -> Self {
        Self(UNKNOWN_CUSTOMER_ID.to_string())
    }

    /// Whether this is the anonymous sentinel.
    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_CUSTOMER_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Year-Month (cohort key)
// =============================================================================

/// A calendar month, ordered chronologically.
///
/// Serialized as `"YYYY-MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

/// 1-based month offset of a transaction from its customer's cohort month.
pub type CohortIndex = u32;

impl YearMonth {
    /// Build a year-month; `None` if `month` is not in `1..=12`.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Truncate a timestamp to its month.
    pub fn of(time: &NaiveDateTime) -> Self {
        Self {
            year: time.year(),
            month: time.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Months since year 0, so that differences cross year boundaries correctly.
    fn linear(&self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    /// Cohort index of `later` relative to this cohort month.
    ///
    /// The cohort month itself is index 1. Returns `None` when `later`
    /// precedes this month.
    pub fn cohort_index(&self, later: YearMonth) -> Option<CohortIndex> {
        let offset = later.linear() - self.linear();
        if offset < 0 {
            return None;
        }
        CohortIndex::try_from(offset + 1).ok()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .rsplit_once('-')
            .ok_or_else(|| format!("Invalid year-month '{}': expected YYYY-MM", s))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("Invalid year in '{}'", s))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("Invalid month in '{}'", s))?;
        YearMonth::new(year, month).ok_or_else(|| format!("Month out of range in '{}'", s))
    }
}

impl From<YearMonth> for String {
    fn from(ym: YearMonth) -> Self {
        ym.to_string()
    }
}

impl TryFrom<String> for YearMonth {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// =============================================================================
// Missing Value Policy
// =============================================================================

/// How rows with missing values are treated before cohort computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Drop rows missing a customer id or an invoice date.
    #[default]
    DropIncomplete,
    /// Fill missing customer ids with `-1` and missing text with `"No Description"`.
    FillDefaults,
    /// Keep every row; incomplete rows are left out of aggregation.
    PassThrough,
}

impl MissingValuePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DropIncomplete => "drop_incomplete",
            Self::FillDefaults => "fill_defaults",
            Self::PassThrough => "pass_through",
        }
    }
}

impl FromStr for MissingValuePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "drop" | "drop_incomplete" | "dropna" => Ok(Self::DropIncomplete),
            "fill" | "fill_defaults" | "fillna" => Ok(Self::FillDefaults),
            "none" | "pass_through" | "passthrough" | "keep" => Ok(Self::PassThrough),
            _ => Err(format!(
                "Unknown missing value policy '{}' (expected drop, fill or none)",
                s
            )),
        }
    }
}

// =============================================================================
// Attribute Values
// =============================================================================

/// Typed value of a passthrough column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Integer(i64),
    Float(f64),
    Timestamp(NaiveDateTime),
    Text(String),
    Missing,
}

impl AttrValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, AttrValue::Missing)
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A normalized transaction row.
///
/// `customer_id` and `invoice_time` are optional because
/// [`MissingValuePolicy::PassThrough`] keeps rows that lack them; such rows
/// never reach aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Position of the row in the source dataset (0-based, header excluded).
    pub row: usize,
    pub customer_id: Option<CustomerId>,
    pub invoice_time: Option<NaiveDateTime>,
    /// Every other column, typed by schema detection.
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Transaction {
    /// Whether both fields needed for cohort computation are present.
    pub fn is_complete(&self) -> bool {
        self.customer_id.is_some() && self.invoice_time.is_some()
    }

    /// Customer and timestamp, if the row is complete.
    pub fn key(&self) -> Option<(&CustomerId, NaiveDateTime)> {
        match (&self.customer_id, self.invoice_time) {
            (Some(id), Some(time)) => Some((id, time)),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn month(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    #[test]
    fn test_customer_id_float_canonicalised() {
        assert_eq!(CustomerId::parse("17850.0"), CustomerId::parse("17850"));
        assert_eq!(CustomerId::parse(" 17850 ").as_str(), "17850");
        assert_eq!(CustomerId::parse("C-001").as_str(), "C-001");
        assert_eq!(CustomerId::parse("12.5").as_str(), "12.5");
    }

    #[test]
    fn test_unknown_customer() {
        assert!(CustomerId::unknown().is_unknown());
        assert!(CustomerId::parse("-1.0").is_unknown());
        assert!(!CustomerId::parse("1").is_unknown());
    }

    #[test]
    fn test_year_month_display_and_parse() {
        let ym = YearMonth::new(2023, 1).unwrap();
        assert_eq!(ym.to_string(), "2023-01");
        assert_eq!(month("2023-01"), ym);
        assert!("2023-13".parse::<YearMonth>().is_err());
        assert!("202301".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_year_month_ordering() {
        assert!(month("2022-12") < month("2023-01"));
        assert!(month("2023-02") < month("2023-11"));
    }

    #[test]
    fn test_year_month_of_timestamp() {
        let t = NaiveDate::from_ymd_opt(2023, 2, 28)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(YearMonth::of(&t), month("2023-02"));
    }

    #[test]
    fn test_cohort_index_same_month_is_one() {
        assert_eq!(month("2023-05").cohort_index(month("2023-05")), Some(1));
    }

    #[test]
    fn test_cohort_index_crosses_year_boundary() {
        assert_eq!(month("2023-12").cohort_index(month("2024-01")), Some(2));
        assert_eq!(month("2023-12").cohort_index(month("2024-02")), Some(3));
        assert_eq!(month("2020-01").cohort_index(month("2024-01")), Some(49));
    }

    #[test]
    fn test_cohort_index_before_cohort() {
        assert_eq!(month("2024-01").cohort_index(month("2023-12")), None);
    }

    #[test]
    fn test_year_month_serializes_as_string() {
        let json = serde_json::to_string(&month("2011-03")).unwrap();
        assert_eq!(json, "\"2011-03\"");
        let back: YearMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, month("2011-03"));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "drop".parse::<MissingValuePolicy>(),
            Ok(MissingValuePolicy::DropIncomplete)
        );
        assert_eq!(
            "Fill-Defaults".parse::<MissingValuePolicy>(),
            Ok(MissingValuePolicy::FillDefaults)
        );
        assert_eq!(
            "none".parse::<MissingValuePolicy>(),
            Ok(MissingValuePolicy::PassThrough)
        );
        assert!("interpolate".parse::<MissingValuePolicy>().is_err());
    }

    #[test]
    fn test_transaction_completeness() {
        let t = Transaction {
            row: 0,
            customer_id: Some(CustomerId::parse("1")),
            invoice_time: None,
            attributes: BTreeMap::new(),
        };
        assert!(!t.is_complete());
        assert!(t.key().is_none());
    }
}
