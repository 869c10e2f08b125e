//! Explicit schema detection for uploaded datasets.
//!
//! Raw rows arrive as JSON objects of strings. This module decides, per
//! column, what kind of values it holds, which columns carry the customer id
//! and the invoice date, and how timestamps are parsed.
//!
//! # Type detection
//!
//! Only non-missing cells are considered. Tie-break order is
//! `Integer` ⊂ `Float` ⊂ `DateTime` ⊂ `Text`: a column is the narrowest type
//! that every one of its values parses as. A column with no values at all is
//! `Empty`.
//!
//! # Role resolution
//!
//! Header names are compared lowercase with non-alphanumerics removed, so
//! `Customer ID`, `customer_id` and `CustomerID` all match `customerid`.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SchemaError, SchemaResult};
use crate::parser::{is_missing_marker, ParseResult};

/// Header names (normalized) accepted as the customer column, by priority.
const CUSTOMER_CANDIDATES: &[&str] = &[
    "customerid",
    "customer",
    "customerno",
    "customernumber",
    "clientid",
    "userid",
    "memberid",
];

/// Header names (normalized) accepted as the invoice date column, by priority.
const DATE_CANDIDATES: &[&str] = &[
    "invoicedate",
    "orderdate",
    "transactiondate",
    "purchasedate",
    "invoicetime",
    "date",
    "timestamp",
];

/// Date-time formats tried in order when no explicit format is configured.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Date-only formats tried after [`DATETIME_FORMATS`].
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d.%m.%Y"];

/// Number of rows kept in a [`DatasetProfile`] preview.
const PREVIEW_ROWS: usize = 5;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]").expect("static regex"));

// =============================================================================
// Cell access
// =============================================================================

/// Text of a raw cell, or `None` if the cell is missing.
///
/// Records built by the CSV parser only hold strings and nulls, but records
/// handed in directly as JSON may carry numbers or booleans.
pub fn cell_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if is_missing_marker(&text) {
        None
    } else {
        Some(text.trim().to_string())
    }
}

/// Lowercase a header and strip everything but letters and digits.
pub fn normalize_header(header: &str) -> String {
    NON_ALNUM.replace_all(&header.to_lowercase(), "").into_owned()
}

// =============================================================================
// Timestamps
// =============================================================================

/// Parse a timestamp, either with an explicit `chrono` format or by trying
/// the built-in format list.
///
/// RFC 3339 values keep their written wall-clock time, so the month a
/// transaction falls in is the month shown in the file.
pub fn parse_timestamp(raw: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Some(fmt) = format {
        return NaiveDateTime::parse_from_str(raw, fmt)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(raw, fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            });
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// =============================================================================
// Column types
// =============================================================================

/// Detected type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    DateTime,
    Text,
    /// Every cell is missing.
    Empty,
}

impl ColumnType {
    /// Whether the column holds numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    /// Whether the column counts as free text for default filling.
    pub fn is_text(&self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::Empty)
    }
}

/// Classify a column from its non-missing values.
pub fn detect_column_type<'a, I>(values: I, date_format: Option<&str>) -> ColumnType
where
    I: IntoIterator<Item = &'a str>,
{
    let values: Vec<&str> = values.into_iter().collect();

    if values.is_empty() {
        ColumnType::Empty
    } else if values.iter().all(|v| v.parse::<i64>().is_ok()) {
        ColumnType::Integer
    } else if values.iter().all(|v| v.parse::<f64>().is_ok()) {
        ColumnType::Float
    } else if values
        .iter()
        .all(|v| parse_timestamp(v, date_format).is_some())
    {
        ColumnType::DateTime
    } else {
        ColumnType::Text
    }
}

/// Per-column facts gathered from a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub name: String,
    pub column_type: ColumnType,
    /// Number of missing cells.
    pub missing: usize,
}

/// Detect the type and missing count of every column, in header order.
pub fn detect_schema(
    records: &[Value],
    headers: &[String],
    date_format: Option<&str>,
) -> Vec<ColumnProfile> {
    headers
        .iter()
        .map(|header| {
            let cells: Vec<Option<String>> = records
                .iter()
                .map(|r| cell_text(r.get(header)))
                .collect();
            let missing = cells.iter().filter(|c| c.is_none()).count();
            let column_type =
                detect_column_type(cells.iter().flatten().map(String::as_str), date_format);

            ColumnProfile {
                name: header.clone(),
                column_type,
                missing,
            }
        })
        .collect()
}

// =============================================================================
// Column roles
// =============================================================================

/// Columns carrying the fields cohort analysis depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRoles {
    pub customer: String,
    pub invoice_date: String,
}

/// Find the customer and invoice date columns.
///
/// Explicit overrides must name an existing header. Otherwise the first
/// candidate name (by priority) that matches a header wins.
pub fn resolve_roles(
    headers: &[String],
    customer_override: Option<&str>,
    date_override: Option<&str>,
) -> SchemaResult<ColumnRoles> {
    let customer = resolve_role(headers, customer_override, CUSTOMER_CANDIDATES, "customer id")?;
    let invoice_date = resolve_role(headers, date_override, DATE_CANDIDATES, "invoice date")?;

    Ok(ColumnRoles {
        customer,
        invoice_date,
    })
}

fn resolve_role(
    headers: &[String],
    explicit: Option<&str>,
    candidates: &[&str],
    role: &str,
) -> SchemaResult<String> {
    if let Some(name) = explicit {
        return headers
            .iter()
            .find(|h| h.as_str() == name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownColumn(name.to_string()));
    }

    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();

    candidates
        .iter()
        .find_map(|candidate| {
            normalized
                .iter()
                .position(|n| n == candidate)
                .map(|i| headers[i].clone())
        })
        .ok_or_else(|| SchemaError::MissingColumn {
            role: role.to_string(),
            available: headers.join(", "),
        })
}

// =============================================================================
// Dataset profile
// =============================================================================

/// Overview of an uploaded dataset: shape, column types, missing values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetProfile {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<ColumnProfile>,
    /// First rows of the dataset as parsed.
    pub preview: Vec<Value>,
}

impl DatasetProfile {
    /// Total number of missing cells.
    pub fn total_missing(&self) -> usize {
        self.columns.iter().map(|c| c.missing).sum()
    }

    /// Columns detected as numeric.
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.column_type.is_numeric())
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Profile a parsed dataset.
pub fn profile(parsed: &ParseResult, date_format: Option<&str>) -> DatasetProfile {
    profile_rows(&parsed.records, &parsed.headers, date_format)
}

/// Profile rows that did not necessarily come from a CSV file.
pub fn profile_rows(
    records: &[Value],
    headers: &[String],
    date_format: Option<&str>,
) -> DatasetProfile {
    DatasetProfile {
        row_count: records.len(),
        column_count: headers.len(),
        columns: detect_schema(records, headers, date_format),
        preview: records.iter().take(PREVIEW_ROWS).cloned().collect(),
    }
}

// =============================================================================
// Table schema
// =============================================================================

/// Everything row normalization needs to know about the columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub roles: ColumnRoles,
    pub columns: Vec<ColumnProfile>,
    /// Explicit `chrono` format for the invoice date, if any.
    pub date_format: Option<String>,
}

impl TableSchema {
    /// Detect column types and resolve roles in one go.
    pub fn infer(
        records: &[Value],
        headers: &[String],
        customer_override: Option<&str>,
        date_override: Option<&str>,
        date_format: Option<&str>,
    ) -> SchemaResult<Self> {
        let roles = resolve_roles(headers, customer_override, date_override)?;
        Ok(Self {
            roles,
            columns: detect_schema(records, headers, date_format),
            date_format: date_format.map(String::from),
        })
    }

    /// Detected type of a column; unknown columns are treated as text.
    pub fn column_type(&self, name: &str) -> ColumnType {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.column_type)
            .unwrap_or(ColumnType::Text)
    }

    /// Whether the column is one of the two role columns.
    pub fn is_role_column(&self, name: &str) -> bool {
        name == self.roles.customer || name == self.roles.invoice_date
    }
}
