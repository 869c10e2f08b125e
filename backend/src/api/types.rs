//! REST API types for frontend integration.
//!
//! Matrices are pivoted into dense tables here so the client can draw a
//! heatmap without reshaping: one row per cohort, one column per cohort
//! index from 1 to the largest index seen. Absent cells are `null`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

use crate::models::{CohortIndex, MissingValuePolicy, YearMonth};
use crate::schema::{ColumnRoles, DatasetProfile};
use crate::transform::aggregator::CohortMatrix;
use crate::transform::normalizer::NormalizationReport;
use crate::transform::pipeline::AnalysisResult;
use crate::transform::retention::{RetentionCell, RetentionMatrix};

/// Response sent to frontend after CSV upload and analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready", "warning", "error"
    pub status: String,

    /// Distinct customers per cohort and index
    pub cohorts: CohortTable,

    /// Share of each cohort still purchasing at each index
    pub retention: RetentionTable,

    /// Metadata about the analysis
    pub metadata: ResponseMetadata,
}

/// Metadata about the analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub csv_info: CsvMetadata,
    pub profile: DatasetProfile,
    pub roles: ColumnRoles,
    pub policy: MissingValuePolicy,
    pub normalization: NormalizationReport,
    pub customer_count: usize,
    pub cohort_count: usize,
    /// Cohorts whose retention row could not be computed
    pub undefined_cohorts: Vec<YearMonth>,
}

/// CSV file metadata
///
/// `encoding` and `delimiter` are `null` for rows posted already parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: Option<String>,
    pub delimiter: Option<String>,
    pub row_count: usize,
    pub columns: Vec<String>,
}

// =============================================================================
// Pivot tables
// =============================================================================

/// Cohort counts pivoted to one row per cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortTable {
    pub columns: Vec<CohortIndex>,
    pub rows: Vec<CohortRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortRow {
    pub cohort: YearMonth,
    /// Customers in the cohort (the index-1 count, `None` when absent)
    pub size: Option<usize>,
    pub cells: Vec<Option<usize>>,
}

impl CohortTable {
    pub fn from_matrix(matrix: &CohortMatrix) -> Self {
        let columns = matrix.index_range();
        let rows = matrix
            .rows()
            .map(|(cohort, cells)| CohortRow {
                cohort,
                size: cells.get(&1).copied(),
                cells: columns.iter().map(|i| cells.get(i).copied()).collect(),
            })
            .collect();

        Self { columns, rows }
    }
}

/// Retention rates pivoted to one row per cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionTable {
    pub columns: Vec<CohortIndex>,
    pub rows: Vec<RetentionRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionRow {
    pub cohort: YearMonth,
    /// The cohort has no usable base; every present cell is undefined
    pub undefined: bool,
    /// Ratios in `[0, 1]`
    pub cells: Vec<Option<f64>>,
    /// Rounded labels such as `"43%"`
    pub labels: Vec<Option<String>>,
}

impl RetentionTable {
    pub fn from_matrix(matrix: &RetentionMatrix) -> Self {
        let max = matrix
            .rows()
            .filter_map(|(_, r)| r.keys().next_back().copied())
            .max();
        let columns: Vec<CohortIndex> = max.map(|m| (1..=m).collect()).unwrap_or_default();

        let rows = matrix
            .rows()
            .map(|(cohort, cells)| {
                let rates: Vec<Option<RetentionCell>> =
                    columns.iter().map(|i| cells.get(i).copied()).collect();
                RetentionRow {
                    cohort,
                    undefined: matrix.is_undefined(cohort),
                    cells: rates
                        .iter()
                        .map(|c| c.and_then(|c| c.rate()).map(|r| r.as_f64()))
                        .collect(),
                    labels: rates
                        .iter()
                        .map(|c| c.and_then(|c| c.rate()).map(|r| format!("{}%", r.percent())))
                        .collect(),
                }
            })
            .collect();

        Self { columns, rows }
    }
}

// =============================================================================
// Text rendering
// =============================================================================

const COHORT_WIDTH: usize = 9;
const CELL_WIDTH: usize = 6;

fn write_header(f: &mut fmt::Formatter<'_>, columns: &[CohortIndex], lead: &str) -> fmt::Result {
    write!(f, "{:<w$}", "cohort", w = COHORT_WIDTH)?;
    write!(f, "{:>w$}", lead, w = CELL_WIDTH)?;
    for c in columns {
        write!(f, "{:>w$}", c, w = CELL_WIDTH)?;
    }
    writeln!(f)
}

impl fmt::Display for CohortTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_header(f, &self.columns, "size")?;
        for row in &self.rows {
            write!(f, "{:<w$}", row.cohort.to_string(), w = COHORT_WIDTH)?;
            let size = row.size.map(|s| s.to_string()).unwrap_or_default();
            write!(f, "{:>w$}", size, w = CELL_WIDTH)?;
            for cell in &row.cells {
                let text = cell.map(|c| c.to_string()).unwrap_or_default();
                write!(f, "{:>w$}", text, w = CELL_WIDTH)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for RetentionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_header(f, &self.columns, "")?;
        for row in &self.rows {
            write!(f, "{:<w$}", row.cohort.to_string(), w = COHORT_WIDTH)?;
            write!(f, "{:>w$}", "", w = CELL_WIDTH)?;
            if row.undefined {
                writeln!(f, "{:>w$}", "n/a", w = CELL_WIDTH)?;
                continue;
            }
            for label in &row.labels {
                write!(f, "{:>w$}", label.as_deref().unwrap_or(""), w = CELL_WIDTH)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// =============================================================================
// Conversions
// =============================================================================

/// Convert an AnalysisResult to an AnalysisResponse
impl From<AnalysisResult> for AnalysisResponse {
    fn from(result: AnalysisResult) -> Self {
        let analysis = &result.analysis;
        let undefined_cohorts = analysis.retention.undefined_cohorts();
        let clean = undefined_cohorts.is_empty() && result.normalization.incomplete_rows == 0;

        AnalysisResponse {
            job_id: Uuid::new_v4().to_string(),
            status: if clean { "ready" } else { "warning" }.to_string(),
            cohorts: CohortTable::from_matrix(&analysis.cohorts),
            retention: RetentionTable::from_matrix(&analysis.retention),
            metadata: ResponseMetadata {
                customer_count: analysis.assignment.customer_count(),
                cohort_count: analysis.cohorts.cohort_keys().len(),
                undefined_cohorts,
                csv_info: CsvMetadata {
                    encoding: result.csv_info.encoding,
                    delimiter: result.csv_info.delimiter.map(String::from),
                    row_count: result.csv_info.row_count,
                    columns: result.csv_info.headers,
                },
                profile: result.profile,
                roles: result.roles,
                policy: result.policy,
                normalization: result.normalization,
            },
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "cohorts": { "columns": [], "rows": [] },
        "retention": { "columns": [], "rows": [] },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::retention::compute_retention;

    fn month(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn matrix() -> CohortMatrix {
        CohortMatrix::from_cells([
            ((month("2023-01"), 1), 4),
            ((month("2023-01"), 3), 1),
            ((month("2023-02"), 1), 3),
            ((month("2023-02"), 2), 2),
        ])
    }

    #[test]
    fn test_cohort_table_is_dense() {
        let table = CohortTable::from_matrix(&matrix());

        assert_eq!(table.columns, vec![1, 2, 3]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cohort, month("2023-01"));
        assert_eq!(table.rows[0].size, Some(4));
        assert_eq!(table.rows[0].cells, vec![Some(4), None, Some(1)]);
        assert_eq!(table.rows[1].cells, vec![Some(3), Some(2), None]);
    }

    #[test]
    fn test_retention_table_labels() {
        let table = RetentionTable::from_matrix(&compute_retention(&matrix()));

        assert_eq!(table.rows[0].cells, vec![Some(1.0), None, Some(0.25)]);
        assert_eq!(
            table.rows[1].labels,
            vec![Some("100%".to_string()), Some("67%".to_string()), None]
        );
        assert!(!table.rows[0].undefined);
    }

    #[test]
    fn test_undefined_row_flagged() {
        let m = CohortMatrix::from_cells([((month("2023-05"), 2), 3)]);
        let table = RetentionTable::from_matrix(&compute_retention(&m));

        assert!(table.rows[0].undefined);
        assert_eq!(table.rows[0].cells, vec![None, None]);
        assert!(table.to_string().contains("n/a"));
    }

    #[test]
    fn test_cohort_size_absent_without_base() {
        let m = CohortMatrix::from_cells([((month("2023-05"), 2), 3)]);
        let table = CohortTable::from_matrix(&m);

        assert_eq!(table.rows[0].size, None);
        assert_eq!(table.rows[0].cells, vec![None, Some(3)]);

        let json = serde_json::to_value(&table).unwrap();
        assert!(json["rows"][0]["size"].is_null());

        let line = table.to_string().lines().nth(1).unwrap().to_string();
        assert_eq!(line.split_whitespace().collect::<Vec<_>>(), vec!["2023-05", "3"]);
    }

    #[test]
    fn test_table_json_shape() {
        let json = serde_json::to_value(CohortTable::from_matrix(&matrix())).unwrap();

        assert_eq!(json["columns"][2], 3);
        assert_eq!(json["rows"][0]["cohort"], "2023-01");
        assert!(json["rows"][0]["cells"][1].is_null());
    }

    #[test]
    fn test_text_rendering() {
        let text = CohortTable::from_matrix(&matrix()).to_string();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("cohort"));
        assert!(lines[1].starts_with("2023-01"));
    }

    #[test]
    fn test_error_response() {
        let resp = error_response("No file provided");
        assert_eq!(resp["status"], "error");
        assert_eq!(resp["error"], "No file provided");
        assert!(resp["cohorts"]["rows"].as_array().unwrap().is_empty());
    }
}
