//! High-level pipeline API for CSV to cohort retention analysis.
//!
//! This module provides easy-to-use functions that combine all steps:
//! parsing, schema detection, normalization, cohort assignment, aggregation
//! and retention.
//!
//! # Example
//!
//! ```rust,ignore
//! use retention::{analyze_file, AnalysisOptions, MissingValuePolicy};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = AnalysisOptions {
//!         policy: MissingValuePolicy::FillDefaults,
//!         ..Default::default()
//!     };
//!     let result = analyze_file(Path::new("online_retail.csv"), &options)?;
//!
//!     println!("{} cohorts", result.analysis.cohorts.cohort_keys().len());
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use super::aggregator::{aggregate, CohortMatrix};
use super::cohort::{assign_cohorts, CohortAssignment};
use super::normalizer::{normalize, NormalizationReport};
use super::retention::{compute_retention, RetentionMatrix};
use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::error::{CohortError, CohortResult, PipelineResult};
use crate::models::{MissingValuePolicy, Transaction};
use crate::parser::parse_bytes;
use crate::schema::{profile_rows, resolve_roles, ColumnRoles, DatasetProfile, TableSchema};

/// Options for the analysis pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisOptions {
    /// How rows with missing values are handled
    pub policy: MissingValuePolicy,

    /// Customer id column (auto-detected if not specified)
    pub customer_column: Option<String>,

    /// Invoice date column (auto-detected if not specified)
    pub date_column: Option<String>,

    /// `chrono` format of the invoice date (built-in formats if not specified)
    pub date_format: Option<String>,

    /// CSV delimiter (auto-detected if not specified)
    pub delimiter: Option<char>,
}

/// Source file information
///
/// `encoding` and `delimiter` are `None` when the rows were handed in
/// already parsed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvInfo {
    pub encoding: Option<String>,
    pub delimiter: Option<char>,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Output of the core computation: cohorts, counts and rates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortAnalysis {
    pub assignment: CohortAssignment,
    pub cohorts: CohortMatrix,
    pub retention: RetentionMatrix,
}

/// Result of a complete analysis pipeline
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// CSV parsing metadata
    pub csv_info: CsvInfo,

    /// Shape, column types and missing values of the upload
    pub profile: DatasetProfile,

    /// Columns used as customer id and invoice date
    pub roles: ColumnRoles,

    /// Policy applied to missing values
    pub policy: MissingValuePolicy,

    /// What normalization kept, dropped and filled
    pub normalization: NormalizationReport,

    /// Cohorts, cohort matrix and retention matrix
    pub analysis: CohortAnalysis,
}

/// Run cohort assignment, aggregation and retention over normalized rows.
///
/// Fails with [`CohortError::EmptyDataset`] when no row has both a customer
/// id and an invoice date. Never logs.
pub fn analyze_transactions(transactions: &[Transaction]) -> CohortResult<CohortAnalysis> {
    if !transactions.iter().any(Transaction::is_complete) {
        return Err(CohortError::EmptyDataset);
    }

    let assignment = assign_cohorts(transactions);
    let cohorts = aggregate(transactions, &assignment)?;
    let retention = compute_retention(&cohorts);

    Ok(CohortAnalysis {
        assignment,
        cohorts,
        retention,
    })
}

/// Analyze a CSV file.
///
/// This is the main entry point for the pipeline. It:
/// 1. Parses the CSV with auto-detection
/// 2. Profiles the columns and resolves the customer/date columns
/// 3. Normalizes rows under the missing-value policy
/// 4. Assigns cohorts and cohort indices
/// 5. Builds the cohort and retention matrices
pub fn analyze_file(path: &Path, options: &AnalysisOptions) -> PipelineResult<AnalysisResult> {
    let bytes = std::fs::read(path).map_err(crate::error::CsvError::from)?;
    analyze_bytes(&bytes, options)
}

/// Analyze CSV bytes.
///
/// Same as `analyze_file` but accepts raw bytes instead of a file path.
pub fn analyze_bytes(bytes: &[u8], options: &AnalysisOptions) -> PipelineResult<AnalysisResult> {
    log_info("📖 Reading CSV file...");
    log_info("Detecting encoding and separator...");
    let parse_result = parse_bytes(bytes, options.delimiter)?;
    log_success(format!("Detected encoding: {}", parse_result.encoding));
    log_success(format!(
        "Detected separator: '{}'",
        format_delimiter(parse_result.delimiter)
    ));
    log_success(format!("Read {} rows", parse_result.records.len()));

    let csv_info = CsvInfo {
        encoding: Some(parse_result.encoding),
        delimiter: Some(parse_result.delimiter),
        headers: parse_result.headers.clone(),
        row_count: parse_result.records.len(),
    };
    analyze_parsed(&parse_result.records, csv_info, options)
}

/// Analyze already-parsed rows.
///
/// Useful when the rows come from somewhere other than a CSV file.
pub fn analyze_records(
    records: Vec<Value>,
    headers: Vec<String>,
    options: &AnalysisOptions,
) -> PipelineResult<AnalysisResult> {
    let csv_info = CsvInfo {
        encoding: None,
        delimiter: None,
        row_count: records.len(),
        headers,
    };
    analyze_parsed(&records, csv_info, options)
}

/// Internal: analyze parsed rows
fn analyze_parsed(
    records: &[Value],
    csv_info: CsvInfo,
    options: &AnalysisOptions,
) -> PipelineResult<AnalysisResult> {
    if records.is_empty() {
        log_error("CSV file has no data rows");
        return Err(CohortError::EmptyDataset.into());
    }

    // Step 1: Profile
    let date_format = options.date_format.as_deref();
    let profile = profile_rows(records, &csv_info.headers, date_format);
    log_info(format!(
        "📋 Dataset has {} rows, {} columns:",
        profile.row_count, profile.column_count
    ));
    for (i, col) in profile.columns.iter().enumerate() {
        log_info_indent(
            format!(
                "[{:2}] {} ({:?}, {} missing)",
                i + 1,
                col.name,
                col.column_type,
                col.missing
            ),
            1,
        );
    }

    // Step 2: Resolve columns
    let schema = TableSchema {
        roles: resolve_roles(
            &csv_info.headers,
            options.customer_column.as_deref(),
            options.date_column.as_deref(),
        )
        .inspect_err(|e| log_error(e.to_string()))?,
        columns: profile.columns.clone(),
        date_format: options.date_format.clone(),
    };
    log_success(format!(
        "Customer column: '{}', date column: '{}'",
        schema.roles.customer, schema.roles.invoice_date
    ));

    // Step 3: Normalize
    log_info(format!(
        "🛠️  Handling missing values ({})...",
        options.policy.as_str()
    ));
    let normalized = normalize(records, &schema, options.policy)
        .inspect_err(|e| log_error(e.to_string()))?;
    print_normalization_report(&normalized.report);

    // Step 4-6: Cohorts, matrix, retention
    log_info("📦 Assigning cohorts...");
    let analysis = analyze_transactions(&normalized.transactions)
        .inspect_err(|e| log_error(e.to_string()))?;
    log_success(format!(
        "{} customers in {} cohorts",
        analysis.assignment.customer_count(),
        analysis.cohorts.cohort_keys().len()
    ));
    if let Some(max) = analysis.cohorts.max_index() {
        log_success(format!("Cohort indices span 1..={}", max));
    }

    let undefined = analysis.retention.undefined_cohorts();
    if !undefined.is_empty() {
        let names: Vec<String> = undefined.iter().map(|c| c.to_string()).collect();
        log_warning(format!(
            "Retention undefined for {} cohort(s): {}",
            undefined.len(),
            names.join(", ")
        ));
    }

    Ok(AnalysisResult {
        csv_info,
        profile,
        roles: schema.roles,
        policy: options.policy,
        normalization: normalized.report,
        analysis,
    })
}

/// Format delimiter for display
fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}

/// Print normalization counts
fn print_normalization_report(report: &NormalizationReport) {
    log_success(format!(
        "Kept {} of {} rows",
        report.kept_rows, report.input_rows
    ));
    if report.dropped_rows > 0 {
        log_warning(format!(
            "{} rows dropped (missing customer id or date)",
            report.dropped_rows
        ));
    }
    if report.filled_customer_ids > 0 {
        log_warning(format!(
            "{} missing customer ids set to -1",
            report.filled_customer_ids
        ));
    }
    if report.filled_text_fields > 0 {
        log_info(format!(
            "{} missing text fields set to \"No Description\"",
            report.filled_text_fields
        ));
    }
    if report.incomplete_rows > 0 {
        log_warning(format!(
            "{} rows kept but left out of cohorts (missing customer id or date)",
            report.incomplete_rows
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::models::YearMonth;

    const SCENARIO: &str = "CustomerID,InvoiceDate\nC1,2023-01-05\nC1,2023-02-10\nC2,2023-02-01\nC2,2023-02-20\n";

    fn month(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    #[test]
    fn test_default_options() {
        let opts = AnalysisOptions::default();
        assert_eq!(opts.policy, MissingValuePolicy::DropIncomplete);
        assert!(opts.customer_column.is_none());
        assert!(opts.delimiter.is_none());
    }

    #[test]
    fn test_options_from_json() {
        let opts: AnalysisOptions =
            serde_json::from_str(r#"{"policy": "fill_defaults", "dateColumn": "When"}"#).unwrap();
        assert_eq!(opts.policy, MissingValuePolicy::FillDefaults);
        assert_eq!(opts.date_column.as_deref(), Some("When"));
    }

    #[test]
    fn test_reference_scenario() {
        let result = analyze_bytes(SCENARIO.as_bytes(), &AnalysisOptions::default()).unwrap();
        let a = &result.analysis;
        assert_eq!(result.csv_info.delimiter, Some(','));
        assert_eq!(result.csv_info.encoding.as_deref(), Some("utf-8"));

        assert_eq!(a.cohorts.len(), 3);
        assert_eq!(a.cohorts.get(month("2023-01"), 1), Some(1));
        assert_eq!(a.cohorts.get(month("2023-01"), 2), Some(1));
        assert_eq!(a.cohorts.get(month("2023-02"), 1), Some(1));
        assert_eq!(a.retention.ratio(month("2023-01"), 1), Some(1.0));
        assert_eq!(a.retention.ratio(month("2023-01"), 2), Some(1.0));
        assert_eq!(a.retention.ratio(month("2023-02"), 1), Some(1.0));
        assert_eq!(result.roles.customer, "CustomerID");
    }

    #[test]
    fn test_idempotent() {
        let opts = AnalysisOptions::default();
        let first = analyze_bytes(SCENARIO.as_bytes(), &opts).unwrap();
        let second = analyze_bytes(SCENARIO.as_bytes(), &opts).unwrap();
        assert_eq!(first.analysis, second.analysis);
    }

    #[test]
    fn test_analyze_records() {
        let records = vec![
            serde_json::json!({"user_id": 1, "order_date": "2024-01-02"}),
            serde_json::json!({"user_id": 1, "order_date": "2024-03-02"}),
        ];
        let headers = vec!["user_id".to_string(), "order_date".to_string()];
        let result = analyze_records(records, headers, &AnalysisOptions::default()).unwrap();

        assert_eq!(result.analysis.cohorts.get(month("2024-01"), 3), Some(1));
        assert_eq!(result.csv_info.encoding, None);
        assert_eq!(result.csv_info.delimiter, None);
        assert_eq!(result.csv_info.row_count, 2);
    }

    #[test]
    fn test_empty_after_normalization() {
        let csv = "CustomerID,InvoiceDate\n,2023-01-01\n,2023-01-02\n";
        let err = analyze_bytes(csv.as_bytes(), &AnalysisOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Cohort(CohortError::EmptyDataset)));
    }

    #[test]
    fn test_pass_through_without_usable_rows_is_empty() {
        let opts = AnalysisOptions {
            policy: MissingValuePolicy::PassThrough,
            ..Default::default()
        };
        let csv = "CustomerID,InvoiceDate\n,2023-01-01\n";
        let err = analyze_bytes(csv.as_bytes(), &opts).unwrap_err();
        assert!(matches!(err, PipelineError::Cohort(CohortError::EmptyDataset)));
    }

    #[test]
    fn test_header_only_is_empty() {
        let err = analyze_bytes(b"CustomerID,InvoiceDate\n", &AnalysisOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Cohort(CohortError::EmptyDataset)));
    }

    #[test]
    fn test_fill_defaults_counts_anonymous_customer() {
        let csv = "CustomerID,InvoiceDate,Description\n\
                   ,2023-01-03,\n\
                   ,2023-02-03,MUG\n\
                   7,2023-01-10,LANTERN\n";
        let opts = AnalysisOptions {
            policy: MissingValuePolicy::FillDefaults,
            ..Default::default()
        };
        let result = analyze_bytes(csv.as_bytes(), &opts).unwrap();
        let a = &result.analysis;

        assert_eq!(result.normalization.filled_customer_ids, 2);
        assert_eq!(a.cohorts.get(month("2023-01"), 1), Some(2));
        assert_eq!(a.cohorts.get(month("2023-01"), 2), Some(1));
    }

    #[test]
    fn test_malformed_date_aborts() {
        let csv = "CustomerID,InvoiceDate\n1,2023-01-01\n2,31st of June\n";
        let err = analyze_bytes(csv.as_bytes(), &AnalysisOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Normalize(_)));
    }

    #[test]
    fn test_missing_column() {
        let csv = "Invoice,Amount\n1,2\n";
        let err = analyze_bytes(csv.as_bytes(), &AnalysisOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }
}
