//! Error types for the retention analysis pipeline.
//!
//! One error type per layer:
//!
//! - [`CsvError`] - CSV loading errors
//! - [`SchemaError`] - Column role resolution errors
//! - [`NormalizeError`] - Row normalization errors (malformed timestamps)
//! - [`CohortError`] - Cohort computation errors
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// CSV Loading Errors
// =============================================================================

/// Errors while reading and decoding a CSV file.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid CSV format.
    #[error("Invalid CSV format at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let line = err
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(0);
        CsvError::ParseError {
            line,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Errors while resolving which columns carry the required fields.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    /// No column could be matched to a required role.
    #[error("No {role} column found (columns: {available})")]
    MissingColumn { role: String, available: String },

    /// An explicit column override names a column that does not exist.
    #[error("Column '{0}' does not exist in the dataset")]
    UnknownColumn(String),
}

// =============================================================================
// Normalization Errors
// =============================================================================

/// Errors while coercing raw rows into transactions.
#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    /// A non-empty timestamp could not be parsed as a date.
    #[error("Row {row}, column '{column}': cannot parse '{value}' as a date")]
    InvalidTimestamp {
        row: usize,
        column: String,
        value: String,
    },
}

// =============================================================================
// Cohort Errors
// =============================================================================

/// Errors while assigning cohorts or aggregating the cohort matrix.
#[derive(Debug, Error, PartialEq)]
pub enum CohortError {
    /// No usable rows left after normalization.
    #[error("Dataset is empty: no rows with both a customer id and an invoice date")]
    EmptyDataset,

    /// A transaction is dated before its customer's cohort month.
    #[error("Row {row} for customer '{customer}' is dated {month}, before its cohort {cohort}")]
    PrecedesCohort {
        row: usize,
        customer: String,
        month: String,
        cohort: String,
    },

    /// A transaction belongs to a customer with no cohort assignment.
    #[error("Row {row}: customer '{customer}' has no cohort assignment")]
    MissingAssignment { row: usize, customer: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the error type returned by [`crate::transform::pipeline::analyze_file`]
/// and friends. It wraps all lower-level errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV loading error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Column resolution error.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Row normalization error.
    #[error("Parse error: {0}")]
    Normalize(#[from] NormalizeError),

    /// Cohort computation error.
    #[error("Cohort error: {0}")]
    Cohort(#[from] CohortError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upload larger than the configured body limit.
    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for schema resolution.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for normalization.
pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// Result type for cohort computation.
pub type CohortResult<T> = Result<T, CohortError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // CsvError -> PipelineError
        let csv_err = CsvError::EmptyFile;
        let pipeline_err: PipelineError = csv_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        // CohortError -> PipelineError
        let cohort_err = CohortError::EmptyDataset;
        let pipeline_err: PipelineError = cohort_err.into();
        assert!(matches!(pipeline_err, PipelineError::Cohort(CohortError::EmptyDataset)));
    }

    #[test]
    fn test_invalid_timestamp_format() {
        let err = NormalizeError::InvalidTimestamp {
            row: 4,
            column: "InvoiceDate".into(),
            value: "yesterday".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Row 4"));
        assert!(msg.contains("InvoiceDate"));
        assert!(msg.contains("yesterday"));
    }

    #[test]
    fn test_server_error_wraps_pipeline() {
        let err: ServerError = PipelineError::from(SchemaError::UnknownColumn("Foo".into())).into();
        assert!(err.to_string().contains("Foo"));
    }
}
