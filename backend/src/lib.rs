//! # Retention - cohort retention analysis for retail transactions
//!
//! Retention reads a transaction CSV, groups customers into monthly cohorts
//! by their first purchase, and reports how many of each cohort come back in
//! the following months.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│ Normalizer  │────▶│   Cohorts   │────▶│  Retention  │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │  (policy)   │     │ (aggregate) │     │   (rates)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use retention::{analyze_file, AnalysisOptions};
//! use std::path::Path;
//!
//! let result = analyze_file(Path::new("online_retail.csv"), &AnalysisOptions::default())?;
//! for (cohort, row) in result.analysis.retention.rows() {
//!     println!("{}: {} indices", cohort, row.len());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Domain models (CustomerId, YearMonth, Transaction)
//! - [`parser`] - CSV parsing with auto-detection
//! - [`schema`] - Column typing, role resolution, dataset profile
//! - [`transform`] - Normalization, cohorts, aggregation, retention, pipeline
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;
pub mod schema;

// Analysis
pub mod transform;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CohortError, CsvError, NormalizeError, PipelineError, SchemaError, ServerError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    AttrValue, CohortIndex, CustomerId, MissingValuePolicy, Transaction, YearMonth,
    DEFAULT_DESCRIPTION, UNKNOWN_CUSTOMER_ID,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    csv_to_json, decode_content, detect_delimiter, detect_encoding, parse_bytes,
    parse_bytes_auto, parse_csv_file_auto, ParseResult,
};

// =============================================================================
// Re-exports - Schema
// =============================================================================

pub use schema::{
    detect_schema, parse_timestamp, profile, profile_rows, resolve_roles, ColumnProfile, ColumnRoles,
    ColumnType, DatasetProfile, TableSchema,
};

// =============================================================================
// Re-exports - Analysis
// =============================================================================

pub use transform::{
    aggregate, assign_cohorts, compute_retention, normalize, CohortAssignment, CohortMatrix,
    NormalizationReport, Normalized, RetentionCell, RetentionMatrix, RetentionRate,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    analyze_bytes, analyze_file, analyze_records, analyze_transactions, AnalysisOptions,
    AnalysisResult, CohortAnalysis, CsvInfo,
};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{
    error_response, AnalysisResponse, CohortRow, CohortTable, CsvMetadata, ResponseMetadata,
    RetentionRow, RetentionTable,
};

// Server
pub mod server {
    pub use crate::api::server::{router, router_with_limit, start_server, MAX_UPLOAD_BYTES};
}
