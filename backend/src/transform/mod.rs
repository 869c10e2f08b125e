//! Transformation module.
//!
//! This module turns parsed rows into cohort retention results:
//! - Normalizer: raw rows to typed transactions under a missing-value policy
//! - Cohort: first-purchase month per customer, cohort index per row
//! - Aggregator: distinct customers per (cohort, index) bucket
//! - Retention: bucket counts divided by each cohort's base
//! - Pipeline: end-to-end analysis with progress logging

pub mod aggregator;
pub mod cohort;
pub mod normalizer;
pub mod pipeline;
pub mod retention;

pub use aggregator::{aggregate, CohortMatrix};
pub use cohort::{assign_cohorts, CohortAssignment};
pub use normalizer::{normalize, NormalizationReport, Normalized};
pub use pipeline::*;
pub use retention::{compute_retention, RetentionCell, RetentionMatrix, RetentionRate};
