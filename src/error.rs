//! Error types for cluster-specificity testing.
//!
//! Library entry points return `anyhow::Result`; the variants below are what
//! gets wrapped, so callers that need to tell failures apart can use
//! `err.downcast_ref::<SpecificityError>()`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecificityError {
    /// The target cluster has too few cells for a sample variance.
    #[error("Cluster {cluster_id} has {cells} cell(s); at least 2 are required to fit a distribution")]
    DegenerateCluster { cluster_id: i64, cells: usize },

    #[error("Empty {group} group for cluster {cluster_id}")]
    EmptyGroup { cluster_id: i64, group: &'static str },

    #[error("Unknown score mode '{0}' (expected 1-6 or one of bounded, error-bounded, ratio, raw-out, nonparametric, p-value)")]
    InvalidScoreMode(String),

    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Entries are bucketed by integer count, so they must be finite, non-negative and bounded.
    #[error("Invalid count {value} for gene {gene} in cell {cell}; expected a value in [0, {max}]")]
    InvalidCount {
        gene: usize,
        cell: usize,
        value: f64,
        max: usize,
    },

    #[error("Parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },
}
