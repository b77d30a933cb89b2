//! Error types for the ODVT normalization and aggregation pipeline.
//!
//! One error type per layer:
//!
//! - [`SheetError`] - Workbook and CSV reading errors
//! - [`SchemaError`] - Required columns absent at ingestion
//! - [`JoinSchemaError`] - Join keys absent on either side of a join
//! - [`AggregationError`] - A view names a field the table lacks
//! - [`ConfigError`] - Invalid dashboard configuration
//! - [`ExportError`] - Report writing errors
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries. Empty results are
//! never errors: every aggregation returns an empty collection instead.

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Sheet Reading Errors
// =============================================================================

/// Errors while reading a workbook or an uploaded CSV file.
#[derive(Debug, Error)]
pub enum SheetError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// The workbook container could not be opened or decoded.
    #[error("Invalid workbook: {0}")]
    Workbook(String),

    /// A required sheet is not present (names are case-sensitive).
    #[error("Sheet '{sheet}' not found (available: {})", .available.join(", "))]
    MissingSheet { sheet: String, available: Vec<String> },

    /// Sheet has no header row.
    #[error("Sheet '{0}' is empty")]
    EmptySheet(String),

    /// Invalid CSV content.
    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Failed to decode file content.
    #[error("Failed to decode content: {0}")]
    Encoding(String),
}

// =============================================================================
// Schema Errors
// =============================================================================

/// No schema version accepts the table's columns.
///
/// `missing` lists the columns the newest version still lacks; `tried`
/// lists every version that was attempted, newest first.
#[derive(Debug, Clone, Error, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[error("{table}: missing required columns: {} (tried {})", .missing.join(", "), .tried.join(", "))]
pub struct SchemaError {
    pub table: String,
    pub missing: Vec<String>,
    pub tried: Vec<String>,
}

// =============================================================================
// Join Errors
// =============================================================================

/// Which side of a join lacks key columns.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum JoinSide {
    Uploaded,
    CostModel,
}

impl std::fmt::Display for JoinSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinSide::Uploaded => write!(f, "uploaded file"),
            JoinSide::CostModel => write!(f, "cost model"),
        }
    }
}

/// Join key columns are missing; no partial join is performed.
#[derive(Debug, Clone, Error, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[error("Join keys missing in {side}: {}", .missing.join(", "))]
pub struct JoinSchemaError {
    pub side: JoinSide,
    pub missing: Vec<String>,
}

// =============================================================================
// Aggregation Errors
// =============================================================================

/// Errors from the aggregation engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AggregationError {
    /// The operation references a column the table does not have.
    #[error("{operation}: missing field '{field}'")]
    MissingField {
        operation: &'static str,
        field: String,
    },
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid dashboard configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// Rating bounds outside [1, 5] or inverted.
    #[error("Invalid rating range [{low}, {high}]: bounds must satisfy 1 <= low <= high <= 5")]
    InvalidRatingRange { low: u8, high: u8 },

    /// Unknown date range bucket.
    #[error("Unknown date range: {0}")]
    UnknownDateRange(String),

    /// Invalid environment value.
    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while writing an xlsx report.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Workbook writer failure.
    #[error("Excel export error: {0}")]
    Xlsx(String),

    /// JSON serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the error type returned by [`crate::transform::pipeline::load_dataset`]
/// and [`crate::transform::pipeline::join_upload`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Reading error.
    #[error("Sheet error: {0}")]
    Sheet(#[from] SheetError),

    /// Schema error.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Join error.
    #[error("Join error: {0}")]
    Join(#[from] JoinSchemaError),

    /// Aggregation error.
    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Export error.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
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

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for sheet reading.
pub type SheetResult<T> = Result<T, SheetError>;

/// Result type for aggregation operations.
pub type AggregationResult<T> = Result<T, AggregationError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
