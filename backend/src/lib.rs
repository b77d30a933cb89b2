//! # ODVT - Origin/Destination/Vehicle/Transporter analytics
//!
//! Normalizes the ODVT logistics workbook into canonical tables and
//! computes the dashboard's grouped views and cost-model joins.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Workbook   │────▶│   Parser    │────▶│ Normalizer  │────▶│  Aggregate  │
//! │ (2 sheets)  │     │ (calamine)  │     │ (versioned) │     │   (views)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                                                ▲                    │
//!                     ┌─────────────┐            │             ┌──────▼──────┐
//!                     │ Upload file │───── header aliases ────▶│ Cost join   │
//!                     │ (xlsx/csv)  │                          └─────────────┘
//!                     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use odvt::{load_dataset, DashboardFilters, DashboardOptions, DashboardViews};
//!
//! let dataset = load_dataset("ODVT.xlsx")?;
//! let views = DashboardViews::compute(&dataset, &DashboardFilters::default(), &DashboardOptions::default())?;
//! println!("{} trips after filters", views.trip_count);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per layer
//! - [`models`] - Cell values, tables and canonical column names
//! - [`schema`] - Versioned schema catalogs and coercions
//! - [`parser`] - Workbook and CSV reading
//! - [`transform`] - Normalizer, aggregation engine, join and pipeline
//! - [`config`] - Options and dashboard filters
//! - [`dashboard`] - Named views
//! - [`export`] - Excel report
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Schemas and reading
pub mod parser;
pub mod schema;

// Transformation
pub mod transform;

// Dashboard
pub mod config;
pub mod dashboard;
pub mod export;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    AggregationError, ConfigError, ExportError, JoinSchemaError, JoinSide, PipelineError,
    SchemaError, ServerError, SheetError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{Table, Value};

// =============================================================================
// Re-exports - Schemas & Parsing
// =============================================================================

pub use schema::{cost_model_catalog, trip_catalog, Coercion, Layout, SchemaCatalog, SchemaVersion};

pub use parser::{
    detect_delimiter, detect_encoding, read_upload, read_workbook, read_workbook_bytes,
    RawWorkbook,
};

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::{
    bubble_matrix, filter_by_rating_range, group_count, group_means, group_sum, join_cost_model,
    monthly_trend, normalize, top_n_by_frequency, transporter_summary, NormalizeWarning,
    Normalized,
};

pub use transform::pipeline::{
    build_dataset, join_upload, load_dataset, load_dataset_bytes, Dataset, DatasetSummary,
    JoinedUpload,
};

// =============================================================================
// Re-exports - Dashboard
// =============================================================================

pub use config::{DashboardFilters, DashboardOptions, DateRange, RatingRange};
pub use dashboard::{DashboardViews, FilterChoices, View};
pub use export::Report;

// Server
pub use api::server::start_server;
