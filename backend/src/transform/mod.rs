//! Transformation module.
//!
//! - Normalizer: raw sheet to canonical table
//! - Aggregate: grouped summaries, rankings and trends
//! - Join: uploaded cost request onto the cost model
//! - Pipeline: workbook to [`pipeline::Dataset`], upload to joined table

pub mod aggregate;
pub mod join;
pub mod normalizer;
pub mod pipeline;

pub use aggregate::*;
pub use join::{join_cost_model, JoinOutcome};
pub use normalizer::{normalize, reconcile_headers, NormalizeWarning, Normalized};
pub use pipeline::*;
