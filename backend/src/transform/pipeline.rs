//! High-level pipeline: workbook → normalized [`Dataset`], upload → joined table.
//!
//! # Example
//!
//! ```rust,ignore
//! use odvt::{join_upload, load_dataset};
//!
//! let dataset = load_dataset("ODVT.xlsx")?;
//! println!("{} trips ({})", dataset.trips.table.len(), dataset.trips.version);
//!
//! let bytes = std::fs::read("request.csv")?;
//! let joined = join_upload(&bytes, "request.csv", &dataset)?;
//! println!("{}/{} rows matched", joined.matched, joined.rows);
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::join::join_cost_model;
use super::normalizer::{normalize, reconcile_headers, NormalizeWarning, Normalized};
use crate::api::logs::{
    log_error, log_info, log_info_indent, log_success, log_warning, log_warning_indent,
};
use crate::error::{PipelineError, PipelineResult};
use crate::models::columns::COST_JOIN_KEYS;
use crate::models::Table;
use crate::parser::{read_upload, read_workbook, read_workbook_bytes, RawWorkbook};
use crate::schema::{cost_model_catalog, trip_catalog, upload_aliases, SchemaCatalog};

/// Dropped-row reasons shown per sheet in the load log.
const MAX_REASONS_LOGGED: usize = 5;

/// Immutable snapshot of both normalized sheets.
///
/// Loaded once per process and shared behind an [`Arc`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    /// Workbook path or upload name
    pub source: String,
    pub loaded_at: DateTime<Utc>,
    pub trips: Normalized,
    pub cost_model: Normalized,
}

/// Load counters for one sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSummary {
    pub version: String,
    pub rows_read: usize,
    pub rows_kept: usize,
    pub rows_dropped: usize,
    pub coercion_failures: usize,
    pub warnings: usize,
}

impl From<&Normalized> for SheetSummary {
    fn from(n: &Normalized) -> Self {
        Self {
            version: n.version.clone(),
            rows_read: n.rows_read,
            rows_kept: n.table.len(),
            rows_dropped: n.dropped_rows(),
            coercion_failures: n.coercion_failures(),
            warnings: n.warnings.len(),
        }
    }
}

/// What a dataset load produced, without the tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub source: String,
    pub trips: SheetSummary,
    pub cost_model: SheetSummary,
}

impl Dataset {
    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            source: self.source.clone(),
            trips: SheetSummary::from(&self.trips),
            cost_model: SheetSummary::from(&self.cost_model),
        }
    }
}

/// An uploaded cost request joined onto the cost model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedUpload {
    pub file_name: String,
    pub rows: usize,
    pub matched: usize,
    pub table: Table,
}

/// Read and normalize the workbook at `path`.
pub fn load_dataset<P: AsRef<Path>>(path: P) -> PipelineResult<Arc<Dataset>> {
    let path = path.as_ref();
    log_info(format!("📖 Reading workbook {}", path.display()));
    let raw = read_workbook(path).map_err(|e| {
        log_error(e.to_string());
        e
    })?;
    build_dataset(raw, path.display().to_string()).map(Arc::new)
}

/// Same as [`load_dataset`] for an in-memory workbook.
pub fn load_dataset_bytes(bytes: &[u8], source: &str) -> PipelineResult<Arc<Dataset>> {
    log_info(format!("📖 Reading workbook {source}"));
    let raw = read_workbook_bytes(bytes).map_err(|e| {
        log_error(e.to_string());
        e
    })?;
    build_dataset(raw, source.to_string()).map(Arc::new)
}

/// Normalize both sheets of an already-read workbook.
pub fn build_dataset(raw: RawWorkbook, source: String) -> PipelineResult<Dataset> {
    let trips = normalize_sheet(&raw.collective, &trip_catalog())?;
    let cost_model = normalize_sheet(&raw.cost_model, &cost_model_catalog())?;

    Ok(Dataset {
        source,
        loaded_at: Utc::now(),
        trips,
        cost_model,
    })
}

fn normalize_sheet(raw: &Table, catalog: &SchemaCatalog) -> PipelineResult<Normalized> {
    log_info(format!(
        "📋 {}: {} rows, {} columns",
        catalog.table,
        raw.len(),
        raw.columns().len()
    ));

    let normalized = normalize(raw, catalog).map_err(|e| {
        log_error(e.to_string());
        PipelineError::from(e)
    })?;

    log_success(format!("Schema version: {}", normalized.version));
    report_warnings(&normalized);
    log_success(format!(
        "{} rows kept ({} dropped)",
        normalized.table.len(),
        normalized.dropped_rows()
    ));
    Ok(normalized)
}

fn report_warnings(normalized: &Normalized) {
    let mut extra = Vec::new();
    let mut coercions: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dropped: BTreeMap<String, Vec<usize>> = BTreeMap::new();

    for warning in &normalized.warnings {
        match warning {
            NormalizeWarning::ExtraColumn { column } => extra.push(column.as_str()),
            NormalizeWarning::DuplicateColumn { .. } => log_warning_indent(warning.to_string(), 1),
            NormalizeWarning::TypeCoercion { column, .. } => {
                *coercions.entry(column.as_str()).or_default() += 1;
            }
            NormalizeWarning::RowDropped { row, missing } => {
                dropped.entry(missing.join(", ")).or_default().push(*row);
            }
        }
    }

    if !extra.is_empty() {
        log_info_indent(format!("Extra columns ignored: {}", extra.join(", ")), 1);
    }
    for (column, count) in &coercions {
        log_warning_indent(format!("{column}: {count} values could not be coerced"), 1);
    }
    if !dropped.is_empty() {
        log_warning(format!(
            "{} rows dropped (missing required fields)",
            normalized.dropped_rows()
        ));
        for (reason, rows) in dropped.iter().take(MAX_REASONS_LOGGED) {
            let sample: Vec<String> = rows.iter().take(5).map(|r| r.to_string()).collect();
            let more = if rows.len() > 5 {
                format!(" ... +{}", rows.len() - 5)
            } else {
                String::new()
            };
            log_warning_indent(format!("Missing {reason} (rows: {}{more})", sample.join(", ")), 1);
        }
    }
}

/// Read an uploaded cost request and left-join it onto the dataset's cost model.
pub fn join_upload(
    bytes: &[u8],
    file_name: &str,
    dataset: &Dataset,
) -> PipelineResult<JoinedUpload> {
    log_info(format!("📎 Reading upload {file_name}"));
    let raw = read_upload(bytes, file_name).map_err(|e| {
        log_error(e.to_string());
        e
    })?;
    let (user, warnings) = reconcile_headers(&raw, &upload_aliases());
    for warning in &warnings {
        log_warning_indent(warning.to_string(), 1);
    }
    log_info_indent(format!("{} rows, columns: {}", user.len(), user.columns().join(", ")), 1);

    let outcome = join_cost_model(&user, &dataset.cost_model.table, &COST_JOIN_KEYS).map_err(|e| {
        log_error(e.to_string());
        PipelineError::from(e)
    })?;

    if outcome.table.is_empty() {
        log_warning("Upload has no data rows");
    }

    let unmatched = outcome.table.len() - outcome.matched;
    if unmatched > 0 {
        log_warning(format!("{unmatched} rows have no cost-model entry"));
    }
    log_success(format!("Joined {} rows ({} matched)", outcome.table.len(), outcome.matched));

    Ok(JoinedUpload {
        file_name: file_name.to_string(),
        rows: outcome.table.len(),
        matched: outcome.matched,
        table: outcome.table,
    })
}
