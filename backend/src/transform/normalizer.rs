//! Schema normalizer.
//!
//! Turns a raw sheet into the canonical table in four steps:
//!
//! 1. **Presence check**: pick the newest [`SchemaVersion`] whose required
//!    columns are all present, or fail with a [`SchemaError`].
//! 2. **Column reconciliation**: clean headers, apply the version's
//!    rename map, keep unknown columns (with a warning).
//! 3. **Type coercion**: coerce-or-null per declared column.
//! 4. **Row filtering**: drop rows with any missing required value.
//!
//! Per-cell problems never abort: they become [`NormalizeWarning`]s.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::error::SchemaError;
use crate::models::{Table, Value};
use crate::schema::{canonical_header, Layout, SchemaCatalog, SchemaVersion};

/// A non-fatal reconciliation event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NormalizeWarning {
    /// Column not part of the schema; preserved but unused by aggregations.
    ExtraColumn { column: String },

    /// A second source column resolved to an already-taken canonical name; dropped.
    DuplicateColumn { column: String, canonical: String },

    /// Cell could not be coerced and was set to missing.
    TypeCoercion {
        row: usize,
        column: String,
        value: String,
    },

    /// Row dropped because required fields were missing after coercion.
    RowDropped { row: usize, missing: Vec<String> },
}

impl std::fmt::Display for NormalizeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeWarning::ExtraColumn { column } => {
                write!(f, "Extra column '{}' ignored", column)
            }
            NormalizeWarning::DuplicateColumn { column, canonical } => {
                write!(f, "Column '{}' duplicates '{}', dropped", column, canonical)
            }
            NormalizeWarning::TypeCoercion { row, column, value } => {
                write!(f, "Row {}, column '{}': cannot coerce '{}'", row, column, value)
            }
            NormalizeWarning::RowDropped { row, missing } => {
                write!(f, "Row {} dropped, missing: {}", row, missing.join(", "))
            }
        }
    }
}

/// Result of normalizing one sheet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Normalized {
    /// Canonical table.
    pub table: Table,
    /// Name of the schema version that matched.
    pub version: String,
    /// Data rows read before filtering.
    pub rows_read: usize,
    pub warnings: Vec<NormalizeWarning>,
}

impl Normalized {
    pub fn dropped_rows(&self) -> usize {
        self.rows_read - self.table.len()
    }

    pub fn coercion_failures(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, NormalizeWarning::TypeCoercion { .. }))
            .count()
    }
}

/// Source column → canonical column mapping chosen for a sheet.
struct ColumnPlan {
    /// (source index, canonical name) in output order.
    keep: Vec<(usize, String)>,
    warnings: Vec<NormalizeWarning>,
}

/// Normalize `raw` against the first satisfied version of `catalog`.
pub fn normalize(raw: &Table, catalog: &SchemaCatalog) -> Result<Normalized, SchemaError> {
    let headers = clean_headers(raw.columns());

    let mut newest_missing: Option<Vec<String>> = None;
    let mut chosen = None;
    for version in &catalog.versions {
        match plan_columns(&headers, version) {
            Ok(plan) => {
                chosen = Some((version, plan));
                break;
            }
            Err(missing) => {
                newest_missing.get_or_insert(missing);
            }
        }
    }

    let (version, plan) = chosen.ok_or_else(|| SchemaError {
        table: catalog.table.clone(),
        missing: newest_missing.unwrap_or_default(),
        tried: catalog.versions.iter().map(|v| v.name.clone()).collect(),
    })?;

    let ColumnPlan { keep, mut warnings } = plan;
    let mut table = Table::new(keep.iter().map(|(_, name)| name.clone()).collect());

    for (row_idx, raw_row) in raw.rows().iter().enumerate() {
        // Spreadsheet row number: 1-based, header is row 1
        let row_num = row_idx + 2;
        let mut row = Vec::with_capacity(keep.len());

        for (src, name) in &keep {
            let cell = raw_row.get(*src).cloned().unwrap_or_default();
            let value = match version.coercions.get(name) {
                Some(coercion) => coercion.apply(&cell).unwrap_or_else(|failure| {
                    warnings.push(NormalizeWarning::TypeCoercion {
                        row: row_num,
                        column: name.clone(),
                        value: failure.value,
                    });
                    Value::Missing
                }),
                None => cell,
            };
            row.push(value);
        }

        let missing: Vec<String> = version
            .required
            .iter()
            .filter(|req| {
                keep.iter()
                    .position(|(_, name)| name == *req)
                    .map(|i| row[i].is_missing())
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        if missing.is_empty() {
            table.push_row(row);
        } else {
            warnings.push(NormalizeWarning::RowDropped {
                row: row_num,
                missing,
            });
        }
    }

    Ok(Normalized {
        table,
        version: version.name.clone(),
        rows_read: raw.len(),
        warnings,
    })
}

/// Clean an uploaded table's headers: trim, collapse whitespace, apply aliases.
///
/// When several headers resolve to the same name the first column is kept
/// and the others are dropped with a [`NormalizeWarning::DuplicateColumn`].
/// Values are left untouched; key presence is checked by the join.
pub fn reconcile_headers(
    raw: &Table,
    aliases: &BTreeMap<String, String>,
) -> (Table, Vec<NormalizeWarning>) {
    let mut keep: Vec<(usize, String)> = Vec::new();
    let mut warnings = Vec::new();
    let mut seen = HashSet::new();

    for (i, header) in clean_headers(raw.columns()).into_iter().enumerate() {
        let name = aliases.get(&header).cloned().unwrap_or_else(|| header.clone());
        if !seen.insert(name.clone()) {
            warnings.push(NormalizeWarning::DuplicateColumn {
                column: header,
                canonical: name,
            });
            continue;
        }
        keep.push((i, name));
    }

    let rows = raw.rows().iter().map(|row| {
        keep.iter()
            .map(|(i, _)| row.get(*i).cloned().unwrap_or_default())
            .collect::<Vec<_>>()
    });
    let table = Table::from_rows(keep.iter().map(|(_, name)| name.clone()), rows);
    (table, warnings)
}

fn clean_headers(columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let h = canonical_header(c);
            if h.is_empty() {
                format!("Column{}", i + 1)
            } else {
                h
            }
        })
        .collect()
}

/// Map cleaned headers onto `version`, or return the missing required columns.
fn plan_columns(headers: &[String], version: &SchemaVersion) -> Result<ColumnPlan, Vec<String>> {
    let mut keep = Vec::new();
    let mut warnings = Vec::new();

    match &version.layout {
        Layout::Positional { columns } => {
            if headers.len() != columns.len() {
                // Report the whole layout; a positional match is all or nothing
                return Err(columns.clone());
            }
            keep.extend(columns.iter().cloned().enumerate());
        }
        Layout::Named { .. } => {
            let mut seen = HashSet::new();
            for (i, header) in headers.iter().enumerate() {
                let canonical = version.resolve(header).to_string();
                if !seen.insert(canonical.clone()) {
                    warnings.push(NormalizeWarning::DuplicateColumn {
                        column: header.clone(),
                        canonical,
                    });
                    continue;
                }
                if !version.is_known(&canonical) {
                    warnings.push(NormalizeWarning::ExtraColumn {
                        column: canonical.clone(),
                    });
                }
                keep.push((i, canonical));
            }
        }
    }

    let missing: Vec<String> = version
        .required
        .iter()
        .filter(|req| !keep.iter().any(|(_, name)| name == *req))
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(ColumnPlan { keep, warnings })
    } else {
        Err(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::columns::*;
    use crate::schema::{cost_model_catalog, trip_catalog, upload_aliases, TRIP_COLUMNS};

    fn minimal_raw() -> Table {
        Table::from_rows(
            [
                " Origin Pin code",
                "Destination Pin code ",
                "Rating",
                "Transporter",
                "Shipper",
                "Remarks",
            ],
            vec![
                vec![
                    "12345".into(),
                    Value::Number(400001.0),
                    Value::Number(4.0),
                    "Acme".into(),
                    "1,200".into(),
                    "ok".into(),
                ],
                vec![
                    "110001".into(),
                    "560001".into(),
                    "n/a".into(),
                    "Acme".into(),
                    Value::Number(900.0),
                    Value::Missing,
                ],
                vec![
                    "110001".into(),
                    "560001".into(),
                    Value::Number(5.0),
                    Value::Missing,
                    Value::Number(100.0),
                    Value::Missing,
                ],
            ],
        )
    }

    #[test]
    fn test_minimal_schema_selected() {
        let result = normalize(&minimal_raw(), &trip_catalog()).unwrap();
        assert_eq!(result.version, "trips-v3-minimal");
        assert_eq!(
            result.table.columns(),
            &[ORIGIN_PIN_CODE, DESTINATION_PIN_CODE, RATING, TRANSPORTER, SHIPPER_RATE, "Remarks"]
        );
    }

    #[test]
    fn test_pincode_padded_and_numbers_coerced() {
        let result = normalize(&minimal_raw(), &trip_catalog()).unwrap();
        assert_eq!(result.table.len(), 1);
        assert_eq!(result.table.get(0, ORIGIN_PIN_CODE), Some(&Value::Text("012345".into())));
        assert_eq!(result.table.get(0, DESTINATION_PIN_CODE), Some(&Value::Text("400001".into())));
        assert_eq!(result.table.get(0, SHIPPER_RATE), Some(&Value::Number(1200.0)));
    }

    #[test]
    fn test_coercion_failure_drops_row() {
        let result = normalize(&minimal_raw(), &trip_catalog()).unwrap();
        assert_eq!(result.rows_read, 3);
        assert_eq!(result.dropped_rows(), 2);
        assert_eq!(result.coercion_failures(), 1);
        assert!(result.warnings.contains(&NormalizeWarning::TypeCoercion {
            row: 3,
            column: RATING.into(),
            value: "n/a".into(),
        }));
        assert!(result.warnings.contains(&NormalizeWarning::RowDropped {
            row: 3,
            missing: vec![RATING.into()],
        }));
        assert!(result.warnings.contains(&NormalizeWarning::RowDropped {
            row: 4,
            missing: vec![TRANSPORTER.into()],
        }));
    }

    #[test]
    fn test_extra_column_preserved_with_warning() {
        let result = normalize(&minimal_raw(), &trip_catalog()).unwrap();
        assert!(result.warnings.contains(&NormalizeWarning::ExtraColumn {
            column: "Remarks".into()
        }));
        assert_eq!(result.table.get(0, "Remarks"), Some(&Value::Text("ok".into())));
    }

    #[test]
    fn test_missing_required_columns_is_schema_error() {
        let raw = Table::from_rows(
            ["Origin Pin code", "Shipper"],
            vec![vec!["1".into(), "2".into()]],
        );
        let err = normalize(&raw, &trip_catalog()).unwrap_err();
        assert_eq!(err.table, "Collective Data");
        assert_eq!(err.missing, vec![DESTINATION_PIN_CODE, RATING, TRANSPORTER]);
        assert_eq!(err.tried, vec!["trips-v3-minimal", "trips-v1-positional"]);
    }

    #[test]
    fn test_legacy_positional_layout() {
        let headers: Vec<String> = (1..=23).map(|i| format!("col{}", i)).collect();
        let mut row: Vec<Value> = (0..23).map(|i| Value::from(format!("v{}", i))).collect();
        row[0] = "560001".into();
        row[4] = "400001".into();
        row[13] = Value::Number(1000.0);
        row[14] = Value::Number(900.0);
        row[15] = Value::Number(950.0);
        row[16] = Value::Number(840.0);
        row[17] = Value::Number(48.0);
        row[18] = Value::Number(2100.0);
        row[21] = Value::Number(4.0);
        let raw = Table::from_rows(headers, vec![row]);

        let result = normalize(&raw, &trip_catalog()).unwrap();
        assert_eq!(result.version, "trips-v1-positional");
        assert_eq!(result.table.columns().len(), TRIP_COLUMNS.len());
        assert_eq!(result.table.get(0, TRANSPORTER), Some(&Value::Text("v19".into())));
        assert_eq!(result.table.get(0, RATING), Some(&Value::Number(4.0)));
    }

    #[test]
    fn test_legacy_requires_every_column() {
        let headers: Vec<String> = (1..=23).map(|i| format!("col{}", i)).collect();
        let mut row: Vec<Value> = (0..23).map(|_| Value::from("x")).collect();
        row[0] = "560001".into();
        row[4] = "400001".into();
        for i in [13, 14, 15, 16, 17, 18, 21] {
            row[i] = Value::Number(1.0);
        }
        row[2] = Value::Missing;
        let raw = Table::from_rows(headers, vec![row]);

        let result = normalize(&raw, &trip_catalog()).unwrap();
        assert!(result.table.is_empty());
        assert!(matches!(
            &result.warnings[0],
            NormalizeWarning::RowDropped { missing, .. }
                if missing == &vec![ORIGIN_CLUSTER_NAME.to_string()]
        ));
    }

    #[test]
    fn test_normalizing_canonical_table_is_noop() {
        let first = normalize(&minimal_raw(), &trip_catalog()).unwrap();
        let second = normalize(&first.table, &trip_catalog()).unwrap();
        assert_eq!(second.table, first.table);
        assert_eq!(second.rows_read, second.table.len());
        assert!(second
            .warnings
            .iter()
            .all(|w| matches!(w, NormalizeWarning::ExtraColumn { .. })));
    }

    #[test]
    fn test_duplicate_alias_dropped() {
        let raw = Table::from_rows(
            ["Origin", "Destination", "Truck Type", "TruckType"],
            vec![vec!["Pune".into(), "Delhi".into(), "32FT".into(), "20FT".into()]],
        );
        let result = normalize(&raw, &cost_model_catalog()).unwrap();
        assert_eq!(result.table.columns(), &[ORIGIN, DESTINATION, TRUCK_TYPE]);
        assert_eq!(result.table.get(0, TRUCK_TYPE), Some(&Value::Text("32FT".into())));
        assert!(result.warnings.contains(&NormalizeWarning::DuplicateColumn {
            column: "TruckType".into(),
            canonical: TRUCK_TYPE.into(),
        }));
    }

    #[test]
    fn test_reconcile_upload_headers() {
        let raw = Table::from_rows(
            [" Origin ", "Destination", "Truck  Type"],
            vec![vec!["Pune".into(), "Delhi".into(), "32FT".into()]],
        );
        let (table, warnings) = reconcile_headers(&raw, &upload_aliases());
        assert_eq!(table.columns(), &[ORIGIN, DESTINATION, TRUCK_TYPE]);
        assert_eq!(table.len(), 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_reconcile_upload_keeps_first_duplicate() {
        let raw = Table::from_rows(
            ["Origin", "Destination", "Truck Type", "TruckType"],
            vec![vec!["Pune".into(), "Goa".into(), "32FT".into(), "20FT".into()]],
        );
        let (table, warnings) = reconcile_headers(&raw, &upload_aliases());
        assert_eq!(table.columns(), &[ORIGIN, DESTINATION, TRUCK_TYPE]);
        assert_eq!(table.get(0, TRUCK_TYPE), Some(&Value::Text("32FT".into())));
        assert_eq!(
            warnings,
            vec![NormalizeWarning::DuplicateColumn {
                column: "TruckType".into(),
                canonical: TRUCK_TYPE.into(),
            }]
        );
    }
}
