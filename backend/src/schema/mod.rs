//! Versioned schemas for the ODVT workbook sheets.
//!
//! The source workbook drifted across revisions: the earliest exports had
//! a fixed 23-column "Collective Data" layout with no reliable headers,
//! later ones carry named headers and only guarantee a handful of columns.
//! Each revision is one [`SchemaVersion`]; a [`SchemaCatalog`] lists them
//! newest first and the normalizer picks the first one the sheet satisfies.
//!
//! # Layouts
//!
//! - **Named**: columns are matched by header after whitespace cleanup,
//!   either under their canonical name or a declared source alias.
//! - **Positional**: headers are ignored and columns are named by
//!   position; the sheet must have exactly the declared column count.
//!
//! Catalogs are plain serde data, so a custom catalog can be loaded from
//! JSON with [`SchemaCatalog::from_json`].

pub mod coercion;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::columns::*;
pub use coercion::{parse_number, Coercion, CoercionFailure};

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace pattern"));

/// Trim a raw header and collapse internal whitespace runs.
pub fn canonical_header(raw: &str) -> String {
    WHITESPACE.replace_all(raw.trim(), " ").into_owned()
}

/// How source columns map to canonical names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layout {
    /// Match by header; `aliases` maps source header → canonical name.
    Named {
        #[serde(default)]
        aliases: BTreeMap<String, String>,
    },

    /// Name columns by position; requires exactly `columns.len()` columns.
    Positional { columns: Vec<String> },
}

/// One revision of a sheet's column layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Identifier reported in logs and errors.
    pub name: String,

    pub layout: Layout,

    /// Canonical columns that must be present, and non-missing in every kept row.
    pub required: Vec<String>,

    /// Canonical columns this version knows about; anything else is an extra column.
    #[serde(default)]
    pub known: Vec<String>,

    /// Type coercion per canonical column.
    #[serde(default)]
    pub coercions: BTreeMap<String, Coercion>,
}

impl SchemaVersion {
    /// Canonical name for a cleaned source header under this version.
    pub fn resolve<'a>(&'a self, header: &'a str) -> &'a str {
        match &self.layout {
            Layout::Named { aliases } => aliases.get(header).map(String::as_str).unwrap_or(header),
            Layout::Positional { .. } => header,
        }
    }

    pub fn is_known(&self, canonical: &str) -> bool {
        self.known.iter().any(|k| k == canonical) || self.required.iter().any(|r| r == canonical)
    }
}

/// Schema versions for one sheet, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    /// Sheet / table name used in error messages.
    pub table: String,
    pub versions: Vec<SchemaVersion>,
}

impl SchemaCatalog {
    /// Parse a catalog from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn newest(&self) -> Option<&SchemaVersion> {
        self.versions.first()
    }
}

// =============================================================================
// Built-in Catalogs
// =============================================================================

/// Sheet name of the trip records.
pub const COLLECTIVE_DATA_SHEET: &str = "Collective Data";

/// Sheet name of the reference cost model.
pub const COST_MODEL_SHEET: &str = "Cost Model";

/// Canonical trip columns in the order of the legacy 23-column export.
pub const TRIP_COLUMNS: [&str; 23] = [
    ORIGIN_PIN_CODE,
    ORIGIN_LOCALITY,
    ORIGIN_CLUSTER_NAME,
    ORIGIN_STATE,
    DESTINATION_PIN_CODE,
    DESTINATION_CLUSTER_NAME,
    DESTINATION_LOCALITY,
    DESTINATION_STATE,
    TRUCK_TYPE,
    VEHICLE_TYPE,
    VEHICLE_CLASS,
    TOLL_VEHICLE_CATEGORY,
    CREATED_AT,
    SHIPPER_RATE,
    FLEET_OWNER_RATE,
    LSP_RATE,
    LEAD_DISTANCE,
    ETA,
    TOLL_COST,
    TRANSPORTER,
    CATEGORY,
    RATING,
    RATE_TYPE,
];

/// Source headers seen in named trip exports.
const TRIP_ALIASES: &[(&str, &str)] = &[
    ("Origin Pin code", ORIGIN_PIN_CODE),
    ("Origin Locality", ORIGIN_LOCALITY),
    ("Origin cluster name", ORIGIN_CLUSTER_NAME),
    ("Origin State", ORIGIN_STATE),
    ("Destination Pin code", DESTINATION_PIN_CODE),
    ("Destination cluster name", DESTINATION_CLUSTER_NAME),
    ("Destination Locality", DESTINATION_LOCALITY),
    ("Destination State", DESTINATION_STATE),
    ("Truck type", TRUCK_TYPE),
    ("Vehicle Type (New)", VEHICLE_TYPE),
    ("Vehicle Class", VEHICLE_CLASS),
    ("Toll Vehicle Category", TOLL_VEHICLE_CATEGORY),
    ("created_at", CREATED_AT),
    ("Shipper", SHIPPER_RATE),
    ("Shipper Rate", SHIPPER_RATE),
    ("Fleet owner Rate", FLEET_OWNER_RATE),
    ("LSP Rate", LSP_RATE),
    ("Lead Distance", LEAD_DISTANCE),
    ("ETA", ETA),
    ("Toll Cost", TOLL_COST),
    ("Transporter", TRANSPORTER),
    ("Category", CATEGORY),
    ("Rating", RATING),
    ("Rate type", RATE_TYPE),
];

/// Canonical cost-model columns in the order of the legacy 10-column export.
pub const COST_MODEL_COLUMNS: [&str; 10] = [
    ORIGIN,
    DESTINATION,
    LEAD_DISTANCE_KM,
    TAT,
    FIXED_COST_PER_DAY,
    VARIABLE_COST_PER_KM,
    TOTAL_COST_PER_TRIP,
    TRANSPORTER_MARGIN_PCT,
    TOTAL_FREIGHT_COST_PER_TRIP,
    TRUCK_TYPE,
];

/// Source headers seen in named cost-model exports and uploads.
const COST_MODEL_ALIASES: &[(&str, &str)] = &[
    ("Lead Distance (KM)", LEAD_DISTANCE_KM),
    ("TAT @300 KM/Day", TAT),
    ("Fixed Cost/Day", FIXED_COST_PER_DAY),
    ("Variable Cost/KM", VARIABLE_COST_PER_KM),
    ("Total (Fixed+Variable) Cost/Trip", TOTAL_COST_PER_TRIP),
    ("Transporter Margin - 5%", TRANSPORTER_MARGIN_PCT),
    ("Total Freight Cost/Trip", TOTAL_FREIGHT_COST_PER_TRIP),
    ("Truck Type", TRUCK_TYPE),
    ("Truck type", TRUCK_TYPE),
];

fn trip_coercions() -> BTreeMap<String, Coercion> {
    TRIP_COLUMNS
        .iter()
        .filter_map(|&col| {
            let coercion = match col {
                ORIGIN_PIN_CODE | DESTINATION_PIN_CODE => Coercion::Pincode { width: 6 },
                SHIPPER_RATE | FLEET_OWNER_RATE | LSP_RATE | LEAD_DISTANCE | ETA | TOLL_COST
                | RATING => Coercion::Numeric,
                // Left as read; trend parsing accepts timestamps and text
                CREATED_AT => return None,
                _ => Coercion::Text,
            };
            Some((col.to_string(), coercion))
        })
        .collect()
}

fn cost_model_coercions() -> BTreeMap<String, Coercion> {
    COST_MODEL_COLUMNS
        .iter()
        .map(|&col| {
            let coercion = match col {
                ORIGIN | DESTINATION | TRUCK_TYPE => Coercion::Text,
                _ => Coercion::Numeric,
            };
            (col.to_string(), coercion)
        })
        .collect()
}

fn to_strings(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

fn aliases(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(src, canonical)| (src.to_string(), canonical.to_string()))
        .collect()
}

/// Built-in catalog for the "Collective Data" sheet.
pub fn trip_catalog() -> SchemaCatalog {
    SchemaCatalog {
        table: COLLECTIVE_DATA_SHEET.to_string(),
        versions: vec![
            SchemaVersion {
                name: "trips-v3-minimal".to_string(),
                layout: Layout::Named {
                    aliases: aliases(TRIP_ALIASES),
                },
                required: to_strings(&[
                    ORIGIN_PIN_CODE,
                    DESTINATION_PIN_CODE,
                    RATING,
                    TRANSPORTER,
                    SHIPPER_RATE,
                ]),
                known: to_strings(&TRIP_COLUMNS),
                coercions: trip_coercions(),
            },
            SchemaVersion {
                name: "trips-v1-positional".to_string(),
                layout: Layout::Positional {
                    columns: to_strings(&TRIP_COLUMNS),
                },
                required: to_strings(&TRIP_COLUMNS),
                known: Vec::new(),
                coercions: trip_coercions(),
            },
        ],
    }
}

/// Built-in catalog for the "Cost Model" sheet.
pub fn cost_model_catalog() -> SchemaCatalog {
    SchemaCatalog {
        table: COST_MODEL_SHEET.to_string(),
        versions: vec![
            SchemaVersion {
                name: "cost-model-v2-named".to_string(),
                layout: Layout::Named {
                    aliases: aliases(COST_MODEL_ALIASES),
                },
                required: to_strings(&COST_JOIN_KEYS),
                known: to_strings(&COST_MODEL_COLUMNS),
                coercions: cost_model_coercions(),
            },
            SchemaVersion {
                name: "cost-model-v1-positional".to_string(),
                layout: Layout::Positional {
                    columns: to_strings(&COST_MODEL_COLUMNS),
                },
                required: to_strings(&COST_MODEL_COLUMNS),
                known: Vec::new(),
                coercions: cost_model_coercions(),
            },
        ],
    }
}

/// Header renames applied to an uploaded cost request before the key check.
pub fn upload_aliases() -> BTreeMap<String, String> {
    aliases(COST_MODEL_ALIASES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_header_collapses_whitespace() {
        assert_eq!(canonical_header("  Origin   Pin\tcode "), "Origin Pin code");
    }

    #[test]
    fn test_trip_catalog_newest_first() {
        let catalog = trip_catalog();
        assert_eq!(catalog.newest().unwrap().name, "trips-v3-minimal");
        assert_eq!(catalog.versions.len(), 2);
        match &catalog.versions[1].layout {
            Layout::Positional { columns } => assert_eq!(columns.len(), 23),
            other => panic!("expected positional layout, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_alias() {
        let catalog = trip_catalog();
        let v3 = &catalog.versions[0];
        assert_eq!(v3.resolve("Shipper"), SHIPPER_RATE);
        assert_eq!(v3.resolve("Origin Pin code"), ORIGIN_PIN_CODE);
        assert_eq!(v3.resolve(SHIPPER_RATE), SHIPPER_RATE);
        assert_eq!(v3.resolve("Remarks"), "Remarks");
        assert!(!v3.is_known("Remarks"));
    }

    #[test]
    fn test_created_at_not_coerced() {
        let coercions = trip_coercions();
        assert!(!coercions.contains_key(CREATED_AT));
        assert_eq!(coercions[RATING], Coercion::Numeric);
        assert_eq!(coercions[ORIGIN_PIN_CODE], Coercion::Pincode { width: 6 });
    }

    #[test]
    fn test_catalog_json_roundtrip() {
        let catalog = cost_model_catalog();
        let json = catalog.to_json().unwrap();
        assert_eq!(SchemaCatalog::from_json(&json).unwrap(), catalog);
    }

    #[test]
    fn test_upload_aliases_cover_truck_type() {
        assert_eq!(upload_aliases()["Truck Type"], TRUCK_TYPE);
    }
}
