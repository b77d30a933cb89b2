//! Domain models for the ODVT pipeline.
//!
//! - [`Value`] - One cell: missing, number, text or timestamp
//! - [`Table`] - Named columns over ordered rows of values
//! - [`columns`] - Canonical column names shared by every module

use chrono::NaiveDateTime;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::{AggregationError, AggregationResult};

// =============================================================================
// Canonical Column Names
// =============================================================================

/// Canonical column names of the "Collective Data" and "Cost Model" tables.
pub mod columns {
    pub const ORIGIN_PIN_CODE: &str = "OriginPinCode";
    pub const ORIGIN_LOCALITY: &str = "OriginLocality";
    pub const ORIGIN_CLUSTER_NAME: &str = "OriginClusterName";
    pub const ORIGIN_STATE: &str = "OriginState";
    pub const DESTINATION_PIN_CODE: &str = "DestinationPinCode";
    pub const DESTINATION_CLUSTER_NAME: &str = "DestinationClusterName";
    pub const DESTINATION_LOCALITY: &str = "DestinationLocality";
    pub const DESTINATION_STATE: &str = "DestinationState";
    pub const TRUCK_TYPE: &str = "TruckType";
    pub const VEHICLE_TYPE: &str = "VehicleType";
    pub const VEHICLE_CLASS: &str = "VehicleClass";
    pub const TOLL_VEHICLE_CATEGORY: &str = "TollVehicleCategory";
    pub const CREATED_AT: &str = "CreatedAt";
    pub const SHIPPER_RATE: &str = "ShipperRate";
    pub const FLEET_OWNER_RATE: &str = "FleetOwnerRate";
    pub const LSP_RATE: &str = "LSPRate";
    pub const LEAD_DISTANCE: &str = "LeadDistance";
    pub const ETA: &str = "ETA";
    pub const TOLL_COST: &str = "TollCost";
    pub const TRANSPORTER: &str = "Transporter";
    pub const CATEGORY: &str = "Category";
    pub const RATING: &str = "Rating";
    pub const RATE_TYPE: &str = "RateType";

    pub const ORIGIN: &str = "Origin";
    pub const DESTINATION: &str = "Destination";
    pub const LEAD_DISTANCE_KM: &str = "LeadDistanceKM";
    pub const TAT: &str = "TAT";
    pub const FIXED_COST_PER_DAY: &str = "FixedCostPerDay";
    pub const VARIABLE_COST_PER_KM: &str = "VariableCostPerKM";
    pub const TOTAL_COST_PER_TRIP: &str = "TotalCostPerTrip";
    pub const TRANSPORTER_MARGIN_PCT: &str = "TransporterMarginPct";
    pub const TOTAL_FREIGHT_COST_PER_TRIP: &str = "TotalFreightCostPerTrip";

    /// Join keys between an uploaded cost request and the cost model.
    pub const COST_JOIN_KEYS: [&str; 3] = [ORIGIN, DESTINATION, TRUCK_TYPE];
}

// =============================================================================
// Cell Value
// =============================================================================

/// A single cell.
///
/// Serializes to JSON `null`, a number, a string, or an ISO-8601 timestamp.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Missing,
    Number(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Build a text value, mapping blank strings to [`Value::Missing`].
    pub fn text(s: impl AsRef<str>) -> Self {
        let s = s.as_ref().trim();
        if s.is_empty() {
            Value::Missing
        } else {
            Value::Text(s.to_string())
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Textual key used for grouping and joining.
    ///
    /// Integral numbers render without a fractional part so that `32.0`
    /// read from a numeric cell groups with the text `"32"`.
    pub fn group_key(&self) -> Option<String> {
        match self {
            Value::Missing => None,
            Value::Text(s) => Some(s.clone()),
            Value::Number(n) => Some(format_number(*n)),
            Value::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

/// Render a number the way a spreadsheet user typed it.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Missing => serializer.serialize_none(),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Timestamp(ts) => {
                serializer.serialize_str(&ts.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Option<f64>> for Value {
    fn from(n: Option<f64>) -> Self {
        n.map(Value::Number).unwrap_or(Value::Missing)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(ts: NaiveDateTime) -> Self {
        Value::Timestamp(ts)
    }
}

// =============================================================================
// Table
// =============================================================================

/// Ordered columns over ordered rows.
///
/// Every row has exactly `columns.len()` cells. Tables are never mutated
/// after loading; filters return new tables that keep source row order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from string column names and rows.
    ///
    /// Short rows are padded with [`Value::Missing`], long rows truncated.
    pub fn from_rows<C, R>(columns: C, rows: R) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        R: IntoIterator<Item = Vec<Value>>,
    {
        let mut table = Self::new(columns.into_iter().map(Into::into).collect());
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Missing);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of `name`, or a [`AggregationError::MissingField`] tagged with `operation`.
    pub fn require_column(&self, operation: &'static str, name: &str) -> AggregationResult<usize> {
        self.column_index(name)
            .ok_or_else(|| AggregationError::MissingField {
                operation,
                field: name.to_string(),
            })
    }

    /// Cell at `row` in column `name`, if both exist.
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let col = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// New table with the same columns and the rows matching `keep`.
    pub fn filter<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[Value]) -> bool,
    {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_records(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let obj = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.clone(), serde_json::to_value(v).unwrap_or_default()))
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect()
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("columns", &self.columns)?;
        map.serialize_entry("rows", &self.rows)?;
        map.end()
    }
}
