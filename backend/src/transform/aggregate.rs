//! Aggregation engine over normalized tables.
//!
//! Every function here is pure: it reads a [`Table`] and returns a freshly
//! allocated result. Rows whose group key is missing are skipped; missing
//! values never contribute to sums or means. A field the table does not
//! have is an [`AggregationError::MissingField`]; an empty result is not
//! an error.
//!
//! ```text
//! Trip rows                       →  group_sum(RateType, ShipperRate)
//! ┌──────────────────────────┐       ┌────────────────┐
//! │ RateType: Fixed,  100    │       │ Fixed:  150    │
//! │ RateType: Fixed,   50    │  →    │ Market:  30    │
//! │ RateType: Market,  30    │       └────────────────┘
//! └──────────────────────────┘
//! ```
//!
//! Group order is first-seen, which is stable but carries no meaning;
//! only [`top_n_by_frequency`] and [`monthly_trend`] define an order.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use crate::error::{AggregationError, AggregationResult};
use crate::models::columns::{ORIGIN_LOCALITY, RATING, SHIPPER_RATE, TRANSPORTER};
use crate::models::{Table, Value};

// =============================================================================
// Result Types
// =============================================================================

/// Sum of a value field for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub key: String,
    pub total: f64,
}

/// Row count for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupCount {
    pub key: String,
    pub count: usize,
}

/// Occurrences of one distinct value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyEntry {
    pub value: String,
    pub count: usize,
}

/// Per-transporter statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransporterSummaryRow {
    pub transporter: String,
    /// `None` when no trip of this transporter has a rating.
    pub mean_rating: Option<f64>,
    pub trip_count: usize,
    pub total_shipper_rate: f64,
    /// Distinct origin localities served (not distinct origin/destination pairs).
    pub unique_origin_destination_count: usize,
}

/// Trip count for one (row, column) pair of a bubble chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BubbleCell {
    pub row: String,
    pub col: String,
    pub count: usize,
}

/// Trip count for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyCount {
    pub year: i32,
    pub month: u32,
    pub count: usize,
}

impl MonthlyCount {
    /// `YYYY-MM` label.
    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

// =============================================================================
// Insertion-ordered grouping
// =============================================================================

/// Accumulators keyed by group, iterated in first-seen order.
struct OrderedGroups<K, A> {
    index: HashMap<K, usize>,
    entries: Vec<(K, A)>,
}

impl<K: Hash + Eq + Clone, A: Default> OrderedGroups<K, A> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn entry(&mut self, key: K) -> &mut A {
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.len();
                self.index.insert(key.clone(), idx);
                self.entries.push((key, A::default()));
                idx
            }
        };
        &mut self.entries[idx].1
    }

    fn into_entries(self) -> Vec<(K, A)> {
        self.entries
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Sum `value` per distinct `key`, e.g. total ShipperRate by RateType.
pub fn group_sum(table: &Table, key: &str, value: &str) -> AggregationResult<Vec<GroupTotal>> {
    let key_idx = table.require_column("GroupSum", key)?;
    let value_idx = table.require_column("GroupSum", value)?;

    let mut groups: OrderedGroups<String, f64> = OrderedGroups::new();
    for row in table.rows() {
        if let Some(k) = row[key_idx].group_key() {
            let total = groups.entry(k);
            if let Some(v) = row[value_idx].as_f64() {
                *total += v;
            }
        }
    }

    Ok(groups
        .into_entries()
        .into_iter()
        .map(|(key, total)| GroupTotal { key, total })
        .collect())
}

/// Count rows per distinct `key`, e.g. trips by Category.
pub fn group_count(table: &Table, key: &str) -> AggregationResult<Vec<GroupCount>> {
    let key_idx = table.require_column("GroupCount", key)?;

    let mut groups: OrderedGroups<String, usize> = OrderedGroups::new();
    for row in table.rows() {
        if let Some(k) = row[key_idx].group_key() {
            *groups.entry(k) += 1;
        }
    }

    Ok(groups
        .into_entries()
        .into_iter()
        .map(|(key, count)| GroupCount { key, count })
        .collect())
}

/// Mean of each of `fields` per combination of `keys`.
///
/// Returns a table with the key columns followed by one column per field.
/// A group without any value for a field gets [`Value::Missing`] ("no data").
pub fn group_means(table: &Table, keys: &[&str], fields: &[&str]) -> AggregationResult<Table> {
    let key_idx = keys
        .iter()
        .map(|k| table.require_column("GroupMeans", k))
        .collect::<AggregationResult<Vec<_>>>()?;
    let field_idx = fields
        .iter()
        .map(|f| table.require_column("GroupMeans", f))
        .collect::<AggregationResult<Vec<_>>>()?;

    let mut groups: OrderedGroups<Vec<String>, Vec<(f64, usize)>> = OrderedGroups::new();
    'rows: for row in table.rows() {
        let mut group = Vec::with_capacity(key_idx.len());
        for &i in &key_idx {
            match row[i].group_key() {
                Some(k) => group.push(k),
                None => continue 'rows,
            }
        }

        let acc = groups.entry(group);
        acc.resize(field_idx.len(), (0.0, 0));
        for (slot, &i) in acc.iter_mut().zip(&field_idx) {
            if let Some(v) = row[i].as_f64() {
                slot.0 += v;
                slot.1 += 1;
            }
        }
    }

    let columns = keys.iter().chain(fields).map(|s| s.to_string());
    let rows = groups.into_entries().into_iter().map(|(group, acc)| {
        group
            .into_iter()
            .map(Value::Text)
            .chain(acc.into_iter().map(|(sum, n)| {
                if n == 0 {
                    Value::Missing
                } else {
                    Value::Number(sum / n as f64)
                }
            }))
            .collect::<Vec<_>>()
    });

    Ok(Table::from_rows(columns, rows))
}

/// The `n` most frequent values of `field`, most frequent first.
///
/// Ties keep the order in which values first appear in the table.
pub fn top_n_by_frequency(
    table: &Table,
    field: &str,
    n: usize,
) -> AggregationResult<Vec<FrequencyEntry>> {
    let mut counts = group_count(table, field).map_err(|_| AggregationError::MissingField {
        operation: "TopNByFrequency",
        field: field.to_string(),
    })?;

    // sort_by is stable: equal counts stay in first-seen order
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(n);

    Ok(counts
        .into_iter()
        .map(|c| FrequencyEntry {
            value: c.key,
            count: c.count,
        })
        .collect())
}

/// One row per transporter: mean rating, trips, total shipper rate, distinct origins.
pub fn transporter_summary(table: &Table) -> AggregationResult<Vec<TransporterSummaryRow>> {
    const OP: &str = "TransporterSummary";
    let transporter_idx = table.require_column(OP, TRANSPORTER)?;
    let rating_idx = table.require_column(OP, RATING)?;
    let shipper_idx = table.require_column(OP, SHIPPER_RATE)?;
    let origin_idx = table.require_column(OP, ORIGIN_LOCALITY)?;

    #[derive(Default)]
    struct Acc {
        rating_sum: f64,
        ratings: usize,
        trips: usize,
        shipper_total: f64,
        origins: HashSet<String>,
    }

    let mut groups: OrderedGroups<String, Acc> = OrderedGroups::new();
    for row in table.rows() {
        let Some(transporter) = row[transporter_idx].group_key() else {
            continue;
        };
        let acc = groups.entry(transporter);
        acc.trips += 1;
        if let Some(r) = row[rating_idx].as_f64() {
            acc.rating_sum += r;
            acc.ratings += 1;
        }
        if let Some(s) = row[shipper_idx].as_f64() {
            acc.shipper_total += s;
        }
        if let Some(origin) = row[origin_idx].group_key() {
            acc.origins.insert(origin);
        }
    }

    Ok(groups
        .into_entries()
        .into_iter()
        .map(|(transporter, acc)| TransporterSummaryRow {
            transporter,
            mean_rating: (acc.ratings > 0).then(|| acc.rating_sum / acc.ratings as f64),
            trip_count: acc.trips,
            total_shipper_rate: acc.shipper_total,
            unique_origin_destination_count: acc.origins.len(),
        })
        .collect())
}

/// Rows whose Rating lies in `[low, high]` (inclusive). Missing ratings never match.
pub fn filter_by_rating_range(table: &Table, low: f64, high: f64) -> AggregationResult<Table> {
    let rating_idx = table.require_column("FilterByRatingRange", RATING)?;
    Ok(table.filter(|row| {
        row[rating_idx]
            .as_f64()
            .map(|r| r >= low && r <= high)
            .unwrap_or(false)
    }))
}

/// Sparse trip counts over `row_key` × `col_key`, limited to the allow-lists.
///
/// Pairs with no trips are omitted.
pub fn bubble_matrix(
    table: &Table,
    row_key: &str,
    col_key: &str,
    row_allow: &[String],
    col_allow: &[String],
) -> AggregationResult<Vec<BubbleCell>> {
    let row_idx = table.require_column("BubbleMatrix", row_key)?;
    let col_idx = table.require_column("BubbleMatrix", col_key)?;
    let row_allow: HashSet<&str> = row_allow.iter().map(String::as_str).collect();
    let col_allow: HashSet<&str> = col_allow.iter().map(String::as_str).collect();

    let mut groups: OrderedGroups<(String, String), usize> = OrderedGroups::new();
    for row in table.rows() {
        let (Some(r), Some(c)) = (row[row_idx].group_key(), row[col_idx].group_key()) else {
            continue;
        };
        if row_allow.contains(r.as_str()) && col_allow.contains(c.as_str()) {
            *groups.entry((r, c)) += 1;
        }
    }

    Ok(groups
        .into_entries()
        .into_iter()
        .map(|((row, col), count)| BubbleCell { row, col, count })
        .collect())
}

/// Trips per calendar month of `field`, oldest month first.
///
/// Rows whose timestamp cannot be parsed are left out.
pub fn monthly_trend(table: &Table, field: &str) -> AggregationResult<Vec<MonthlyCount>> {
    let ts_idx = table.require_column("MonthlyTrend", field)?;

    let mut months: BTreeMap<(i32, u32), usize> = BTreeMap::new();
    for row in table.rows() {
        if let Some(ts) = parse_timestamp(&row[ts_idx]) {
            *months.entry((ts.year(), ts.month())).or_default() += 1;
        }
    }

    Ok(months
        .into_iter()
        .map(|((year, month), count)| MonthlyCount { year, month, count })
        .collect())
}

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d-%m-%Y %H:%M",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// Parse a timestamp cell: timestamp values, or text in RFC 3339, ISO or day-first form.
pub fn parse_timestamp(value: &Value) -> Option<NaiveDateTime> {
    let s = match value {
        Value::Timestamp(ts) => return Some(*ts),
        Value::Text(s) => s.trim(),
        _ => return None,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::columns::*;

    fn trips() -> Table {
        Table::from_rows(
            [RATE_TYPE, SHIPPER_RATE, TRANSPORTER, RATING, ORIGIN_LOCALITY, CATEGORY],
            vec![
                vec![
                    "Fixed".into(),
                    Value::Number(100.0),
                    "X".into(),
                    Value::Number(4.0),
                    "Pune".into(),
                    "HCV".into(),
                ],
                vec![
                    "Fixed".into(),
                    Value::Number(50.0),
                    "X".into(),
                    Value::Number(5.0),
                    "Pune".into(),
                    "LCV".into(),
                ],
                vec![
                    "Market".into(),
                    Value::Number(30.0),
                    "Y".into(),
                    Value::Number(2.0),
                    "Nashik".into(),
                    "HCV".into(),
                ],
            ],
        )
    }

    #[test]
    fn test_group_sum_by_rate_type() {
        let sums = group_sum(&trips(), RATE_TYPE, SHIPPER_RATE).unwrap();
        assert_eq!(
            sums,
            vec![
                GroupTotal { key: "Fixed".into(), total: 150.0 },
                GroupTotal { key: "Market".into(), total: 30.0 },
            ]
        );
    }

    #[test]
    fn test_group_sum_missing_field() {
        let err = group_sum(&trips(), "Shipper", SHIPPER_RATE).unwrap_err();
        assert_eq!(
            err,
            AggregationError::MissingField { operation: "GroupSum", field: "Shipper".into() }
        );
    }

    #[test]
    fn test_group_count_totals_match_non_missing_rows() {
        let mut table = trips();
        table.push_row(vec![
            "Spot".into(),
            Value::Number(10.0),
            "Z".into(),
            Value::Number(3.0),
            "Pune".into(),
            Value::Missing,
        ]);
        let counts = group_count(&table, CATEGORY).unwrap();
        let total: usize = counts.iter().map(|c| c.count).sum();
        assert_eq!(total, 3);
        assert_eq!(counts[0], GroupCount { key: "HCV".into(), count: 2 });
    }

    #[test]
    fn test_group_means_skips_missing_values() {
        let table = Table::from_rows(
            [ORIGIN_LOCALITY, DESTINATION_LOCALITY, SHIPPER_RATE, ETA],
            vec![
                vec!["Pune".into(), "Delhi".into(), Value::Number(100.0), Value::Number(48.0)],
                vec!["Pune".into(), "Delhi".into(), Value::Number(200.0), Value::Missing],
                vec!["Pune".into(), "Goa".into(), Value::Number(80.0), Value::Missing],
                vec![Value::Missing, "Goa".into(), Value::Number(1.0), Value::Number(1.0)],
            ],
        );
        let keys = [ORIGIN_LOCALITY, DESTINATION_LOCALITY];
        let means = group_means(&table, &keys, &[SHIPPER_RATE, ETA]).unwrap();
        assert_eq!(means.columns(), &[ORIGIN_LOCALITY, DESTINATION_LOCALITY, SHIPPER_RATE, ETA]);
        assert_eq!(means.len(), 2);
        assert_eq!(means.rows()[0][2], Value::Number(150.0));
        assert_eq!(means.rows()[0][3], Value::Number(48.0));
        assert_eq!(means.rows()[1][3], Value::Missing);
    }

    #[test]
    fn test_top_n_stable_on_ties() {
        let table = Table::from_rows(
            [ORIGIN_PIN_CODE],
            ["411001", "110001", "110001", "411001", "560001", "400001", "400001"]
                .into_iter()
                .map(|p| vec![Value::from(p)]),
        );
        let top = top_n_by_frequency(&table, ORIGIN_PIN_CODE, 3).unwrap();
        let values: Vec<&str> = top.iter().map(|e| e.value.as_str()).collect();
        assert_eq!(values, vec!["411001", "110001", "400001"]);
        assert!(top.windows(2).all(|w| w[0].count >= w[1].count));

        let top1 = top_n_by_frequency(&table, ORIGIN_PIN_CODE, 1).unwrap();
        assert_eq!(top1, vec![FrequencyEntry { value: "411001".into(), count: 2 }]);
    }

    #[test]
    fn test_top_n_missing_field_names_operation() {
        let err = top_n_by_frequency(&trips(), DESTINATION_PIN_CODE, 10).unwrap_err();
        assert!(err.to_string().contains("TopNByFrequency"));
    }

    #[test]
    fn test_transporter_summary() {
        let summary = transporter_summary(&trips()).unwrap();
        assert_eq!(summary.len(), 2);
        let x = &summary[0];
        assert_eq!(x.transporter, "X");
        assert_eq!(x.mean_rating, Some(4.5));
        assert_eq!(x.trip_count, 2);
        assert_eq!(x.total_shipper_rate, 150.0);
        assert_eq!(x.unique_origin_destination_count, 1);
    }

    #[test]
    fn test_rating_filter_inclusive() {
        let table = trips();
        assert_eq!(filter_by_rating_range(&table, 1.0, 5.0).unwrap().len(), 3);
        assert_eq!(filter_by_rating_range(&table, 4.0, 5.0).unwrap().len(), 2);
        assert!(filter_by_rating_range(&table, 5.5, 6.0).unwrap().is_empty());
    }

    #[test]
    fn test_rating_filter_full_range_drops_missing() {
        let mut table = trips();
        table.push_row(vec![
            "Spot".into(),
            Value::Number(1.0),
            "Z".into(),
            Value::Missing,
            "Goa".into(),
            "HCV".into(),
        ]);
        assert_eq!(filter_by_rating_range(&table, 1.0, 5.0).unwrap().len(), 3);
    }

    #[test]
    fn test_bubble_matrix_sparse() {
        let table = Table::from_rows(
            [ORIGIN_STATE, DESTINATION_STATE],
            vec![
                vec!["Maharashtra".into(), "Delhi".into()],
                vec!["Maharashtra".into(), "Delhi".into()],
                vec!["Gujarat".into(), "Delhi".into()],
                vec!["Kerala".into(), "Delhi".into()],
            ],
        );
        let allow: Vec<String> = ["Maharashtra", "Gujarat", "Delhi", "Goa"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let cells = bubble_matrix(&table, ORIGIN_STATE, DESTINATION_STATE, &allow, &allow).unwrap();
        assert_eq!(
            cells,
            vec![
                BubbleCell { row: "Maharashtra".into(), col: "Delhi".into(), count: 2 },
                BubbleCell { row: "Gujarat".into(), col: "Delhi".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_monthly_trend_chronological() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(10, 0, 0).unwrap();
        let table = Table::from_rows(
            [CREATED_AT],
            vec![
                vec!["2024-03-02 08:00:00".into()],
                vec![Value::Timestamp(ts)],
                vec!["not a date".into()],
                vec!["05/03/2024".into()],
                vec!["2023-12-31T23:59:59+05:30".into()],
                vec![Value::Missing],
            ],
        );
        let trend = monthly_trend(&table, CREATED_AT).unwrap();
        let labels: Vec<(String, usize)> = trend.iter().map(|m| (m.label(), m.count)).collect();
        assert_eq!(
            labels,
            vec![("2023-12".to_string(), 1), ("2024-01".to_string(), 1), ("2024-03".to_string(), 2)]
        );
    }

    #[test]
    fn test_empty_table_yields_empty_results() {
        let table = Table::new(vec![RATE_TYPE.into(), SHIPPER_RATE.into()]);
        assert!(group_sum(&table, RATE_TYPE, SHIPPER_RATE).unwrap().is_empty());
        assert!(group_count(&table, RATE_TYPE).unwrap().is_empty());
    }
}
