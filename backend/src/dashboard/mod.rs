//! Named dashboard views over a [`Dataset`].
//!
//! Filters are applied first (date bucket, state and transporter
//! selections); every view is then computed independently. A view whose
//! columns are missing becomes [`View::Unavailable`], an empty result
//! [`View::NoData`]. One failing view never hides the others.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::config::{DashboardFilters, DashboardOptions, RatingRange};
use crate::error::{AggregationResult, ConfigError};
use crate::models::columns::*;
use crate::models::Table;
use crate::transform::aggregate::{
    bubble_matrix, filter_by_rating_range, group_count, group_means, group_sum, monthly_trend,
    parse_timestamp, top_n_by_frequency, transporter_summary, BubbleCell, FrequencyEntry,
    GroupCount, GroupTotal, MonthlyCount, TransporterSummaryRow,
};
use crate::transform::pipeline::Dataset;

// =============================================================================
// View Result
// =============================================================================

/// Outcome of one view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum View<T> {
    Data { data: T },
    NoData,
    Unavailable { reason: String },
}

impl<T> View<T> {
    pub fn is_data(&self) -> bool {
        matches!(self, View::Data { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            View::Data { data } => Some(data),
            _ => None,
        }
    }
}

/// Results that can be empty.
pub trait ViewData {
    fn has_rows(&self) -> bool;
}

impl<T> ViewData for Vec<T> {
    fn has_rows(&self) -> bool {
        !self.is_empty()
    }
}

impl ViewData for Table {
    fn has_rows(&self) -> bool {
        !self.is_empty()
    }
}

impl<T: ViewData> From<AggregationResult<T>> for View<T> {
    fn from(result: AggregationResult<T>) -> Self {
        match result {
            Ok(data) if data.has_rows() => View::Data { data },
            Ok(_) => View::NoData,
            Err(e) => View::Unavailable {
                reason: e.to_string(),
            },
        }
    }
}

// =============================================================================
// Views
// =============================================================================

/// Every dashboard view for one set of filters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardViews {
    /// Trips left after filtering
    pub trip_count: usize,
    pub filters: DashboardFilters,
    pub shipper_rate_by_type: View<Vec<GroupTotal>>,
    pub vehicle_category_counts: View<Vec<GroupCount>>,
    pub od_average_table: View<Table>,
    pub top_origin_pincodes: View<Vec<FrequencyEntry>>,
    pub top_destination_pincodes: View<Vec<FrequencyEntry>>,
    pub transporter_summary_table: View<Vec<TransporterSummaryRow>>,
    pub monthly_trip_trend: View<Vec<MonthlyCount>>,
    pub bubble_matrix_table: View<Vec<BubbleCell>>,
}

impl DashboardViews {
    /// Compute every view, using today's date for the date bucket.
    pub fn compute(
        dataset: &Dataset,
        filters: &DashboardFilters,
        options: &DashboardOptions,
    ) -> Result<Self, ConfigError> {
        Self::compute_at(dataset, filters, options, Utc::now().date_naive())
    }

    pub fn compute_at(
        dataset: &Dataset,
        filters: &DashboardFilters,
        options: &DashboardOptions,
        today: NaiveDate,
    ) -> Result<Self, ConfigError> {
        let rating = filters.rating_range()?;
        let trips = apply_filters(&dataset.trips.table, filters, today);

        Ok(Self {
            trip_count: trips.len(),
            filters: filters.clone(),
            shipper_rate_by_type: group_sum(&trips, RATE_TYPE, SHIPPER_RATE).into(),
            vehicle_category_counts: group_count(&trips, CATEGORY).into(),
            od_average_table: group_means(
                &trips,
                &[ORIGIN_LOCALITY, DESTINATION_LOCALITY],
                &[SHIPPER_RATE, ETA, TOLL_COST, LEAD_DISTANCE],
            )
            .into(),
            top_origin_pincodes: top_n_by_frequency(&trips, ORIGIN_PIN_CODE, options.top_n).into(),
            top_destination_pincodes: top_n_by_frequency(
                &trips,
                DESTINATION_PIN_CODE,
                options.top_n,
            )
            .into(),
            transporter_summary_table: rated_transporter_summary(&trips, rating).into(),
            monthly_trip_trend: monthly_trend(&trips, CREATED_AT).into(),
            bubble_matrix_table: state_bubbles(&trips, options.bubble_states).into(),
        })
    }

    /// `(view name, status)` pairs in display order.
    pub fn statuses(&self) -> Vec<(&'static str, &'static str)> {
        fn status<T>(view: &View<T>) -> &'static str {
            match view {
                View::Data { .. } => "data",
                View::NoData => "noData",
                View::Unavailable { .. } => "unavailable",
            }
        }
        vec![
            ("ShipperRateByType", status(&self.shipper_rate_by_type)),
            ("VehicleCategoryCounts", status(&self.vehicle_category_counts)),
            ("ODAverageTable", status(&self.od_average_table)),
            ("TopOriginPincodes", status(&self.top_origin_pincodes)),
            ("TopDestinationPincodes", status(&self.top_destination_pincodes)),
            ("TransporterSummaryTable", status(&self.transporter_summary_table)),
            ("MonthlyTripTrend", status(&self.monthly_trip_trend)),
            ("BubbleMatrixTable", status(&self.bubble_matrix_table)),
        ]
    }
}

fn rated_transporter_summary(
    trips: &Table,
    rating: RatingRange,
) -> AggregationResult<Vec<TransporterSummaryRow>> {
    let rated = filter_by_rating_range(trips, f64::from(rating.low()), f64::from(rating.high()))?;
    transporter_summary(&rated)
}

/// Origin × destination state counts over the `n` busiest states per side.
fn state_bubbles(trips: &Table, n: usize) -> AggregationResult<Vec<BubbleCell>> {
    let origins = top_n_by_frequency(trips, ORIGIN_STATE, n)?;
    let destinations = top_n_by_frequency(trips, DESTINATION_STATE, n)?;
    let values =
        |entries: Vec<FrequencyEntry>| entries.into_iter().map(|e| e.value).collect::<Vec<_>>();
    bubble_matrix(
        trips,
        ORIGIN_STATE,
        DESTINATION_STATE,
        &values(origins),
        &values(destinations),
    )
}

// =============================================================================
// Filtering
// =============================================================================

/// Apply the date bucket, then the state and transporter selections.
///
/// Selections on a column the table lacks are ignored; the views that
/// need that column report it themselves.
pub fn apply_filters(trips: &Table, filters: &DashboardFilters, today: NaiveDate) -> Table {
    let mut table = match (filters.date_range, trips.column_index(CREATED_AT)) {
        (Some(range), Some(idx)) => {
            let start = range.window(today);
            trips.filter(|row| {
                parse_timestamp(&row[idx])
                    .map(|ts| ts.date() >= start && ts.date() <= today)
                    .unwrap_or(false)
            })
        }
        _ => trips.clone(),
    };

    for (column, selection) in [
        (ORIGIN_STATE, &filters.origin_states),
        (DESTINATION_STATE, &filters.destination_states),
        (TRANSPORTER, &filters.transporters),
    ] {
        table = select(&table, column, selection);
    }
    table
}

fn select(table: &Table, column: &str, selection: &[String]) -> Table {
    let Some(idx) = table.column_index(column) else {
        return table.clone();
    };
    if selection.is_empty() {
        return table.clone();
    }
    let wanted: HashSet<&str> = selection.iter().map(String::as_str).collect();
    table.filter(|row| {
        row[idx]
            .group_key()
            .map(|k| wanted.contains(k.as_str()))
            .unwrap_or(false)
    })
}

/// Distinct non-missing values of `column`, sorted, for filter pickers.
pub fn distinct_values(table: &Table, column: &str) -> Vec<String> {
    let Some(idx) = table.column_index(column) else {
        return Vec::new();
    };
    let mut values: Vec<String> = table
        .rows()
        .iter()
        .filter_map(|row| row[idx].group_key())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    values.sort();
    values
}

/// Choices offered by the dashboard's filter controls.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterChoices {
    pub origin_states: Vec<String>,
    pub destination_states: Vec<String>,
    pub transporters: Vec<String>,
    pub date_ranges: Vec<&'static str>,
}

impl FilterChoices {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let trips = &dataset.trips.table;
        Self {
            origin_states: distinct_values(trips, ORIGIN_STATE),
            destination_states: distinct_values(trips, DESTINATION_STATE),
            transporters: distinct_values(trips, TRANSPORTER),
            date_ranges: crate::config::DateRange::ALL.iter().map(|r| r.label()).collect(),
        }
    }
}
