//! Dashboard configuration: process options and per-request filters.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_WORKBOOK: &str = "ODVT.xlsx";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_BUBBLE_STATES: usize = 10;

// =============================================================================
// Process Options
// =============================================================================

/// Options read once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOptions {
    /// Source workbook with "Collective Data" and "Cost Model" sheets
    pub workbook: PathBuf,
    pub port: u16,
    /// Size of the pincode rankings
    pub top_n: usize,
    /// States per axis in the bubble matrix
    pub bubble_states: usize,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            workbook: PathBuf::from(DEFAULT_WORKBOOK),
            port: DEFAULT_PORT,
            top_n: DEFAULT_TOP_N,
            bubble_states: DEFAULT_BUBBLE_STATES,
        }
    }
}

impl DashboardOptions {
    /// Read `ODVT_WORKBOOK`, `ODVT_PORT`, `ODVT_TOP_N` and `ODVT_BUBBLE_STATES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            workbook: lookup("ODVT_WORKBOOK")
                .map(PathBuf::from)
                .unwrap_or(defaults.workbook),
            port: parse_var(&lookup, "ODVT_PORT", defaults.port)?,
            top_n: parse_var(&lookup, "ODVT_TOP_N", defaults.top_n)?,
            bubble_states: parse_var(&lookup, "ODVT_BUBBLE_STATES", defaults.bubble_states)?,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            key: key.to_string(),
            value: raw,
        }),
    }
}

// =============================================================================
// Date Range
// =============================================================================

/// Time window applied to `CreatedAt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DateRange {
    OneYear,
    SixMonths,
    ThreeMonths,
    OneMonth,
    MonthToDate,
}

impl DateRange {
    pub const ALL: [DateRange; 5] = [
        DateRange::OneYear,
        DateRange::SixMonths,
        DateRange::ThreeMonths,
        DateRange::OneMonth,
        DateRange::MonthToDate,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DateRange::OneYear => "1 Year",
            DateRange::SixMonths => "6 Months",
            DateRange::ThreeMonths => "3 Months",
            DateRange::OneMonth => "1 Month",
            DateRange::MonthToDate => "Month to Date",
        }
    }

    /// First day (inclusive) of the window ending on `today`.
    pub fn window(self, today: NaiveDate) -> NaiveDate {
        let start = match self {
            DateRange::OneYear => today.checked_sub_days(Days::new(365)),
            DateRange::SixMonths => today.checked_sub_months(Months::new(6)),
            DateRange::ThreeMonths => today.checked_sub_months(Months::new(3)),
            DateRange::OneMonth => today.checked_sub_months(Months::new(1)),
            DateRange::MonthToDate => today.with_day(1),
        };
        start.unwrap_or(NaiveDate::MIN)
    }
}

impl FromStr for DateRange {
    type Err = ConfigError;

    /// Accepts the camelCase name or the display label, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        DateRange::ALL
            .into_iter()
            .find(|range| {
                let label: String = range.label().chars().filter(|c| c.is_alphanumeric()).collect();
                let name = format!("{range:?}");
                label.to_lowercase() == wanted || name.to_lowercase() == wanted
            })
            .ok_or_else(|| ConfigError::UnknownDateRange(s.to_string()))
    }
}

// =============================================================================
// Rating Range
// =============================================================================

/// Inclusive rating bounds with `1 <= low <= high <= 5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RatingRange {
    low: u8,
    high: u8,
}

impl RatingRange {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(low: u8, high: u8) -> Result<Self, ConfigError> {
        if low < Self::MIN || high > Self::MAX || low > high {
            return Err(ConfigError::InvalidRatingRange { low, high });
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> u8 {
        self.low
    }

    pub fn high(&self) -> u8 {
        self.high
    }
}

impl Default for RatingRange {
    fn default() -> Self {
        Self { low: 2, high: 5 }
    }
}

// =============================================================================
// Filters
// =============================================================================

/// Per-request dashboard filters. Empty selections mean "no restriction".
///
/// List fields accept comma-separated values so they work in query strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardFilters {
    #[serde(deserialize_with = "date_range_opt")]
    pub date_range: Option<DateRange>,
    #[serde(deserialize_with = "comma_list")]
    pub origin_states: Vec<String>,
    #[serde(deserialize_with = "comma_list")]
    pub destination_states: Vec<String>,
    #[serde(deserialize_with = "comma_list")]
    pub transporters: Vec<String>,
    pub rating_low: u8,
    pub rating_high: u8,
}

impl Default for DashboardFilters {
    fn default() -> Self {
        let rating = RatingRange::default();
        Self {
            date_range: None,
            origin_states: Vec::new(),
            destination_states: Vec::new(),
            transporters: Vec::new(),
            rating_low: rating.low,
            rating_high: rating.high,
        }
    }
}

impl DashboardFilters {
    pub fn rating_range(&self) -> Result<RatingRange, ConfigError> {
        RatingRange::new(self.rating_low, self.rating_high)
    }
}

fn comma_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    let items = match Raw::deserialize(deserializer)? {
        Raw::List(items) => items,
        Raw::Joined(joined) => joined.split(',').map(str::to_string).collect(),
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

fn date_range_opt<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateRange>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_rating_range_bounds() {
        assert!(RatingRange::new(1, 5).is_ok());
        assert!(RatingRange::new(3, 3).is_ok());
        assert_eq!(
            RatingRange::new(4, 2),
            Err(ConfigError::InvalidRatingRange { low: 4, high: 2 })
        );
        assert!(RatingRange::new(0, 5).is_err());
        assert!(RatingRange::new(1, 6).is_err());
    }

    #[test]
    fn test_date_windows() {
        let today = date(2024, 8, 31);
        assert_eq!(DateRange::OneYear.window(today), date(2023, 9, 1));
        assert_eq!(DateRange::SixMonths.window(today), date(2024, 2, 29));
        assert_eq!(DateRange::ThreeMonths.window(today), date(2024, 5, 31));
        assert_eq!(DateRange::OneMonth.window(today), date(2024, 7, 31));
        assert_eq!(DateRange::MonthToDate.window(today), date(2024, 8, 1));
    }

    #[test]
    fn test_date_range_parsing() {
        assert_eq!("6 Months".parse::<DateRange>().unwrap(), DateRange::SixMonths);
        assert_eq!("monthToDate".parse::<DateRange>().unwrap(), DateRange::MonthToDate);
        assert_eq!("1year".parse::<DateRange>().unwrap(), DateRange::OneYear);
        assert!(matches!(
            "fortnight".parse::<DateRange>(),
            Err(ConfigError::UnknownDateRange(_))
        ));
    }

    #[test]
    fn test_filters_from_query_like_json() {
        let filters: DashboardFilters = serde_json::from_value(json!({
            "dateRange": "3 Months",
            "originStates": "Maharashtra, Gujarat",
            "transporters": ["X", " "],
            "ratingLow": 1
        }))
        .unwrap();
        assert_eq!(filters.date_range, Some(DateRange::ThreeMonths));
        assert_eq!(filters.origin_states, vec!["Maharashtra", "Gujarat"]);
        assert!(filters.destination_states.is_empty());
        assert_eq!(filters.transporters, vec!["X"]);
        assert_eq!(filters.rating_range().unwrap(), RatingRange::new(1, 5).unwrap());
    }

    #[test]
    fn test_default_filters() {
        let filters = DashboardFilters::default();
        assert_eq!(filters.date_range, None);
        assert_eq!((filters.rating_low, filters.rating_high), (2, 5));
    }

    #[test]
    fn test_options_from_lookup() {
        let vars: HashMap<&str, &str> = [("ODVT_PORT", "8080"), ("ODVT_TOP_N", "5")].into();
        let opts = DashboardOptions::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(opts.port, 8080);
        assert_eq!(opts.top_n, 5);
        assert_eq!(opts.workbook, PathBuf::from(DEFAULT_WORKBOOK));
        assert_eq!(opts.bubble_states, DEFAULT_BUBBLE_STATES);
    }

    #[test]
    fn test_options_reject_bad_env() {
        let err = DashboardOptions::from_lookup(|k| (k == "ODVT_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv { key: "ODVT_PORT".into(), value: "http".into() }
        );
    }
}
