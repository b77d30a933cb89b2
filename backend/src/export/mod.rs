//! Excel report of the dashboard views.
//!
//! One "Summary" sheet followed by one sheet per view. Views without data
//! get a single line explaining why.

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::path::Path;

use crate::api::logs::{log_info, log_success};
use crate::dashboard::{DashboardViews, View};
use crate::error::ExportError;
use crate::models::{Table, Value};
use crate::transform::aggregate::{
    BubbleCell, FrequencyEntry, GroupCount, GroupTotal, MonthlyCount, TransporterSummaryRow,
};
use crate::transform::pipeline::{DatasetSummary, JoinedUpload};

pub const SUMMARY_SHEET: &str = "Summary";
pub const JOINED_SHEET: &str = "JoinedCostTable";

fn xlsx(e: XlsxError) -> ExportError {
    ExportError::Xlsx(e.to_string())
}

/// Sheet content: a table, or the reason there is none.
type SheetContent = Result<Table, String>;

/// Everything one report contains.
pub struct Report<'a> {
    pub summary: &'a DatasetSummary,
    pub views: &'a DashboardViews,
    pub joined: Option<&'a JoinedUpload>,
}

impl Report<'_> {
    /// Write the report to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        let path = path.as_ref();
        log_info(format!("📝 Writing report {}", path.display()));
        let mut workbook = self.build()?;
        workbook.save(path).map_err(xlsx)?;
        log_success(format!("Report written: {}", path.display()));
        Ok(())
    }

    /// The report as xlsx bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ExportError> {
        self.build()?.save_to_buffer().map_err(xlsx)
    }

    fn build(&self) -> Result<Workbook, ExportError> {
        let bold = Format::new().set_bold();
        let mut workbook = Workbook::new();

        let sheet = workbook.add_worksheet();
        sheet.set_name(SUMMARY_SHEET).map_err(xlsx)?;
        self.write_summary(sheet, &bold)?;

        for (name, content) in self.sheets() {
            let sheet = workbook.add_worksheet();
            sheet.set_name(name).map_err(xlsx)?;
            match content {
                Ok(table) => write_table(sheet, &table, &bold)?,
                Err(reason) => {
                    sheet.write_string(0, 0, reason).map_err(xlsx)?;
                }
            }
        }
        Ok(workbook)
    }

    fn write_summary(&self, sheet: &mut Worksheet, bold: &Format) -> Result<(), ExportError> {
        let s = self.summary;
        sheet
            .write_string_with_format(0, 0, "ODVT Dashboard Report", bold)
            .map_err(xlsx)?;

        let mut lines: Vec<(String, Value)> = vec![
            ("Source".into(), Value::text(&s.source)),
            ("Trips schema version".into(), Value::text(&s.trips.version)),
            ("Trip rows read".into(), Value::Number(s.trips.rows_read as f64)),
            ("Trip rows kept".into(), Value::Number(s.trips.rows_kept as f64)),
            ("Trip rows dropped".into(), Value::Number(s.trips.rows_dropped as f64)),
            ("Cost model schema version".into(), Value::text(&s.cost_model.version)),
            ("Cost model rows kept".into(), Value::Number(s.cost_model.rows_kept as f64)),
            ("Trips after filters".into(), Value::Number(self.views.trip_count as f64)),
        ];
        if let Some(joined) = self.joined {
            lines.push(("Uploaded file".into(), Value::text(&joined.file_name)));
            lines.push(("Uploaded rows matched".into(), Value::Number(joined.matched as f64)));
        }
        for (name, status) in self.views.statuses() {
            lines.push((format!("View {name}"), Value::text(status)));
        }

        for (i, (label, value)) in lines.iter().enumerate() {
            let row = i as u32 + 2;
            sheet.write_string(row, 0, label).map_err(xlsx)?;
            write_value(sheet, row, 1, value)?;
        }
        Ok(())
    }

    fn sheets(&self) -> Vec<(&'static str, SheetContent)> {
        let v = self.views;
        let mut sheets = vec![
            (
                "ShipperRateByType",
                content(&v.shipper_rate_by_type, |d| totals(d, "RateType", "ShipperRate")),
            ),
            (
                "VehicleCategoryCounts",
                content(&v.vehicle_category_counts, |d| counts(d, "Category")),
            ),
            ("ODAverageTable", content(&v.od_average_table, Table::clone)),
            (
                "TopOriginPincodes",
                content(&v.top_origin_pincodes, |d| frequencies(d, "OriginPinCode")),
            ),
            (
                "TopDestinationPincodes",
                content(&v.top_destination_pincodes, |d| {
                    frequencies(d, "DestinationPinCode")
                }),
            ),
            ("TransporterSummaryTable", content(&v.transporter_summary_table, |d| transporters(d))),
            ("MonthlyTripTrend", content(&v.monthly_trip_trend, |d| months(d))),
            ("BubbleMatrixTable", content(&v.bubble_matrix_table, |d| bubbles(d))),
        ];
        if let Some(joined) = self.joined {
            sheets.push((JOINED_SHEET, Ok(joined.table.clone())));
        }
        sheets
    }
}

fn content<T>(view: &View<T>, to_table: impl Fn(&T) -> Table) -> SheetContent {
    match view {
        View::Data { data } => Ok(to_table(data)),
        View::NoData => Err("No data for the selected filters".to_string()),
        View::Unavailable { reason } => Err(format!("Unavailable: {reason}")),
    }
}

fn write_table(sheet: &mut Worksheet, table: &Table, bold: &Format) -> Result<(), ExportError> {
    for (c, name) in table.columns().iter().enumerate() {
        sheet
            .write_string_with_format(0, c as u16, name, bold)
            .map_err(xlsx)?;
    }
    for (r, row) in table.rows().iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            write_value(sheet, r as u32 + 1, c as u16, value)?;
        }
    }
    Ok(())
}

fn write_value(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &Value,
) -> Result<(), ExportError> {
    match value {
        Value::Missing => {}
        Value::Number(n) => {
            sheet.write_number(row, col, *n).map_err(xlsx)?;
        }
        Value::Text(s) => {
            sheet.write_string(row, col, s).map_err(xlsx)?;
        }
        Value::Timestamp(ts) => {
            sheet
                .write_string(row, col, ts.format("%Y-%m-%d %H:%M:%S").to_string())
                .map_err(xlsx)?;
        }
    }
    Ok(())
}

// =============================================================================
// View → Table
// =============================================================================

fn totals(rows: &[GroupTotal], key: &str, value: &str) -> Table {
    Table::from_rows(
        [key, value],
        rows.iter()
            .map(|r| vec![Value::text(&r.key), Value::Number(r.total)]),
    )
}

fn counts(rows: &[GroupCount], key: &str) -> Table {
    Table::from_rows(
        [key, "Count"],
        rows.iter()
            .map(|r| vec![Value::text(&r.key), Value::Number(r.count as f64)]),
    )
}

fn frequencies(rows: &[FrequencyEntry], field: &str) -> Table {
    Table::from_rows(
        [field, "Trips"],
        rows.iter()
            .map(|r| vec![Value::text(&r.value), Value::Number(r.count as f64)]),
    )
}

fn transporters(rows: &[TransporterSummaryRow]) -> Table {
    Table::from_rows(
        ["Transporter", "MeanRating", "Trips", "TotalShipperRate", "UniqueOrigins"],
        rows.iter().map(|r| {
            vec![
                Value::text(&r.transporter),
                Value::from(r.mean_rating),
                Value::Number(r.trip_count as f64),
                Value::Number(r.total_shipper_rate),
                Value::Number(r.unique_origin_destination_count as f64),
            ]
        }),
    )
}

fn months(rows: &[MonthlyCount]) -> Table {
    Table::from_rows(
        ["Month", "Trips"],
        rows.iter()
            .map(|r| vec![Value::Text(r.label()), Value::Number(r.count as f64)]),
    )
}

fn bubbles(rows: &[BubbleCell]) -> Table {
    Table::from_rows(
        ["OriginState", "DestinationState", "Trips"],
        rows.iter().map(|r| {
            vec![
                Value::text(&r.row),
                Value::text(&r.col),
                Value::Number(r.count as f64),
            ]
        }),
    )
}
