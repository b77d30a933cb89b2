//! Workbook and CSV readers producing raw [`Table`]s.
//!
//! Reading never interprets column meaning: headers are returned as
//! written and cells keep their spreadsheet type. Schema resolution and
//! coercion happen in [`crate::transform::normalizer`].

use calamine::{
    open_workbook_auto, open_workbook_auto_from_rs, Data, DataType, Range, Reader, Sheets,
};
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use crate::error::{SheetError, SheetResult};
use crate::models::{Table, Value};
use crate::schema::{COLLECTIVE_DATA_SHEET, COST_MODEL_SHEET};

/// The two sheets every ODVT workbook must carry.
#[derive(Debug, Clone)]
pub struct RawWorkbook {
    pub collective: Table,
    pub cost_model: Table,
}

/// Result of parsing delimited text, with detected settings.
#[derive(Debug, Clone)]
pub struct ParsedCsv {
    pub table: Table,
    pub encoding: String,
    pub delimiter: char,
}

// =============================================================================
// Workbooks
// =============================================================================

/// Read the "Collective Data" and "Cost Model" sheets of a workbook on disk.
pub fn read_workbook<P: AsRef<Path>>(path: P) -> SheetResult<RawWorkbook> {
    let path = path.as_ref();
    std::fs::metadata(path)?;
    let mut sheets = open_workbook_auto(path).map_err(|e| SheetError::Workbook(e.to_string()))?;
    read_required_sheets(&mut sheets)
}

/// Same as [`read_workbook`] for an in-memory workbook.
pub fn read_workbook_bytes(bytes: &[u8]) -> SheetResult<RawWorkbook> {
    let mut sheets = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| SheetError::Workbook(e.to_string()))?;
    read_required_sheets(&mut sheets)
}

fn read_required_sheets<RS: Read + Seek>(sheets: &mut Sheets<RS>) -> SheetResult<RawWorkbook> {
    Ok(RawWorkbook {
        collective: read_sheet(sheets, COLLECTIVE_DATA_SHEET)?,
        cost_model: read_sheet(sheets, COST_MODEL_SHEET)?,
    })
}

/// Read one sheet by its exact, case-sensitive name.
pub fn read_sheet<RS: Read + Seek>(sheets: &mut Sheets<RS>, name: &str) -> SheetResult<Table> {
    let available = sheets.sheet_names();
    if !available.iter().any(|s| s == name) {
        return Err(SheetError::MissingSheet {
            sheet: name.to_string(),
            available,
        });
    }
    let range = sheets
        .worksheet_range(name)
        .map_err(|e| SheetError::Workbook(e.to_string()))?;
    range_to_table(name, &range)
}

/// First row is the header; rows with no value at all are skipped.
fn range_to_table(sheet: &str, range: &Range<Data>) -> SheetResult<Table> {
    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| SheetError::EmptySheet(sheet.to_string()))?;
    let columns: Vec<String> = header
        .iter()
        .map(|cell| cell_to_value(cell).group_key().unwrap_or_default())
        .collect();

    let mut table = Table::new(columns);
    for row in rows {
        let values: Vec<Value> = row.iter().map(cell_to_value).collect();
        if values.iter().all(Value::is_missing) {
            continue;
        }
        table.push_row(values);
    }
    Ok(table)
}

/// Convert a spreadsheet cell. Error cells read as missing.
pub fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::Number(*i as f64),
        Data::Float(f) => Value::Number(*f),
        Data::String(s) => Value::text(s),
        Data::Bool(b) => Value::Text(b.to_string()),
        Data::DateTime(_) => cell.as_datetime().map(Value::Timestamp).unwrap_or_default(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::text(s),
        Data::Error(_) | Data::Empty => Value::Missing,
    }
}

// =============================================================================
// Uploads
// =============================================================================

/// Spreadsheet container formats recognized by file extension.
const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Read an uploaded cost request: the first sheet of a workbook, or a CSV file.
pub fn read_upload(bytes: &[u8], file_name: &str) -> SheetResult<Table> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) || bytes.starts_with(b"PK\x03\x04") {
        let mut sheets = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| SheetError::Workbook(e.to_string()))?;
        let first = sheets
            .sheet_names()
            .into_iter()
            .next()
            .ok_or_else(|| SheetError::EmptySheet(file_name.to_string()))?;
        return read_sheet(&mut sheets, &first);
    }

    Ok(parse_csv_bytes(bytes)?.table)
}

/// Detect the encoding of raw bytes using chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes using the given encoding, falling back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> SheetResult<String> {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(enc) => enc.decode(bytes).0.into_owned(),
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    };
    Ok(decoded.trim_start_matches('\u{feff}').to_string())
}

/// Pick the separator occurring most often in the first line.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = ',';
    let mut best_count = 0;
    for sep in [',', ';', '\t', '|'] {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }
    best_sep
}

/// Parse delimited text with auto-detected encoding and delimiter.
pub fn parse_csv_bytes(bytes: &[u8]) -> SheetResult<ParsedCsv> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    if content.trim().is_empty() {
        return Err(SheetError::EmptySheet("uploaded file".to_string()));
    }
    let delimiter = detect_delimiter(&content);
    let table = parse_csv_str(&content, delimiter)?;
    Ok(ParsedCsv {
        table,
        encoding,
        delimiter,
    })
}

/// Parse delimited text with an explicit delimiter. Blank lines are skipped.
pub fn parse_csv_str(content: &str, delimiter: char) -> SheetResult<Table> {
    let delimiter = u8::try_from(delimiter)
        .map_err(|_| SheetError::Encoding(format!("unsupported delimiter '{delimiter}'")))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut table = Table::new(columns);
    for record in reader.records() {
        let record = record?;
        let values: Vec<Value> = record.iter().map(Value::text).collect();
        if values.iter().all(Value::is_missing) {
            continue;
        }
        table.push_row(values);
    }
    Ok(table)
}
