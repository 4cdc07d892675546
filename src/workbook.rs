use std::collections::HashSet;
use std::io::Cursor;
use std::path::PathBuf;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

/// Tokens treated as "no value" when deciding whether a column is numeric.
const MISSING_TOKENS: [&str; 8] = ["-", "n/a", "na", "nan", "nd", "none", "null", "#n/a"];

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("could not read spreadsheet '{name}': {reason}")]
    Unreadable { name: String, reason: String },
    #[error("no sheets found in '{name}'")]
    NoSheets { name: String },
}

/// Where a workbook comes from: a file on disk or an uploaded byte buffer.
#[derive(Clone, Debug)]
pub enum Source {
    Path(PathBuf),
    Upload { name: String, bytes: Vec<u8> },
}

impl Source {
    pub fn display_name(&self) -> String {
        match self {
            Source::Path(p) => p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| p.to_string_lossy().into_owned()),
            Source::Upload { name, .. } => name.clone(),
        }
    }

    fn read(&self) -> Result<SourceFile, IngestError> {
        match self {
            Source::Path(p) => {
                let bytes = std::fs::read(p).map_err(|e| IngestError::Unreadable { name: p.to_string_lossy().into_owned(), reason: e.to_string() })?;
                Ok(SourceFile { name: self.display_name(), path: Some(p.clone()), bytes })
            }
            Source::Upload { name, bytes } => Ok(SourceFile { name: name.clone(), path: None, bytes: bytes.clone() }),
        }
    }
}

/// The untouched bytes of an ingested file, offered back as the "original" download.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub name: String,
    pub path: Option<PathBuf>,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct LoadedWorkbook {
    pub source: SourceFile,
    pub workbook: Workbook,
}

#[derive(Clone, Copy, Debug)]
pub struct IngestOptions {
    /// Minimum share of numeric cells (among non-empty, non-placeholder cells) for a column to be coerced.
    pub numeric_share: f64,
}

impl Default for IngestOptions {
    fn default() -> Self { Self { numeric_share: 1.0 } }
}

#[derive(Clone, Debug, Serialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> { self.sheets.iter().find(|s| s.name == name) }
}

#[derive(Clone, Debug, Serialize)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<Column>,
    rows: usize,
    coerced: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self { ColumnData::Numeric(v) => v.len(), ColumnData::Text(v) => v.len() }
    }

    pub fn is_numeric(&self) -> bool { matches!(self, ColumnData::Numeric(_)) }

    /// Display text of one cell; `None` for a missing value.
    pub fn text(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Numeric(v) => v.get(row).copied().flatten().map(format_number),
            ColumnData::Text(v) => v.get(row).cloned().flatten(),
        }
    }
}

impl Column {
    #[cfg(test)]
    pub fn text(name: &str, values: &[Option<&str>]) -> Self {
        Column { name: name.to_string(), data: ColumnData::Text(values.iter().map(|v| v.map(str::to_string)).collect()) }
    }

    #[cfg(test)]
    pub fn numeric(name: &str, values: &[Option<f64>]) -> Self {
        Column { name: name.to_string(), data: ColumnData::Numeric(values.to_vec()) }
    }
}

impl Sheet {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let rows = columns.iter().map(|c| c.data.len()).max().unwrap_or(0);
        Sheet { name: name.into(), columns, rows, coerced: 0 }
    }

    pub fn rows(&self) -> usize { self.rows }

    pub fn is_empty(&self) -> bool { self.rows == 0 }

    /// Cells that were blanked because they failed numeric coercion.
    pub fn coerced_cells(&self) -> usize { self.coerced }

    pub fn column_names(&self) -> Vec<&str> { self.columns.iter().map(|c| c.name.as_str()).collect() }

    pub fn cell_text(&self, row: usize, col: usize) -> Option<String> {
        self.columns.get(col).and_then(|c| c.data.text(row))
    }

    /// One row as display strings, missing values rendered empty.
    pub fn row_texts(&self, row: usize) -> Vec<String> {
        (0..self.columns.len()).map(|c| self.cell_text(row, c).unwrap_or_default()).collect()
    }

    pub fn exceeds(&self, cap: usize) -> bool { self.rows > cap }
}

pub fn load(source: &Source, options: &IngestOptions) -> Result<LoadedWorkbook, IngestError> {
    let file = source.read()?;
    let workbook = parse_workbook(&file.name, &file.bytes, options)?;
    log::debug!("Loaded '{}' with {} sheet(s)", file.name, workbook.sheets.len());
    Ok(LoadedWorkbook { source: file, workbook })
}

pub fn parse_workbook(name: &str, bytes: &[u8], options: &IngestOptions) -> Result<Workbook, IngestError> {
    let unreadable = |reason: String| IngestError::Unreadable { name: name.to_string(), reason };
    let mut reader = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| unreadable(e.to_string()))?;
    let names = reader.sheet_names();
    if names.is_empty() { return Err(IngestError::NoSheets { name: name.to_string() }); }
    let mut sheets = Vec::with_capacity(names.len());
    for sheet_name in names {
        let range = reader.worksheet_range(&sheet_name).map_err(|e| unreadable(format!("sheet '{}': {}", sheet_name, e)))?;
        let sheet = build_sheet(&sheet_name, &range, options);
        if sheet.coerced > 0 { log::debug!("Sheet '{}': {} cell(s) coerced to missing", sheet_name, sheet.coerced); }
        sheets.push(sheet);
    }
    Ok(Workbook { sheets })
}

fn build_sheet(name: &str, range: &Range<Data>, options: &IngestOptions) -> Sheet {
    let mut rows = range.rows();
    let Some(header) = rows.next() else { return Sheet::new(name, vec![]) };
    let body: Vec<&[Data]> = rows.collect();
    let names = unique_headers(header);
    let mut coerced = 0;
    let mut columns = Vec::with_capacity(names.len());
    for (idx, col_name) in names.into_iter().enumerate() {
        let cells: Vec<&Data> = body.iter().map(|r| r.get(idx).unwrap_or(&Data::Empty)).collect();
        let (data, blanked) = infer_column(&cells, options.numeric_share);
        coerced += blanked;
        columns.push(Column { name: col_name, data });
    }
    Sheet { name: name.to_string(), columns, rows: body.len(), coerced }
}

fn unique_headers(header: &[Data]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(header.len());
    for (idx, cell) in header.iter().enumerate() {
        let raw = cell_text(cell).unwrap_or_default();
        let base = if raw.trim().is_empty() { format!("Unnamed: {}", idx) } else { raw };
        let mut candidate = base.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", base, n);
            n += 1;
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

/// Only stored numbers count towards the numeric share, so text such as a zero-padded id stays text.
/// Once a column is numeric, string cells are coerced and those that fail become missing.
fn infer_column(cells: &[&Data], numeric_share: f64) -> (ColumnData, usize) {
    let mut present = 0usize;
    let mut numeric = 0usize;
    for cell in cells {
        if is_blank(cell) || is_placeholder(cell) { continue; }
        present += 1;
        if matches!(cell, Data::Float(_) | Data::Int(_)) { numeric += 1; }
    }
    if present > 0 && numeric as f64 / present as f64 >= numeric_share {
        let values: Vec<Option<f64>> = cells.iter().map(|c| numeric_value(c)).collect();
        let blanked = cells.iter().zip(&values).filter(|(c, v)| v.is_none() && !is_blank(c)).count();
        (ColumnData::Numeric(values), blanked)
    } else {
        (ColumnData::Text(cells.iter().map(|c| cell_text(c)).collect()), 0)
    }
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn is_placeholder(cell: &Data) -> bool {
    match cell {
        Data::String(s) => { let t = s.trim().to_lowercase(); MISSING_TOKENS.contains(&t.as_str()) }
        _ => false,
    }
}

fn numeric_value(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f).filter(|v| v.is_finite()),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => if s.is_empty() { None } else { Some(s.clone()) },
        Data::Float(f) => Some(format_number(*f)),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
        Data::DateTime(dt) => Some(excel_serial_to_datetime(dt.as_f64()).map(format_datetime).unwrap_or_else(|| dt.as_f64().to_string())),
        Data::Error(e) => Some(e.to_string()),
        other => Some(other.to_string()),
    }
}

/// Integral values print without a fractional part.
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 { format!("{}", v as i64) } else { format!("{}", v) }
}

fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 { return None; }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.floor();
    let secs = ((serial - days) * 86_400.0).round() as i64;
    base.checked_add_signed(Duration::days(days as i64))?.checked_add_signed(Duration::seconds(secs))
}

fn format_datetime(dt: NaiveDateTime) -> String {
    if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 { dt.format("%Y-%m-%d").to_string() } else { dt.format("%Y-%m-%d %H:%M:%S").to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{xlsx_bytes, Fx};

    #[test]
    fn sheets_keep_source_order_and_columns() {
        let bytes = xlsx_bytes(&[
            ("Summary", vec![vec![Fx::S("Field"), Fx::S("Value")], vec![Fx::S("Sample ID"), Fx::S("TP-1")]]),
            ("Metals", vec![vec![Fx::S("Element"), Fx::S("ppm"), Fx::S("Notes")], vec![Fx::S("Cu"), Fx::N(1.5), Fx::S("ok")]]),
            ("Blank", vec![]),
        ]);
        let wb = parse_workbook("lab.xlsx", &bytes, &IngestOptions::default()).unwrap();
        let names: Vec<&str> = wb.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Summary", "Metals", "Blank"]);
        assert_eq!(wb.sheets[1].column_names(), vec!["Element", "ppm", "Notes"]);
        assert_eq!(wb.sheets[1].rows(), 1);
        assert!(wb.sheets[2].is_empty());
    }

    #[test]
    fn header_only_sheet_is_empty_but_has_columns() {
        let bytes = xlsx_bytes(&[("Results", vec![vec![Fx::S("Analyte"), Fx::S("Result")]])]);
        let wb = parse_workbook("lab.xlsx", &bytes, &IngestOptions::default()).unwrap();
        let sheet = &wb.sheets[0];
        assert_eq!(sheet.rows(), 0);
        assert_eq!(sheet.column_names(), vec!["Analyte", "Result"]);
    }

    #[test]
    fn numeric_columns_coerce_placeholders_to_missing() {
        let bytes = xlsx_bytes(&[("Data", vec![
            vec![Fx::S("pH"), Fx::S("Label")],
            vec![Fx::N(7.25), Fx::S("A")],
            vec![Fx::S("n/a"), Fx::S("B")],
            vec![Fx::N(8.0), Fx::Blank],
        ])]);
        let wb = parse_workbook("lab.xlsx", &bytes, &IngestOptions::default()).unwrap();
        let sheet = &wb.sheets[0];
        assert_eq!(sheet.columns[0].data, ColumnData::Numeric(vec![Some(7.25), None, Some(8.0)]));
        assert_eq!(sheet.coerced_cells(), 1);
        assert_eq!(sheet.row_texts(1), vec!["".to_string(), "B".to_string()]);
        assert_eq!(sheet.row_texts(2), vec!["8".to_string(), "".to_string()]);
    }

    #[test]
    fn mixed_column_stays_text_by_default() {
        let bytes = xlsx_bytes(&[("Data", vec![
            vec![Fx::S("Field"), Fx::S("Value")],
            vec![Fx::S("Sample ID"), Fx::S("TP-2024-0091")],
            vec![Fx::S("pH"), Fx::N(7.1)],
            vec![Fx::S("Temp"), Fx::N(21.0)],
        ])]);
        let wb = parse_workbook("lab.xlsx", &bytes, &IngestOptions::default()).unwrap();
        let value = &wb.sheets[0].columns[1];
        assert!(!value.data.is_numeric());
        assert_eq!(value.data.text(0).as_deref(), Some("TP-2024-0091"));
        assert_eq!(value.data.text(2).as_deref(), Some("21"));
    }

    #[test]
    fn lower_share_threshold_coerces_predominantly_numeric_columns() {
        let bytes = xlsx_bytes(&[("Data", vec![
            vec![Fx::S("Reading")],
            vec![Fx::N(1.0)], vec![Fx::N(2.0)], vec![Fx::N(3.0)], vec![Fx::S("4.5")], vec![Fx::S("broken sensor")],
        ])]);
        let wb = parse_workbook("lab.xlsx", &bytes, &IngestOptions { numeric_share: 0.6 }).unwrap();
        let sheet = &wb.sheets[0];
        assert_eq!(sheet.columns[0].data, ColumnData::Numeric(vec![Some(1.0), Some(2.0), Some(3.0), Some(4.5), None]));
        assert_eq!(sheet.coerced_cells(), 1);
    }

    #[test]
    fn numeric_looking_text_keeps_leading_zeros() {
        let bytes = xlsx_bytes(&[("Summary", vec![
            vec![Fx::S("Field"), Fx::S("Value")],
            vec![Fx::S("Sample ID"), Fx::S("0091")],
            vec![Fx::S("Batch"), Fx::S("007")],
        ])]);
        let wb = parse_workbook("lab.xlsx", &bytes, &IngestOptions::default()).unwrap();
        let value = &wb.sheets[0].columns[1];
        assert!(!value.data.is_numeric());
        assert_eq!(value.data.text(0).as_deref(), Some("0091"));
        assert_eq!(value.data.text(1).as_deref(), Some("007"));
        assert_eq!(wb.sheets[0].coerced_cells(), 0);
    }

    #[test]
    fn blank_and_duplicate_headers_are_made_unique() {
        let bytes = xlsx_bytes(&[("Data", vec![
            vec![Fx::S("Result"), Fx::Blank, Fx::S("Result")],
            vec![Fx::N(1.0), Fx::N(2.0), Fx::N(3.0)],
        ])]);
        let wb = parse_workbook("lab.xlsx", &bytes, &IngestOptions::default()).unwrap();
        assert_eq!(wb.sheets[0].column_names(), vec!["Result", "Unnamed: 1", "Result.1"]);
    }

    #[test]
    fn booleans_render_as_text() {
        let bytes = xlsx_bytes(&[("Data", vec![vec![Fx::S("Passed")], vec![Fx::B(true)], vec![Fx::B(false)]])]);
        let wb = parse_workbook("lab.xlsx", &bytes, &IngestOptions::default()).unwrap();
        assert_eq!(wb.sheets[0].cell_text(0, 0).as_deref(), Some("True"));
        assert_eq!(wb.sheets[0].cell_text(1, 0).as_deref(), Some("False"));
    }

    #[test]
    fn garbage_bytes_are_unreadable() {
        let err = parse_workbook("notes.txt", b"definitely not a spreadsheet", &IngestOptions::default()).unwrap_err();
        assert!(matches!(err, IngestError::Unreadable { .. }));
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = load(&Source::Path(PathBuf::from("/nonexistent/lab/TP_EXAMPLE.xlsx")), &IngestOptions::default()).unwrap_err();
        assert!(matches!(err, IngestError::Unreadable { .. }));
    }

    #[test]
    fn upload_keeps_original_bytes() {
        let bytes = xlsx_bytes(&[("Data", vec![vec![Fx::S("A")], vec![Fx::N(1.0)]])]);
        let loaded = load(&Source::Upload { name: "TP.xlsx".into(), bytes: bytes.clone() }, &IngestOptions::default()).unwrap();
        assert_eq!(loaded.source.bytes, bytes);
        assert_eq!(loaded.source.name, "TP.xlsx");
        assert!(loaded.source.path.is_none());
    }

    #[test]
    fn excel_serials_become_dates() {
        assert_eq!(excel_serial_to_datetime(45292.0).map(format_datetime).as_deref(), Some("2024-01-01"));
        assert_eq!(excel_serial_to_datetime(45292.5).map(format_datetime).as_deref(), Some("2024-01-01 12:00:00"));
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.125), "0.125");
    }
}
