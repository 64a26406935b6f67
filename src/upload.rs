//! Upload boundary: turns a delimited-text or spreadsheet file into a raw
//! [`RecordTable`]. Unsupported inputs are rejected here, before any
//! cleaning stage runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calamine::{Data, Reader, open_workbook_auto};
use log::{debug, info};
use thiserror::Error;

use crate::{
    data::{Value, excel_serial_to_date, parse_naive_date},
    io_utils,
    record::{Cell, RecordTable, Row},
};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(
        "Unsupported upload format '{0}': expected .csv, .tsv, .txt, .xlsx, .xlsm, .xlsb, .xls or .ods"
    )]
    UnsupportedFormat(String),
    #[error("Upload {0:?} has no header row")]
    MissingHeader(PathBuf),
    #[error("Workbook {0:?} contains no sheets")]
    EmptyWorkbook(PathBuf),
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),
    #[error("Spreadsheet read error: {0}")]
    Spreadsheet(#[from] calamine::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Delimited(u8),
    Spreadsheet,
}

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

impl UploadFormat {
    /// Picks the reader from the extension. An explicit delimiter forces text.
    pub fn detect(path: &Path, delimiter: Option<u8>) -> Result<Self, UploadError> {
        if let Some(delimiter) = delimiter {
            return Ok(Self::Delimited(delimiter));
        }
        if io_utils::is_dash(path) {
            return Ok(Self::Delimited(io_utils::DEFAULT_CSV_DELIMITER));
        }
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "csv" | "txt" => Ok(Self::Delimited(io_utils::DEFAULT_CSV_DELIMITER)),
            "tsv" | "tab" => Ok(Self::Delimited(io_utils::DEFAULT_TSV_DELIMITER)),
            ext if SPREADSHEET_EXTENSIONS.contains(&ext) => Ok(Self::Spreadsheet),
            "" => Err(UploadError::UnsupportedFormat(path.display().to_string())),
            other => Err(UploadError::UnsupportedFormat(format!(".{other}"))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub delimiter: Option<u8>,
    pub encoding: Option<String>,
    pub sheet: Option<String>,
}

pub fn load(path: &Path, options: &UploadOptions) -> Result<RecordTable> {
    let format = UploadFormat::detect(path, options.delimiter)?;
    debug!("Reading {path:?} as {format:?}");
    let table = match format {
        UploadFormat::Delimited(delimiter) => {
            read_delimited(path, delimiter, options.encoding.as_deref())?
        }
        UploadFormat::Spreadsheet => read_spreadsheet(path, options.sheet.as_deref())?,
    };
    if table.is_empty() {
        info!("Upload {path:?} has a header row but no data rows");
    }
    Ok(table)
}

fn text_cell(raw: String) -> Cell {
    if raw.is_empty() { None } else { Some(Value::Text(raw)) }
}

pub fn read_delimited(path: &Path, delimiter: u8, encoding: Option<&str>) -> Result<RecordTable> {
    let encoding = io_utils::resolve_encoding(encoding)?;
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)
        .with_context(|| format!("Reading header row of {path:?}"))?;
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(UploadError::MissingHeader(path.to_path_buf()).into());
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", idx + 2))?;
        let decoded = io_utils::decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {}", idx + 2))?;
        rows.push(decoded.into_iter().map(text_cell).collect::<Row>());
    }
    Ok(RecordTable::new(headers, rows))
}

pub fn read_spreadsheet(path: &Path, sheet: Option<&str>) -> Result<RecordTable> {
    let mut workbook = open_workbook_auto(path).map_err(UploadError::from)?;
    let sheet_names = workbook.sheet_names().to_vec();
    let sheet_name = match sheet {
        Some(name) => sheet_names
            .iter()
            .find(|candidate| candidate.as_str() == name)
            .cloned()
            .ok_or_else(|| UploadError::SheetNotFound(name.to_string()))?,
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| UploadError::EmptyWorkbook(path.to_path_buf()))?,
    };
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(UploadError::from)?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|row| row.iter().map(header_text).collect::<Vec<_>>())
        .filter(|headers| headers.iter().any(|h| !h.trim().is_empty()))
        .ok_or_else(|| UploadError::MissingHeader(path.to_path_buf()))?;
    let rows = rows
        .map(|row| row.iter().map(spreadsheet_cell).collect::<Row>())
        .collect::<Vec<_>>();
    debug!("Sheet '{sheet_name}' yielded {} data row(s)", rows.len());
    Ok(RecordTable::new(headers, rows))
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn spreadsheet_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => text_cell(s.clone()),
        Data::Float(f) => Some(Value::Number(*f)),
        Data::Int(i) => Some(Value::Integer(*i)),
        Data::Bool(b) => Some(Value::Text(b.to_string())),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()).map(Value::Date),
        Data::DateTimeIso(s) => Some(
            parse_naive_date(s)
                .map(Value::Date)
                .unwrap_or_else(|_| Value::Text(s.clone())),
        ),
        Data::DurationIso(s) => Some(Value::Text(s.clone())),
    }
}
