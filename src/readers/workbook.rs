use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use chrono::NaiveDateTime;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::table::Value;
use crate::utils::excel_serial_to_datetime;

#[derive(Error, Debug)]
pub enum WorkbookError {
    #[error("Failed to open workbook {path}: {msg}")]
    Open { path: PathBuf, msg: String },

    #[error("Failed to read sheet '{sheet}': {msg}")]
    Sheet { sheet: String, msg: String },
}

/// Anything that can hand out named sheets as calamine grids
///
/// `Ok(None)` means the sheet does not exist; `Err` means the workbook itself could not
/// be read.
pub trait SheetSource {
    fn sheet_names(&self) -> Vec<String>;

    fn sheet_range(&mut self, name: &str) -> Result<Option<Range<Data>>, WorkbookError>;
}

/// A workbook file on disk (xlsx, xlsm, xls or ods)
pub struct Workbook {
    path: PathBuf,
    sheets: Sheets<BufReader<File>>,
}

impl Workbook {
    /// Open a workbook; the format is detected from the file extension
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WorkbookError> {
        let path = path.as_ref().to_path_buf();
        info!("Opening workbook: {}", path.display());

        let sheets = open_workbook_auto(&path).map_err(|e| WorkbookError::Open {
            path: path.clone(),
            msg: e.to_string(),
        })?;

        debug!("Found {} sheets", sheets.sheet_names().len());
        Ok(Self { path, sheets })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SheetSource for Workbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    fn sheet_range(&mut self, name: &str) -> Result<Option<Range<Data>>, WorkbookError> {
        if !self.sheets.sheet_names().iter().any(|s| s == name) {
            return Ok(None);
        }
        self.sheets
            .worksheet_range(name)
            .map(Some)
            .map_err(|e| WorkbookError::Sheet {
                sheet: name.to_string(),
                msg: e.to_string(),
            })
    }
}

/// Sheets already held in memory, e.g. grids produced by another reader
#[derive(Default)]
pub struct InMemoryWorkbook {
    sheets: Vec<(String, Range<Data>)>,
}

impl InMemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, name: impl Into<String>, range: Range<Data>) -> Self {
        self.sheets.push((name.into(), range));
        self
    }
}

impl SheetSource for InMemoryWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(n, _)| n.clone()).collect()
    }

    fn sheet_range(&mut self, name: &str) -> Result<Option<Range<Data>>, WorkbookError> {
        Ok(self
            .sheets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r.clone()))
    }
}

/// Convert a calamine cell into a table value
pub fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::Number(*i as f64),
        Data::Float(f) => Value::Number(*f),
        Data::String(s) if s.trim().is_empty() => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::Bool(b) => Value::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(excel_date) => excel_date
            .as_datetime()
            .or_else(|| excel_serial_to_datetime(excel_date.as_f64()))
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .map(Value::DateTime)
            .unwrap_or_else(|_| Value::Text(s.clone())),
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}

/// Read one cell by absolute 0-based coordinates; cells outside the used area are null
pub fn cell_at(range: &Range<Data>, row: u32, col: u32) -> Value {
    range
        .get_value((row, col))
        .map(cell_to_value)
        .unwrap_or(Value::Null)
}

/// Absolute index of the last used row and column, if the sheet has any cells
pub fn used_extent(range: &Range<Data>) -> Option<(u32, u32)> {
    range.end()
}
