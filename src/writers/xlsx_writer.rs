/// Xlsx artifact writer
///
/// Every artifact is written completely to a temporary file next to its destination and
/// then renamed over it, so readers never observe a half-written workbook.
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::table::{Table, Value};

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Xlsx error: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Table '{sheet}' is too wide for a worksheet ({columns} columns)")]
    TooWide { sheet: String, columns: usize },
}

/// Write `sheets` (name, table) into one workbook at `path`, replacing it atomically
#[instrument(skip(sheets), fields(path = %path.display(), sheets = sheets.len()))]
pub fn write_workbook(path: &Path, sheets: &[(&str, &Table)]) -> Result<(), WriteError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|source| WriteError::Io {
        path: dir.clone(),
        source,
    })?;

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let date = Format::new().set_num_format("yyyy-mm-dd");
    let datetime = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");

    for (name, table) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name)?;
        write_table(worksheet, name, table, &header, &date, &datetime)?;
        debug!("Sheet '{}': {} rows", name, table.row_count());
    }

    let tmp = NamedTempFile::new_in(&dir).map_err(|source| WriteError::Io {
        path: dir.clone(),
        source,
    })?;
    workbook.save(tmp.path())?;
    tmp.persist(path).map_err(|e| WriteError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    info!("Wrote {}", path.display());
    Ok(())
}

fn write_table(
    worksheet: &mut Worksheet,
    name: &str,
    table: &Table,
    header: &Format,
    date: &Format,
    datetime: &Format,
) -> Result<(), WriteError> {
    if table.columns().len() > u16::MAX as usize {
        return Err(WriteError::TooWide {
            sheet: name.to_string(),
            columns: table.columns().len(),
        });
    }

    for (col, column) in table.columns().iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, column, header)?;
    }

    for (i, row) in table.rows().iter().enumerate() {
        let r = i as u32 + 1;
        for (col, value) in row.iter().enumerate() {
            let c = col as u16;
            match value {
                Value::Null => {}
                Value::Number(f) if f.is_finite() => {
                    worksheet.write_number(r, c, *f)?;
                }
                Value::Number(_) => {}
                Value::Text(s) => {
                    worksheet.write_string(r, c, s)?;
                }
                Value::Date(d) => {
                    worksheet.write_datetime_with_format(r, c, d, date)?;
                }
                Value::DateTime(dt) => {
                    worksheet.write_datetime_with_format(r, c, dt, datetime)?;
                }
            }
        }
    }
    Ok(())
}
