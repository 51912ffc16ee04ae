/// Per-sheet processing and column-wise assembly
///
/// Every configured sheet goes through the same steps: optional shift averaging, the
/// start-date filter, then prefixing. The processed sheets of one workbook are then
/// placed side by side and their date columns collapsed into a single `Date` column.
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::{PipelineConfig, SheetSpec};
use crate::reconcile::shift_averaging::{average_shift_pairs, DATE_COLUMN};
use crate::reconcile::Outcome;
use crate::table::{Table, Value};

/// Name of the collapsed date column of an assembled table
pub const ASSEMBLED_DATE_COLUMN: &str = "Date";

#[derive(Error, Debug, PartialEq)]
pub enum AssembleError {
    #[error("Sheet '{sheet}' has {found} rows but '{reference}' has {expected}")]
    RowCountMismatch {
        reference: String,
        expected: usize,
        sheet: String,
        found: usize,
    },

    #[error("Row {row} is dated {expected} in '{reference}' but {found} in '{sheet}'")]
    DateMisaligned {
        row: usize,
        reference: String,
        expected: NaiveDate,
        sheet: String,
        found: NaiveDate,
    },

    #[error("The {0} table has no Date column")]
    MissingDateColumn(String),
}

/// `DATE` itself or any prefixed `*_DATE` column
pub fn is_date_column(name: &str) -> bool {
    let upper = name.trim().to_uppercase();
    upper == DATE_COLUMN || upper.ends_with("_DATE")
}

/// Keep rows dated on or after `start`; the date column is normalized to calendar dates
///
/// Unparseable dates fail the threshold. A table without a date column is returned
/// unchanged.
pub fn filter_by_start_date(mut table: Table, start: NaiveDate) -> Table {
    let Some(idx) = table.find_column(DATE_COLUMN) else {
        warn!("No DATE column, keeping all {} rows", table.row_count());
        return table;
    };

    table.map_column(idx, |v| Value::from(v.as_date()));
    let before = table.row_count();
    table.retain_rows(|row| matches!(row[idx], Value::Date(d) if d >= start));
    debug!(
        "Date filter kept {} of {} rows (start {})",
        table.row_count(),
        before,
        start
    );
    table
}

/// Averaging (when enabled for the sheet), date filter, then prefix
#[instrument(skip(table, spec, config), fields(sheet = %spec.name))]
pub fn prepare_sheet(table: Table, spec: &SheetSpec, config: &PipelineConfig) -> Table {
    let table = if spec.shift_averaging {
        average_shift_pairs(table, &config.shift_pairs, &config.averaging_exclude).into_table()
    } else {
        table
    };
    filter_by_start_date(table, config.start_date).with_prefix(&spec.prefix)
}

/// Place processed sheets side by side, row-aligned
///
/// Sheets without rows are left out. All remaining sheets must have the same number of
/// rows, and sheets that carry dates must agree on the date of every row.
#[instrument(skip_all, fields(sheets = sheets.len()))]
pub fn assemble(sheets: Vec<(String, Table)>) -> Result<Outcome<Table>, AssembleError> {
    let sheets: Vec<(String, Table)> = sheets
        .into_iter()
        .filter(|(name, table)| {
            if table.is_empty() {
                debug!("Sheet '{}' produced no rows, leaving it out", name);
            }
            !table.is_empty()
        })
        .collect();

    let Some((reference, first)) = sheets.first() else {
        return Ok(Outcome::Skipped("nothing to write".to_string()));
    };

    let expected = first.row_count();
    for (name, table) in &sheets[1..] {
        if table.row_count() != expected {
            return Err(AssembleError::RowCountMismatch {
                reference: reference.clone(),
                expected,
                sheet: name.clone(),
                found: table.row_count(),
            });
        }
    }
    check_date_alignment(&sheets)?;

    let mut columns = Vec::new();
    let mut rows: Vec<Vec<Value>> = vec![Vec::new(); expected];
    for (_, table) in sheets {
        let (cols, sheet_rows) = table.into_parts();
        columns.extend(cols);
        for (out, row) in rows.iter_mut().zip(sheet_rows) {
            out.extend(row);
        }
    }

    let table = collapse_date_columns(Table::new(columns, rows));
    info!(
        "Assembled {} rows x {} columns",
        table.row_count(),
        table.columns().len()
    );
    Ok(Outcome::Done(table))
}

fn check_date_alignment(sheets: &[(String, Table)]) -> Result<(), AssembleError> {
    let dated: Vec<(&String, Vec<Option<NaiveDate>>)> = sheets
        .iter()
        .filter_map(|(name, table)| {
            let idx = table.columns().iter().position(|c| is_date_column(c))?;
            Some((name, table.column_values(idx).map(Value::as_date).collect()))
        })
        .collect();

    let Some((reference, ref_dates)) = dated.first() else {
        return Ok(());
    };
    for (sheet, dates) in &dated[1..] {
        for (row, (expected, found)) in ref_dates.iter().zip(dates).enumerate() {
            if let (Some(expected), Some(found)) = (expected, found) {
                if expected != found {
                    return Err(AssembleError::DateMisaligned {
                        row,
                        reference: (*reference).clone(),
                        expected: *expected,
                        sheet: (*sheet).clone(),
                        found: *found,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Replace every date-like column by one `Date` column at the first one's position
///
/// The first date column wins; the others are dropped without consulting their values.
fn collapse_date_columns(mut table: Table) -> Table {
    let date_cols: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| is_date_column(name))
        .map(|(idx, _)| idx)
        .collect();

    let Some((&keep, rest)) = date_cols.split_first() else {
        warn!("Assembled table has no date column");
        return table;
    };

    table.map_column(keep, |v| Value::from(v.as_date()));
    table.rename_column(keep, ASSEMBLED_DATE_COLUMN);
    table.drop_columns(rest);
    table
}
