/// Sheet region reader
///
/// Turns one configured region of a workbook into a `Table`. Two layouts exist:
/// header-based regions (a column range read below a header row) and fixed-coordinate
/// regions used by the daily production report (one date row plus labelled rows).
use calamine::{Data, Range};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::{ColumnSelector, FixedCoordinates, SheetLayout, SheetSpec};
use crate::readers::workbook::{cell_at, used_extent, SheetSource, WorkbookError};
use crate::table::{Table, Value};

#[derive(Error, Debug)]
pub enum SheetReadError {
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error(transparent)]
    Workbook(#[from] WorkbookError),
}

/// Header dropped from every header-based region
const TIME_COLUMN: &str = "TIME";

/// First column of every fixed-coordinate region
pub const FIXED_DATE_COLUMN: &str = "Date";

/// Read the region described by `spec` from `source`
#[instrument(skip(source, spec), fields(sheet = %spec.name))]
pub fn read_sheet<S: SheetSource>(
    source: &mut S,
    spec: &SheetSpec,
) -> Result<Table, SheetReadError> {
    let range = source
        .sheet_range(&spec.name)?
        .ok_or_else(|| SheetReadError::SheetNotFound(spec.name.clone()))?;

    let table = match &spec.layout {
        SheetLayout::Header {
            columns,
            header_row,
        } => {
            let table = read_header_region(&range, columns, *header_row);
            apply_header_renames(table, &spec.rename)
        }
        SheetLayout::Fixed(fixed) => read_fixed_region(&range, fixed),
    };

    info!(
        "Read {} rows x {} columns from '{}'",
        table.row_count(),
        table.columns().len(),
        spec.name
    );
    Ok(table)
}

/// Header-based region: header at the 1-based `header_row`, data below it
///
/// Blank headers become `Unnamed: <n>` (n = position inside the selection), duplicate
/// headers are suffixed, fully empty rows and a literal `TIME` column are dropped.
pub fn read_header_region(
    range: &Range<Data>,
    columns: &ColumnSelector,
    header_row: u32,
) -> Table {
    let Some((_, last_col)) = used_extent(range) else {
        debug!("Sheet is empty");
        return Table::default();
    };

    let selected: Vec<u32> = columns
        .indices()
        .iter()
        .copied()
        .filter(|&c| c <= last_col)
        .collect();

    let mut table = read_columns(range, &selected, header_row);
    if let Some(idx) = table.column_index(TIME_COLUMN) {
        debug!("Dropping {} column", TIME_COLUMN);
        table.drop_columns(&[idx]);
    }
    table
}

/// Every used column of a sheet below the 1-based `header_row`
pub fn read_table(range: &Range<Data>, header_row: u32) -> Table {
    match used_extent(range) {
        Some((_, last_col)) => {
            let all: Vec<u32> = (0..=last_col).collect();
            read_columns(range, &all, header_row)
        }
        None => Table::default(),
    }
}

fn read_columns(range: &Range<Data>, selected: &[u32], header_row: u32) -> Table {
    let header_idx = header_row.saturating_sub(1);
    let Some((last_row, _)) = used_extent(range) else {
        return Table::default();
    };

    let headers: Vec<String> = selected
        .iter()
        .enumerate()
        .map(|(pos, &col)| match cell_at(range, header_idx, col) {
            Value::Null => format!("Unnamed: {pos}"),
            other => other.to_string().trim().to_string(),
        })
        .collect();

    let mut table = Table::empty(headers);
    for row in (header_idx + 1)..=last_row {
        let values: Vec<Value> = selected.iter().map(|&col| cell_at(range, row, col)).collect();
        if values.iter().all(Value::is_null) {
            continue;
        }
        table.push_row(values);
    }
    table
}

/// Apply `from → to` header renames, only when every `from` header is present
fn apply_header_renames(mut table: Table, renames: &[(String, String)]) -> Table {
    if renames.is_empty() {
        return table;
    }
    let positions: Option<Vec<usize>> = renames
        .iter()
        .map(|(from, _)| table.column_index(from))
        .collect();

    match positions {
        Some(positions) => {
            for (idx, (_, to)) in positions.into_iter().zip(renames) {
                table.rename_column(idx, to.clone());
                if &table.columns()[idx] != to {
                    warn!(
                        "Rename target '{}' already exists, column renamed to '{}'",
                        to,
                        table.columns()[idx]
                    );
                }
            }
        }
        None => debug!("Not all rename sources present, leaving headers unchanged"),
    }
    table
}

/// Fixed-coordinate region: a date row plus labelled rows over one column span
///
/// The table has a `Date` column followed by one column per label, in configuration
/// order, with one row per spanned spreadsheet column.
pub fn read_fixed_region(range: &Range<Data>, fixed: &FixedCoordinates) -> Table {
    let renames = one_to_one_renames(&fixed.rename);

    let mut headers = vec![FIXED_DATE_COLUMN.to_string()];
    headers.extend(fixed.rows.iter().map(|r| {
        renames
            .get(r.label.as_str())
            .map(|to| to.to_string())
            .unwrap_or_else(|| r.label.clone())
    }));

    let date_row = fixed.date_row.saturating_sub(1);
    let mut table = Table::empty(headers);
    for &col in fixed.columns.indices() {
        let mut values = vec![cell_at(range, date_row, col)];
        values.extend(
            fixed
                .rows
                .iter()
                .map(|r| cell_at(range, r.row.saturating_sub(1), col)),
        );
        if values.iter().all(Value::is_null) {
            continue;
        }
        table.push_row(values);
    }
    table
}

/// Keep only renames whose source label maps to exactly one target
fn one_to_one_renames(pairs: &[(String, String)]) -> HashMap<&str, &str> {
    let mut targets: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to) in pairs {
        let entry = targets.entry(from.as_str()).or_default();
        if !entry.contains(&to.as_str()) {
            entry.push(to.as_str());
        }
    }

    targets
        .into_iter()
        .filter_map(|(from, tos)| {
            if tos.len() == 1 {
                Some((from, tos[0]))
            } else {
                warn!(
                    "Label '{}' has {} rename targets ({:?}), keeping original name",
                    from,
                    tos.len(),
                    tos
                );
                None
            }
        })
        .collect()
}
