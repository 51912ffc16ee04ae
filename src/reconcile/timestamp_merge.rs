/// Exact-match timestamp merge of two hourly report sections
///
/// The timestamp is compared as its trimmed textual form and never parsed, so
/// `2025-06-24 10:00:00` and `2025-06-24 10:00:00.0` are different keys.
use calamine::{Data, Range};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use crate::config::HourlySpec;
use crate::readers::sheet_reader::{read_table, SheetReadError};
use crate::readers::workbook::SheetSource;
use crate::reconcile::joiner::suffixed_names;
use crate::reconcile::Outcome;
use crate::table::{Table, Value};

/// Both sections as read plus their merge, ready to be written as one workbook
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyMerge {
    pub sections: [(String, Table); 2],
    pub merged_sheet: String,
    pub merged: Table,
}

impl HourlyMerge {
    /// Sheets in output order: the two sections, then the merged one
    pub fn sheets(&self) -> Vec<(&str, &Table)> {
        let mut sheets: Vec<(&str, &Table)> = self
            .sections
            .iter()
            .map(|(name, table)| (name.as_str(), table))
            .collect();
        sheets.push((self.merged_sheet.as_str(), &self.merged));
        sheets
    }
}

fn is_placeholder(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name.starts_with("Unnamed")
}

/// Read a report section: `skip_rows` boilerplate rows, then the header row
///
/// Placeholder columns (blank or `Unnamed…` headers) are dropped.
pub fn read_section(range: &Range<Data>, skip_rows: u32) -> Table {
    let mut table = read_table(range, skip_rows + 1);
    let placeholders: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| is_placeholder(name))
        .map(|(i, _)| i)
        .collect();
    if !placeholders.is_empty() {
        debug!("Dropping {} placeholder columns", placeholders.len());
        table.drop_columns(&placeholders);
    }
    table
}

/// Group row indices by exact timestamp text; rows with an empty timestamp are dropped
fn rows_by_key(table: &Table, key: usize) -> (BTreeMap<String, Vec<usize>>, usize) {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut dropped = 0;
    for (i, row) in table.rows().iter().enumerate() {
        let text = row[key].key_string();
        if text.is_empty() {
            dropped += 1;
            continue;
        }
        groups.entry(text).or_default().push(i);
    }
    (groups, dropped)
}

/// Outer join of two sections on the exact timestamp text, sorted by that text
///
/// Skipped when either section lacks the timestamp column.
#[instrument(skip(left, right))]
pub fn merge_on_timestamp(left: &Table, right: &Table, timestamp_column: &str) -> Outcome<Table> {
    let (Some(lkey), Some(rkey)) = (
        left.find_column(timestamp_column),
        right.find_column(timestamp_column),
    ) else {
        let reason = format!("timestamp column '{timestamp_column}' missing from a section");
        warn!("{}", reason);
        return Outcome::Skipped(reason);
    };

    let left_cols: Vec<usize> = (0..left.columns().len()).filter(|&i| i != lkey).collect();
    let right_cols: Vec<usize> = (0..right.columns().len()).filter(|&i| i != rkey).collect();
    let mut columns = vec![left.columns()[lkey].clone()];
    columns.extend(suffixed_names(left, &left_cols, right, &right_cols, "_x"));
    columns.extend(suffixed_names(right, &right_cols, left, &left_cols, "_y"));

    let (lgroups, ldropped) = rows_by_key(left, lkey);
    let (rgroups, rdropped) = rows_by_key(right, rkey);
    if ldropped + rdropped > 0 {
        debug!("Dropped {} rows without a timestamp", ldropped + rdropped);
    }

    let mut keys: Vec<&String> = lgroups.keys().chain(rgroups.keys()).collect();
    keys.sort();
    keys.dedup();

    let values = |table: &Table, cols: &[usize], row: Option<usize>| -> Vec<Value> {
        match row {
            Some(r) => cols.iter().map(|&c| table.rows()[r][c].clone()).collect(),
            None => vec![Value::Null; cols.len()],
        }
    };

    let mut merged = Table::empty(columns);
    for key in keys {
        let lrows: Vec<Option<usize>> = match lgroups.get(key) {
            Some(rows) => rows.iter().copied().map(Some).collect(),
            None => vec![None],
        };
        let rrows: Vec<Option<usize>> = match rgroups.get(key) {
            Some(rows) => rows.iter().copied().map(Some).collect(),
            None => vec![None],
        };
        for &l in &lrows {
            for &r in &rrows {
                let mut row = vec![Value::Text(key.clone())];
                row.extend(values(left, &left_cols, l));
                row.extend(values(right, &right_cols, r));
                merged.push_row(row);
            }
        }
    }

    info!(
        "Merged {} + {} rows on '{}' into {} rows",
        left.row_count(),
        right.row_count(),
        timestamp_column,
        merged.row_count()
    );
    Outcome::Done(merged)
}

/// Read both configured sections from `source` and merge them
///
/// A missing section skips the merge rather than failing the run.
#[instrument(skip_all, fields(sections = ?spec.sections))]
pub fn merge_sections<S: SheetSource>(
    source: &mut S,
    spec: &HourlySpec,
) -> Result<Outcome<HourlyMerge>, SheetReadError> {
    let mut sections = Vec::with_capacity(2);
    for name in &spec.sections {
        match source.sheet_range(name)? {
            Some(range) => sections.push((name.clone(), read_section(&range, spec.skip_rows))),
            None => {
                let reason = format!("section '{name}' not found");
                warn!("{}", reason);
                return Ok(Outcome::Skipped(reason));
            }
        }
    }
    let [first, second]: [(String, Table); 2] = match sections.try_into() {
        Ok(pair) => pair,
        Err(_) => return Ok(Outcome::Skipped("expected two sections".to_string())),
    };

    let merged = match merge_on_timestamp(&first.1, &second.1, &spec.timestamp_column) {
        Outcome::Done(merged) => merged,
        Outcome::Skipped(reason) => return Ok(Outcome::Skipped(reason)),
    };
    Ok(Outcome::Done(HourlyMerge {
        sections: [first, second],
        merged_sheet: spec.merged_sheet.clone(),
        merged,
    }))
}
