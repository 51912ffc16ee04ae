/// Cross-dataset join on the calendar date and canonical column ordering
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use crate::reconcile::assembler::{AssembleError, ASSEMBLED_DATE_COLUMN};
use crate::table::{Table, Value};

/// Outer join of two assembled tables on `Date`
///
/// Rows come out sorted by date with undated rows last. A date present on both sides
/// yields every left row paired with every right row. Non-key columns present on both
/// sides are suffixed `_x` (left) and `_y` (right).
#[instrument(skip_all, fields(left = left.row_count(), right = right.row_count()))]
pub fn outer_join_on_date(left: &Table, right: &Table) -> Result<Table, AssembleError> {
    let left_key = left
        .find_column(ASSEMBLED_DATE_COLUMN)
        .ok_or_else(|| AssembleError::MissingDateColumn("left".to_string()))?;
    let right_key = right
        .find_column(ASSEMBLED_DATE_COLUMN)
        .ok_or_else(|| AssembleError::MissingDateColumn("right".to_string()))?;

    let left_cols: Vec<usize> = (0..left.columns().len()).filter(|&i| i != left_key).collect();
    let right_cols: Vec<usize> = (0..right.columns().len())
        .filter(|&i| i != right_key)
        .collect();

    let mut columns = vec![ASSEMBLED_DATE_COLUMN.to_string()];
    columns.extend(suffixed_names(left, &left_cols, right, &right_cols, "_x"));
    columns.extend(suffixed_names(right, &right_cols, left, &left_cols, "_y"));

    let mut by_date: BTreeMap<NaiveDate, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    let mut undated_left = Vec::new();
    let mut undated_right = Vec::new();
    for (i, row) in left.rows().iter().enumerate() {
        match row[left_key].as_date() {
            Some(d) => by_date.entry(d).or_default().0.push(i),
            None => undated_left.push(i),
        }
    }
    for (i, row) in right.rows().iter().enumerate() {
        match row[right_key].as_date() {
            Some(d) => by_date.entry(d).or_default().1.push(i),
            None => undated_right.push(i),
        }
    }

    let pick = |table: &Table, cols: &[usize], row: Option<usize>| -> Vec<Value> {
        match row {
            Some(r) => cols.iter().map(|&c| table.rows()[r][c].clone()).collect(),
            None => vec![Value::Null; cols.len()],
        }
    };

    let mut out = Table::empty(columns);
    let mut matched = 0;
    for (date, (lrows, rrows)) in &by_date {
        let lrows: Vec<Option<usize>> = if lrows.is_empty() {
            vec![None]
        } else {
            lrows.iter().copied().map(Some).collect()
        };
        let rrows: Vec<Option<usize>> = if rrows.is_empty() {
            vec![None]
        } else {
            rrows.iter().copied().map(Some).collect()
        };
        if lrows[0].is_some() && rrows[0].is_some() {
            matched += 1;
        }

        for &l in &lrows {
            for &r in &rrows {
                let mut row = vec![Value::Date(*date)];
                row.extend(pick(left, &left_cols, l));
                row.extend(pick(right, &right_cols, r));
                out.push_row(row);
            }
        }
    }
    for &l in &undated_left {
        let mut row = vec![left.rows()[l][left_key].clone()];
        row.extend(pick(left, &left_cols, Some(l)));
        row.extend(pick(right, &right_cols, None));
        out.push_row(row);
    }
    for &r in &undated_right {
        let mut row = vec![right.rows()[r][right_key].clone()];
        row.extend(pick(left, &left_cols, None));
        row.extend(pick(right, &right_cols, Some(r)));
        out.push_row(row);
    }

    info!(
        "Joined on Date: {} dates ({} on both sides), {} rows",
        by_date.len(),
        matched,
        out.row_count()
    );
    Ok(out)
}

pub(crate) fn suffixed_names(
    table: &Table,
    cols: &[usize],
    other: &Table,
    other_cols: &[usize],
    suffix: &str,
) -> Vec<String> {
    cols.iter()
        .map(|&i| {
            let name = &table.columns()[i];
            let collides = other_cols.iter().any(|&j| &other.columns()[j] == name);
            if collides {
                format!("{name}{suffix}")
            } else {
                name.clone()
            }
        })
        .collect()
}

/// Move the `fixed_order` columns that exist to the front, in that order
///
/// The remaining columns keep their relative order. Names absent from the table are
/// ignored.
pub fn reorder_columns(mut table: Table, fixed_order: &[String]) -> Table {
    let mut order: Vec<usize> = Vec::with_capacity(table.columns().len());
    for name in fixed_order {
        if let Some(idx) = table.column_index(name) {
            if !order.contains(&idx) {
                order.push(idx);
            }
        }
    }
    let leading = order.len();
    let rest: Vec<usize> = (0..table.columns().len())
        .filter(|i| !order.contains(i))
        .collect();
    order.extend(rest);

    debug!("Reordered {} leading columns", leading);
    table.select_indices(&order);
    table
}
