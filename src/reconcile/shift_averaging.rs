/// Shift-pair averaging
///
/// Collapses the two readings of a shift pair (e.g. "A-1"/"A-2") taken on the same day
/// into one synthesized row labelled with the pair's designation ("A").
use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use crate::config::ShiftPairRule;
use crate::table::{Table, Value};

pub const DATE_COLUMN: &str = "DATE";
pub const SHIFT_COLUMN: &str = "SHIFT";

/// What the reducer did with a sheet
#[derive(Debug, Clone, PartialEq)]
pub enum Averaged {
    /// One row per (date, pair) that had at least one reading
    Reduced(Table),
    /// The sheet lacks a date or shift column and passes through as-is
    Unchanged { table: Table, reason: String },
}

impl Averaged {
    pub fn into_table(self) -> Table {
        match self {
            Averaged::Reduced(table) => table,
            Averaged::Unchanged { table, .. } => table,
        }
    }
}

/// Combine two readings of one column
///
/// Zero counts as missing. Both present → mean, one present → that value, neither →
/// `None`.
pub fn combine_pair(v1: Option<f64>, v2: Option<f64>) -> Option<f64> {
    let present = |v: Option<f64>| v.filter(|x| *x != 0.0);
    match (present(v1), present(v2)) {
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        (None, Some(b)) => Some(b),
        (Some(a), None) => Some(a),
        (None, None) => None,
    }
}

/// Average each configured shift pair per calendar day
///
/// Only the first two rows of a pair on a given day are used; later ones are ignored.
/// The shift column and the `exclude` identifier columns are not averaged and do not
/// appear in the output.
#[instrument(skip_all, fields(rows = table.row_count()))]
pub fn average_shift_pairs(table: Table, pairs: &[ShiftPairRule], exclude: &[String]) -> Averaged {
    let (Some(date_idx), Some(shift_idx)) =
        (table.find_column(DATE_COLUMN), table.find_column(SHIFT_COLUMN))
    else {
        let reason = "missing DATE or SHIFT column, skipping averaging".to_string();
        warn!("{}", reason);
        return Averaged::Unchanged { table, reason };
    };

    let excluded: Vec<String> = exclude.iter().map(|e| e.trim().to_uppercase()).collect();
    let numeric: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(idx, name)| {
            *idx != date_idx
                && *idx != shift_idx
                && !excluded.contains(&name.trim().to_uppercase())
        })
        .map(|(idx, _)| idx)
        .collect();

    let dates: Vec<Option<NaiveDate>> = table.column_values(date_idx).map(Value::as_date).collect();
    let shifts: Vec<String> = table
        .column_values(shift_idx)
        .map(|v| v.key_string().to_uppercase())
        .collect();

    let mut distinct_dates: Vec<NaiveDate> = Vec::new();
    for date in dates.iter().flatten() {
        if !distinct_dates.contains(date) {
            distinct_dates.push(*date);
        }
    }

    let mut columns = vec![
        table.columns()[date_idx].clone(),
        table.columns()[shift_idx].clone(),
    ];
    columns.extend(numeric.iter().map(|&i| table.columns()[i].clone()));
    let mut out = Table::empty(columns);

    for date in &distinct_dates {
        for rule in pairs {
            let matched: Vec<&Vec<Value>> = table
                .rows()
                .iter()
                .enumerate()
                .filter(|(i, _)| dates[*i] == Some(*date) && rule.matches(&shifts[*i]))
                .map(|(_, row)| row)
                .take(2)
                .collect();

            let Some(first) = matched.first() else {
                continue;
            };
            let second = matched.get(1);

            let mut row = vec![Value::Date(*date), Value::Text(rule.label.clone())];
            row.extend(numeric.iter().map(|&col| {
                let v1 = first[col].as_number();
                let v2 = second.and_then(|r| r[col].as_number());
                combine_pair(v1, v2).map(Value::Number).unwrap_or(Value::Null)
            }));
            out.push_row(row);
        }
    }

    if out.is_empty() {
        warn!("No averaged data generated");
    } else {
        info!(
            "Averaged {} rows into {} shift-pair rows over {} days",
            table.row_count(),
            out.row_count(),
            distinct_dates.len()
        );
    }
    debug!("Averaged columns: {:?}", out.columns());
    Averaged::Reduced(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs() -> Vec<ShiftPairRule> {
        vec![
            ShiftPairRule::new("C-1", "C-2").unwrap(),
            ShiftPairRule::new("A-1", "A-2").unwrap(),
            ShiftPairRule::new("B-1", "B-2").unwrap(),
        ]
    }

    fn sinter(rows: Vec<(&str, &str, Value, f64)>) -> Table {
        Table::new(
            vec![
                "DATE".to_string(),
                "SHIFT".to_string(),
                "VAL".to_string(),
                "BUNKER NO.".to_string(),
            ],
            rows.into_iter()
                .map(|(d, s, v, b)| vec![Value::from(d), Value::from(s), v, Value::Number(b)])
                .collect(),
        )
    }

    fn exclude() -> Vec<String> {
        vec!["BUNKER NO.".to_string()]
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_combine_pair_policy() {
        assert_eq!(combine_pair(Some(10.0), Some(20.0)), Some(15.0));
        assert_eq!(combine_pair(Some(0.0), Some(20.0)), Some(20.0));
        assert_eq!(combine_pair(None, Some(20.0)), Some(20.0));
        assert_eq!(combine_pair(Some(10.0), Some(0.0)), Some(10.0));
        assert_eq!(combine_pair(Some(10.0), None), Some(10.0));
        assert_eq!(combine_pair(Some(0.0), None), None);
        assert_eq!(combine_pair(None, None), None);
    }

    #[test]
    fn test_combine_pair_is_commutative_for_present_values() {
        for (a, b) in [(1.0, 3.0), (55.2, 54.8), (-2.0, 4.0)] {
            assert_eq!(combine_pair(Some(a), Some(b)), combine_pair(Some(b), Some(a)));
        }
    }

    #[test]
    fn test_zero_reading_is_treated_as_missing() {
        let table = sinter(vec![
            ("2025-06-24", "A-1", Value::Number(10.0), 1.0),
            ("2025-06-24", "A-2", Value::Number(0.0), 2.0),
        ]);
        let out = average_shift_pairs(table, &pairs(), &exclude()).into_table();

        assert_eq!(out.columns(), &["DATE", "SHIFT", "VAL"]);
        assert_eq!(out.row_count(), 1);
        assert_eq!(
            out.rows()[0],
            vec![
                Value::Date(d("2025-06-24")),
                Value::from("A"),
                Value::Number(10.0)
            ]
        );
    }

    #[test]
    fn test_only_first_two_matches_are_used() {
        let table = sinter(vec![
            ("2025-06-24", "B-1", Value::Number(2.0), 1.0),
            ("2025-06-24", "B-2", Value::Number(4.0), 1.0),
            ("2025-06-24", "B-2", Value::Number(100.0), 1.0),
        ]);
        let out = average_shift_pairs(table, &pairs(), &exclude()).into_table();
        assert_eq!(out.row_count(), 1);
        assert_eq!(out.get(0, "VAL"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn test_output_order_and_missing_pairs() {
        let table = sinter(vec![
            ("2025-06-25", "a-1 ", Value::Number(1.0), 1.0),
            ("2025-06-24", "C-1", Value::Number(5.0), 1.0),
            ("2025-06-24", "c-2", Value::from("7"), 1.0),
            ("2025-06-25", "A-2", Value::Null, 1.0),
        ]);
        let out = average_shift_pairs(table, &pairs(), &exclude()).into_table();

        // dates in first-appearance order, pairs in configured order, no empty pairs
        let keys: Vec<(Value, Value)> = out
            .rows()
            .iter()
            .map(|r| (r[0].clone(), r[1].clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (Value::Date(d("2025-06-25")), Value::from("A")),
                (Value::Date(d("2025-06-24")), Value::from("C")),
            ]
        );
        assert_eq!(out.get(0, "VAL"), Some(&Value::Number(1.0)));
        assert_eq!(out.get(1, "VAL"), Some(&Value::Number(6.0)));
    }

    #[test]
    fn test_single_reading_and_non_numeric_values() {
        let table = sinter(vec![
            ("2025-06-24", "A-1", Value::from("n/a"), 1.0),
            ("2025-06-24", "B-1", Value::Number(8.5), 1.0),
        ]);
        let out = average_shift_pairs(table, &pairs(), &exclude()).into_table();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.get(0, "VAL"), Some(&Value::Null));
        assert_eq!(out.get(1, "VAL"), Some(&Value::Number(8.5)));
    }

    #[test]
    fn test_rows_without_a_date_are_ignored() {
        let table = sinter(vec![
            ("garbage", "A-1", Value::Number(1.0), 1.0),
            ("2025-06-24", "A-1", Value::Number(3.0), 1.0),
        ]);
        let out = average_shift_pairs(table, &pairs(), &exclude()).into_table();
        assert_eq!(out.row_count(), 1);
        assert_eq!(out.get(0, "VAL"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn test_missing_shift_column_passes_through() {
        let table = Table::new(
            vec!["DATE".to_string(), "VAL".to_string()],
            vec![vec![Value::from("2025-06-24"), Value::Number(1.0)]],
        );
        match average_shift_pairs(table.clone(), &pairs(), &exclude()) {
            Averaged::Unchanged { table: out, reason } => {
                assert_eq!(out, table);
                assert!(reason.contains("SHIFT"));
            }
            other => panic!("Expected pass-through, got {other:?}"),
        }
    }
}
