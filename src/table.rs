//! In-memory tabular model shared by every reconciliation stage
//!
//! A `Table` is an ordered list of unique column names plus rows of `Value`s aligned
//! to those columns. Raw sheet regions, processed sheets and combined tables are all
//! represented by this one type; each stage takes a table by value and hands back a
//! new one.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use std::fmt;

use crate::utils::parse_date_value;

/// A single scalar cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Number(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Number(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Numeric coercion: numbers as-is, numeric text parsed, everything else missing
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(f) if f.is_finite() => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    /// Calendar-date coercion (time of day discarded)
    pub fn as_date(&self) -> Option<NaiveDate> {
        parse_date_value(self)
    }

    /// Stable textual form used for key comparisons and exact-match merges
    ///
    /// Whole numbers render without a fractional part so that `3` and `3.0` read back
    /// from different cell types compare equal.
    pub fn key_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Number(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
            Value::Number(f) => f.to_string(),
            Value::Text(s) => s.trim().to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            other => write!(f, "{}", other.key_string()),
        }
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Number(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Ordered columns and position-aligned rows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Build a table; duplicate column names are made unique with `.1`, `.2` suffixes
    /// and short rows are padded with nulls.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let columns = dedupe_names(columns);
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self::new(columns, Vec::new())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Case-insensitive, whitespace-trimmed column lookup
    pub fn find_column(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_uppercase();
        self.columns
            .iter()
            .position(|c| c.trim().to_uppercase() == wanted)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |r| &r[idx])
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[Value]) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }

    pub fn map_column<F>(&mut self, idx: usize, mut f: F)
    where
        F: FnMut(&Value) -> Value,
    {
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
    }

    /// Rename one column; a clash with an existing name is suffixed like a duplicate header
    pub fn rename_column(&mut self, idx: usize, name: impl Into<String>) {
        self.columns[idx] = name.into();
        self.columns = dedupe_names(std::mem::take(&mut self.columns));
    }

    /// Remove the given column positions
    pub fn drop_columns(&mut self, indices: &[usize]) {
        let drop: HashSet<usize> = indices.iter().copied().collect();
        let keep: Vec<usize> = (0..self.columns.len()).filter(|i| !drop.contains(i)).collect();
        self.select_indices(&keep);
    }

    /// Keep only the given column positions, in the given order
    pub fn select_indices(&mut self, indices: &[usize]) {
        self.columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            let picked = indices.iter().map(|&i| std::mem::take(&mut row[i])).collect();
            *row = picked;
        }
    }

    /// Prefix every column name
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        if !prefix.is_empty() {
            for name in &mut self.columns {
                name.insert_str(0, prefix);
            }
        }
        self
    }
}

/// Make column names unique the way spreadsheet tools do: the first occurrence keeps
/// its name, later ones get `.1`, `.2`, ...
pub fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{name}.{n}");
            n += 1;
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_duplicate_columns_get_suffixes() {
        let table = Table::empty(names(&["A", "B", "A", "A"]));
        assert_eq!(table.columns(), &["A", "B", "A.1", "A.2"]);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let table = Table::new(names(&["A", "B"]), vec![vec![Value::from(1.0)]]);
        assert_eq!(table.rows()[0], vec![Value::Number(1.0), Value::Null]);
    }

    #[test]
    fn test_find_column_ignores_case_and_whitespace() {
        let table = Table::empty(names(&[" Date ", "SHIFT"]));
        assert_eq!(table.find_column("DATE"), Some(0));
        assert_eq!(table.find_column("shift"), Some(1));
        assert_eq!(table.find_column("missing"), None);
    }

    #[test]
    fn test_drop_and_select_columns() {
        let mut table = Table::new(
            names(&["A", "B", "C"]),
            vec![vec![1.0.into(), 2.0.into(), 3.0.into()]],
        );
        table.drop_columns(&[1]);
        assert_eq!(table.columns(), &["A", "C"]);
        assert_eq!(table.rows()[0], vec![Value::Number(1.0), Value::Number(3.0)]);

        table.select_indices(&[1, 0]);
        assert_eq!(table.columns(), &["C", "A"]);
        assert_eq!(table.rows()[0], vec![Value::Number(3.0), Value::Number(1.0)]);
    }

    #[test]
    fn test_rename_onto_existing_name_stays_unique() {
        let mut table = Table::empty(names(&["DATE", "SHIFT", "FE"]));
        table.rename_column(2, "SHIFT");
        assert_eq!(table.columns(), &["DATE", "SHIFT", "SHIFT.1"]);

        table.rename_column(1, "DATE");
        assert_eq!(table.columns(), &["DATE", "DATE.1", "SHIFT.1"]);
    }

    #[test]
    fn test_with_prefix() {
        let table = Table::empty(names(&["DATE", "FE"])).with_prefix("SIN_");
        assert_eq!(table.columns(), &["SIN_DATE", "SIN_FE"]);
    }

    #[test]
    fn test_key_string_normalizes_whole_numbers() {
        assert_eq!(Value::Number(3.0).key_string(), "3");
        assert_eq!(Value::Number(3.25).key_string(), "3.25");
        assert_eq!(Value::from("  A ").key_string(), "A");
        let d = NaiveDate::from_ymd_opt(2025, 6, 24).unwrap();
        assert_eq!(Value::Date(d).key_string(), "2025-06-24");
        assert_eq!(
            Value::DateTime(d.and_hms_opt(10, 0, 0).unwrap()).key_string(),
            "2025-06-24 10:00:00"
        );
    }

    #[test]
    fn test_is_null() {
        assert!(Value::Null.is_null());
        assert!(Value::from("  ").is_null());
        assert!(Value::Number(f64::NAN).is_null());
        assert!(!Value::Number(0.0).is_null());
    }

    #[test]
    fn test_as_number_coercion() {
        assert_eq!(Value::from(" 12.5 ").as_number(), Some(12.5));
        assert_eq!(Value::from("n/a").as_number(), None);
        assert_eq!(Value::Null.as_number(), None);
    }
}
