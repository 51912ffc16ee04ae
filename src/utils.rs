use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::table::Value;

/// Shared utility functions for the reconciler
///
/// Convert an Excel column reference (e.g. "A", "Q", "AB") to a 0-based index
///
/// # Examples
///
/// ```
/// use plant_sheet_reconciler::utils::column_letter_to_index;
///
/// assert_eq!(column_letter_to_index("A"), Some(0));
/// assert_eq!(column_letter_to_index("z"), Some(25));
/// assert_eq!(column_letter_to_index("AA"), Some(26));
/// assert_eq!(column_letter_to_index("A1"), None);
/// ```
pub fn column_letter_to_index(letters: &str) -> Option<u32> {
    let letters = letters.trim();
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut index: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        index = index * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    Some(index - 1)
}

/// Convert a 0-based column index back to its letter reference
pub fn index_to_column_letter(mut index: u32) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

/// Convert Excel date serial to NaiveDate
///
/// Excel stores dates as day counts since Dec 30, 1899 (adjusted for Excel's
/// off-by-one leap year bug). Fractional parts carry the time of day and are dropped.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    excel_serial_to_datetime(serial).map(|dt| dt.date())
}

/// Convert Excel date serial to NaiveDateTime, keeping the time of day
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

/// Date formats seen in the plant workbooks, most specific first
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%b-%y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%Y/%m/%d",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Parse a date from free text, tolerant of the locale formats used in the sheets
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use plant_sheet_reconciler::utils::parse_date_str;
///
/// let expected = NaiveDate::from_ymd_opt(2025, 6, 24);
/// assert_eq!(parse_date_str("2025-06-24"), expected);
/// assert_eq!(parse_date_str("24-Jun-2025"), expected);
/// assert_eq!(parse_date_str("24/06/2025"), expected);
/// assert_eq!(parse_date_str("2025-06-24 06:00:00"), expected);
/// assert_eq!(parse_date_str("yesterday"), None);
/// ```
pub fn parse_date_str(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Coerce any cell value to a calendar date; `None` when it cannot be read as one
pub fn parse_date_value(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::DateTime(dt) => Some(dt.date()),
        Value::Number(f) => excel_serial_to_date(*f),
        Value::Text(s) => parse_date_str(s),
        Value::Null => None,
    }
}
