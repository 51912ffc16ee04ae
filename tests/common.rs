#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;

use plant_sheet_reconciler::config::{Config, PipelineConfig};

/// One fixture cell
pub enum Cell {
    Text(&'static str),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Empty,
}

pub use Cell::{Empty, Number as N, Text as T};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn datetime(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

/// Write a workbook fixture; rows start at A1 of each sheet
pub fn write_fixture(path: &Path, sheets: &[(&str, Vec<Vec<Cell>>)]) {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let datetime_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");

    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let (r, c) = (r as u32, c as u16);
                match cell {
                    Cell::Text(s) => {
                        worksheet.write_string(r, c, *s).unwrap();
                    }
                    Cell::Number(f) => {
                        worksheet.write_number(r, c, *f).unwrap();
                    }
                    Cell::Date(d) => {
                        worksheet
                            .write_datetime_with_format(r, c, d, &date_format)
                            .unwrap();
                    }
                    Cell::DateTime(dt) => {
                        worksheet
                            .write_datetime_with_format(r, c, dt, &datetime_format)
                            .unwrap();
                    }
                    Cell::Empty => {}
                }
            }
        }
    }
    workbook.save(path).unwrap();
}

/// Pipeline used by the end-to-end tests: SINTER (averaged) and COKE from the bunker
/// workbook, one fixed-coordinate DPR block, and a two-section hourly report
pub const PIPELINE_JSON: &str = r#"{
    "start_date": "2025-06-24",
    "shift_pairs": [
        {"first": "A-1", "second": "A-2"},
        {"first": "B-1", "second": "B-2"},
        {"first": "C-1", "second": "C-2"}
    ],
    "bunker_sheets": [
        {"name": "SINTER", "columns": "A:E", "header_row": 3, "prefix": "SIN_",
         "shift_averaging": true},
        {"name": "COKE", "columns": "A:B", "prefix": "COKE_"},
        {"name": "LIMESTONE", "columns": "A:B", "prefix": "LS_"}
    ],
    "dpr_sheets": [
        {"name": "DPR", "prefix": "DPR_",
         "fixed": {"date_row": 2, "columns": "C:D",
                   "rows": [{"label": "Hot Metal", "row": 4}],
                   "rename": [["Hot Metal", "HM"]]}}
    ],
    "fixed_order": ["Date", "SIN_SHIFT"],
    "hourly": {"sections": ["BF", "STOVE"], "skip_rows": 2, "timestamp_column": "Timestamp"}
}"#;

pub fn pipeline() -> PipelineConfig {
    PipelineConfig::from_json_str(PIPELINE_JSON).unwrap()
}

pub fn bunker_fixture(path: &Path) {
    write_fixture(
        path,
        &[
            (
                "SINTER",
                vec![
                    vec![T("SINTER ANALYSIS")],
                    vec![],
                    vec![T("DATE"), T("SHIFT"), T("TIME"), T("FE"), T("BUNKER NO.")],
                    vec![T("2025-06-23"), T("A-1"), T("06:00"), N(50.0), N(1.0)],
                    vec![Cell::Date(date("2025-06-24")), T("A-1"), T("06:00"), N(10.0), N(1.0)],
                    vec![Cell::Date(date("2025-06-24")), T("A-2"), T("10:00"), N(0.0), N(2.0)],
                    vec![T("24-Jun-2025"), T("B-1"), T("14:00"), N(5.0), N(1.0)],
                    vec![T("24/06/2025"), T("B-2"), T("18:00"), N(7.0), N(2.0)],
                ],
            ),
            (
                "COKE",
                vec![
                    vec![T("DATE"), T("ASH")],
                    vec![T("2025-06-22"), N(1.5)],
                    vec![T("2025-06-24"), N(1.0)],
                    vec![T("2025-06-24"), N(1.1)],
                ],
            ),
        ],
    );
}

pub fn dpr_fixture(path: &Path) {
    write_fixture(
        path,
        &[(
            "DPR",
            vec![
                vec![T("DAILY PRODUCTION REPORT")],
                vec![Empty, Empty, T("2025-06-24"), T("2025-06-25")],
                vec![],
                vec![T("Hot Metal"), Empty, N(3100.0), N(3150.0)],
            ],
        )],
    );
}

pub fn config(dir: &Path) -> Config {
    Config {
        pipeline_config_path: dir.join("pipeline.json"),
        bunker_workbook: dir.join("bunker.xlsx"),
        dpr_workbook: Some(dir.join("dpr.xlsx")),
        hourly_workbook: None,
        output_dir: dir.join("output"),
        start_date_override: None,
    }
}
