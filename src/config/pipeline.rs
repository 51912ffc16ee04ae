/// Pipeline configuration: sheet regions, shift pairs, thresholds and artifact paths
///
/// Loaded once per run from a JSON file and validated while deserializing, so the
/// reconciliation stages only ever see well-formed values.
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::utils::{column_letter_to_index, parse_date_str};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid pipeline config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid pipeline config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Rows dated before this day are dropped (inclusive threshold)
    #[serde(deserialize_with = "deserialize_date")]
    pub start_date: NaiveDate,

    /// The three shift pairs averaged per calendar day
    pub shift_pairs: [ShiftPairRule; 3],

    /// Identifier columns left out of shift averaging
    #[serde(default = "default_averaging_exclude")]
    pub averaging_exclude: Vec<String>,

    /// Columns whose name ends with this marker form the master composite key
    #[serde(default = "default_shift_suffix")]
    pub shift_suffix: String,

    /// Header-based (or fixed) regions of the bunker workbook, in assembly order
    pub bunker_sheets: Vec<SheetSpec>,

    /// Daily production report regions
    #[serde(default)]
    pub dpr_sheets: Vec<SheetSpec>,

    /// Canonical leading column order of the joined output
    #[serde(default)]
    pub fixed_order: Vec<String>,

    #[serde(default)]
    pub hourly: Option<HourlySpec>,

    #[serde(default)]
    pub outputs: OutputPaths,
}

impl PipelineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading pipeline config from {}", path.display());
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        debug!(
            "Pipeline config: {} bunker sheets, {} DPR sheets, start date {}",
            config.bunker_sheets.len(),
            config.dpr_sheets.len(),
            config.start_date
        );
        Ok(config)
    }

    /// Cross-field checks that serde cannot express
    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        let mut synthesized = std::collections::HashSet::new();
        for rule in &self.shift_pairs {
            for label in [&rule.first, &rule.second] {
                if !seen.insert(label.clone()) {
                    return Err(ConfigError::Invalid(format!(
                        "shift_pairs: label '{label}' appears in more than one pair"
                    )));
                }
            }
            if !synthesized.insert(rule.label.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "shift_pairs: averaged label '{}' is produced by more than one pair",
                    rule.label
                )));
            }
        }

        if self.shift_suffix.trim().is_empty() {
            return Err(ConfigError::Invalid("shift_suffix must not be empty".into()));
        }

        for spec in self.bunker_sheets.iter().chain(&self.dpr_sheets) {
            if spec.name.trim().is_empty() {
                return Err(ConfigError::Invalid("sheet name must not be empty".into()));
            }
        }

        if let Some(hourly) = &self.hourly {
            if hourly.sections[0] == hourly.sections[1] {
                return Err(ConfigError::Invalid(
                    "hourly.sections must name two different sheets".into(),
                ));
            }
        }
        Ok(())
    }

    /// Replace the start date, e.g. from a `START_DATE` override
    pub fn with_start_date(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.start_date = parse_date_str(raw)
            .ok_or_else(|| ConfigError::Invalid(format!("start date '{raw}' is not a date")))?;
        Ok(self)
    }
}

fn default_averaging_exclude() -> Vec<String> {
    vec!["BUNKER NO.".to_string()]
}

fn default_shift_suffix() -> String {
    "SHIFT".to_string()
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date_str(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("start_date '{raw}' is not a date")))
}

/// Two shift labels consolidated into one synthesized row per day
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ShiftPairFile")]
pub struct ShiftPairRule {
    pub first: String,
    pub second: String,
    /// Label written to the averaged row, e.g. "A" for "A-1"/"A-2"
    pub label: String,
}

impl ShiftPairRule {
    pub fn new(first: &str, second: &str) -> Result<Self, String> {
        ShiftPairRule::try_from(ShiftPairFile {
            first: first.to_string(),
            second: second.to_string(),
            label: None,
        })
    }

    /// Whether a (normalized) shift label belongs to this pair
    pub fn matches(&self, label: &str) -> bool {
        label == self.first || label == self.second
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ShiftPairFile {
    first: String,
    second: String,
    #[serde(default)]
    label: Option<String>,
}

impl TryFrom<ShiftPairFile> for ShiftPairRule {
    type Error = String;

    fn try_from(raw: ShiftPairFile) -> Result<Self, Self::Error> {
        let first = raw.first.trim().to_uppercase();
        let second = raw.second.trim().to_uppercase();
        if first.is_empty() || second.is_empty() {
            return Err("shift pair labels must not be empty".to_string());
        }
        if first == second {
            return Err(format!("shift pair '{first}' pairs a label with itself"));
        }
        let label = match raw.label {
            Some(l) => l.trim().to_uppercase(),
            None => first.chars().take(1).collect(),
        };
        if label.chars().count() != 1 {
            return Err(format!(
                "shift pair label '{label}' must be a single character"
            ));
        }
        Ok(Self {
            first,
            second,
            label,
        })
    }
}

/// Selected spreadsheet columns as 0-based indices, in selection order
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ColumnSelectorFile")]
pub struct ColumnSelector {
    indices: Vec<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnSelectorFile {
    Spec(String),
    List(Vec<String>),
}

impl TryFrom<ColumnSelectorFile> for ColumnSelector {
    type Error = String;

    fn try_from(raw: ColumnSelectorFile) -> Result<Self, Self::Error> {
        match raw {
            ColumnSelectorFile::Spec(s) => ColumnSelector::parse(&s),
            ColumnSelectorFile::List(parts) => ColumnSelector::parse(&parts.join(",")),
        }
    }
}

impl ColumnSelector {
    /// Parse "A:Q", "A,C,E:G" or "B1:AG1"-style selectors (row numbers are ignored)
    pub fn parse(spec: &str) -> Result<Self, String> {
        let part_re = Regex::new(r"^([A-Za-z]{1,3})\d*(?::([A-Za-z]{1,3})\d*)?$")
            .map_err(|e| e.to_string())?;

        let mut indices = Vec::new();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let caps = part_re
                .captures(part)
                .ok_or_else(|| format!("invalid column selector '{part}'"))?;
            let start = column_letter_to_index(&caps[1])
                .ok_or_else(|| format!("invalid column '{}'", &caps[1]))?;
            let end = match caps.get(2) {
                Some(m) => column_letter_to_index(m.as_str())
                    .ok_or_else(|| format!("invalid column '{}'", m.as_str()))?,
                None => start,
            };
            if end < start {
                return Err(format!("column range '{part}' runs backwards"));
            }
            indices.extend(start..=end);
        }

        if indices.is_empty() {
            return Err(format!("column selector '{spec}' selects no columns"));
        }
        Ok(Self { indices })
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}

/// One extractable region of a workbook
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "SheetSpecFile")]
pub struct SheetSpec {
    pub name: String,
    pub prefix: String,
    pub shift_averaging: bool,
    /// Header renames applied after reading, only when every source header is present
    pub rename: Vec<(String, String)>,
    pub layout: SheetLayout,
}

#[derive(Debug, Clone)]
pub enum SheetLayout {
    /// Column range read below a 1-based header row
    Header {
        columns: ColumnSelector,
        header_row: u32,
    },
    /// Date row plus labelled rows read by coordinates
    Fixed(FixedCoordinates),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SheetSpecFile {
    name: String,
    #[serde(default)]
    columns: Option<ColumnSelector>,
    #[serde(default)]
    header_row: Option<u32>,
    #[serde(default)]
    prefix: String,
    #[serde(default)]
    shift_averaging: bool,
    #[serde(default)]
    rename: Vec<(String, String)>,
    #[serde(default)]
    fixed: Option<FixedCoordinates>,
}

impl TryFrom<SheetSpecFile> for SheetSpec {
    type Error = String;

    fn try_from(raw: SheetSpecFile) -> Result<Self, Self::Error> {
        let layout = match (raw.columns, raw.fixed) {
            (Some(columns), None) => {
                let header_row = raw.header_row.unwrap_or(1);
                if header_row == 0 {
                    return Err(format!("sheet '{}': header_row is 1-based", raw.name));
                }
                SheetLayout::Header {
                    columns,
                    header_row,
                }
            }
            (None, Some(fixed)) => SheetLayout::Fixed(fixed),
            (Some(_), Some(_)) => {
                return Err(format!(
                    "sheet '{}': 'columns' and 'fixed' are mutually exclusive",
                    raw.name
                ))
            }
            (None, None) => {
                return Err(format!(
                    "sheet '{}': one of 'columns' or 'fixed' is required",
                    raw.name
                ))
            }
        };

        Ok(Self {
            name: raw.name,
            prefix: raw.prefix,
            shift_averaging: raw.shift_averaging,
            rename: raw.rename,
            layout,
        })
    }
}

impl SheetSpec {
    /// Header-mode spec, mostly for callers building configuration in code
    pub fn header(name: &str, columns: &str, header_row: u32) -> Result<Self, String> {
        SheetSpec::try_from(SheetSpecFile {
            name: name.to_string(),
            columns: Some(ColumnSelector::parse(columns)?),
            header_row: Some(header_row),
            prefix: String::new(),
            shift_averaging: false,
            rename: Vec::new(),
            fixed: None,
        })
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn with_shift_averaging(mut self) -> Self {
        self.shift_averaging = true;
        self
    }
}

/// Coordinates of a daily production report block
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "FixedCoordinatesFile")]
pub struct FixedCoordinates {
    /// 1-based row holding one date per column
    pub date_row: u32,
    /// Columns spanned by the dates and the labelled rows
    pub columns: ColumnSelector,
    /// Labelled rows, in output column order
    pub rows: Vec<LabelRow>,
    /// label → output name; a label listed with several targets keeps its own name
    #[serde(default)]
    pub rename: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelRow {
    pub label: String,
    /// 1-based spreadsheet row
    pub row: u32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FixedCoordinatesFile {
    date_row: u32,
    columns: ColumnSelector,
    rows: Vec<LabelRow>,
    #[serde(default)]
    rename: Vec<(String, String)>,
}

impl TryFrom<FixedCoordinatesFile> for FixedCoordinates {
    type Error = String;

    fn try_from(raw: FixedCoordinatesFile) -> Result<Self, Self::Error> {
        if raw.date_row == 0 {
            return Err("fixed.date_row is 1-based".to_string());
        }
        if let Some(bad) = raw.rows.iter().find(|r| r.row == 0) {
            return Err(format!("fixed row for '{}' is 1-based", bad.label));
        }
        Ok(Self {
            date_row: raw.date_row,
            columns: raw.columns,
            rows: raw.rows,
            rename: raw.rename,
        })
    }
}

/// Two report sections of the hourly workbook merged on a timestamp
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HourlySpec {
    pub sections: [String; 2],
    /// Boilerplate rows above each section's header
    #[serde(default)]
    pub skip_rows: u32,
    pub timestamp_column: String,
    #[serde(default = "default_merged_sheet")]
    pub merged_sheet: String,
}

fn default_merged_sheet() -> String {
    "Merged".to_string()
}

/// Artifact file names, resolved against the output directory
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputPaths {
    #[serde(default = "default_combined")]
    pub combined: PathBuf,
    #[serde(default = "default_master")]
    pub master: PathBuf,
    #[serde(default = "default_hourly")]
    pub hourly: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            combined: default_combined(),
            master: default_master(),
            hourly: default_hourly(),
        }
    }
}

fn default_combined() -> PathBuf {
    "combined_output.xlsx".into()
}

fn default_master() -> PathBuf {
    "master.xlsx".into()
}

fn default_hourly() -> PathBuf {
    "hourly_merged.xlsx".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "start_date": "24-Jun-2025",
        "shift_pairs": [
            {"first": "C-1", "second": "C-2"},
            {"first": "a-1", "second": "a-2"},
            {"first": "B-1", "second": "B-2", "label": "b"}
        ],
        "bunker_sheets": [
            {"name": "SINTER", "columns": "A:Q", "header_row": 3, "prefix": "SIN_",
             "shift_averaging": true,
             "rename": [["% T. ALKALI", "%Na2O"], ["Unnamed: 12", "%K2O"]]},
            {"name": "COKE", "columns": ["A", "C", "E:G"], "prefix": "COKE_"}
        ],
        "dpr_sheets": [
            {"name": "DPR", "prefix": "DPR_",
             "fixed": {"date_row": 4, "columns": "C:AG",
                       "rows": [{"label": "Hot Metal", "row": 10}],
                       "rename": [["Hot Metal", "HM_PRODUCTION"]]}}
        ],
        "fixed_order": ["Date", "SIN_SHIFT"],
        "hourly": {"sections": ["BF", "STOVE"], "skip_rows": 5, "timestamp_column": "Timestamp"}
    }"#;

    #[test]
    fn test_parse_sample_config() {
        let config = PipelineConfig::from_json_str(SAMPLE).unwrap();

        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2025, 6, 24).unwrap());
        assert_eq!(config.shift_pairs[1].first, "A-1");
        assert_eq!(config.shift_pairs[1].label, "A");
        assert_eq!(config.shift_pairs[2].label, "B");
        assert_eq!(config.averaging_exclude, vec!["BUNKER NO."]);
        assert_eq!(config.shift_suffix, "SHIFT");
        assert_eq!(config.outputs.master, PathBuf::from("master.xlsx"));

        let sinter = &config.bunker_sheets[0];
        assert!(sinter.shift_averaging);
        assert_eq!(sinter.rename.len(), 2);
        match &sinter.layout {
            SheetLayout::Header {
                columns,
                header_row,
            } => {
                assert_eq!(columns.indices().len(), 17);
                assert_eq!(*header_row, 3);
            }
            other => panic!("Expected header layout, got {other:?}"),
        }

        match &config.bunker_sheets[1].layout {
            SheetLayout::Header { columns, header_row } => {
                assert_eq!(columns.indices(), &[0, 2, 4, 5, 6]);
                assert_eq!(*header_row, 1);
            }
            other => panic!("Expected header layout, got {other:?}"),
        }

        match &config.dpr_sheets[0].layout {
            SheetLayout::Fixed(fixed) => {
                assert_eq!(fixed.date_row, 4);
                assert_eq!(fixed.columns.indices().first(), Some(&2));
                assert_eq!(fixed.rows[0].row, 10);
            }
            other => panic!("Expected fixed layout, got {other:?}"),
        }

        let hourly = config.hourly.unwrap();
        assert_eq!(hourly.merged_sheet, "Merged");
        assert_eq!(hourly.skip_rows, 5);
    }

    #[test]
    fn test_shipped_config_parses() {
        let config =
            PipelineConfig::from_json_str(include_str!("../../config/pipeline.json")).unwrap();
        assert_eq!(config.bunker_sheets.len(), 3);
        assert_eq!(config.shift_pairs[0].label, "C");
    }

    #[test]
    fn test_requires_exactly_three_shift_pairs() {
        let raw = r#"{
            "start_date": "2025-06-24",
            "shift_pairs": [
                {"first": "A-1", "second": "A-2"},
                {"first": "B-1", "second": "B-2"}
            ],
            "bunker_sheets": []
        }"#;
        assert!(matches!(
            PipelineConfig::from_json_str(raw),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_sheet_with_columns_and_fixed() {
        let raw = SAMPLE.replace(
            r#""name": "DPR", "prefix": "DPR_","#,
            r#""name": "DPR", "columns": "A:B","#,
        );
        let err = PipelineConfig::from_json_str(&raw).unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_rejects_bad_start_date() {
        let raw = SAMPLE.replace("24-Jun-2025", "someday");
        let err = PipelineConfig::from_json_str(&raw).unwrap_err();
        assert!(err.to_string().contains("someday"));
    }

    #[test]
    fn test_rejects_label_in_two_pairs() {
        let raw = SAMPLE.replace(r#""first": "C-1""#, r#""first": "A-1""#);
        let err = PipelineConfig::from_json_str(&raw).unwrap_err();
        assert!(err.to_string().contains("A-1"));
    }

    #[test]
    fn test_rejects_two_pairs_with_the_same_averaged_label() {
        let raw = SAMPLE.replace(
            r#"{"first": "C-1", "second": "C-2"}"#,
            r#"{"first": "A-3", "second": "A-4"}"#,
        );
        let err = PipelineConfig::from_json_str(&raw).unwrap_err();
        assert!(err.to_string().contains("averaged label 'A'"));
    }

    #[test]
    fn test_rejects_zero_fixed_rows() {
        let raw = SAMPLE.replace(r#""date_row": 4"#, r#""date_row": 0"#);
        let err = PipelineConfig::from_json_str(&raw).unwrap_err();
        assert!(err.to_string().contains("date_row is 1-based"));

        let raw = SAMPLE.replace(r#""row": 10"#, r#""row": 0"#);
        let err = PipelineConfig::from_json_str(&raw).unwrap_err();
        assert!(err.to_string().contains("'Hot Metal' is 1-based"));
    }

    #[test]
    fn test_with_start_date_override() {
        let config = PipelineConfig::from_json_str(SAMPLE)
            .unwrap()
            .with_start_date("2025-07-01")
            .unwrap();
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
    }

    #[test]
    fn test_column_selector_parse() {
        assert_eq!(ColumnSelector::parse("A:C").unwrap().indices(), &[0, 1, 2]);
        assert_eq!(ColumnSelector::parse("B1:D1").unwrap().indices(), &[1, 2, 3]);
        assert_eq!(ColumnSelector::parse("A, AA").unwrap().indices(), &[0, 26]);
        assert!(ColumnSelector::parse("C:A").is_err());
        assert!(ColumnSelector::parse("1:3").is_err());
        assert!(ColumnSelector::parse("").is_err());
    }

    #[test]
    fn test_shift_pair_rule_normalizes_labels() {
        let rule = ShiftPairRule::new(" a-1", "A-2 ").unwrap();
        assert_eq!(rule.first, "A-1");
        assert_eq!(rule.second, "A-2");
        assert_eq!(rule.label, "A");
        assert!(rule.matches("A-2"));
        assert!(!rule.matches("B-1"));
    }

    #[test]
    fn test_shift_pair_rule_rejects_self_pair() {
        assert!(ShiftPairRule::new("A-1", "a-1").is_err());
    }
}
