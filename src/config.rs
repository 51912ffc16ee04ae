pub mod pipeline;

pub use pipeline::{
    ColumnSelector, ConfigError, FixedCoordinates, HourlySpec, LabelRow, OutputPaths,
    PipelineConfig, SheetLayout, SheetSpec, ShiftPairRule,
};

use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    pub pipeline_config_path: PathBuf,
    pub bunker_workbook: PathBuf,
    pub dpr_workbook: Option<PathBuf>,
    pub hourly_workbook: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub start_date_override: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            pipeline_config_path: env::var("PIPELINE_CONFIG")
                .unwrap_or_else(|_| "config/pipeline.json".to_string())
                .into(),
            bunker_workbook: env::var("BUNKER_WORKBOOK")?.into(),
            dpr_workbook: optional_var("DPR_WORKBOOK").map(PathBuf::from),
            hourly_workbook: optional_var("HOURLY_WORKBOOK").map(PathBuf::from),
            output_dir: env::var("OUTPUT_DIR")
                .unwrap_or_else(|_| "output".to_string())
                .into(),
            start_date_override: optional_var("START_DATE"),
        })
    }

    /// Resolve an artifact path from the pipeline config against the output directory
    pub fn output_path(&self, artifact: &Path) -> PathBuf {
        if artifact.is_absolute() {
            artifact.to_path_buf()
        } else {
            self.output_dir.join(artifact)
        }
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
