use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{Config, HourlySpec, PipelineConfig, SheetSpec};
use crate::readers::sheet_reader::{read_sheet, SheetReadError};
use crate::readers::workbook::{SheetSource, Workbook, WorkbookError};
use crate::reconcile::assembler::{assemble, prepare_sheet, AssembleError, ASSEMBLED_DATE_COLUMN};
use crate::reconcile::joiner::{outer_join_on_date, reorder_columns};
use crate::reconcile::master::{AppendReport, MasterStore, MasterStoreError};
use crate::reconcile::timestamp_merge::merge_sections;
use crate::reconcile::Outcome;
use crate::table::Table;
use crate::writers::{write_workbook, WriteError};

/// Sheet name of the combined artifact
pub const COMBINED_SHEET: &str = "Combined";

/// Error types for a reconciliation cycle
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Workbook error: {0}")]
    Workbook(#[from] WorkbookError),

    #[error("Sheet read error: {0}")]
    SheetRead(#[from] SheetReadError),

    #[error("Assembly of the {dataset} data failed: {source}")]
    Assemble {
        dataset: String,
        source: AssembleError,
    },

    #[error(transparent)]
    Master(#[from] MasterStoreError),

    #[error("Write failed: {0}")]
    Write(#[from] WriteError),
}

/// Processed sheets of one workbook plus the configured sheets it lacked
#[derive(Debug, Default)]
pub struct Dataset {
    pub sheets: Vec<(String, Table)>,
    pub missing: Vec<String>,
}

/// What one cycle produced
#[derive(Debug)]
pub struct RunReport {
    pub sheets_read: usize,
    pub sheets_missing: Vec<String>,
    /// Combined artifact path and its dimensions, or why nothing was written
    pub combined: Outcome<(PathBuf, usize, usize)>,
    pub master: Outcome<AppendReport>,
    /// `None` when no hourly workbook is configured
    pub hourly: Option<Outcome<PathBuf>>,
    pub duration_secs: f64,
}

/// One reconciliation cycle over the configured workbooks
pub struct ReconcileService {
    config: Config,
    pipeline: PipelineConfig,
}

impl ReconcileService {
    pub fn new(config: Config, pipeline: PipelineConfig) -> Self {
        Self { config, pipeline }
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    /// Run a full cycle
    ///
    /// 1. Reads and processes the bunker sheets, then the DPR sheets
    /// 2. Assembles each workbook's sheets and joins the two on Date
    /// 3. Writes the combined artifact
    /// 4. Appends new rows to the master dataset
    /// 5. Merges the hourly sections, when configured
    #[instrument(skip(self), fields(bunker = %self.config.bunker_workbook.display()))]
    pub fn run(&self) -> Result<RunReport, ReconcileError> {
        let start_time = Instant::now();
        info!(
            "Starting reconciliation cycle (start date {})",
            self.pipeline.start_date
        );

        let mut bunker_wb = Workbook::open(&self.config.bunker_workbook)?;
        let bunker = process_workbook(&mut bunker_wb, &self.pipeline.bunker_sheets, &self.pipeline)?;

        let dpr = match &self.config.dpr_workbook {
            Some(path) if !self.pipeline.dpr_sheets.is_empty() => {
                let mut dpr_wb = Workbook::open(path)?;
                process_workbook(&mut dpr_wb, &self.pipeline.dpr_sheets, &self.pipeline)?
            }
            _ => {
                debug!("No DPR workbook configured");
                Dataset::default()
            }
        };

        let sheets_read = bunker.sheets.len() + dpr.sheets.len();
        let mut sheets_missing = bunker.missing.clone();
        sheets_missing.extend(dpr.missing.iter().cloned());

        let combined = combine(bunker, dpr, &self.pipeline.fixed_order)?;

        let (combined_outcome, master_outcome) = match combined {
            Outcome::Done(table) => {
                let path = self.config.output_path(&self.pipeline.outputs.combined);
                write_workbook(&path, &[(COMBINED_SHEET, &table)])?;
                let dims = (path, table.row_count(), table.columns().len());

                let store = MasterStore::new(self.config.output_path(&self.pipeline.outputs.master));
                let master = store.append(table, &self.pipeline.shift_suffix)?;
                (Outcome::Done(dims), master)
            }
            Outcome::Skipped(reason) => {
                warn!("Combined dataset is empty: {}", reason);
                (
                    Outcome::Skipped(reason.clone()),
                    Outcome::Skipped(reason),
                )
            }
        };

        let hourly = match (&self.pipeline.hourly, &self.config.hourly_workbook) {
            (Some(spec), Some(input)) => {
                let output = self.config.output_path(&self.pipeline.outputs.hourly);
                Some(merge_hourly_workbook(input, spec, &output)?)
            }
            _ => None,
        };

        let duration = start_time.elapsed();
        info!(
            "✓ Reconciliation cycle complete ({:.1}s, {} sheets)",
            duration.as_secs_f64(),
            sheets_read
        );

        Ok(RunReport {
            sheets_read,
            sheets_missing,
            combined: combined_outcome,
            master: master_outcome,
            hourly,
            duration_secs: duration.as_secs_f64(),
        })
    }
}

/// Read and process every configured sheet of one workbook
///
/// Sheets missing from the workbook are skipped with a warning; any other read failure
/// aborts the workbook.
#[instrument(skip_all, fields(sheets = specs.len()))]
pub fn process_workbook<S: SheetSource>(
    source: &mut S,
    specs: &[SheetSpec],
    pipeline: &PipelineConfig,
) -> Result<Dataset, ReconcileError> {
    let mut dataset = Dataset::default();
    for spec in specs {
        info!("Parsing sheet: {}", spec.name);
        match read_sheet(source, spec) {
            Ok(raw) => {
                let processed = prepare_sheet(raw, spec, pipeline);
                dataset.sheets.push((spec.name.clone(), processed));
            }
            Err(SheetReadError::SheetNotFound(name)) => {
                warn!("Sheet '{}' not found, skipping", name);
                dataset.missing.push(name);
            }
            Err(e) => {
                error!("Failed to read sheet '{}': {}", spec.name, e);
                return Err(e.into());
            }
        }
    }
    Ok(dataset)
}

/// Assemble both datasets and join them; either side may be empty
///
/// A side without a `Date` column cannot be joined and is left out with a warning.
pub fn combine(
    bunker: Dataset,
    dpr: Dataset,
    fixed_order: &[String],
) -> Result<Outcome<Table>, ReconcileError> {
    let assemble_named = |dataset: &str, sheets| {
        assemble(sheets).map_err(|source| ReconcileError::Assemble {
            dataset: dataset.to_string(),
            source,
        })
    };

    let bunker = assemble_named("bunker", bunker.sheets)?;
    let dpr = assemble_named("DPR", dpr.sheets)?;

    let joined = match (bunker, dpr) {
        (Outcome::Done(left), Outcome::Done(right)) => {
            let has_date = |t: &Table| t.find_column(ASSEMBLED_DATE_COLUMN).is_some();
            match (has_date(&left), has_date(&right)) {
                (true, true) => {
                    outer_join_on_date(&left, &right).map_err(|source| {
                        ReconcileError::Assemble {
                            dataset: "combined".to_string(),
                            source,
                        }
                    })?
                }
                (true, false) => {
                    warn!("DPR data has no Date column, leaving it out of the join");
                    left
                }
                (false, true) => {
                    warn!("Bunker data has no Date column, leaving it out of the join");
                    right
                }
                (false, false) => {
                    let reason = "neither dataset has a Date column".to_string();
                    warn!("{}", reason);
                    return Ok(Outcome::Skipped(reason));
                }
            }
        }
        (Outcome::Done(only), Outcome::Skipped(_)) | (Outcome::Skipped(_), Outcome::Done(only)) => {
            only
        }
        (Outcome::Skipped(reason), Outcome::Skipped(_)) => return Ok(Outcome::Skipped(reason)),
    };

    Ok(Outcome::Done(reorder_columns(joined, fixed_order)))
}

/// Merge the two hourly sections of `input` and write them with the merge to `output`
#[instrument(skip(spec), fields(input = %input.display()))]
pub fn merge_hourly_workbook(
    input: &Path,
    spec: &HourlySpec,
    output: &Path,
) -> Result<Outcome<PathBuf>, ReconcileError> {
    let mut workbook = Workbook::open(input)?;
    match merge_sections(&mut workbook, spec)? {
        Outcome::Done(merge) => {
            write_workbook(output, &merge.sheets())?;
            info!(
                "Hourly merge: {} rows written to {}",
                merge.merged.row_count(),
                output.display()
            );
            Ok(Outcome::Done(output.to_path_buf()))
        }
        Outcome::Skipped(reason) => {
            warn!("Hourly merge skipped: {}", reason);
            Ok(Outcome::Skipped(reason))
        }
    }
}
