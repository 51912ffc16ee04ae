/// Master append/dedup store
///
/// The master dataset accumulates every reconciled row across runs. A row is recorded
/// once per composite key: its calendar date plus the values of every shift column.
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::readers::sheet_reader::read_table;
use crate::readers::workbook::{SheetSource, Workbook, WorkbookError};
use crate::reconcile::assembler::ASSEMBLED_DATE_COLUMN;
use crate::reconcile::Outcome;
use crate::table::{Table, Value};
use crate::writers::{write_workbook, WriteError};

/// Sheet name of the persisted master workbook
pub const MASTER_SHEET: &str = "Master";

#[derive(Error, Debug)]
pub enum MasterStoreError {
    #[error("Master dataset is locked by another run ({0})")]
    Locked(PathBuf),

    #[error("Failed to create lock file {path}: {source}")]
    Lock { path: PathBuf, source: io::Error },

    #[error("Failed to read master dataset: {0}")]
    Workbook(#[from] WorkbookError),

    #[error("Failed to write master dataset: {0}")]
    Write(#[from] WriteError),
}

/// Result of merging one batch into the master rows
#[derive(Debug, Clone, PartialEq)]
pub struct MasterMerge {
    pub table: Table,
    /// Batch rows whose key was new
    pub appended: usize,
    /// Batch rows whose key was already recorded (or repeated inside the batch)
    pub duplicates: usize,
    /// Batch rows without a date or without any shift value
    pub dropped_unkeyed: usize,
}

/// Counts reported after an append that changed the master file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReport {
    pub appended: usize,
    pub duplicates: usize,
    pub dropped_unkeyed: usize,
    pub total_rows: usize,
}

fn date_key(v: &Value) -> String {
    v.as_date()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| v.key_string())
}

/// Append the batch rows whose composite key is not yet in `existing`
///
/// Key columns are taken from the batch: `Date` plus every column whose name ends with
/// `shift_suffix` (case-insensitive). The result has the existing columns followed by
/// columns only the batch carries; cells a row lacks are null.
#[instrument(skip_all, fields(existing = existing.row_count(), batch = batch.row_count()))]
pub fn merge_into_master(existing: Table, batch: Table, shift_suffix: &str) -> MasterMerge {
    let Some(batch_date) = batch.find_column(ASSEMBLED_DATE_COLUMN) else {
        warn!("Batch has no Date column, nothing can be keyed");
        return MasterMerge {
            dropped_unkeyed: batch.row_count(),
            table: existing,
            appended: 0,
            duplicates: 0,
        };
    };

    let suffix = shift_suffix.trim().to_uppercase();
    let shift_names: Vec<String> = batch
        .columns()
        .iter()
        .enumerate()
        .filter(|(i, name)| *i != batch_date && name.trim().to_uppercase().ends_with(&suffix))
        .map(|(_, name)| name.clone())
        .collect();
    if shift_names.is_empty() {
        debug!("Batch has no {} columns, keying on Date alone", suffix);
    }
    let batch_shift: Vec<usize> = shift_names
        .iter()
        .filter_map(|n| batch.column_index(n))
        .collect();

    // existing keys, looked up by the batch's key column names
    let master_date = existing.find_column(ASSEMBLED_DATE_COLUMN);
    let master_shift: Vec<Option<usize>> =
        shift_names.iter().map(|n| existing.column_index(n)).collect();
    let mut seen: HashSet<Vec<String>> = existing
        .rows()
        .iter()
        .map(|row| {
            let mut key = vec![master_date.map(|i| date_key(&row[i])).unwrap_or_default()];
            key.extend(
                master_shift
                    .iter()
                    .map(|idx| idx.map(|i| row[i].key_string()).unwrap_or_default()),
            );
            key
        })
        .collect();

    // union of columns; the batch date lands on the master date column
    let (mut columns, mut rows) = existing.into_parts();
    if columns.is_empty() {
        rows.clear();
    }
    let mut target = Vec::with_capacity(batch.columns().len());
    for (i, name) in batch.columns().iter().enumerate() {
        let existing_idx = if i == batch_date {
            master_date.filter(|_| !columns.is_empty())
        } else {
            columns.iter().position(|c| c == name)
        };
        match existing_idx {
            Some(idx) => target.push(idx),
            None => {
                columns.push(name.clone());
                target.push(columns.len() - 1);
            }
        }
    }

    let mut appended = 0;
    let mut duplicates = 0;
    let mut dropped_unkeyed = 0;
    for row in batch.rows() {
        let Some(date) = row[batch_date].as_date() else {
            dropped_unkeyed += 1;
            continue;
        };
        if !batch_shift.is_empty() && batch_shift.iter().all(|&i| row[i].is_null()) {
            dropped_unkeyed += 1;
            continue;
        }

        let mut key = vec![date.format("%Y-%m-%d").to_string()];
        key.extend(batch_shift.iter().map(|&i| row[i].key_string()));
        if !seen.insert(key) {
            duplicates += 1;
            continue;
        }

        let mut out = vec![Value::Null; columns.len()];
        for (i, value) in row.iter().enumerate() {
            out[target[i]] = if i == batch_date {
                Value::Date(date)
            } else {
                value.clone()
            };
        }
        rows.push(out);
        appended += 1;
    }

    let table = Table::new(columns, rows);
    info!(
        "Master merge: {} new rows, {} duplicates skipped, {} unkeyed rows dropped",
        appended, duplicates, dropped_unkeyed
    );
    MasterMerge {
        table,
        appended,
        duplicates,
        dropped_unkeyed,
    }
}

/// Exclusive claim on the master file, released when dropped
#[derive(Debug)]
pub struct MasterLock {
    path: PathBuf,
}

impl Drop for MasterLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}

/// The persisted master dataset: one xlsx workbook with a single sheet
#[derive(Debug, Clone)]
pub struct MasterStore {
    path: PathBuf,
}

impl MasterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut raw = self.path.as_os_str().to_owned();
        raw.push(".lock");
        PathBuf::from(raw)
    }

    /// Take the lock file; fails if another run holds it
    pub fn lock(&self) -> Result<MasterLock, MasterStoreError> {
        let path = self.lock_path();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| MasterStoreError::Lock {
                path: path.clone(),
                source,
            })?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(MasterStoreError::Locked(path))
            }
            Err(source) => return Err(MasterStoreError::Lock { path, source }),
        };
        // holder pid, for whoever finds a stale lock
        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            warn!("Failed to record pid in {}: {}", path.display(), e);
        }
        debug!("Acquired {}", path.display());
        Ok(MasterLock { path })
    }

    /// Persisted rows, or an empty table if the master does not exist yet
    pub fn load(&self) -> Result<Table, MasterStoreError> {
        if !self.path.exists() {
            info!("No master dataset at {}, starting empty", self.path.display());
            return Ok(Table::default());
        }

        let mut workbook = Workbook::open(&self.path)?;
        let Some(sheet) = workbook.sheet_names().into_iter().next() else {
            return Ok(Table::default());
        };
        let Some(range) = workbook.sheet_range(&sheet)? else {
            return Ok(Table::default());
        };

        let mut table = read_table(&range, 1);
        if let Some(idx) = table.find_column(ASSEMBLED_DATE_COLUMN) {
            table.map_column(idx, |v| v.as_date().map(Value::Date).unwrap_or_else(|| v.clone()));
        }
        debug!("Loaded {} master rows", table.row_count());
        Ok(table)
    }

    pub fn save(&self, table: &Table) -> Result<(), MasterStoreError> {
        write_workbook(&self.path, &[(MASTER_SHEET, table)])?;
        Ok(())
    }

    /// Lock, load, merge and save; the file is only rewritten when rows were added
    #[instrument(skip_all, fields(master = %self.path.display()))]
    pub fn append(
        &self,
        batch: Table,
        shift_suffix: &str,
    ) -> Result<Outcome<AppendReport>, MasterStoreError> {
        let _lock = self.lock()?;
        let existing = self.load()?;
        let merge = merge_into_master(existing, batch, shift_suffix);

        if merge.appended == 0 {
            debug!("No new master rows");
            return Ok(Outcome::Skipped("no new rows to append".to_string()));
        }

        self.save(&merge.table)?;
        info!(
            "Appended {} rows to master ({} total)",
            merge.appended,
            merge.table.row_count()
        );
        Ok(Outcome::Done(AppendReport {
            appended: merge.appended,
            duplicates: merge.duplicates,
            dropped_unkeyed: merge.dropped_unkeyed,
            total_rows: merge.table.row_count(),
        }))
    }
}
