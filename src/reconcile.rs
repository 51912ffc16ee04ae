// Tabular reconciliation stages
//
// Each stage takes tables by value and returns new ones. Stages that can decline to
// produce anything return `Outcome::Skipped` with a reason; structural failures are
// reported through each stage's error type.

pub mod assembler;
pub mod joiner;
pub mod master;
pub mod shift_averaging;
pub mod timestamp_merge;

pub use assembler::{assemble, filter_by_start_date, prepare_sheet, AssembleError};
pub use joiner::{outer_join_on_date, reorder_columns};
pub use master::{merge_into_master, AppendReport, MasterMerge, MasterStore, MasterStoreError};
pub use shift_averaging::{average_shift_pairs, combine_pair, Averaged};
pub use timestamp_merge::{merge_on_timestamp, merge_sections, read_section, HourlyMerge};

/// Result of a stage that may legitimately have nothing to do
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Done(T),
    Skipped(String),
}

impl<T> Outcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    pub fn done(self) -> Option<T> {
        match self {
            Outcome::Done(v) => Some(v),
            Outcome::Skipped(_) => None,
        }
    }
}
