// Artifact writers

pub mod xlsx_writer;

pub use xlsx_writer::{write_workbook, WriteError};
