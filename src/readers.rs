// Workbook access and region extraction

pub mod sheet_reader;
pub mod workbook;

// Re-export commonly used items
pub use sheet_reader::{read_sheet, read_table, SheetReadError};
pub use workbook::{InMemoryWorkbook, SheetSource, Workbook, WorkbookError};
