use clap::Parser;
use std::path::PathBuf;

use plant_sheet_reconciler::readers::workbook::{cell_at, used_extent, SheetSource, Workbook};
use plant_sheet_reconciler::table::Value;
use plant_sheet_reconciler::utils::index_to_column_letter;

#[derive(Parser)]
#[command(name = "examine-workbook")]
#[command(about = "List the sheets of a workbook and dump the first rows of one of them", long_about = None)]
struct Cli {
    /// Workbook to examine
    file: PathBuf,

    /// Sheet to dump (defaults to the first sheet)
    #[arg(long)]
    sheet: Option<String>,

    /// Number of rows to show
    #[arg(long, default_value = "40")]
    rows: u32,

    /// Number of columns to show
    #[arg(long, default_value = "10")]
    columns: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    println!("Opening workbook: {}", cli.file.display());
    let mut workbook = Workbook::open(&cli.file)?;

    let names = workbook.sheet_names();
    println!("\nSheet names:");
    for (i, name) in names.iter().enumerate() {
        println!("  {i}: {name}");
    }

    let sheet_name = match cli.sheet.or_else(|| names.first().cloned()) {
        Some(name) => name,
        None => return Err("workbook has no sheets".into()),
    };

    println!("\n\nExamining sheet: {sheet_name}");
    println!("{}", "=".repeat(100));

    let range = workbook
        .sheet_range(&sheet_name)?
        .ok_or_else(|| format!("sheet '{sheet_name}' not found"))?;
    let Some((last_row, last_col)) = used_extent(&range) else {
        println!("Sheet is empty");
        return Ok(());
    };

    println!("Used area: A1:{}{}", index_to_column_letter(last_col), last_row + 1);
    println!(
        "\nFirst {} rows (showing first {} columns):",
        cli.rows, cli.columns
    );
    println!("{}", "=".repeat(100));

    let width = cli.columns.min(last_col + 1);
    for row in 0..cli.rows.min(last_row + 1) {
        let cells: Vec<Value> = (0..width).map(|col| cell_at(&range, row, col)).collect();
        // Only print rows with data
        if cells.iter().all(Value::is_null) {
            continue;
        }
        print!("Row {:3}: ", row + 1);
        for cell in &cells {
            if cell.is_null() {
                print!("[empty] ");
            } else {
                print!("[{cell}] ");
            }
        }
        println!();
    }

    Ok(())
}
