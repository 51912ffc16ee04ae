use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use plant_sheet_reconciler::config::HourlySpec;
use plant_sheet_reconciler::reconcile::Outcome;
use plant_sheet_reconciler::services::reconcile_service::merge_hourly_workbook;

#[derive(Parser)]
#[command(name = "merge-hourly")]
#[command(about = "Merge two hourly report sections of a workbook on their timestamp column", long_about = None)]
struct Cli {
    /// Hourly workbook to read
    #[arg(long, env = "HOURLY_WORKBOOK")]
    input: PathBuf,

    /// First section (sheet name)
    #[arg(long)]
    left: String,

    /// Second section (sheet name)
    #[arg(long)]
    right: String,

    /// Boilerplate rows above each section's header
    #[arg(long, default_value = "0")]
    skip_rows: u32,

    /// Timestamp column shared by both sections
    #[arg(long, default_value = "Timestamp")]
    timestamp_column: String,

    /// Name of the merged sheet
    #[arg(long, default_value = "Merged")]
    merged_sheet: String,

    /// Output workbook
    #[arg(long, default_value = "output/hourly_merged.xlsx")]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if it exists (ignore errors if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if cli.left == cli.right {
        return Err("--left and --right must name different sheets".into());
    }

    let spec = HourlySpec {
        sections: [cli.left, cli.right],
        skip_rows: cli.skip_rows,
        timestamp_column: cli.timestamp_column,
        merged_sheet: cli.merged_sheet,
    };

    info!("Merging {:?} from {}", spec.sections, cli.input.display());
    match merge_hourly_workbook(&cli.input, &spec, &cli.output)? {
        Outcome::Done(path) => println!("✓ Wrote {}", path.display()),
        Outcome::Skipped(reason) => println!("Nothing written: {reason}"),
    }
    Ok(())
}
