use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use plant_sheet_reconciler::config::{Config, PipelineConfig};
use plant_sheet_reconciler::reconcile::Outcome;
use plant_sheet_reconciler::services::ReconcileService;

#[instrument]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing with environment filter support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,plant_sheet_reconciler=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    info!("Starting plant sheet reconciler with config: {:?}", config);

    let mut pipeline = PipelineConfig::from_file(&config.pipeline_config_path)?;
    if let Some(raw) = &config.start_date_override {
        info!("Overriding start date with {}", raw);
        pipeline = pipeline.with_start_date(raw)?;
    }

    let service = ReconcileService::new(config, pipeline);

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message("Reconciling plant sheets...");
    let report = service.run()?;
    pb.finish_with_message("✓ Reconciliation complete");

    println!("\n{}", "=".repeat(60));
    println!("Reconciliation Summary");
    println!("{}", "=".repeat(60));
    println!("Start Date:         {}", service.pipeline().start_date);
    println!("Sheets Read:        {}", report.sheets_read);
    if !report.sheets_missing.is_empty() {
        println!("Sheets Missing:     {}", report.sheets_missing.join(", "));
    }
    println!("{}", "-".repeat(60));
    match &report.combined {
        Outcome::Done((path, rows, columns)) => {
            println!("Combined:           {rows} rows x {columns} columns");
            println!("                    {}", path.display());
        }
        Outcome::Skipped(reason) => println!("Combined:           skipped ({reason})"),
    }
    match &report.master {
        Outcome::Done(master) => {
            println!("Master Appended:    {}", master.appended);
            println!("Master Duplicates:  {}", master.duplicates);
            println!("Master Unkeyed:     {}", master.dropped_unkeyed);
            println!("Master Total Rows:  {}", master.total_rows);
        }
        Outcome::Skipped(reason) => println!("Master:             unchanged ({reason})"),
    }
    match &report.hourly {
        Some(Outcome::Done(path)) => println!("Hourly Merge:       {}", path.display()),
        Some(Outcome::Skipped(reason)) => println!("Hourly Merge:       skipped ({reason})"),
        None => println!("Hourly Merge:       not configured"),
    }
    println!("{}", "-".repeat(60));
    println!("Total Time:         {:.2}s", report.duration_secs);
    println!("{}", "=".repeat(60));

    Ok(())
}
