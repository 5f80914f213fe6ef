// src/main.rs
use anyhow::Context;
use clap::Parser;
use ct_pack::cli::Cli;
use ct_pack::config::Config;
use ct_pack::log_db::LogDbReader;
use ct_pack::pipeline::{ExportPipeline, run_export};
use ct_pack::progress::ProgressReporter;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Validate arguments
    cli.validate()?;

    // Load config file if given
    let config = match cli.config {
        Some(ref path) => Config::from_file(Path::new(path))?,
        None => Config::default(),
    };

    // Apply CLI overrides
    let report_interval = cli.report_interval.unwrap_or(config.pipeline.report_interval);
    let expected_total = cli.expected_total.unwrap_or(config.pipeline.expected_total);

    // Initialize logging
    let log_level = cli.log_level().unwrap_or(&config.logging.level);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting ct-pack...");

    // Open the source database before touching the output directory, so a
    // bad input path leaves no partial work behind
    let reader = LogDbReader::open(Path::new(&cli.database)).await?;

    let output_dir = Path::new(&cli.output_dir);
    std::fs::create_dir(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;
    tracing::info!("Writing output to {}", output_dir.display());

    let reporter = ProgressReporter::new(cli.should_show_progress(), report_interval, expected_total);
    let pipeline =
        ExportPipeline::start(output_dir, config.pipeline.queue_capacity, reporter).await?;

    run_export(reader, pipeline).await?;

    Ok(())
}
