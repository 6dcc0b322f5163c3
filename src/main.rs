use anyhow::Context;
use clap::Parser;
use std::fs::OpenOptions;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use chalisha_reporter::config::{CliArgs, ReporterOptions};
use chalisha_reporter::replay::replay;
use chalisha_reporter::reporter::ChalishaReporter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // Keep the guard alive so buffered file logs are flushed on exit
    let mut _log_guard = None;
    let file_layer = match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            _log_guard = Some(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chalisha_reporter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    info!("Starting chalisha-reporter v{}", env!("CARGO_PKG_VERSION"));

    let options = ReporterOptions::from_args(&args)?;
    info!("Report dir: {:?}", options.report_dir);

    let mut reporter = ChalishaReporter::new(options)?;
    info!("Run id: {}", reporter.run_id());

    let stats = if args.events.as_os_str() == "-" {
        info!("Reading events from stdin");
        replay(&mut reporter, BufReader::new(tokio::io::stdin())).await?
    } else {
        info!("Reading events from {:?}", args.events);
        let file = tokio::fs::File::open(&args.events)
            .await
            .with_context(|| format!("Failed to open event stream {:?}", args.events))?;
        replay(&mut reporter, BufReader::new(file)).await?
    };

    info!(
        "Processed {} events ({} malformed, {} tests not recorded)",
        stats.events, stats.malformed_lines, stats.failed_tests
    );
    info!("Report written to {:?}", reporter.writer().report_path());

    Ok(())
}
