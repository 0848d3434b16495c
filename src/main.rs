//! CLI entry point for the GTFS calendar comparison tool.
//!
//! Provides subcommands for comparing a directory of feed generations,
//! resolving a single generation's calendar, and scanning service alert
//! snapshots for changes.

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeDelta};
use clap::{Parser, Subcommand};
use gtfs_calendar_diff::{
    alerts::scan_alert_files,
    loader::{Generation, list_generations},
    model::FactKey,
    output::{print_json, summarize, write_calendar, write_pivot, write_summary},
    pipeline::{self, process_generation},
    publish::upload_file,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_calendar_diff")]
#[command(about = "Track how GTFS service calendars change across feed generations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare every generation directory under GTFS_DIR, oldest name first
    Compare {
        /// Directory holding one subdirectory per feed generation
        #[arg(value_name = "GTFS_DIR")]
        gtfs_dir: PathBuf,

        /// CSV file to write the pivot table to
        #[arg(short, long, default_value = "pivot.csv")]
        output: PathBuf,

        /// Optional: CSV file for the per-date summary
        #[arg(short, long)]
        summary: Option<PathBuf>,

        /// Fact column groups of the pivot table, in order
        #[arg(
            short,
            long,
            value_enum,
            value_delimiter = ',',
            default_value = "generation,service_id,trip_count"
        )]
        facts: Vec<FactKey>,

        /// Write a `key@generation` header row to the pivot table
        #[arg(long, default_value_t = false)]
        header: bool,

        /// Optional: S3 bucket to upload the written files to
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Key prefix for S3 uploads
        #[arg(long, default_value = "comparisons")]
        s3_prefix: String,

        /// Gzip compress files before uploading to S3
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Resolve the calendar of a single generation directory
    Resolve {
        #[arg(value_name = "GENERATION_DIR")]
        dir: PathBuf,

        /// CSV file to write `date,service_ids` rows to
        #[arg(short, long, default_value = "calendar.csv")]
        output: PathBuf,
    },
    /// Report when service alert snapshots change content
    ScanAlerts {
        /// Directory of `YYYY-MM-DDTHH:MM:SS.pb` snapshots
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Scan start, e.g. 2020-03-01T00:00:00
        #[arg(long)]
        from: NaiveDateTime,

        /// Scan end (inclusive)
        #[arg(long)]
        to: NaiveDateTime,

        /// Hours between scan steps
        #[arg(long, default_value_t = 12)]
        step_hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/gtfs_calendar_diff.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_calendar_diff.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compare {
            gtfs_dir,
            output,
            summary,
            facts,
            header,
            s3_bucket,
            s3_prefix,
            gzip,
        } => {
            let generations = list_generations(&gtfs_dir)
                .with_context(|| format!("listing generations in {}", gtfs_dir.display()))?;
            if generations.is_empty() {
                warn!(dir = %gtfs_dir.display(), "No generation directories found");
            }

            let comparison = pipeline::run(&generations, &facts);

            write_pivot(&output, &comparison.pivot, header)?;
            let mut written = vec![output];

            let summaries = summarize(&comparison.series);
            for s in &summaries {
                debug!(
                    date = %s.date,
                    latest_generation = %s.latest_generation,
                    generations = s.generations,
                    trips = %s.trip_history,
                    "Date summary"
                );
            }
            if let Some(path) = summary {
                write_summary(&path, &summaries)?;
                written.push(path);
            }

            for failure in &comparison.failures {
                warn!(generation = %failure.label, error = %failure.error, "Generation was skipped");
            }

            if let Some(bucket) = s3_bucket {
                info!(bucket = %bucket, gzip, "S3 upload enabled");
                let config = aws_config::load_from_env().await;
                let s3 = aws_sdk_s3::Client::new(&config);
                for path in &written {
                    upload_file(&s3, &bucket, &s3_prefix, path, gzip).await?;
                }
            }
        }
        Commands::Resolve { dir, output } => {
            let label = dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("generation")
                .to_string();
            let generation = Generation { label, path: dir };

            let resolved = process_generation(&generation)
                .with_context(|| format!("resolving {}", generation.path.display()))?;
            print_json(&resolved)?;
            write_calendar(&output, &resolved.calendar)?;

            info!(
                output = %output.display(),
                days = resolved.calendar.len(),
                "Resolved calendar written"
            );
        }
        Commands::ScanAlerts {
            dir,
            from,
            to,
            step_hours,
        } => {
            let step = TimeDelta::try_hours(step_hours).context("step is out of range")?;
            let changes = scan_alert_files(&dir, from, to, step)?;
            for change in &changes {
                info!(
                    at = %change.at,
                    file = %change.file.display(),
                    alerts = change.alert_count,
                    "Alert change"
                );
            }
            info!(changes = changes.len(), "Alert scan finished");
        }
    }

    Ok(())
}
