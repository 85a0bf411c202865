use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use kin_core::{Config, MediaResult};
use kin_processing::MediaPipeline;
use kin_worker::{IngestHandle, IngestJob, IngestQueue};
use std::path::PathBuf;
use std::sync::Arc;

use kin_cli::{parse_taken_at, print_json, print_table, IngestOutcome, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "kin-ingest")]
#[command(about = "Store photos and videos as content-addressed variant sets")]
struct Args {
    /// Files to ingest
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Owner the files belong to
    #[arg(long, value_name = "ID")]
    owner: i64,

    /// Capture time, RFC 3339 or YYYY-MM-DD (default: now)
    #[arg(long, value_name = "DATE", value_parser = parse_taken_at)]
    taken_at: Option<DateTime<Utc>>,

    /// Media root directory (overrides MEDIA_PATH)
    #[arg(long, value_name = "DIR")]
    media_path: Option<PathBuf>,

    /// Output format: json or table
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(media_path) = args.media_path {
        config.media_path = media_path;
    }

    kin_infra::init_telemetry("kin-ingest", &config.environment, "info")
        .map_err(|e| anyhow!("Failed to initialize telemetry: {}", e))?;

    let pipeline = MediaPipeline::new(&config)
        .await
        .context("Failed to initialize media pipeline")?;
    let queue = IngestQueue::new(Arc::new(pipeline), &config.worker);
    let taken_at = args.taken_at.unwrap_or_else(Utc::now);

    tracing::info!(
        files = args.files.len(),
        owner_id = args.owner,
        taken_at = %taken_at,
        media_path = %config.media_path.display(),
        "Starting ingest"
    );

    // Submit everything first so the worker pool stays busy, then collect in order.
    let mut pending: Vec<(String, MediaResult<IngestHandle>)> = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let display = path.display().to_string();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| display.clone());

        let submitted = match tokio::fs::read(path).await {
            Ok(data) => {
                queue
                    .submit(IngestJob::new(data, filename, args.owner, taken_at))
                    .await
            }
            Err(e) => Err(e.into()),
        };
        pending.push((display, submitted));
    }

    let mut outcomes = Vec::with_capacity(pending.len());
    for (file, submitted) in pending {
        let result = match submitted {
            Ok(handle) => handle.wait().await,
            Err(e) => Err(e),
        };
        if let Ok(set) = &result {
            tracing::debug!(
                file = %file,
                preview = ?set.preview().map(|v| v.path.as_str()),
                "Ingest finished"
            );
        }
        outcomes.push(IngestOutcome::new(file, result));
    }

    match args.format {
        OutputFormat::Json => print_json(&outcomes)?,
        OutputFormat::Table => print_table(&outcomes),
    }

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        return Err(anyhow!("{} of {} file(s) failed to ingest", failed, outcomes.len()));
    }

    Ok(())
}
