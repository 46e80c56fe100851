///
/// This module implements the CLI interface for mmspd-explorer-uploader: argument
/// parsing, settings resolution, and the async entrypoint used by `main` and by
/// integration tests.
///
/// All scanning and publishing logic lives in the [`explorer-uploader-core`] crate.
/// This module is strictly CLI glue: it builds the S3 store, hands it to the
/// synchroniser, and decides how the process ends.
///
/// [`explorer-uploader-core`]: ../../explorer-uploader-core/
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use explorer_uploader_core::synchronise::Synchroniser;

use crate::load_config::settings_from;
use crate::upload::S3Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Upload MMSPD score snapshots to S3 for the graph explorer.
#[derive(Debug, Parser)]
#[clap(name = "mmspd-explorer-uploader", version)]
pub struct Cli {
    /// AWS CLI profile name
    #[clap(long)]
    pub aws_profile: Option<String>,

    /// AWS region name
    #[clap(long)]
    pub aws_region: Option<String>,

    /// S3-compatible endpoint URL, e.g. a MinIO server
    #[clap(long)]
    pub endpoint_url: Option<String>,

    /// Number of parallel S3 uploader tasks [default: 10]
    #[clap(long, value_name = "NUM")]
    pub s3_uploaders: Option<usize>,

    /// Seconds to wait between scans [default: 10]
    #[clap(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Scan and upload once, then exit
    #[clap(long)]
    pub once: bool,

    /// YAML file supplying defaults for any of the other options
    #[clap(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[clap(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// AWS S3 bucket name
    #[clap(value_name = "BUCKET")]
    pub bucket: Option<String>,

    /// Cache CSV file for /indexer-scores
    #[clap(value_name = "INDEXER_CACHE")]
    pub indexer_cache: Option<PathBuf>,

    /// Output directories to scan
    #[clap(value_name = "DIRECTORY")]
    pub directories: Vec<PathBuf>,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    let settings = settings_from(&cli)?;
    // Listen before the first pass so an early Ctrl-C still ends the loop cleanly.
    let shutdown = if cli.once { None } else { Some(shutdown_signal()?) };
    let store = S3Store::connect(settings.bucket.clone(), &settings.aws).await;
    let mut synchroniser = Synchroniser::new(settings.sync, Arc::new(store));

    let Some(shutdown) = shutdown else {
        let report = synchroniser.run_once().await?;
        tracing::info!(?report, "Single pass complete");
        if report.uploads_failed > 0 {
            anyhow::bail!("{} of {} uploads failed", report.uploads_failed, report.jobs_queued);
        }
        return Ok(());
    };

    synchroniser.run(shutdown).await;
    Ok(())
}

/// Registers the Ctrl-C listener right away and returns a future resolving on the
/// first interrupt delivered after registration.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt()).context("Cannot listen for Ctrl-C")?;
    Ok(async move {
        interrupt.recv().await;
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c().context("Cannot listen for Ctrl-C")?;
    Ok(async move {
        ctrl_c.recv().await;
    })
}
