/// `load_config` module: loads the optional YAML config file and merges it with the
/// command line into the settings the uploader runs with.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into type-safe structs
/// - Let every command line value take precedence over the file
/// - Fail with a clear diagnostic when a required value (bucket, indexer cache,
///   directories) is set in neither place
///
/// Credentials never live here: they come from the AWS credential chain.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use explorer_uploader_core::synchronise::{
    SynchroniseConfig, DEFAULT_POLL_INTERVAL, DEFAULT_UPLOADERS,
};

use crate::cli::Cli;
use crate::upload::AwsSettings;

/// Shape of the YAML config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bucket: Option<String>,
    pub indexer_cache: Option<PathBuf>,
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    pub aws_profile: Option<String>,
    pub aws_region: Option<String>,
    pub endpoint_url: Option<String>,
    pub s3_uploaders: Option<usize>,
    pub poll_interval_secs: Option<u64>,
}

/// Fully resolved settings for one process.
#[derive(Debug, Clone)]
pub struct UploaderSettings {
    pub bucket: String,
    pub aws: AwsSettings,
    pub sync: SynchroniseConfig,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        e
    })
    .with_context(|| format!("Failed to read config file {:?}", path_ref))?;

    let config: FileConfig = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML {:?}: {e}", path_ref)
    })?;

    info!(config_path = ?path_ref, "Parsed config YAML successfully");
    Ok(config)
}

/// Merges the command line over the (optional) file config.
pub fn resolve(cli: &Cli, file: FileConfig) -> Result<UploaderSettings> {
    let bucket = cli
        .bucket
        .clone()
        .or(file.bucket)
        .context("no bucket given on the command line or in the config file")?;
    let indexer_cache = cli
        .indexer_cache
        .clone()
        .or(file.indexer_cache)
        .context("no indexer cache given on the command line or in the config file")?;
    let directories = if cli.directories.is_empty() {
        file.directories
    } else {
        cli.directories.clone()
    };
    if directories.is_empty() {
        anyhow::bail!("no directories given on the command line or in the config file");
    }

    let uploaders = cli
        .s3_uploaders
        .or(file.s3_uploaders)
        .unwrap_or(DEFAULT_UPLOADERS);
    if uploaders == 0 {
        anyhow::bail!("s3-uploaders must be at least 1");
    }
    let poll_interval = cli
        .poll_interval
        .or(file.poll_interval_secs)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_POLL_INTERVAL);

    let aws = AwsSettings {
        profile: cli.aws_profile.clone().or(file.aws_profile),
        region: cli.aws_region.clone().or(file.aws_region),
        endpoint_url: cli.endpoint_url.clone().or(file.endpoint_url),
    };

    let mut sync = SynchroniseConfig::new(directories, indexer_cache);
    sync.uploaders = uploaders;
    sync.poll_interval = poll_interval;

    info!(
        bucket = %bucket,
        directories = sync.directories.len(),
        uploaders,
        poll_interval_secs = poll_interval.as_secs(),
        "Config loaded and merged successfully"
    );
    Ok(UploaderSettings { bucket, aws, sync })
}

/// Resolves settings, reading the config file first when `--config` is given.
pub fn settings_from(cli: &Cli) -> Result<UploaderSettings> {
    let file = match &cli.config {
        Some(path) => load_config(path)?,
        None => FileConfig::default(),
    };
    resolve(cli, file)
}
