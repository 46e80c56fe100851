//! High-level pipeline: scan score output directories and publish new snapshots.
//!
//! One pass ("run") of the [`Synchroniser`]:
//!   - scans every configured directory for `<ts>.json` manifests
//!   - validates each manifest and skips snapshots already published
//!   - extracts the matching `<ts>.zip` into a scratch directory and queues every
//!     file under both its scoped and its legacy key
//!   - rebuilds `timestamps.json` and `list.json` for the latest epoch and queues
//!     them together with the indexer-scores cache
//!   - waits for the uploader pool to drain, then removes the scratch directory
//!
//! The catalog of published snapshots lives in memory, so a restart republishes
//! everything once. Per-snapshot and per-upload failures are logged and never
//! abort a pass.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::archive::extract_archive;
use crate::catalog::Catalog;
use crate::contract::{ObjectStore, UploadJob};
use crate::keys;
use crate::manifest::{load_manifest, snapshot_ts};
use crate::pool::UploaderPool;

pub const DEFAULT_UPLOADERS: usize = 10;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SynchroniseConfig {
    /// Score computer output directories to scan.
    pub directories: Vec<PathBuf>,
    /// Local cache file published as `api/scores/indexer-scores`.
    pub indexer_cache: PathBuf,
    /// Number of concurrent uploader workers.
    pub uploaders: usize,
    pub poll_interval: Duration,
}

impl SynchroniseConfig {
    pub fn new(directories: Vec<PathBuf>, indexer_cache: PathBuf) -> Self {
        Self {
            directories,
            indexer_cache,
            uploaders: DEFAULT_UPLOADERS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cannot create scratch directory: {0}")]
    Scratch(#[source] std::io::Error),
    #[error("cannot write index document {path}: {source}")]
    WriteIndex {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode index document: {0}")]
    EncodeIndex(#[from] serde_json::Error),
}

/// Outcome of one pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub snapshots_published: usize,
    pub snapshots_failed: usize,
    pub jobs_queued: usize,
    pub uploads_succeeded: usize,
    pub uploads_failed: usize,
}

enum Snapshot {
    /// Not a manifest, not ready yet, or already published.
    Skipped,
    Broken,
    Queued(usize),
}

pub struct Synchroniser {
    config: SynchroniseConfig,
    store: Arc<dyn ObjectStore>,
    catalog: Catalog,
}

impl Synchroniser {
    pub fn new(config: SynchroniseConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            config,
            store,
            catalog: Catalog::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Runs passes until `shutdown` resolves, sleeping the poll interval between them.
    ///
    /// A pass in progress is always completed before returning.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            match self.run_once().await {
                Ok(report) => debug!(?report, "run report"),
                Err(e) => error!(error = %e, "run failed"),
            }
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping");
                    return;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Performs a single scan-and-publish pass.
    pub async fn run_once(&mut self) -> Result<RunReport, SyncError> {
        info!("starting a run");
        let scratch = TempDir::new().map_err(SyncError::Scratch)?;
        let pool = UploaderPool::spawn(self.store.clone(), self.config.uploaders);
        let mut report = RunReport::default();

        // The pool is always drained, even when queueing the indexes fails.
        let queued = self.queue_pass(&pool, scratch.path(), &mut report).await;
        if queued.is_ok() {
            info!("finished a run");
        }

        let uploads = pool.finish().await;
        report.uploads_succeeded = uploads.succeeded;
        report.uploads_failed = uploads.failed;
        info!(
            succeeded = uploads.succeeded,
            failed = uploads.failed,
            "all uploads finished"
        );

        if let Err(e) = scratch.close() {
            warn!(error = %e, "cannot remove scratch directory");
        }
        queued.map(|()| report)
    }

    async fn queue_pass(
        &mut self,
        pool: &UploaderPool,
        scratch: &Path,
        report: &mut RunReport,
    ) -> Result<(), SyncError> {
        let directories = self.config.directories.clone();
        let snapshots = scratch.join("snapshots");
        let mut slot = 0usize;
        for directory in &directories {
            for manifest_path in manifest_paths(directory).await {
                // Every candidate gets its own extraction directory within the pass.
                let dest = snapshots.join(slot.to_string());
                slot += 1;
                match self.publish_snapshot(pool, &dest, &manifest_path).await {
                    Snapshot::Queued(jobs) => {
                        report.snapshots_published += 1;
                        report.jobs_queued += jobs;
                    }
                    Snapshot::Broken => report.snapshots_failed += 1,
                    Snapshot::Skipped => {}
                }
            }
        }

        if self.catalog.is_empty() {
            info!("no snapshots published yet, skipping index documents");
            return Ok(());
        }

        let timestamps_path = scratch.join("timestamps.json");
        write_json(&timestamps_path, &self.catalog.timestamps_index()).await?;
        let list_path = scratch.join("list.json");
        write_json(&list_path, &self.catalog.list_index()).await?;

        for job in [
            UploadJob::new(timestamps_path, keys::TIMESTAMPS_KEY),
            UploadJob::new(list_path, keys::LIST_KEY),
            UploadJob::new(self.config.indexer_cache.clone(), keys::INDEXER_SCORES_KEY),
        ] {
            pool.submit(job).await;
            report.jobs_queued += 1;
        }
        Ok(())
    }

    /// Extracts one snapshot into `dest`, queues its files and records it in the catalog.
    async fn publish_snapshot(
        &mut self,
        pool: &UploaderPool,
        dest: &Path,
        manifest_path: &Path,
    ) -> Snapshot {
        let Some(ts) = snapshot_ts(manifest_path) else {
            return Snapshot::Skipped;
        };
        let path = manifest_path.display();

        let manifest = match load_manifest(manifest_path, ts).await {
            Ok(manifest) => manifest,
            Err(e) if e.is_noteworthy() => {
                error!(path = %path, error = %e, "invalid manifest");
                return Snapshot::Broken;
            }
            Err(e) => {
                debug!(path = %path, error = %e, "skipping manifest");
                return Snapshot::Skipped;
            }
        };
        if self.catalog.contains(&manifest.scope, ts) {
            return Snapshot::Skipped;
        }

        let archive = manifest_path.with_extension("zip");
        let files = match extract_archive(archive, dest.to_path_buf()).await {
            Ok(files) => files,
            Err(e) => {
                error!(path = %path, scope = %manifest.scope, error = %e, "cannot extract snapshot archive");
                return Snapshot::Broken;
            }
        };

        let mut queued = 0;
        for file in &files {
            let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
                warn!(file = %file.display(), "skipping file with non UTF-8 name");
                continue;
            };
            pool.submit(UploadJob::new(file, keys::scoped_file_key(&manifest.scope, ts, name)))
                .await;
            pool.submit(UploadJob::new(file, keys::legacy_file_key(ts, name)))
                .await;
            queued += 2;
        }

        info!(path = %path, scope = %manifest.scope, ts, files = files.len(), "snapshot queued");
        self.catalog.insert(manifest, ts);
        Snapshot::Queued(queued)
    }
}

/// Lists manifest candidates of a directory in file name order.
async fn manifest_paths(directory: &Path) -> Vec<PathBuf> {
    let mut entries = match tokio::fs::read_dir(directory).await {
        Ok(entries) => entries,
        Err(e) => {
            error!(directory = %directory.display(), error = %e, "cannot scan directory");
            return Vec::new();
        }
    };
    let mut paths = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                if snapshot_ts(&path).is_some() {
                    paths.push(path);
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(directory = %directory.display(), error = %e, "directory scan interrupted");
                break;
            }
        }
    }
    paths.sort();
    paths
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), SyncError> {
    let encoded = serde_json::to_vec(value)?;
    tokio::fs::write(path, encoded)
        .await
        .map_err(|source| SyncError::WriteIndex {
            path: path.to_path_buf(),
            source,
        })
}
