//! Snapshot archive extraction.

use std::fs::File;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot open archive {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot extract archive {path}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("archive {path} has an entry escaping the extraction directory: {name:?}")]
    UnsafeEntry { path: PathBuf, name: String },
    #[error("cannot list extracted files in {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Extracts `archive` into `dest` and returns the top-level regular files, sorted.
///
/// Entries with names escaping `dest` make the whole archive fail.
pub fn extract_archive_blocking(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let file = File::open(archive).map_err(|source| ArchiveError::Open {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = zip::ZipArchive::new(file).map_err(|source| ArchiveError::Extract {
        path: archive.to_path_buf(),
        source,
    })?;
    for i in 0..zip.len() {
        let entry = zip.by_index_raw(i).map_err(|source| ArchiveError::Extract {
            path: archive.to_path_buf(),
            source,
        })?;
        if entry.enclosed_name().is_none() {
            return Err(ArchiveError::UnsafeEntry {
                path: archive.to_path_buf(),
                name: entry.name().to_string(),
            });
        }
    }
    debug!(archive = %archive.display(), entries = zip.len(), dest = %dest.display(), "extracting archive");
    zip.extract(dest).map_err(|source| ArchiveError::Extract {
        path: archive.to_path_buf(),
        source,
    })?;
    top_level_files(dest)
}

/// Async wrapper running the extraction on the blocking pool.
pub async fn extract_archive(archive: PathBuf, dest: PathBuf) -> Result<Vec<PathBuf>, ArchiveError> {
    tokio::task::spawn_blocking(move || extract_archive_blocking(&archive, &dest)).await?
}

fn top_level_files(dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let list_err = |source| ArchiveError::List {
        path: dir.to_path_buf(),
        source,
    };
    // An archive with no entries leaves nothing behind.
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(list_err)? {
        let entry = entry.map_err(list_err)?;
        if entry.file_type().map_err(list_err)?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
