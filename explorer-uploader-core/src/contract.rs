//! # contract: the storage boundary of the uploader
//!
//! This module defines the [`ObjectStore`] trait through which every upload leaves
//! the process, plus the [`UploadJob`] unit of work queued by the synchroniser.
//!
//! - The CLI crate implements the trait over the S3 API.
//! - The trait is annotated for `mockall` so tests can assert on the exact keys
//!   written, or inject failures, without any network access.
//! - Errors are boxed, as the concrete client's error types vary per operation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// A local file and the key it must be stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub path: PathBuf,
    pub key: String,
}

impl UploadJob {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
        }
    }
}

/// Destination bucket for snapshot files and index documents.
///
/// The trait is `Send` + `Sync` so one store can be shared by all uploader workers.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket, for log fields.
    fn bucket(&self) -> String;

    /// Uploads the file at `path` to `key`, replacing any existing object.
    async fn put_file(&self, path: &Path, key: &str) -> Result<(), StoreError>;
}
