//! # manifest: snapshot manifests written next to each score archive
//!
//! A snapshot is a pair of files `<ts>.json` + `<ts>.zip` in an output directory,
//! where `<ts>` is the snapshot issuance time in milliseconds since the Unix epoch.
//! The manifest is kept verbatim because it is republished in `list.json`; only
//! `epoch`, `issuanceDate` and `scope` are interpreted here.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::timestamp::{parse_timestamp, to_millis, TimestampError};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest: {0}")]
    Read(#[from] std::io::Error),
    #[error("cannot parse manifest: {0}")]
    Parse(#[from] serde_json::Error),
    /// Still being written upstream, or not a snapshot manifest at all.
    #[error("manifest lacks field {0:?}")]
    Incomplete(&'static str),
    #[error("invalid {field} in manifest: {source}")]
    InvalidTimestamp {
        field: &'static str,
        #[source]
        source: TimestampError,
    },
    #[error("scope is not a string")]
    ScopeNotString,
    #[error("issuanceDate is {actual} ms but file name says {expected}")]
    TimestampMismatch { expected: i64, actual: i64 },
}

impl ManifestError {
    /// Whether the failure deserves an error-level log line.
    ///
    /// Incomplete manifests are expected while the score computer is mid-write.
    pub fn is_noteworthy(&self) -> bool {
        !matches!(self, ManifestError::Incomplete(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub epoch: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub scope: String,
    /// The manifest document exactly as found on disk.
    pub document: Value,
}

impl Manifest {
    pub fn from_value(document: Value) -> Result<Self, ManifestError> {
        let epoch = field(&document, "epoch")?;
        let issued_at = field(&document, "issuanceDate")?;
        let scope = field(&document, "scope")?;

        let epoch = timestamp_field(epoch, "epoch")?;
        let issued_at = timestamp_field(issued_at, "issuanceDate")?;
        let scope = scope
            .as_str()
            .ok_or(ManifestError::ScopeNotString)?
            .to_string();

        Ok(Manifest {
            epoch,
            issued_at,
            scope,
            document,
        })
    }

    /// Checks the manifest against the timestamp encoded in its file name.
    pub fn check_issuance(&self, ts: i64) -> Result<(), ManifestError> {
        let actual = to_millis(&self.issued_at);
        if actual != ts {
            return Err(ManifestError::TimestampMismatch {
                expected: ts,
                actual,
            });
        }
        Ok(())
    }
}

fn field<'a>(document: &'a Value, name: &'static str) -> Result<&'a Value, ManifestError> {
    document.get(name).ok_or(ManifestError::Incomplete(name))
}

fn timestamp_field(value: &Value, field: &'static str) -> Result<DateTime<Utc>, ManifestError> {
    let raw = value.as_str().unwrap_or_default();
    parse_timestamp(raw).map_err(|source| ManifestError::InvalidTimestamp { field, source })
}

/// Returns the snapshot timestamp encoded in a manifest file name, or `None`
/// when the path is not a manifest (`<integer>.json`).
pub fn snapshot_ts(path: &Path) -> Option<i64> {
    if path.extension()? != "json" {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Reads and validates the manifest at `path` for snapshot `ts`.
pub async fn load_manifest(path: &Path, ts: i64) -> Result<Manifest, ManifestError> {
    let content = tokio::fs::read(path).await?;
    let document: Value = serde_json::from_slice(&content)?;
    let manifest = Manifest::from_value(document)?;
    manifest.check_issuance(ts)?;
    Ok(manifest)
}
