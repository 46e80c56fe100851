//! In-memory record of every snapshot published since the process started.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::manifest::Manifest;

#[derive(Debug, Default)]
pub struct Catalog {
    manifests: BTreeMap<String, BTreeMap<i64, Value>>,
    by_epoch: BTreeMap<DateTime<Utc>, BTreeMap<String, BTreeSet<i64>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, scope: &str, ts: i64) -> bool {
        self.manifests
            .get(scope)
            .is_some_and(|snapshots| snapshots.contains_key(&ts))
    }

    pub fn insert(&mut self, manifest: Manifest, ts: i64) {
        self.by_epoch
            .entry(manifest.epoch)
            .or_default()
            .entry(manifest.scope.clone())
            .or_default()
            .insert(ts);
        self.manifests
            .entry(manifest.scope)
            .or_default()
            .insert(ts, manifest.document);
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.manifests.values().map(BTreeMap::len).sum()
    }

    pub fn latest_epoch(&self) -> Option<DateTime<Utc>> {
        self.by_epoch.keys().next_back().copied()
    }

    /// Snapshot timestamps of the latest epoch across all scopes, ascending.
    pub fn timestamps_index(&self) -> Vec<String> {
        let Some((_, scopes)) = self.by_epoch.iter().next_back() else {
            return Vec::new();
        };
        let all: BTreeSet<i64> = scopes.values().flatten().copied().collect();
        all.into_iter().map(|ts| ts.to_string()).collect()
    }

    /// Manifests of the latest epoch keyed by snapshot timestamp.
    ///
    /// Scopes are merged in name order; on a timestamp shared by two scopes the
    /// later scope's manifest is kept.
    pub fn list_index(&self) -> BTreeMap<String, Value> {
        let mut list = BTreeMap::new();
        let Some((_, scopes)) = self.by_epoch.iter().next_back() else {
            return list;
        };
        for (scope, timestamps) in scopes {
            for ts in timestamps {
                if let Some(document) = self.manifests.get(scope).and_then(|m| m.get(ts)) {
                    list.insert(ts.to_string(), document.clone());
                }
            }
        }
        list
    }
}
