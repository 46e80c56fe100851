use async_trait::async_trait;
use explorer_uploader_core::contract::{MockObjectStore, ObjectStore, StoreError};
use explorer_uploader_core::keys::{INDEXER_SCORES_KEY, LIST_KEY, TIMESTAMPS_KEY};
use explorer_uploader_core::synchronise::{SynchroniseConfig, Synchroniser};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use zip::write::SimpleFileOptions;

/// Store that keeps a copy of every uploaded object, keyed by object key.
#[derive(Default)]
struct RecordingStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    puts: Mutex<Vec<String>>,
}

impl RecordingStore {
    fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    fn object(&self, key: &str) -> Vec<u8> {
        self.objects.lock().unwrap()[key].clone()
    }

    fn json(&self, key: &str) -> Value {
        serde_json::from_slice(&self.object(key)).unwrap()
    }

    fn take_puts(&self) -> Vec<String> {
        let mut puts = std::mem::take(&mut *self.puts.lock().unwrap());
        puts.sort();
        puts
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    fn bucket(&self) -> String {
        "explorer-test".to_string()
    }

    async fn put_file(&self, path: &Path, key: &str) -> Result<(), StoreError> {
        let data = tokio::fs::read(path).await?;
        self.objects.lock().unwrap().insert(key.to_string(), data);
        self.puts.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

struct Fixture {
    root: TempDir,
    output: PathBuf,
    indexer_cache: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = tempdir().unwrap();
        let output = root.path().join("output");
        std::fs::create_dir(&output).unwrap();
        let indexer_cache = root.path().join("indexer-scores.csv");
        std::fs::write(&indexer_cache, "i,j,v\n1,2,0.5\n").unwrap();
        Fixture {
            root,
            output,
            indexer_cache,
        }
    }

    fn config(&self) -> SynchroniseConfig {
        let mut config = SynchroniseConfig::new(vec![self.output.clone()], self.indexer_cache.clone());
        config.uploaders = 3;
        config
    }

    fn write_manifest(&self, ts: i64, manifest: &Value) {
        write_manifest_in(&self.output, ts, manifest);
    }

    fn write_archive(&self, ts: i64, files: &[(&str, &str)]) {
        write_archive_in(&self.output, ts, files);
    }

    /// Writes a complete snapshot whose issuance time is `ts` milliseconds.
    fn write_snapshot(&self, scope: &str, epoch: &str, ts: i64, files: &[(&str, &str)]) {
        write_snapshot_in(&self.output, scope, epoch, ts, files);
    }

    /// Creates another output directory next to the default one.
    fn extra_output(&self, name: &str) -> PathBuf {
        let dir = self.root.path().join(name);
        std::fs::create_dir(&dir).unwrap();
        dir
    }
}

fn write_manifest_in(dir: &Path, ts: i64, manifest: &Value) {
    std::fs::write(dir.join(format!("{ts}.json")), serde_json::to_vec(manifest).unwrap()).unwrap();
}

fn write_archive_in(dir: &Path, ts: i64, files: &[(&str, &str)]) {
    let file = File::create(dir.join(format!("{ts}.zip"))).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, content) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn write_snapshot_in(dir: &Path, scope: &str, epoch: &str, ts: i64, files: &[(&str, &str)]) {
    write_archive_in(dir, ts, files);
    write_manifest_in(
        dir,
        ts,
        &json!({
            "epoch": epoch,
            "issuanceDate": iso(ts),
            "scope": scope,
        }),
    );
}

fn iso(ts: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ts)
        .unwrap()
        .format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        .to_string()
}

const EPOCH_APRIL: &str = "2024-04-01T00:00:00Z";
const EPOCH_MAY: &str = "2024-05-01T00:00:00Z";
const TS_A: i64 = 1_714_521_600_123;
const TS_B: i64 = 1_714_608_000_456;
const TS_OLD: i64 = 1_711_929_600_000;

#[tokio::test]
async fn test_single_pass_publishes_files_under_both_layouts() {
    let fixture = Fixture::new();
    fixture.write_snapshot(
        "Global",
        EPOCH_MAY,
        TS_A,
        &[("scores.csv", "i,v\n1,0.25\n"), ("peers.csv", "i\n1\n")],
    );

    let store = Arc::new(RecordingStore::default());
    let mut sync = Synchroniser::new(fixture.config(), store.clone());
    let report = sync.run_once().await.expect("pass should succeed");

    assert_eq!(report.snapshots_published, 1);
    assert_eq!(report.snapshots_failed, 0);
    assert_eq!(report.jobs_queued, 2 * 2 + 3);
    assert_eq!(report.uploads_succeeded, 7);
    assert_eq!(report.uploads_failed, 0);

    let expected = vec![
        INDEXER_SCORES_KEY.to_string(),
        LIST_KEY.to_string(),
        TIMESTAMPS_KEY.to_string(),
        format!("files/{TS_A}/peers.csv"),
        format!("files/{TS_A}/scores.csv"),
        format!("files/Global/{TS_A}/peers.csv"),
        format!("files/Global/{TS_A}/scores.csv"),
    ];
    assert_eq!(store.keys(), expected);
    assert_eq!(store.object(&format!("files/Global/{TS_A}/scores.csv")), b"i,v\n1,0.25\n");
    assert_eq!(store.object(INDEXER_SCORES_KEY), b"i,j,v\n1,2,0.5\n");
    assert_eq!(store.json(TIMESTAMPS_KEY), json!([TS_A.to_string()]));
    assert_eq!(store.json(LIST_KEY)[TS_A.to_string()]["scope"], "Global");
}

#[tokio::test]
async fn test_second_pass_only_republishes_indexes() {
    let fixture = Fixture::new();
    fixture.write_snapshot("Global", EPOCH_MAY, TS_A, &[("scores.csv", "a")]);

    let store = Arc::new(RecordingStore::default());
    let mut sync = Synchroniser::new(fixture.config(), store.clone());
    sync.run_once().await.unwrap();
    store.take_puts();

    let report = sync.run_once().await.unwrap();
    assert_eq!(report.snapshots_published, 0);
    assert_eq!(
        store.take_puts(),
        vec![
            INDEXER_SCORES_KEY.to_string(),
            LIST_KEY.to_string(),
            TIMESTAMPS_KEY.to_string(),
        ]
    );

    fixture.write_snapshot("Global", EPOCH_MAY, TS_B, &[("scores.csv", "b")]);
    let report = sync.run_once().await.unwrap();
    assert_eq!(report.snapshots_published, 1);
    assert_eq!(report.jobs_queued, 2 + 3);
    assert_eq!(
        store.json(TIMESTAMPS_KEY),
        json!([TS_A.to_string(), TS_B.to_string()])
    );
}

#[tokio::test]
async fn test_indexes_only_list_latest_epoch() {
    let fixture = Fixture::new();
    fixture.write_snapshot("Global", EPOCH_APRIL, TS_OLD, &[("scores.csv", "old")]);
    fixture.write_snapshot("Global", EPOCH_MAY, TS_A, &[("scores.csv", "a")]);
    fixture.write_snapshot("Local", EPOCH_MAY, TS_B, &[("scores.csv", "b")]);

    let store = Arc::new(RecordingStore::default());
    let mut sync = Synchroniser::new(fixture.config(), store.clone());
    let report = sync.run_once().await.unwrap();

    assert_eq!(report.snapshots_published, 3);
    assert_eq!(sync.catalog().len(), 3);
    // Older epochs are still published as files, just not indexed.
    assert!(store.keys().contains(&format!("files/Global/{TS_OLD}/scores.csv")));

    assert_eq!(
        store.json(TIMESTAMPS_KEY),
        json!([TS_A.to_string(), TS_B.to_string()])
    );
    let list = store.json(LIST_KEY);
    let listed: Vec<&String> = list.as_object().unwrap().keys().collect();
    assert_eq!(listed, vec![&TS_A.to_string(), &TS_B.to_string()]);
    assert_eq!(list[TS_B.to_string()]["scope"], "Local");
    assert_eq!(list[TS_A.to_string()]["issuanceDate"], iso(TS_A));
}

#[tokio::test]
async fn test_empty_directory_publishes_nothing() {
    let fixture = Fixture::new();
    std::fs::write(fixture.output.join("notes.txt"), "ignored").unwrap();
    std::fs::write(fixture.output.join("latest.json"), "{}").unwrap();

    let mut store = MockObjectStore::new();
    store.expect_bucket().return_const("explorer-test".to_string());
    store.expect_put_file().never();

    let mut sync = Synchroniser::new(fixture.config(), Arc::new(store));
    let report = sync.run_once().await.unwrap();
    assert_eq!(report.jobs_queued, 0);
    assert!(sync.catalog().is_empty());
}

#[tokio::test]
async fn test_invalid_manifests_are_skipped() {
    let fixture = Fixture::new();
    // Still being written: no scope yet. Not counted as a failure.
    fixture.write_manifest(TS_A, &json!({"epoch": EPOCH_MAY, "issuanceDate": iso(TS_A)}));
    fixture.write_archive(TS_A, &[("scores.csv", "a")]);
    // File name disagrees with issuanceDate.
    fixture.write_manifest(
        TS_B,
        &json!({"epoch": EPOCH_MAY, "issuanceDate": iso(TS_A), "scope": "Global"}),
    );
    fixture.write_archive(TS_B, &[("scores.csv", "b")]);
    // Unparseable.
    std::fs::write(fixture.output.join(format!("{TS_OLD}.json")), "{not json").unwrap();

    let store = Arc::new(RecordingStore::default());
    let mut sync = Synchroniser::new(fixture.config(), store.clone());
    let report = sync.run_once().await.unwrap();

    assert_eq!(report.snapshots_published, 0);
    assert_eq!(report.snapshots_failed, 2);
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn test_missing_archive_is_retried_next_pass() {
    let fixture = Fixture::new();
    fixture.write_manifest(
        TS_A,
        &json!({"epoch": EPOCH_MAY, "issuanceDate": iso(TS_A), "scope": "Global"}),
    );

    let store = Arc::new(RecordingStore::default());
    let mut sync = Synchroniser::new(fixture.config(), store.clone());
    let report = sync.run_once().await.unwrap();
    assert_eq!(report.snapshots_failed, 1);
    assert!(sync.catalog().is_empty());

    fixture.write_archive(TS_A, &[("scores.csv", "a")]);
    let report = sync.run_once().await.unwrap();
    assert_eq!(report.snapshots_published, 1);
    assert!(sync.catalog().contains("Global", TS_A));
    assert!(store.keys().contains(&format!("files/Global/{TS_A}/scores.csv")));
}

#[tokio::test]
async fn test_failed_uploads_do_not_stop_the_pass() {
    let fixture = Fixture::new();
    fixture.write_snapshot("Global", EPOCH_MAY, TS_A, &[("scores.csv", "a")]);

    let mut store = MockObjectStore::new();
    store.expect_bucket().return_const("explorer-test".to_string());
    store.expect_put_file().times(5).returning(|_, key| {
        if key.starts_with("files/") {
            Err("SlowDown".into())
        } else {
            Ok(())
        }
    });

    let mut sync = Synchroniser::new(fixture.config(), Arc::new(store));
    let report = sync.run_once().await.unwrap();
    assert_eq!(report.uploads_failed, 2);
    assert_eq!(report.uploads_succeeded, 3);
    // The snapshot counts as published; uploads are not retried.
    assert!(sync.catalog().contains("Global", TS_A));
}

#[tokio::test]
async fn test_unreadable_directory_is_skipped() {
    let fixture = Fixture::new();
    fixture.write_snapshot("Global", EPOCH_MAY, TS_A, &[("scores.csv", "a")]);

    let mut config = fixture.config();
    config.directories.insert(0, fixture.output.join("missing"));

    let store = Arc::new(RecordingStore::default());
    let mut sync = Synchroniser::new(config, store.clone());
    let report = sync.run_once().await.unwrap();
    assert_eq!(report.snapshots_published, 1);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let fixture = Fixture::new();
    fixture.write_snapshot("Global", EPOCH_MAY, TS_A, &[("scores.csv", "a")]);

    let mut config = fixture.config();
    config.poll_interval = Duration::from_secs(3600);
    let store = Arc::new(RecordingStore::default());
    let mut sync = Synchroniser::new(config, store.clone());

    tokio::time::timeout(Duration::from_secs(10), sync.run(async {}))
        .await
        .expect("run should return once shutdown resolves");
    assert!(sync.catalog().contains("Global", TS_A));
}

#[tokio::test]
async fn test_scopes_sharing_a_timestamp_keep_their_own_files() {
    let fixture = Fixture::new();
    let other = fixture.extra_output("other");
    fixture.write_snapshot("a/b", EPOCH_MAY, TS_A, &[("scores.csv", "from a/b")]);
    write_snapshot_in(&other, "a_b", EPOCH_MAY, TS_A, &[("scores.csv", "from a_b")]);

    let mut config = fixture.config();
    config.directories.push(other);
    let store = Arc::new(RecordingStore::default());
    let mut sync = Synchroniser::new(config, store.clone());
    let report = sync.run_once().await.unwrap();

    assert_eq!(report.snapshots_published, 2);
    assert_eq!(report.snapshots_failed, 0);
    assert_eq!(report.uploads_failed, 0);
    assert_eq!(store.object(&format!("files/a/b/{TS_A}/scores.csv")), b"from a/b");
    assert_eq!(store.object(&format!("files/a_b/{TS_A}/scores.csv")), b"from a_b");
}
