//! Object key layout read by the graph explorer.

pub const TIMESTAMPS_KEY: &str = "api/scores/timestamps.json";
pub const LIST_KEY: &str = "api/scores/list.json";
pub const INDEXER_SCORES_KEY: &str = "api/scores/indexer-scores";

pub fn scoped_file_key(scope: &str, ts: i64, file_name: &str) -> String {
    format!("files/{}/{}/{}", scope, ts, file_name)
}

/// Pre-scope layout, still read by older explorer deployments.
pub fn legacy_file_key(ts: i64, file_name: &str) -> String {
    format!("files/{}/{}", ts, file_name)
}
