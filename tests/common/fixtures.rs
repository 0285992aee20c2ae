//! Message fixtures, downloader setup and filesystem helpers

use chat_media_dl::{Config, MediaAttachment, MediaDownloader, MediaKind, Message, RetryConfig};
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use super::ScriptedSource;

/// Declared size of the photo with message id `id`
pub fn photo_size(id: i64) -> u64 {
    1024 + id as u64
}

/// Photos with ids `1..=count`, newest last
pub fn photos(count: i64) -> Vec<Message> {
    photo_range(1..=count)
}

/// Photos with the given message ids
pub fn photo_range(ids: RangeInclusive<i64>) -> Vec<Message> {
    ids.map(|id| Message {
        id,
        date: None,
        media: Some(MediaAttachment {
            kind: MediaKind::Photo,
            file_name: None,
            file_size: Some(photo_size(id)),
        }),
    })
    .collect()
}

/// Config rooted in `root` with millisecond retry pauses
pub fn config_in(root: &Path) -> Config {
    Config {
        download_dir: root.join("media"),
        report_dir: root.join("reports"),
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 1.0,
            jitter: false,
        },
        ..Config::default()
    }
}

/// Downloader over `source` in a fresh temp dir; keep the `TempDir` alive for the test
pub async fn downloader_with(
    source: Arc<ScriptedSource>,
    tweak: impl FnOnce(&mut Config),
) -> (MediaDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = config_in(temp_dir.path());
    tweak(&mut config);
    let downloader = MediaDownloader::new(source, config)
        .await
        .expect("Failed to create downloader");
    (downloader, temp_dir)
}

/// Media file names under `dir`, sorted, history documents excluded
pub fn media_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.ends_with("_history.json"))
        .collect();
    names.sort();
    names
}

/// Poll `condition` every few milliseconds, panicking after `limit`
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + limit;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached within {limit:?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Parsed history document at `path`, if it exists and is valid JSON
pub fn read_history(path: &Path) -> Option<serde_json::Map<String, serde_json::Value>> {
    let raw = std::fs::read(path).ok()?;
    match serde_json::from_slice(&raw).ok()? {
        serde_json::Value::Object(records) => Some(records),
        _ => None,
    }
}
