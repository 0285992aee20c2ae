//! Downloader tests, grouped by the submodule they exercise.


use std::path::Path;
use std::time::Duration;

/// Files in `dir` other than history documents, sorted
pub(super) fn media_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| !name.ends_with("_history.json"))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Poll `condition` every few milliseconds until it holds, panicking after `limit`
pub(super) async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + limit;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within {limit:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
