//! Utility functions shared by the scan, transfer and metadata paths

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Maximum characters kept from an error message for per-item status reports
pub const ERROR_EXCERPT_LEN: usize = 40;

static NON_WORD: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[^\w\s-]").ok());
static SEPARATOR_RUNS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[-\s]+").ok());

/// Shorten an error to its first line, at most `max_chars` characters
///
/// # Examples
///
/// ```
/// use chat_media_dl::utils::error_excerpt;
///
/// assert_eq!(error_excerpt("timed out\nat frame 3", 40), "timed out");
/// assert_eq!(error_excerpt("abcdef", 3), "abc");
/// ```
pub fn error_excerpt(error: impl std::fmt::Display, max_chars: usize) -> String {
    let text = error.to_string();
    let first_line = text.lines().next().unwrap_or("");
    first_line.chars().take(max_chars).collect()
}

/// Check whether a regular file exists at `path` with exactly `expected` bytes.
///
/// An unknown expected size never matches. Any filesystem error counts as "no match".
pub async fn local_file_matches(path: &Path, expected: Option<u64>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() == expected,
        Err(_) => false,
    }
}

/// Delete a partially written file, tolerating its absence
///
/// Failures other than "not found" are logged; callers treat partial output as invalid
/// regardless of whether the removal succeeded.
pub async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed partial file");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial file");
        }
    }
}

/// Make a chat title usable as part of a file name
///
/// Drops everything except word characters, whitespace and dashes, then collapses runs of
/// whitespace/dashes into single underscores.
///
/// # Examples
///
/// ```
/// use chat_media_dl::utils::sanitize_title;
///
/// assert_eq!(sanitize_title("My Chat: 2024!"), "My_Chat_2024");
/// assert_eq!(sanitize_title("***"), "Unknown_Chat");
/// ```
pub fn sanitize_title(title: &str) -> String {
    let stripped = match NON_WORD.as_ref() {
        Some(re) => re.replace_all(title, "").into_owned(),
        None => title
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
            .collect(),
    };
    let collapsed = match SEPARATOR_RUNS.as_ref() {
        Some(re) => re.replace_all(&stripped, "_").into_owned(),
        None => stripped
            .split(|c: char| c == '-' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_"),
    };
    let trimmed = collapsed.trim_matches('_');

    if trimmed.is_empty() {
        "Unknown_Chat".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Replace path separators so an identifier can be embedded in a single file name
pub fn safe_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect()
}

/// Convert a byte count to MiB
pub fn bytes_to_mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
