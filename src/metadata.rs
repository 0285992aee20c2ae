//! Per-chat download history
//!
//! Each chat gets one JSON document (`{chat_id}_history.json` inside the download directory)
//! mapping local file names to the outcome of their last transfer. The document is loaded once
//! when the store is opened and rewritten wholesale on every save.
//!
//! A "downloaded" record is never trusted on its own: [`MetadataStore::is_downloaded`] also checks
//! the file on disk, so files deleted or truncated between runs are fetched again.
//!
//! Records this version cannot read, and fields it does not know, are carried through saves
//! unchanged.

use crate::types::{ChatId, MediaKind};
use crate::utils::{local_file_matches, safe_component};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Outcome recorded for a file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// The file was transferred completely
    Downloaded,
    /// Every transfer attempt failed or the transfer was cancelled
    Failed,
    /// A status written by another tool or a newer version
    #[serde(other)]
    Unknown,
}

/// One record of the history document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Declared size of the media in bytes
    pub size: u64,
    /// Kind of media
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Outcome of the last transfer
    pub status: EntryStatus,
    /// Local time the record was written
    pub timestamp: NaiveDateTime,
    /// Chat the file came from
    pub chat_id: ChatId,
    /// Fields written by other tools, kept as they were
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Counts of history records by status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataStats {
    /// Records with status "downloaded"
    pub downloaded: usize,
    /// Records with status "failed"
    pub failed: usize,
    /// All records
    pub total: usize,
}

/// Durable record of transfer outcomes for one chat
#[derive(Debug)]
pub struct MetadataStore {
    chat_id: ChatId,
    download_dir: PathBuf,
    path: PathBuf,
    entries: Mutex<HashMap<String, MetadataEntry>>,
    /// Records that did not parse, written back untouched unless replaced
    unparsed: Mutex<Map<String, Value>>,
    /// Held for the whole of a save so two saves never interleave their writes
    save_lock: Mutex<()>,
}

impl MetadataStore {
    /// Open the history of `chat_id` stored under `download_dir`, loading it eagerly
    pub async fn open(chat_id: ChatId, download_dir: impl Into<PathBuf>) -> Self {
        let download_dir = download_dir.into();
        let path = history_path(&download_dir, &chat_id);
        let store = Self {
            chat_id,
            download_dir,
            path,
            entries: Mutex::new(HashMap::new()),
            unparsed: Mutex::new(Map::new()),
            save_lock: Mutex::new(()),
        };
        store.load().await;
        store
    }

    /// Location of the history document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Chat this store belongs to
    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    /// Replace the in-memory map with the document on disk.
    ///
    /// A missing, unreadable or malformed document yields an empty map. Individual records that
    /// do not parse are set aside and saved back as they were. Returns the number of records
    /// loaded.
    pub async fn load(&self) -> usize {
        let HistoryDocument { entries, unparsed } = read_history(&self.path).await;
        let count = entries.len();
        let kept_aside = unparsed.len();
        *self.entries.lock().await = entries;
        *self.unparsed.lock().await = unparsed;
        tracing::debug!(
            chat_id = %self.chat_id,
            path = %self.path.display(),
            entries = count,
            unparsed = kept_aside,
            "Loaded download history"
        );
        count
    }

    /// Whether `file_name` was downloaded completely and is still intact on disk.
    ///
    /// True only when the record says "downloaded" with `expected_size`, and the local file
    /// exists with exactly that size.
    pub async fn is_downloaded(&self, file_name: &str, expected_size: u64) -> bool {
        let recorded = {
            let entries = self.entries.lock().await;
            entries.get(file_name).is_some_and(|entry| {
                entry.status == EntryStatus::Downloaded && entry.size == expected_size
            })
        };
        if !recorded {
            return false;
        }
        local_file_matches(&self.download_dir.join(file_name), Some(expected_size)).await
    }

    /// Insert or overwrite the record for `file_name`.
    ///
    /// Unknown fields of a previous record are kept.
    pub async fn update_entry(
        &self,
        file_name: &str,
        size: u64,
        kind: MediaKind,
        status: EntryStatus,
    ) {
        let mut entries = self.entries.lock().await;
        let extra = entries
            .remove(file_name)
            .map(|previous| previous.extra)
            .unwrap_or_default();
        let entry = MetadataEntry {
            size,
            kind,
            status,
            timestamp: chrono::Local::now().naive_local(),
            chat_id: self.chat_id.clone(),
            extra,
        };
        entries.insert(file_name.to_string(), entry);
    }

    /// Record for `file_name`, if any
    pub async fn entry(&self, file_name: &str) -> Option<MetadataEntry> {
        self.entries.lock().await.get(file_name).cloned()
    }

    /// Remove the record for `file_name`, readable or not; returns whether one existed
    pub async fn remove_entry(&self, file_name: &str) -> bool {
        let parsed = self.entries.lock().await.remove(file_name).is_some();
        let unparsed = self.unparsed.lock().await.remove(file_name).is_some();
        parsed || unparsed
    }

    /// Forget every record (the document on disk is untouched until the next save)
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        self.unparsed.lock().await.clear();
    }

    /// Number of records that could be read
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether there are no records
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Counts of records by status
    pub async fn get_stats(&self) -> MetadataStats {
        let entries = self.entries.lock().await;
        entries.values().fold(
            MetadataStats {
                total: entries.len(),
                ..MetadataStats::default()
            },
            |mut stats, entry| {
                match entry.status {
                    EntryStatus::Downloaded => stats.downloaded += 1,
                    EntryStatus::Failed => stats.failed += 1,
                    EntryStatus::Unknown => {}
                }
                stats
            },
        )
    }

    /// Write the whole map to disk.
    ///
    /// Saves are serialized; a save waits for any save already in progress. The document is
    /// written to a temporary sibling and renamed into place. Returns false (after logging) on
    /// any failure.
    pub async fn save(&self) -> bool {
        let _guard = self.save_lock.lock().await;

        let mut document = self.unparsed.lock().await.clone();
        {
            let entries = self.entries.lock().await;
            for (file_name, entry) in entries.iter() {
                match serde_json::to_value(entry) {
                    Ok(value) => {
                        document.insert(file_name.clone(), value);
                    }
                    Err(e) => {
                        tracing::warn!(file_name = %file_name, error = %e, "Cannot encode history record");
                    }
                }
            }
        }
        let count = document.len();

        match write_history(&self.download_dir, &self.path, &document).await {
            Ok(()) => {
                tracing::debug!(
                    chat_id = %self.chat_id,
                    entries = count,
                    "Saved download history"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    chat_id = %self.chat_id,
                    path = %self.path.display(),
                    error = %e,
                    "Failed to save download history"
                );
                false
            }
        }
    }
}

/// Location of a chat's history document
pub fn history_path(download_dir: &Path, chat_id: &ChatId) -> PathBuf {
    download_dir.join(format!("{}_history.json", safe_component(chat_id.as_str())))
}

/// Contents of a history document, split by whether each record could be read
#[derive(Default)]
struct HistoryDocument {
    entries: HashMap<String, MetadataEntry>,
    unparsed: Map<String, Value>,
}

async fn read_history(path: &Path) -> HistoryDocument {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HistoryDocument::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read download history, starting fresh");
            return HistoryDocument::default();
        }
    };

    let document: Value = match serde_json::from_slice(&raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Corrupt download history, starting fresh");
            return HistoryDocument::default();
        }
    };

    let Value::Object(records) = document else {
        tracing::warn!(path = %path.display(), "Download history is not an object, starting fresh");
        return HistoryDocument::default();
    };

    let mut loaded = HistoryDocument::default();
    for (file_name, value) in records {
        match serde_json::from_value::<MetadataEntry>(value.clone()) {
            Ok(entry) => {
                loaded.entries.insert(file_name, entry);
            }
            Err(e) => {
                tracing::warn!(file_name = %file_name, error = %e, "Keeping unreadable history record as is");
                loaded.unparsed.insert(file_name, value);
            }
        }
    }
    loaded
}

async fn write_history(
    download_dir: &Path,
    path: &Path,
    document: &Map<String, Value>,
) -> crate::error::Result<()> {
    tokio::fs::create_dir_all(download_dir).await?;

    let body = serde_json::to_vec_pretty(document)?;
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    if let Err(e) = tokio::fs::write(&tmp_path, &body).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}
