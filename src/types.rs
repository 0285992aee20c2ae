//! Core types for chat-media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{Error, Result};

/// Identifier of a remote chat (numeric id or public username)
///
/// History documents written by older tools may carry the id as a JSON number; both forms load.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ChatId(pub String);

impl<'de> Deserialize<'de> for ChatId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(id) => Self(id),
            Raw::Number(id) => Self(id.to_string()),
        })
    }
}

impl ChatId {
    /// Create a new ChatId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChatId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChatId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of attachment carried by a message
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Compressed photo
    Photo,
    /// Video file
    Video,
    /// Generic document
    Document,
    /// Audio track
    Audio,
    /// GIF-style animation
    Animation,
    /// Voice note
    Voice,
    /// Round video message
    VideoNote,
    /// Sticker
    Sticker,
}

impl MediaKind {
    /// Every kind, in declaration order
    pub const ALL: [MediaKind; 8] = [
        MediaKind::Photo,
        MediaKind::Video,
        MediaKind::Document,
        MediaKind::Audio,
        MediaKind::Animation,
        MediaKind::Voice,
        MediaKind::VideoNote,
        MediaKind::Sticker,
    ];

    /// Wire name of the kind, as stored in history documents
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
            MediaKind::Animation => "animation",
            MediaKind::Voice => "voice",
            MediaKind::VideoNote => "video_note",
            MediaKind::Sticker => "sticker",
        }
    }

    /// File name used when the service does not provide one
    pub fn fallback_file_name(&self, message_id: i64) -> String {
        match self {
            MediaKind::Photo => format!("photo_{message_id}.jpg"),
            MediaKind::Video => format!("video_{message_id}.mp4"),
            MediaKind::Document => format!("doc_{message_id}"),
            MediaKind::Audio => format!("audio_{message_id}.mp3"),
            MediaKind::Animation => format!("animation_{message_id}.mp4"),
            MediaKind::Voice => format!("voice_{message_id}.ogg"),
            MediaKind::VideoNote => format!("videonote_{message_id}.mp4"),
            MediaKind::Sticker => format!("sticker_{message_id}.webp"),
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MediaKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::Other(format!("unknown media kind: {s}")))
    }
}

/// How many messages of a chat's history to enumerate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum MessageLimit {
    /// The whole history
    #[default]
    Unbounded,
    /// At most this many of the newest messages
    Bounded(u32),
}

impl MessageLimit {
    /// Interpret a count where 0 means "the whole history"
    pub fn from_count(count: u32) -> Self {
        match count {
            0 => MessageLimit::Unbounded,
            n => MessageLimit::Bounded(n),
        }
    }

    /// Count form for sources whose API encodes "no limit" as 0
    pub fn as_count(&self) -> u32 {
        match self {
            MessageLimit::Unbounded => 0,
            MessageLimit::Bounded(n) => *n,
        }
    }

    /// Upper bound on messages, if any
    pub fn bound(&self) -> Option<u32> {
        match self {
            MessageLimit::Unbounded => None,
            MessageLimit::Bounded(n) => Some(*n),
        }
    }
}

impl From<u32> for MessageLimit {
    fn from(count: u32) -> Self {
        MessageLimit::from_count(count)
    }
}

impl From<MessageLimit> for u32 {
    fn from(limit: MessageLimit) -> Self {
        limit.as_count()
    }
}

impl std::fmt::Display for MessageLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageLimit::Unbounded => f.write_str("All"),
            MessageLimit::Bounded(n) => write!(f, "{n}"),
        }
    }
}

impl std::str::FromStr for MessageLimit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(MessageLimit::Unbounded);
        }
        trimmed
            .parse::<u32>()
            .map(MessageLimit::from_count)
            .map_err(|_| Error::config("limit", format!("invalid message limit: {s}")))
    }
}

/// Set of media kinds a run is interested in
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaFilter {
    kinds: Option<BTreeSet<MediaKind>>,
}

impl MediaFilter {
    /// Filter that accepts every kind
    pub fn all() -> Self {
        Self { kinds: None }
    }

    /// Filter that accepts only the given kinds
    pub fn only(kinds: impl IntoIterator<Item = MediaKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
        }
    }

    /// Whether a kind passes the filter (no kinds listed means everything passes)
    pub fn matches(&self, kind: MediaKind) -> bool {
        match &self.kinds {
            None => true,
            Some(kinds) => kinds.is_empty() || kinds.contains(&kind),
        }
    }

    /// The kinds explicitly selected, if any
    pub fn kinds(&self) -> Option<&BTreeSet<MediaKind>> {
        self.kinds.as_ref()
    }
}

/// Attachment descriptor as declared by the remote service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    /// Kind of attachment
    pub kind: MediaKind,
    /// File name declared by the service, if any
    pub file_name: Option<String>,
    /// Size in bytes declared by the service, if known
    pub file_size: Option<u64>,
}

/// One message from a chat's history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id, unique within the chat
    pub id: i64,
    /// Time the message was sent
    pub date: Option<DateTime<Utc>>,
    /// Attached media, if the message carries any
    pub media: Option<MediaAttachment>,
}

impl Message {
    /// Whether the message carries an attachment
    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }
}

/// A downloadable unit extracted from a message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Id of the message the media belongs to
    pub id: i64,
    /// Kind of media
    pub kind: MediaKind,
    /// Local file name (service-provided or deterministic fallback)
    pub file_name: String,
    /// Declared remote size in bytes, if known
    pub byte_size: Option<u64>,
    /// Time the message was sent
    pub timestamp: Option<DateTime<Utc>>,
}

impl MediaItem {
    /// Extract the downloadable item from a message.
    ///
    /// Returns `Ok(None)` for messages without media.
    pub fn from_message(message: &Message) -> Result<Option<Self>> {
        let Some(media) = &message.media else {
            return Ok(None);
        };
        if message.id <= 0 {
            return Err(Error::InvalidMessage {
                message_id: message.id,
                reason: "message id must be positive".to_string(),
            });
        }

        let file_name = media
            .file_name
            .as_deref()
            .and_then(local_file_name)
            .unwrap_or_else(|| media.kind.fallback_file_name(message.id));

        Ok(Some(Self {
            id: message.id,
            kind: media.kind,
            file_name,
            byte_size: media.file_size,
            timestamp: message.date,
        }))
    }

    /// Declared size, treating unknown as zero
    pub fn size_or_zero(&self) -> u64 {
        self.byte_size.unwrap_or(0)
    }
}

/// Reduce a service-provided name to a single safe path component
fn local_file_name(declared: &str) -> Option<String> {
    let name = Path::new(declared.trim()).file_name()?.to_str()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

/// One line of a scan preview
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    /// The media item found
    pub item: MediaItem,
    /// Whether a local file with the declared size already exists
    pub exists: bool,
}

/// Preview of what a download run over one chat would do
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Chat that was scanned
    pub chat_id: ChatId,
    /// Resolved display title (falls back to the raw id)
    pub title: String,
    /// Media items in enumeration order
    pub entries: Vec<ScanEntry>,
    /// Number of media items found
    pub total_count: usize,
    /// Sum of declared sizes
    pub total_bytes: u64,
    /// Items already present locally
    pub existing_count: usize,
    /// Items that would be transferred
    pub new_count: usize,
    /// Media messages that cannot be turned into an item; a download run counts them as failed
    #[serde(default)]
    pub rejected_count: usize,
    /// Enumeration stopped early because of cancellation
    pub cancelled: bool,
}

impl ScanResult {
    pub(crate) fn new(chat_id: ChatId, title: String) -> Self {
        Self {
            chat_id,
            title,
            entries: Vec::new(),
            total_count: 0,
            total_bytes: 0,
            existing_count: 0,
            new_count: 0,
            rejected_count: 0,
            cancelled: false,
        }
    }

    pub(crate) fn push(&mut self, entry: ScanEntry) {
        self.total_count += 1;
        self.total_bytes += entry.item.size_or_zero();
        if entry.exists {
            self.existing_count += 1;
        } else {
            self.new_count += 1;
        }
        self.entries.push(entry);
    }
}

/// Totals across several scans, shown before committing to a download
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Number of chats scanned
    pub chats: usize,
    /// Media items found across all chats
    pub total_count: usize,
    /// Items already present locally
    pub existing_count: usize,
    /// Items that would be transferred
    pub new_count: usize,
    /// Media messages that would fail as unusable
    pub rejected_count: usize,
    /// Sum of declared sizes
    pub total_bytes: u64,
}

impl ScanSummary {
    /// Aggregate the given scan results
    pub fn from_results(results: &[ScanResult]) -> Self {
        results.iter().fold(
            ScanSummary {
                chats: results.len(),
                ..ScanSummary::default()
            },
            |mut acc, scan| {
                acc.total_count += scan.total_count;
                acc.existing_count += scan.existing_count;
                acc.new_count += scan.new_count;
                acc.rejected_count += scan.rejected_count;
                acc.total_bytes += scan.total_bytes;
                acc
            },
        )
    }

    /// Total declared size in GiB
    pub fn total_gib(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

/// Final counts of one chat download run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Chat that was downloaded
    pub chat_id: ChatId,
    /// Resolved display title
    pub title: String,
    /// Media-bearing messages dispatched to workers
    pub count: u64,
    /// Items transferred (or found complete on disk)
    pub downloaded: u64,
    /// Items skipped because the history showed them complete
    pub skipped: u64,
    /// Items that failed
    pub failed: u64,
    /// The run was cut short by cancellation
    pub cancelled: bool,
}

impl RunSummary {
    /// Items that reached a terminal outcome
    pub fn processed(&self) -> u64 {
        self.downloaded + self.skipped + self.failed
    }

    /// Human-readable one-line summary, e.g. "3 downloaded, 1 failed"
    pub fn describe(&self) -> String {
        let parts: Vec<String> = [
            (self.downloaded, "downloaded"),
            (self.skipped, "skipped"),
            (self.failed, "failed"),
        ]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, label)| format!("{n} {label}"))
        .collect();

        if parts.is_empty() {
            "No media found.".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Outcome of one chat within a multi-chat run
#[derive(Debug)]
pub struct ChatRunReport {
    /// Chat the report belongs to
    pub chat_id: ChatId,
    /// Run summary, or the error that aborted enumeration
    pub result: Result<RunSummary>,
}

/// Chat listed by the remote service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    /// Chat identifier
    pub id: ChatId,
    /// Display title
    pub title: String,
}

impl Dialog {
    /// Selection label, e.g. "Family (-100123)"
    pub fn label(&self) -> String {
        format!("{} ({})", self.title, self.id)
    }
}

/// Why an item was not transferred
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The history document and the file on disk both show it complete
    AlreadyRecorded,
    /// A local file of the declared size was found before transferring
    AlreadyOnDisk,
}

/// Event emitted during scans and download runs
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Scan enumeration started
    ScanStarted {
        /// Chat being scanned
        chat_id: ChatId,
        /// Message limit applied
        limit: MessageLimit,
    },

    /// One media item found during a scan
    ScanItem {
        /// Chat being scanned
        chat_id: ChatId,
        /// The preview line
        entry: ScanEntry,
    },

    /// Scan finished (possibly early)
    ScanComplete {
        /// Chat that was scanned
        chat_id: ChatId,
        /// Resolved title
        title: String,
        /// Media items found
        total_count: usize,
        /// Sum of declared sizes
        total_bytes: u64,
        /// Items already present
        existing_count: usize,
        /// Items that would be transferred
        new_count: usize,
        /// Media messages that cannot be downloaded
        rejected_count: usize,
        /// Stopped early because of cancellation
        cancelled: bool,
    },

    /// Chat download run started
    ChatStarted {
        /// Chat being downloaded
        chat_id: ChatId,
        /// Resolved title
        title: String,
    },

    /// A worker started transferring an item
    Downloading {
        /// Chat the item belongs to
        chat_id: ChatId,
        /// Local file name
        file_name: String,
        /// Position of the message among dispatched media messages (1-based)
        index: u64,
        /// Message limit of the run, if bounded
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },

    /// Bytes transferred so far for an item
    Progress {
        /// Chat the item belongs to
        chat_id: ChatId,
        /// Local file name
        file_name: String,
        /// Bytes transferred
        transferred: u64,
        /// Total bytes expected
        total: u64,
    },

    /// A stale local file with the wrong size is being replaced
    Redownloading {
        /// Chat the item belongs to
        chat_id: ChatId,
        /// Local file name
        file_name: String,
        /// Size found on disk
        local_size: u64,
    },

    /// An item was not transferred
    Skipped {
        /// Chat the item belongs to
        chat_id: ChatId,
        /// Local file name
        file_name: String,
        /// Why it was skipped
        reason: SkipReason,
    },

    /// A transfer attempt failed
    AttemptFailed {
        /// Chat the item belongs to
        chat_id: ChatId,
        /// Local file name
        file_name: String,
        /// Attempt number (1-based)
        attempt: u32,
        /// Attempt budget
        max_attempts: u32,
        /// Short error excerpt
        error: String,
    },

    /// An item was transferred
    Downloaded {
        /// Chat the item belongs to
        chat_id: ChatId,
        /// Local file name
        file_name: String,
        /// Declared size
        size: u64,
    },

    /// An item failed for good
    ItemFailed {
        /// Chat the item belongs to
        chat_id: ChatId,
        /// Message the item came from
        message_id: i64,
        /// Local file name, if it could be determined
        #[serde(skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        /// Short error excerpt
        error: String,
    },

    /// Cancellation observed; outstanding workers are being stopped
    Cancelling {
        /// Chat being cancelled
        chat_id: ChatId,
        /// Worker tasks still outstanding
        outstanding: usize,
    },

    /// Chat download run finished
    ChatComplete {
        /// Final counts
        summary: RunSummary,
    },

    /// Chat download run aborted because enumeration failed
    ChatFailed {
        /// Chat that failed
        chat_id: ChatId,
        /// Error message
        error: String,
    },
}
