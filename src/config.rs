//! Configuration types for chat-media-dl

use crate::error::{Error, Result};
use crate::types::{ChatId, MediaFilter, MessageLimit};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Lowest accepted per-chat concurrency
pub const MIN_CONCURRENCY: usize = 1;

/// Highest accepted per-chat concurrency
pub const MAX_CONCURRENCY: usize = 20;

/// Main configuration for [`MediaDownloader`](crate::MediaDownloader)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Directory media files and per-chat history documents are written to (default: "downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Directory scan report text files are written to (default: current directory)
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    /// Maximum concurrently active transfers per chat (default: 5, clamped to 1..=20)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Multiplier over `concurrency` bounding queued + active worker tasks (default: 3)
    ///
    /// Once this many tasks are outstanding, message enumeration pauses until one finishes.
    #[serde(default = "default_flow_control_factor")]
    pub flow_control_factor: usize,

    /// Number of processed items between proactive history saves (default: 20)
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Consult and update the per-chat history document (default: true)
    #[serde(default = "default_true")]
    pub track_metadata: bool,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Retry behavior for individual transfers
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            report_dir: default_report_dir(),
            concurrency: default_concurrency(),
            flow_control_factor: default_flow_control_factor(),
            checkpoint_interval: default_checkpoint_interval(),
            track_metadata: true,
            event_buffer: default_event_buffer(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Concurrency actually applied to a chat run, clamped to the supported range
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
    }

    /// Upper bound on queued + active worker tasks for one chat
    pub fn max_pending_tasks(&self) -> usize {
        self.effective_concurrency() * self.flow_control_factor
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.flow_control_factor == 0 {
            return Err(Error::config(
                "flow_control_factor",
                "flow control factor must be at least 1",
            ));
        }
        if self.checkpoint_interval == 0 {
            return Err(Error::config(
                "checkpoint_interval",
                "checkpoint interval must be at least 1",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config(
                "retry.max_attempts",
                "at least one transfer attempt is required",
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                format!("backoff multiplier must be finite and non-negative (got {multiplier})"),
            ));
        }
        if self.event_buffer == 0 {
            return Err(Error::config(
                "event_buffer",
                "event buffer must hold at least one event",
            ));
        }
        Ok(())
    }
}

/// Retry configuration for transient transfer failures
///
/// The defaults give a fixed five second pause between at most three attempts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of transfer attempts, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (default: 5 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between attempts (default: 5 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each failed attempt (default: 1.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_retry_delay(),
            max_delay: default_retry_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Per-chat download request, immutable for the duration of one run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDownloadConfig {
    /// Chat to enumerate
    pub chat_id: ChatId,

    /// How many messages to look at, newest first
    #[serde(default)]
    pub limit: MessageLimit,

    /// Media kinds to keep (absent or empty keeps everything)
    #[serde(default)]
    pub media_filter: MediaFilter,
}

impl ChatDownloadConfig {
    /// Request covering the whole history of a chat with no kind filter
    pub fn new(chat_id: impl Into<ChatId>) -> Self {
        Self {
            chat_id: chat_id.into(),
            limit: MessageLimit::Unbounded,
            media_filter: MediaFilter::all(),
        }
    }

    /// Restrict the request to the newest `limit` messages
    pub fn with_limit(mut self, limit: MessageLimit) -> Self {
        self.limit = limit;
        self
    }

    /// Restrict the request to specific media kinds
    pub fn with_filter(mut self, media_filter: MediaFilter) -> Self {
        self.media_filter = media_filter;
        self
    }
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_report_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_concurrency() -> usize {
    5
}

fn default_flow_control_factor() -> usize {
    3
}

fn default_checkpoint_interval() -> u64 {
    20
}

fn default_event_buffer() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
