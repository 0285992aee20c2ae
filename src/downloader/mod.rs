//! Core downloader implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`lifecycle`] - Session start and graceful shutdown
//! - [`scan`] - Read-only preview of a chat
//! - [`chat`] - Single-chat download coordinator
//! - [`multi`] - Concurrent multi-chat downloads
//! - [`worker`] - Per-message worker task
//! - [`stats`] - Per-run atomic counters

mod chat;
mod lifecycle;
mod multi;
mod scan;
mod stats;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::report;
use crate::reporter::Reporter;
use crate::source::MessageSource;
use crate::types::{ChatId, Dialog, Event, ScanResult};

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Client for the remote chat service
    pub(crate) source: Arc<dyn MessageSource>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Event reporter (multiple subscribers supported)
    pub(crate) reporter: Reporter,
    /// Root cancellation token; every scan and run observes it or a child of it
    pub(crate) cancel: CancellationToken,
    /// Number of chat runs currently executing
    pub(crate) active_runs: Arc<AtomicUsize>,
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// Validates the configuration and makes sure the download directory exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid settings and [`Error::Io`] if the download directory
    /// cannot be created.
    pub async fn new(source: Arc<dyn MessageSource>, config: Config) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download_dir.display(),
                        e
                    ),
                ))
            })?;

        let reporter = Reporter::new(config.event_buffer);

        tracing::debug!(
            download_dir = %config.download_dir.display(),
            concurrency = config.effective_concurrency(),
            track_metadata = config.track_metadata,
            "Media downloader created"
        );

        Ok(Self {
            source,
            config: Arc::new(config),
            reporter,
            cancel: CancellationToken::new(),
            active_runs: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Replace the event reporter, e.g. to share one channel between several downloaders
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Subscribe to scan and download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls behind by more than `event_buffer` events receives a
    /// `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use chat_media_dl::{ChatDownloadConfig, Config, Event, MediaDownloader, MessageSource};
    /// use std::sync::Arc;
    ///
    /// async fn run(source: Arc<dyn MessageSource>) -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = MediaDownloader::new(source, Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             if let Event::ItemFailed { error, .. } = event {
    ///                 eprintln!("failed: {error}");
    ///             }
    ///         }
    ///     });
    ///
    ///     let summary = downloader
    ///         .download_chat(&ChatDownloadConfig::new("-1001234567890"))
    ///         .await?;
    ///     println!("{}", summary.describe());
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.reporter.subscribe()
    }

    /// The reporter events are published on
    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Request cancellation of every scan and download run of this downloader.
    ///
    /// Returns immediately; running operations wind down and return partial results.
    /// Cancellation is permanent for this instance.
    pub fn cancel(&self) {
        tracing::info!("Cancellation requested");
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Clone of the root cancellation token, for wiring into external shutdown logic
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Chats visible to the account, most recent first
    ///
    /// # Errors
    ///
    /// Returns the source's error if the listing fails.
    pub async fn list_chats(&self, limit: usize) -> Result<Vec<Dialog>> {
        let dialogs = self.source.list_dialogs(limit).await?;
        tracing::debug!(count = dialogs.len(), "Listed chats");
        Ok(dialogs)
    }

    /// Write the plain-text report of a scan into the configured report directory
    ///
    /// # Errors
    ///
    /// Returns an error if the report file cannot be written.
    pub async fn write_scan_report(&self, scan: &ScanResult) -> Result<PathBuf> {
        report::write_scan_report(&self.config.report_dir, scan).await
    }

    /// Write one report per non-empty scan, returning how many were written
    pub async fn write_scan_reports(&self, scans: &[ScanResult]) -> usize {
        report::write_scan_reports(&self.config.report_dir, scans).await
    }

    /// Best-effort chat title; falls back to the raw identifier
    pub(crate) async fn resolve_title(&self, chat_id: &ChatId) -> String {
        match self.source.resolve_chat(chat_id).await {
            Ok(title) if !title.trim().is_empty() => title,
            Ok(_) => chat_id.to_string(),
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, error = %e, "Could not resolve chat title");
                chat_id.to_string()
            }
        }
    }

    /// Track a running chat download until the returned guard is dropped
    pub(crate) fn track_run(&self) -> RunGuard {
        self.active_runs.fetch_add(1, Ordering::SeqCst);
        RunGuard {
            active_runs: Arc::clone(&self.active_runs),
        }
    }
}

/// Decrements the active run count when dropped
pub(crate) struct RunGuard {
    active_runs: Arc<AtomicUsize>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active_runs.fetch_sub(1, Ordering::SeqCst);
    }
}
