//! # chat-media-dl
//!
//! Bulk download engine for media attachments in chat histories.
//!
//! ## Design Philosophy
//!
//! chat-media-dl is designed to be:
//! - **Resumable** - A per-chat history document, verified against the filesystem, lets
//!   repeated runs skip what is already complete
//! - **Bounded** - Per-chat transfer concurrency and enumeration backpressure are configurable
//! - **Library-first** - The remote service is a pluggable [`MessageSource`]; no UI is built in
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use chat_media_dl::{ChatDownloadConfig, Config, MediaDownloader, MessageSource};
//! use std::sync::Arc;
//!
//! async fn run(source: Arc<dyn MessageSource>) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         concurrency: 8,
//!         ..Default::default()
//!     };
//!
//!     let downloader = MediaDownloader::new(source, config).await?;
//!     downloader.start().await?;
//!
//!     // Stop cleanly on Ctrl+C
//!     tokio::spawn(chat_media_dl::cancel_on_signal(downloader.clone()));
//!
//!     let request = ChatDownloadConfig::new("-1001234567890");
//!     let preview = downloader.scan_chat(&request, true).await?;
//!     println!("{} new of {}", preview.new_count, preview.total_count);
//!
//!     let summary = downloader.download_chat(&request).await?;
//!     println!("{}", summary.describe());
//!
//!     downloader.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Per-chat download history
pub mod metadata;
/// Plain-text scan reports
pub mod report;
/// Event reporting
pub mod reporter;
/// Retry logic for transfers
pub mod retry;
/// Remote chat service abstraction
pub mod source;
/// Single-item transfers
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{ChatDownloadConfig, Config, RetryConfig};
pub use downloader::MediaDownloader;
pub use error::{Error, Result};
pub use metadata::{EntryStatus, MetadataEntry, MetadataStats, MetadataStore};
pub use reporter::Reporter;
pub use source::{MessageSource, ProgressFn};
pub use transfer::{TransferOutcome, TransferWorker};
pub use types::{
    ChatId, ChatRunReport, Dialog, Event, MediaAttachment, MediaFilter, MediaItem, MediaKind,
    Message, MessageLimit, RunSummary, ScanEntry, ScanResult, ScanSummary, SkipReason,
};

/// Cancel all of the downloader's work when a termination signal arrives.
///
/// Waits for a termination signal and then calls the downloader's `cancel()` method, so running
/// scans and downloads stop, clean up partial files and return their partial results.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use chat_media_dl::{Config, MediaDownloader, MessageSource, cancel_on_signal};
/// use std::sync::Arc;
///
/// async fn run(source: Arc<dyn MessageSource>) -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::new(source, Config::default()).await?;
///     tokio::spawn(cancel_on_signal(downloader.clone()));
///     Ok(())
/// }
/// ```
pub async fn cancel_on_signal(downloader: MediaDownloader) {
    let token = downloader.cancel_token();
    tokio::select! {
        _ = wait_for_signal() => downloader.cancel(),
        _ = token.cancelled() => {
            tracing::debug!("Downloader cancelled before any signal arrived");
        }
    }
}

/// Resolves on the first SIGTERM or SIGINT.
///
/// Handlers that cannot be registered (restricted containers) are skipped; with none at all the
/// portable Ctrl+C listener is used instead.
#[cfg(unix)]
async fn wait_for_signal() {
    use futures::future::{FutureExt, select_all};
    use tokio::signal::unix::{SignalKind, signal};

    let mut listeners = Vec::new();
    for (kind, name) in [
        (SignalKind::terminate(), "SIGTERM"),
        (SignalKind::interrupt(), "SIGINT"),
    ] {
        match signal(kind) {
            Ok(stream) => listeners.push((stream, name)),
            Err(e) => tracing::warn!(signal = name, error = %e, "Could not register signal handler"),
        }
    }

    if listeners.is_empty() {
        tracing::error!("No signal handlers registered, falling back to ctrl_c");
        tokio::signal::ctrl_c().await.ok();
        return;
    }

    let pending = listeners.iter_mut().map(|(stream, name)| {
        async move {
            stream.recv().await;
            *name
        }
        .boxed()
    });
    let (received, _, _) = select_all(pending).await;
    tracing::info!(signal = received, "Received termination signal");
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C, cancelling immediately");
        return;
    }
    tracing::info!(signal = "ctrl_c", "Received termination signal");
}
