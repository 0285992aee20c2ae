//! Single-item transfer with existence check, retry and partial-file cleanup

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::reporter::Reporter;
use crate::retry::{RetryFailure, retry_with_cancel};
use crate::source::{MessageSource, ProgressFn};
use crate::types::{ChatId, Event, MediaItem, Message};
use crate::utils::{ERROR_EXCERPT_LEN, error_excerpt, remove_partial};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result of one [`TransferWorker::transfer`] call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The media was fetched into the download directory
    Downloaded {
        /// Bytes on disk after the transfer
        bytes: u64,
    },
    /// A local file of the declared size was already there; nothing was fetched
    AlreadyPresent,
    /// Every attempt failed, or the failure could not be retried
    Failed {
        /// Error of the last attempt
        error: String,
        /// Attempts made
        attempts: u32,
    },
    /// Cancellation interrupted the transfer
    Cancelled,
}

impl TransferOutcome {
    /// Whether the file is complete on disk
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TransferOutcome::Downloaded { .. } | TransferOutcome::AlreadyPresent
        )
    }
}

/// Fetches individual media items into a download directory
#[derive(Clone)]
pub struct TransferWorker {
    source: Arc<dyn MessageSource>,
    download_dir: PathBuf,
    retry: RetryConfig,
    reporter: Reporter,
}

impl TransferWorker {
    /// Create a worker writing into `download_dir`
    pub fn new(
        source: Arc<dyn MessageSource>,
        download_dir: impl Into<PathBuf>,
        retry: RetryConfig,
        reporter: Reporter,
    ) -> Self {
        Self {
            source,
            download_dir: download_dir.into(),
            retry,
            reporter,
        }
    }

    /// Local path an item is written to
    pub fn target_path(&self, item: &MediaItem) -> PathBuf {
        self.download_dir.join(&item.file_name)
    }

    /// Fetch `item` (the media of `message`) unless a complete copy already exists.
    ///
    /// A local file whose size differs from the declared size is deleted and fetched again.
    /// Transfer errors are retried per the [`RetryConfig`]; they are reported through the
    /// returned outcome, never as `Err`. No failure or cancellation path leaves a file at the
    /// target path.
    ///
    /// # Errors
    ///
    /// Returns an error only when the download directory cannot be created.
    pub async fn transfer(
        &self,
        chat_id: &ChatId,
        message: &Message,
        item: &MediaItem,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome> {
        let path = self.target_path(item);

        if let Some(local_size) = existing_file_size(&path).await {
            if item.byte_size == Some(local_size) {
                tracing::debug!(
                    chat_id = %chat_id,
                    file_name = %item.file_name,
                    size = local_size,
                    "Complete file already on disk"
                );
                return Ok(TransferOutcome::AlreadyPresent);
            }

            tracing::warn!(
                chat_id = %chat_id,
                file_name = %item.file_name,
                local_size,
                declared_size = ?item.byte_size,
                "Local file size mismatch, fetching again"
            );
            self.reporter.report(Event::Redownloading {
                chat_id: chat_id.clone(),
                file_name: item.file_name.clone(),
                local_size,
            });
            remove_partial(&path).await;
        }

        tokio::fs::create_dir_all(&self.download_dir).await?;

        let progress = self.progress_callback(chat_id, item);
        let max_attempts = self.retry.max_attempts;

        let result = retry_with_cancel(&self.retry, cancel, |attempt| {
            let progress = progress.clone();
            let path = &path;
            async move {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    fetched = self.source.fetch_media(chat_id, message, path, progress) => fetched,
                };
                if let Err(e) = &outcome
                    && !e.is_cancelled()
                {
                    self.reporter.report(Event::AttemptFailed {
                        chat_id: chat_id.clone(),
                        file_name: item.file_name.clone(),
                        attempt,
                        max_attempts,
                        error: error_excerpt(e, ERROR_EXCERPT_LEN),
                    });
                }
                outcome
            }
        })
        .await;

        match result {
            Ok(()) => {
                let bytes = existing_file_size(&path)
                    .await
                    .unwrap_or_else(|| item.size_or_zero());
                tracing::debug!(
                    chat_id = %chat_id,
                    file_name = %item.file_name,
                    bytes,
                    "Transfer complete"
                );
                Ok(TransferOutcome::Downloaded { bytes })
            }
            Err(failure) => {
                remove_partial(&path).await;
                Ok(match failure {
                    RetryFailure::Cancelled { attempts, .. } => {
                        tracing::info!(
                            chat_id = %chat_id,
                            file_name = %item.file_name,
                            attempts,
                            "Transfer cancelled"
                        );
                        TransferOutcome::Cancelled
                    }
                    RetryFailure::Exhausted {
                        attempts,
                        last_error,
                    }
                    | RetryFailure::Permanent {
                        attempts,
                        error: last_error,
                    } => TransferOutcome::Failed {
                        error: last_error.to_string(),
                        attempts,
                    },
                })
            }
        }
    }

    fn progress_callback(&self, chat_id: &ChatId, item: &MediaItem) -> ProgressFn {
        let reporter = self.reporter.clone();
        let chat_id = chat_id.clone();
        let file_name = item.file_name.clone();
        Arc::new(move |transferred, total| {
            reporter.report(Event::Progress {
                chat_id: chat_id.clone(),
                file_name: file_name.clone(),
                transferred,
                total,
            });
        })
    }
}

async fn existing_file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}
