//! Read-only preview of a chat download.

use crate::config::ChatDownloadConfig;
use crate::error::Result;
use crate::types::{Event, MediaItem, ScanEntry, ScanResult};
use crate::utils::local_file_matches;
use futures::StreamExt;

use super::MediaDownloader;

impl MediaDownloader {
    /// Enumerate a chat and list the media a download run would consider.
    ///
    /// Nothing is transferred and the history document is not touched. With `check_existing`,
    /// each item is flagged as existing when a local file of the declared size is present.
    /// Media messages a run would reject as unusable are not listed but counted in
    /// [`ScanResult::rejected_count`].
    /// Cancellation stops enumeration early and returns the partial result with
    /// [`ScanResult::cancelled`] set.
    ///
    /// # Errors
    ///
    /// Returns the source's error if message enumeration fails.
    pub async fn scan_chat(
        &self,
        request: &ChatDownloadConfig,
        check_existing: bool,
    ) -> Result<ScanResult> {
        let chat_id = &request.chat_id;
        let title = self.resolve_title(chat_id).await;
        tracing::info!(chat_id = %chat_id, title = %title, limit = %request.limit, "Scanning chat");
        self.reporter.report(Event::ScanStarted {
            chat_id: chat_id.clone(),
            limit: request.limit,
        });

        let mut scan = ScanResult::new(chat_id.clone(), title);
        let mut messages = self.source.stream_messages(chat_id, request.limit);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!(chat_id = %chat_id, found = scan.total_count, "Scan cancelled");
                    scan.cancelled = true;
                    break;
                }
                next = messages.next() => next,
            };

            let message = match next {
                None => break,
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    tracing::error!(chat_id = %chat_id, error = %e, "Scan enumeration failed");
                    return Err(e);
                }
            };

            let Some(media) = &message.media else {
                continue;
            };
            if !request.media_filter.matches(media.kind) {
                continue;
            }
            let item = match MediaItem::from_message(&message) {
                Ok(Some(item)) => item,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(chat_id = %chat_id, message_id = message.id, error = %e, "Rejected media message");
                    scan.rejected_count += 1;
                    continue;
                }
            };

            let exists = check_existing
                && local_file_matches(&self.config.download_dir.join(&item.file_name), item.byte_size)
                    .await;
            let entry = ScanEntry { item, exists };
            self.reporter.report(Event::ScanItem {
                chat_id: chat_id.clone(),
                entry: entry.clone(),
            });
            scan.push(entry);
        }

        tracing::info!(
            chat_id = %chat_id,
            total = scan.total_count,
            existing = scan.existing_count,
            new = scan.new_count,
            rejected = scan.rejected_count,
            bytes = scan.total_bytes,
            "Scan complete"
        );
        self.reporter.report(Event::ScanComplete {
            chat_id: chat_id.clone(),
            title: scan.title.clone(),
            total_count: scan.total_count,
            total_bytes: scan.total_bytes,
            existing_count: scan.existing_count,
            new_count: scan.new_count,
            rejected_count: scan.rejected_count,
            cancelled: scan.cancelled,
        });

        Ok(scan)
    }
}
