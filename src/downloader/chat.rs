//! Chat download coordinator: enumerates one chat and feeds a bounded worker pool.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::ChatDownloadConfig;
use crate::error::{Error, Result};
use crate::metadata::MetadataStore;
use crate::transfer::TransferWorker;
use crate::types::{Event, RunSummary};

use super::MediaDownloader;
use super::stats::{ItemOutcome, RunStats};
use super::worker::{self, ChatContext};

impl MediaDownloader {
    /// Download the media of one chat.
    ///
    /// Messages are enumerated lazily and handed to at most
    /// [`Config::effective_concurrency`](crate::Config::effective_concurrency) concurrent
    /// transfers. Enumeration pauses while
    /// [`Config::max_pending_tasks`](crate::Config::max_pending_tasks) worker tasks are
    /// outstanding. Per-item failures are counted, never returned.
    ///
    /// Cancelling the downloader stops enumeration, tells in-flight transfers to stop (removing
    /// their partial files) and waits for every worker before returning a summary with
    /// [`RunSummary::cancelled`] set.
    ///
    /// # Errors
    ///
    /// Returns the source's error if message enumeration itself fails. Workers already
    /// dispatched are drained and the history is saved before the error is returned.
    ///
    /// The run itself is a spawned task. Dropping the returned future cancels it, and the task
    /// still removes partial files and saves the history before it ends.
    pub async fn download_chat(&self, request: &ChatDownloadConfig) -> Result<RunSummary> {
        let token = self.cancel.child_token();
        let _cancel_on_drop = token.clone().drop_guard();

        let downloader = self.clone();
        let owned = request.clone();
        let chat_id = request.chat_id.clone();
        tokio::spawn(async move { downloader.run_chat(&owned, token).await })
            .await
            .unwrap_or_else(|e| {
                tracing::error!(chat_id = %chat_id, error = %e, "Chat coordinator panicked");
                Err(Error::Other(format!("chat task failed: {e}")))
            })
    }

    /// Run one chat under the given cancellation token
    pub(crate) async fn run_chat(
        &self,
        request: &ChatDownloadConfig,
        cancel: CancellationToken,
    ) -> Result<RunSummary> {
        let chat_id = request.chat_id.clone();
        let _run = self.track_run();

        // Starting
        let title = self.resolve_title(&chat_id).await;
        let concurrency = self.config.effective_concurrency();
        let max_pending = self.config.max_pending_tasks();
        tracing::info!(
            chat_id = %chat_id,
            title = %title,
            limit = %request.limit,
            concurrency,
            "Starting chat download"
        );
        self.reporter.report(Event::ChatStarted {
            chat_id: chat_id.clone(),
            title: title.clone(),
        });

        let metadata = if self.config.track_metadata {
            Some(Arc::new(
                MetadataStore::open(chat_id.clone(), &self.config.download_dir).await,
            ))
        } else {
            None
        };

        let ctx = Arc::new(ChatContext {
            chat_id: chat_id.clone(),
            limit: request.limit,
            media_filter: request.media_filter.clone(),
            transfer: TransferWorker::new(
                self.source.clone(),
                &self.config.download_dir,
                self.config.retry.clone(),
                self.reporter.clone(),
            ),
            metadata: metadata.clone(),
            stats: Arc::new(RunStats::default()),
            slots: Arc::new(Semaphore::new(concurrency)),
            reporter: self.reporter.clone(),
            cancel: cancel.clone(),
            checkpoint_interval: self.config.checkpoint_interval,
        });

        // Enumerating
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut enumeration_error: Option<Error> = None;
        {
            let mut messages = self.source.stream_messages(&chat_id, request.limit);

            loop {
                while let Some(finished) = tasks.try_join_next() {
                    reap(&ctx, finished).await;
                }

                if tasks.len() >= max_pending {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        Some(finished) = tasks.join_next() => {
                            reap(&ctx, finished).await;
                            continue;
                        }
                    }
                }

                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = messages.next() => next,
                };

                match next {
                    None => break,
                    Some(Err(e)) => {
                        tracing::error!(chat_id = %chat_id, error = %e, "Message enumeration failed");
                        enumeration_error = Some(e);
                        break;
                    }
                    Some(Ok(message)) => {
                        let Some(media) = &message.media else {
                            continue;
                        };
                        if !request.media_filter.matches(media.kind) {
                            continue;
                        }
                        let index = ctx.stats.record_dispatched();
                        tasks.spawn(worker::process_message(ctx.clone(), message, index));
                    }
                }
            }
        }

        // Draining
        if cancel.is_cancelled() {
            tracing::info!(chat_id = %chat_id, outstanding = tasks.len(), "Cancelling chat download");
            self.reporter.report(Event::Cancelling {
                chat_id: chat_id.clone(),
                outstanding: tasks.len(),
            });
        }
        while let Some(finished) = tasks.join_next().await {
            reap(&ctx, finished).await;
        }

        // Done
        if let Some(store) = &metadata {
            store.save().await;
        }

        if let Some(e) = enumeration_error {
            self.reporter.report(Event::ChatFailed {
                chat_id: chat_id.clone(),
                error: e.to_string(),
            });
            return Err(e);
        }

        let summary = ctx.stats.summary(chat_id, title, cancel.is_cancelled());
        tracing::info!(
            chat_id = %summary.chat_id,
            count = summary.count,
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Chat download finished"
        );
        self.reporter.report(Event::ChatComplete {
            summary: summary.clone(),
        });

        Ok(summary)
    }
}

/// Account for a finished worker task; a panicked worker counts as a failed item
async fn reap(ctx: &ChatContext, finished: std::result::Result<(), JoinError>) {
    if let Err(e) = finished {
        tracing::error!(chat_id = %ctx.chat_id, error = %e, "Worker task panicked");
        worker::finish(ctx, ItemOutcome::Failed).await;
    }
}
