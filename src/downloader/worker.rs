//! Per-message worker task spawned by the chat coordinator.

use crate::metadata::{EntryStatus, MetadataStore};
use crate::reporter::Reporter;
use crate::transfer::{TransferOutcome, TransferWorker};
use crate::types::{ChatId, Event, MediaFilter, MediaItem, Message, MessageLimit, SkipReason};
use crate::utils::{ERROR_EXCERPT_LEN, error_excerpt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::stats::{ItemOutcome, RunStats};

/// State shared by every worker of one chat run
pub(crate) struct ChatContext {
    pub(crate) chat_id: ChatId,
    pub(crate) limit: MessageLimit,
    pub(crate) media_filter: MediaFilter,
    pub(crate) transfer: TransferWorker,
    pub(crate) metadata: Option<Arc<MetadataStore>>,
    pub(crate) stats: Arc<RunStats>,
    pub(crate) slots: Arc<Semaphore>,
    pub(crate) reporter: Reporter,
    pub(crate) cancel: CancellationToken,
    pub(crate) checkpoint_interval: u64,
}

/// Process one dispatched message: skip, transfer or fail it, then record the outcome.
///
/// Returns without counting anything if cancellation is observed before a transfer slot
/// is acquired.
pub(crate) async fn process_message(ctx: Arc<ChatContext>, message: Message, index: u64) {
    let permit = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return,
        permit = ctx.slots.clone().acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return,
        },
    };
    if ctx.cancel.is_cancelled() {
        return;
    }

    let item = match MediaItem::from_message(&message) {
        Ok(Some(item)) => item,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(chat_id = %ctx.chat_id, message_id = message.id, error = %e, "Rejected media message");
            ctx.reporter.report(Event::ItemFailed {
                chat_id: ctx.chat_id.clone(),
                message_id: message.id,
                file_name: None,
                error: error_excerpt(&e, ERROR_EXCERPT_LEN),
            });
            drop(permit);
            finish(&ctx, ItemOutcome::Failed).await;
            return;
        }
    };
    if !ctx.media_filter.matches(item.kind) {
        return;
    }

    if let (Some(store), Some(size)) = (&ctx.metadata, item.byte_size)
        && store.is_downloaded(&item.file_name, size).await
    {
        tracing::debug!(chat_id = %ctx.chat_id, file_name = %item.file_name, "Already downloaded, skipping");
        ctx.reporter.report(Event::Skipped {
            chat_id: ctx.chat_id.clone(),
            file_name: item.file_name.clone(),
            reason: SkipReason::AlreadyRecorded,
        });
        drop(permit);
        finish(&ctx, ItemOutcome::Skipped).await;
        return;
    }

    ctx.reporter.report(Event::Downloading {
        chat_id: ctx.chat_id.clone(),
        file_name: item.file_name.clone(),
        index,
        limit: ctx.limit.bound(),
    });

    let result = ctx
        .transfer
        .transfer(&ctx.chat_id, &message, &item, &ctx.cancel)
        .await;
    drop(permit);

    let outcome = match result {
        Ok(TransferOutcome::Downloaded { bytes }) => {
            ctx.reporter.report(Event::Downloaded {
                chat_id: ctx.chat_id.clone(),
                file_name: item.file_name.clone(),
                size: bytes,
            });
            ItemOutcome::Downloaded
        }
        Ok(TransferOutcome::AlreadyPresent) => {
            ctx.reporter.report(Event::Skipped {
                chat_id: ctx.chat_id.clone(),
                file_name: item.file_name.clone(),
                reason: SkipReason::AlreadyOnDisk,
            });
            ItemOutcome::Downloaded
        }
        Ok(TransferOutcome::Failed { error, attempts }) => {
            tracing::warn!(
                chat_id = %ctx.chat_id,
                file_name = %item.file_name,
                attempts,
                error = %error,
                "Transfer failed"
            );
            report_failure(&ctx, &message, &item, &error);
            ItemOutcome::Failed
        }
        Ok(TransferOutcome::Cancelled) => {
            report_failure(&ctx, &message, &item, "cancelled");
            ItemOutcome::Failed
        }
        Err(e) => {
            tracing::error!(chat_id = %ctx.chat_id, file_name = %item.file_name, error = %e, "Transfer could not start");
            report_failure(&ctx, &message, &item, &e.to_string());
            ItemOutcome::Failed
        }
    };

    if let Some(store) = &ctx.metadata {
        let status = match outcome {
            ItemOutcome::Downloaded => EntryStatus::Downloaded,
            _ => EntryStatus::Failed,
        };
        store
            .update_entry(&item.file_name, item.size_or_zero(), item.kind, status)
            .await;
    }

    finish(&ctx, outcome).await;
}

fn report_failure(ctx: &ChatContext, message: &Message, item: &MediaItem, error: &str) {
    ctx.reporter.report(Event::ItemFailed {
        chat_id: ctx.chat_id.clone(),
        message_id: message.id,
        file_name: Some(item.file_name.clone()),
        error: error_excerpt(error, ERROR_EXCERPT_LEN),
    });
}

/// Count the outcome and take a checkpoint save on every `checkpoint_interval`-th item
pub(crate) async fn finish(ctx: &ChatContext, outcome: ItemOutcome) {
    let processed = ctx.stats.record(outcome);
    if processed % ctx.checkpoint_interval != 0 {
        return;
    }
    if let Some(store) = &ctx.metadata {
        tracing::debug!(chat_id = %ctx.chat_id, processed, "Checkpointing download history");
        store.save().await;
    }
}
