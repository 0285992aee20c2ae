//! Per-run counters shared between the coordinator and its worker tasks.

use crate::types::{ChatId, RunSummary};
use std::sync::atomic::{AtomicU64, Ordering};

/// Terminal outcome of one dispatched message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ItemOutcome {
    Downloaded,
    Skipped,
    Failed,
}

/// Atomic counters for one chat download run.
#[derive(Debug, Default)]
pub(crate) struct RunStats {
    count: AtomicU64,
    downloaded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    processed: AtomicU64,
}

impl RunStats {
    /// Count a dispatched media message, returning its 1-based position
    pub(crate) fn record_dispatched(&self) -> u64 {
        self.count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count a terminal outcome, returning how many items have been processed including this one.
    ///
    /// Every processed number is handed out exactly once, so exactly one caller observes each
    /// checkpoint boundary.
    pub(crate) fn record(&self, outcome: ItemOutcome) -> u64 {
        let counter = match outcome {
            ItemOutcome::Downloaded => &self.downloaded,
            ItemOutcome::Skipped => &self.skipped,
            ItemOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn summary(&self, chat_id: ChatId, title: String, cancelled: bool) -> RunSummary {
        RunSummary {
            chat_id,
            title,
            count: self.count.load(Ordering::Relaxed),
            downloaded: self.downloaded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled,
        }
    }
}
