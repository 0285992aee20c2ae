//! Multi-chat coordinator: runs several chat downloads side by side.

use futures::StreamExt;
use futures::stream::FuturesUnordered;

use crate::config::ChatDownloadConfig;
use crate::error::Error;
use crate::types::ChatRunReport;

use super::MediaDownloader;

impl MediaDownloader {
    /// Download several chats concurrently, one coordinator per request.
    ///
    /// The concurrency limit applies to each chat separately. All runs share one cancellation
    /// group derived from the downloader's token: cancelling the downloader stops every run, and
    /// this method still waits for each of them to drain before returning. If the returned future
    /// is dropped, the group is cancelled and the runs wind down on their own.
    ///
    /// Reports come back in request order.
    pub async fn download_chats(&self, requests: &[ChatDownloadConfig]) -> Vec<ChatRunReport> {
        let group = self.cancel.child_token();
        let _cancel_on_drop = group.clone().drop_guard();

        tracing::info!(chats = requests.len(), "Starting multi-chat download");

        let mut running: FuturesUnordered<_> = requests
            .iter()
            .cloned()
            .enumerate()
            .map(|(position, request)| {
                let downloader = self.clone();
                let token = group.child_token();
                let chat_id = request.chat_id.clone();
                let handle =
                    tokio::spawn(async move { downloader.run_chat(&request, token).await });
                async move { (position, chat_id, handle.await) }
            })
            .collect();

        let mut reports: Vec<Option<ChatRunReport>> =
            std::iter::repeat_with(|| None).take(requests.len()).collect();

        while let Some((position, chat_id, joined)) = running.next().await {
            let result = joined.unwrap_or_else(|e| {
                tracing::error!(chat_id = %chat_id, error = %e, "Chat coordinator panicked");
                Err(Error::Other(format!("chat task failed: {e}")))
            });
            if let Err(e) = &result {
                tracing::warn!(chat_id = %chat_id, error = %e, "Chat download failed");
            }
            reports[position] = Some(ChatRunReport { chat_id, result });
        }

        tracing::info!(chats = requests.len(), "Multi-chat download finished");
        reports.into_iter().flatten().collect()
    }
}
