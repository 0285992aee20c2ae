//! Startup and shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::Result;

use super::MediaDownloader;

/// How long shutdown waits for running chat downloads to drain
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between checks while waiting for runs to drain
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl MediaDownloader {
    /// Open the session with the remote service
    ///
    /// # Errors
    ///
    /// Returns the source's error if the session cannot be established.
    pub async fn start(&self) -> Result<()> {
        tracing::info!("Starting message source session");
        self.source.start().await
    }

    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Cancels every scan and download run
    /// 2. Waits for running chat downloads to drain with a timeout (30 seconds)
    /// 3. Closes the session with the remote service
    ///
    /// # Errors
    ///
    /// Returns the source's error if closing the session fails. The runs are cancelled
    /// regardless.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Cancel everything derived from the root token
        self.cancel.cancel();
        tracing::info!("Signaled cancellation to all chat downloads");

        // 2. Wait for runs to drain
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_runs()).await {
            Ok(()) => tracing::info!("All chat downloads drained"),
            Err(_) => tracing::warn!(
                active = self.active_runs.load(Ordering::SeqCst),
                "Timeout waiting for chat downloads to drain, proceeding with shutdown"
            ),
        }

        // 3. Close the session
        if let Err(e) = self.source.stop().await {
            tracing::error!(error = %e, "Failed to stop message source session");
            return Err(e);
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_active_runs(&self) {
        loop {
            let active = self.active_runs.load(Ordering::SeqCst);
            if active == 0 {
                return;
            }
            tracing::debug!(active, "Waiting for chat downloads to drain");
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}
