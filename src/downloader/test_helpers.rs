//! Shared test helpers: a scripted in-memory message source and downloader constructors.

use crate::config::{Config, RetryConfig};
use crate::downloader::MediaDownloader;
use crate::error::{Error, Result};
use crate::source::{MessageSource, ProgressFn};
use crate::types::{ChatId, Dialog, MediaAttachment, MediaKind, Message, MessageLimit};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

/// What one `fetch_media` call does
#[derive(Clone, Debug)]
pub(crate) enum FetchBehavior {
    /// Write the full declared size
    Succeed,
    /// Write half the declared size, then fail with the message
    FailAfterPartial(String),
    /// Write half the declared size, then never return
    Hang,
}

/// Scripted [`MessageSource`] recording how it was driven.
pub(crate) struct MockSource {
    title: Option<String>,
    messages: Vec<Message>,
    /// Chat-specific histories; chats not listed here use `messages`
    per_chat: HashMap<ChatId, Vec<Message>>,
    /// Yield an enumeration error after this many messages
    fail_stream_after: Option<usize>,
    fetch_delay: Duration,
    scripts: Mutex<HashMap<i64, VecDeque<FetchBehavior>>>,
    dialogs: Vec<Dialog>,

    fetch_calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    fetch_finished: AtomicUsize,
    yielded: AtomicUsize,
    max_outstanding: AtomicUsize,
    started: AtomicUsize,
    stopped: AtomicUsize,
}

impl MockSource {
    pub(crate) fn new(messages: Vec<Message>) -> Self {
        Self {
            title: Some("Test Chat".to_string()),
            messages,
            per_chat: HashMap::new(),
            fail_stream_after: None,
            fetch_delay: Duration::ZERO,
            scripts: Mutex::new(HashMap::new()),
            dialogs: Vec::new(),
            fetch_calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            fetch_finished: AtomicUsize::new(0),
            yielded: AtomicUsize::new(0),
            max_outstanding: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
        }
    }

    /// Chat title resolution fails
    pub(crate) fn without_title(mut self) -> Self {
        self.title = None;
        self
    }

    pub(crate) fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub(crate) fn failing_stream_after(mut self, messages: usize) -> Self {
        self.fail_stream_after = Some(messages);
        self
    }

    pub(crate) fn with_chat(mut self, chat: &str, messages: Vec<Message>) -> Self {
        self.per_chat.insert(ChatId::from(chat), messages);
        self
    }

    pub(crate) fn with_dialogs(mut self, dialogs: Vec<Dialog>) -> Self {
        self.dialogs = dialogs;
        self
    }

    /// Queue behaviors for successive fetches of one message; unscripted fetches succeed
    pub(crate) fn script(&self, message_id: i64, behaviors: impl IntoIterator<Item = FetchBehavior>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(message_id)
            .or_default()
            .extend(behaviors);
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Largest number of yielded media messages whose fetch had not finished, seen at yield time
    pub(crate) fn max_outstanding(&self) -> usize {
        self.max_outstanding.load(Ordering::SeqCst)
    }

    pub(crate) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    fn next_behavior(&self, message_id: i64) -> FetchBehavior {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&message_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(FetchBehavior::Succeed)
    }

    async fn perform(
        &self,
        behavior: FetchBehavior,
        destination: &Path,
        size: usize,
        progress: ProgressFn,
    ) -> Result<()> {
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        match behavior {
            FetchBehavior::Succeed => {
                tokio::fs::write(destination, vec![0xAB; size]).await?;
                progress(size as u64, size as u64);
                Ok(())
            }
            FetchBehavior::FailAfterPartial(reason) => {
                tokio::fs::write(destination, vec![0xAB; size / 2]).await?;
                progress((size / 2) as u64, size as u64);
                Err(Error::source(reason))
            }
            FetchBehavior::Hang => {
                tokio::fs::write(destination, vec![0xAB; size / 2]).await?;
                std::future::pending::<Result<()>>().await
            }
        }
    }
}

#[async_trait::async_trait]
impl MessageSource for MockSource {
    async fn start(&self) -> Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resolve_chat(&self, chat: &ChatId) -> Result<String> {
        self.title
            .clone()
            .ok_or_else(|| Error::source(format!("CHANNEL_INVALID: {chat}")))
    }

    async fn list_dialogs(&self, limit: usize) -> Result<Vec<Dialog>> {
        Ok(self.dialogs.iter().take(limit).cloned().collect())
    }

    fn stream_messages<'a>(
        &'a self,
        chat: &'a ChatId,
        limit: MessageLimit,
    ) -> BoxStream<'a, Result<Message>> {
        let history = self.per_chat.get(chat).unwrap_or(&self.messages);
        let take = limit.bound().map_or(history.len(), |n| n as usize);
        let fail_after = self.fail_stream_after;

        stream::iter(history.iter().take(take).enumerate())
            .map(move |(position, message)| {
                if fail_after.is_some_and(|n| position >= n) {
                    return Err(Error::source("history request failed"));
                }
                if message.has_media() {
                    let yielded = self.yielded.fetch_add(1, Ordering::SeqCst) + 1;
                    let finished = self.fetch_finished.load(Ordering::SeqCst);
                    self.max_outstanding
                        .fetch_max(yielded.saturating_sub(finished), Ordering::SeqCst);
                }
                Ok(message.clone())
            })
            .boxed()
    }

    async fn fetch_media(
        &self,
        _chat: &ChatId,
        message: &Message,
        destination: &Path,
        progress: ProgressFn,
    ) -> Result<()> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let size = message
            .media
            .as_ref()
            .and_then(|m| m.file_size)
            .unwrap_or(16) as usize;
        let behavior = self.next_behavior(message.id);

        let result = self.perform(behavior, destination, size, progress).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.fetch_finished.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// Message carrying media of `kind` with a declared size
pub(crate) fn media_message(id: i64, kind: MediaKind, size: u64) -> Message {
    Message {
        id,
        date: None,
        media: Some(MediaAttachment {
            kind,
            file_name: None,
            file_size: Some(size),
        }),
    }
}

/// Text-only message
pub(crate) fn text_message(id: i64) -> Message {
    Message {
        id,
        date: None,
        media: None,
    }
}

/// `count` photo messages with ids starting at 1
pub(crate) fn photo_messages(count: usize) -> Vec<Message> {
    (1..=count as i64)
        .map(|id| media_message(id, MediaKind::Photo, 256 + id as u64))
        .collect()
}

/// Retry settings with millisecond pauses
pub(crate) fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 1.0,
        jitter: false,
    }
}

/// Config rooted in a scratch directory with fast retries
pub(crate) fn test_config(root: &Path) -> Config {
    Config {
        download_dir: root.join("downloads"),
        report_dir: root.join("reports"),
        retry: fast_retry(),
        ..Config::default()
    }
}

/// Helper to create a test MediaDownloader over `source`.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader(
    source: Arc<MockSource>,
) -> (MediaDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());
    let downloader = MediaDownloader::new(source, config).await.unwrap();
    (downloader, temp_dir)
}

/// Like [`create_test_downloader`] with a config tweak applied first
pub(crate) async fn create_test_downloader_with(
    source: Arc<MockSource>,
    tweak: impl FnOnce(&mut Config),
) -> (MediaDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    tweak(&mut config);
    let downloader = MediaDownloader::new(source, config).await.unwrap();
    (downloader, temp_dir)
}
