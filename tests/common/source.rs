//! In-memory chat service driven by per-message scripts

use chat_media_dl::{
    ChatId, Dialog, Error, Message, MessageLimit, MessageSource, ProgressFn, Result,
};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Serves one fixed history for every chat not given its own.
///
/// Unscripted fetches write the declared number of bytes. Messages marked as hanging write
/// half their bytes and never return; messages with a failure budget fail that many times first.
pub struct ScriptedSource {
    history: Vec<Message>,
    per_chat: HashMap<ChatId, Vec<Message>>,
    fetch_delay: Duration,
    hanging: Mutex<HashSet<i64>>,
    failures: Mutex<HashMap<i64, usize>>,

    fetch_calls: AtomicUsize,
    fetched: Mutex<Vec<i64>>,
    yielded: AtomicUsize,
    finished: AtomicUsize,
    max_outstanding: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(history: Vec<Message>) -> Self {
        Self {
            history,
            per_chat: HashMap::new(),
            fetch_delay: Duration::ZERO,
            hanging: Mutex::new(HashSet::new()),
            failures: Mutex::new(HashMap::new()),
            fetch_calls: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
            yielded: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            max_outstanding: AtomicUsize::new(0),
        }
    }

    pub fn with_chat(mut self, chat: &str, history: Vec<Message>) -> Self {
        self.per_chat.insert(ChatId::from(chat), history);
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn hang(&self, ids: impl IntoIterator<Item = i64>) {
        self.hanging.lock().unwrap().extend(ids);
    }

    pub fn fail_times(&self, id: i64, times: usize) {
        self.failures.lock().unwrap().insert(id, times);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Message ids passed to `fetch_media`, in call order
    pub fn fetched(&self) -> Vec<i64> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding.load(Ordering::SeqCst)
    }

    fn take_failure(&self, id: i64) -> bool {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&id) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }

    async fn write(
        &self,
        id: i64,
        destination: &Path,
        size: usize,
        progress: ProgressFn,
    ) -> Result<()> {
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        let hangs = self.hanging.lock().unwrap().contains(&id);
        if hangs {
            tokio::fs::write(destination, vec![7u8; size / 2]).await?;
            return std::future::pending().await;
        }
        if self.take_failure(id) {
            tokio::fs::write(destination, vec![7u8; size / 2]).await?;
            return Err(Error::source("connection reset by peer"));
        }
        tokio::fs::write(destination, vec![7u8; size]).await?;
        progress(size as u64, size as u64);
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageSource for ScriptedSource {
    async fn resolve_chat(&self, chat: &ChatId) -> Result<String> {
        Ok(format!("Chat {chat}"))
    }

    async fn list_dialogs(&self, _limit: usize) -> Result<Vec<Dialog>> {
        Ok(Vec::new())
    }

    fn stream_messages<'a>(
        &'a self,
        chat: &'a ChatId,
        limit: MessageLimit,
    ) -> BoxStream<'a, Result<Message>> {
        let history = self.per_chat.get(chat).unwrap_or(&self.history);
        let take = limit.bound().map_or(history.len(), |n| n as usize);
        stream::iter(history.iter().take(take))
            .map(move |message| {
                if message.has_media() {
                    let yielded = self.yielded.fetch_add(1, Ordering::SeqCst) + 1;
                    let finished = self.finished.load(Ordering::SeqCst);
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
        self.fetched.lock().unwrap().push(message.id);
        let size = message
            .media
            .as_ref()
            .and_then(|media| media.file_size)
            .unwrap_or(32) as usize;

        let result = self.write(message.id, destination, size, progress).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }
}
