//! Abstraction over the remote chat service.
//!
//! The engine never speaks a wire protocol itself. Everything that touches the network
//! (session handshake, dialog listing, history enumeration, byte transfer) goes through
//! [`MessageSource`], which lets tests drive the engine with a scripted in-memory source.

use crate::error::Result;
use crate::types::{ChatId, Dialog, Message, MessageLimit};
use futures::stream::BoxStream;
use std::path::Path;
use std::sync::Arc;

/// Progress callback: `(bytes_transferred, total_bytes)`
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Client for the remote chat service
#[async_trait::async_trait]
pub trait MessageSource: Send + Sync {
    /// Open the session (connect, authenticate). Called once before any other method.
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Close the session
    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Resolve the display title of a chat
    async fn resolve_chat(&self, chat: &ChatId) -> Result<String>;

    /// List the chats the account can see, most recent first
    async fn list_dialogs(&self, limit: usize) -> Result<Vec<Dialog>>;

    /// Lazily enumerate the history of a chat, newest first.
    ///
    /// An `Err` item means enumeration itself broke; the stream is not polled after it.
    fn stream_messages<'a>(
        &'a self,
        chat: &'a ChatId,
        limit: MessageLimit,
    ) -> BoxStream<'a, Result<Message>>;

    /// Transfer the media of `message` into `destination`, reporting progress along the way.
    ///
    /// On error the destination may hold a partial file; the caller removes it.
    async fn fetch_media(
        &self,
        chat: &ChatId,
        message: &Message,
        destination: &Path,
        progress: ProgressFn,
    ) -> Result<()>;
}
