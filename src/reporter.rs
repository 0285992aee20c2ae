//! Event reporting for UIs and other observers

use crate::types::Event;
use tokio::sync::broadcast;

/// Broadcasts [`Event`]s to any number of subscribers.
///
/// Cloning is cheap; every clone feeds the same channel. Reporting never blocks and never fails:
/// with no subscribers events are dropped, and slow subscribers observe
/// [`broadcast::error::RecvError::Lagged`] instead of stalling the engine.
#[derive(Clone, Debug)]
pub struct Reporter {
    tx: broadcast::Sender<Event>,
}

impl Reporter {
    /// Create a reporter buffering up to `capacity` undelivered events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event
    pub fn report(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.tx.send(event).ok();
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(1000)
    }
}
