//! In-process fan-out over a `tokio::sync::broadcast` channel.
//!
//! Every subscriber sees every event published after it subscribed. A
//! subscriber that falls more than `capacity` events behind skips the
//! oldest ones (`RecvError::Lagged`); publishers never wait on slow
//! listeners.

use skywatch_protocol::HistoryEvent;
use tokio::sync::broadcast;

use crate::{Notifier, NotifyError};

/// Default number of events buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 256;

/// A [`Notifier`] that fans events out to any number of in-process
/// subscribers (websocket bridges, the dashboard feed, tests).
///
/// Cheap to clone: clones share the same channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<HistoryEvent>,
}

impl BroadcastNotifier {
    /// Creates a notifier buffering up to `capacity` events per
    /// subscriber. `capacity` is raised to 1 if zero.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier for BroadcastNotifier {
    async fn publish(&self, event: HistoryEvent) -> Result<(), NotifyError> {
        // No subscribers is not an error: nobody is watching right now.
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::trace!(receivers, "history event published");
            }
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(filename = %event.filename(), "history event dropped, no subscribers");
            }
        }
        Ok(())
    }
}
