//! Notification sinks for Skywatch.
//!
//! After every write to a history bucket the engine publishes a
//! [`HistoryEvent`] through a [`Notifier`]. Delivery is fire-and-forget:
//! the engine logs a failed publish and moves on, it never retries.
//!
//! # Feature Flags
//!
//! - `broadcast` (default): [`BroadcastNotifier`], an in-process fan-out
//!   over a Tokio broadcast channel.

mod error;
#[cfg(feature = "broadcast")]
mod broadcast;

#[cfg(feature = "broadcast")]
pub use broadcast::{BroadcastNotifier, DEFAULT_CAPACITY};
pub use error::NotifyError;

use std::future::Future;
use std::sync::Arc;

use skywatch_protocol::HistoryEvent;

/// Somewhere to send "a bucket changed" events.
///
/// The returned future must be `Send` because the service loop that
/// publishes may run on any runtime worker thread.
pub trait Notifier: Send + Sync + 'static {
    /// Publishes one event. Should not block for long; the engine awaits
    /// it inline after each save.
    fn publish(
        &self,
        event: HistoryEvent,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

impl<N: Notifier> Notifier for Arc<N> {
    fn publish(
        &self,
        event: HistoryEvent,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send {
        (**self).publish(event)
    }
}

/// A [`Notifier`] that discards every event. For headless runs and tests
/// that only look at the files.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    async fn publish(&self, _event: HistoryEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_notifier_accepts_everything() {
        let n = NullNotifier;
        assert!(n.publish(HistoryEvent::bucket_updated("a.json")).await.is_ok());
    }

    #[tokio::test]
    async fn test_arc_notifier_forwards() {
        let n = Arc::new(NullNotifier);
        assert!(n.publish(HistoryEvent::bucket_updated("a.json")).await.is_ok());
    }

    #[test]
    fn test_notify_error_display() {
        assert_eq!(NotifyError::Closed.to_string(), "notification sink closed");
        assert_eq!(
            NotifyError::Rejected("full".into()).to_string(),
            "notification rejected: full"
        );
    }
}
