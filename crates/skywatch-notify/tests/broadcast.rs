//! Integration tests for the broadcast notifier.

#[cfg(feature = "broadcast")]
mod broadcast {
    use skywatch_notify::{BroadcastNotifier, Notifier};
    use skywatch_protocol::HistoryEvent;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let notifier = BroadcastNotifier::default();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 2);

        notifier
            .publish(HistoryEvent::bucket_updated("w1.json"))
            .await
            .unwrap();

        assert_eq!(a.recv().await.unwrap().filename(), "w1.json");
        assert_eq!(b.recv().await.unwrap().filename(), "w1.json");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let notifier = BroadcastNotifier::new(4);
        assert!(
            notifier
                .publish(HistoryEvent::bucket_updated("w1.json"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let notifier = BroadcastNotifier::new(4);
        let _early = notifier.subscribe();
        notifier
            .publish(HistoryEvent::bucket_updated("w1.json"))
            .await
            .unwrap();

        let mut late = notifier.subscribe();
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_clones_share_one_channel() {
        let notifier = BroadcastNotifier::new(4);
        let mut rx = notifier.subscribe();
        let clone = notifier.clone();

        clone
            .publish(HistoryEvent::bucket_updated("w2.json"))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().filename(), "w2.json");
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking() {
        let notifier = BroadcastNotifier::new(2);
        let mut rx = notifier.subscribe();

        for n in 0..5 {
            notifier
                .publish(HistoryEvent::bucket_updated(format!("w{n}.json")))
                .await
                .unwrap();
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(rx.recv().await.unwrap().filename(), "w3.json");
    }
}
