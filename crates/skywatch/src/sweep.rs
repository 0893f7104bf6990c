//! Archiving sweeps.
//!
//! The periodic sweep demotes sessions that went quiet; the shutdown
//! sweep closes every flight still tracked so nothing is left `live` on
//! disk after the process exits.

use chrono::{DateTime, Utc};
use skywatch_notify::Notifier;
use skywatch_protocol::{Detection, SessionState};
use skywatch_store::SharedBucket;
use tracing::{debug, error, info};

use crate::{FlightController, SkywatchError};

/// Outcome of one periodic sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Cached buckets inspected.
    pub buckets_checked: usize,
    /// Buckets that changed and were written.
    pub buckets_written: usize,
    /// Sessions demoted to `local`.
    pub sessions_archived: usize,
    /// Buckets whose write failed. Their sessions stay demoted in memory.
    pub failures: usize,
}

impl<N: Notifier> FlightController<N> {
    /// Runs one periodic sweep against the wall clock.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Demotes every `live`/`waiting` session idle for longer than the
    /// inactivity timeout, in every cached bucket.
    ///
    /// Only changed buckets are written, and each gets one
    /// `bucket-updated` event. A failing bucket is logged and skipped.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for filename in self.cache.filenames().await {
            let Some(shared) = self.cache.cached(&filename).await else {
                continue;
            };
            report.buckets_checked += 1;

            match self.sweep_bucket(&filename, &shared, now).await {
                Ok(0) => {}
                Ok(archived) => {
                    report.sessions_archived += archived;
                    report.buckets_written += 1;
                    self.publish(&filename).await;
                }
                Err(e) => {
                    report.failures += 1;
                    error!(%filename, error = %e, "sweep failed to write bucket");
                }
            }
        }

        let dropped = self.registry.lock().await.expire_stale(now);
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "stale registry entries dropped");
        }

        if report.sessions_archived > 0 || report.failures > 0 {
            info!(
                archived = report.sessions_archived,
                buckets = report.buckets_written,
                failures = report.failures,
                "archiving sweep finished"
            );
        }
        report
    }

    async fn sweep_bucket(
        &self,
        filename: &str,
        shared: &SharedBucket,
        now: DateTime<Utc>,
    ) -> Result<usize, SkywatchError> {
        let mut sessions = shared.lock().await;

        let mut demoted = Vec::new();
        for session in sessions.iter_mut() {
            if session.state.is_active() && self.config.is_expired(session.last_activity(), now) {
                session.set_state(SessionState::Local)?;
                demoted.push((session.id.clone(), session.created_time));
            }
        }
        if demoted.is_empty() {
            return Ok(0);
        }

        {
            let mut registry = self.registry.lock().await;
            for (drone_id, created_time) in &demoted {
                registry.forget_session(drone_id, *created_time);
                info!(%drone_id, created = %created_time, %filename, "inactive flight archived");
            }
        }

        self.cache.write_locked(filename, &sessions).await?;
        Ok(demoted.len())
    }

    /// Closes every tracked flight as `local`, however recently it was
    /// seen, then empties the registry. Returns how many were closed.
    ///
    /// Each close goes through the normal save path, so it lands in the
    /// flight's own bucket and publishes like any other save.
    pub async fn shutdown_sweep(&self) -> usize {
        let flights = self.registry.lock().await.flights();
        let mut closed = 0;

        for flight in flights {
            let close = Detection {
                created_time: Some(flight.created_time),
                state: Some(SessionState::Local),
                ..Detection::for_drone(flight.drone_id.clone())
            };
            match self.save_flight_to_history(close).await {
                Ok(_) => closed += 1,
                Err(e) => error!(
                    drone_id = %flight.drone_id,
                    error = %e,
                    "failed to archive flight at shutdown"
                ),
            }
        }

        self.registry.lock().await.clear();
        info!(closed, "shutdown sweep finished");
        closed
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeDelta, TimeZone};
    use skywatch_notify::BroadcastNotifier;
    use skywatch_protocol::HistoryEvent;
    use skywatch_session::SessionConfig;
    use skywatch_store::FileStore;
    use tempfile::TempDir;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    const WEEK: &str = "flights_2024-03-03_2024-03-09.json";

    fn controller(dir: &TempDir) -> (FlightController<BroadcastNotifier>, tokio::sync::broadcast::Receiver<HistoryEvent>) {
        let notifier = BroadcastNotifier::new(16);
        let rx = notifier.subscribe();
        let c = FlightController::new(FileStore::new(dir.path()), SessionConfig::default(), notifier);
        (c, rx)
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<HistoryEvent>) -> Vec<HistoryEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(e) => events.push(e),
                Err(TryRecvError::Empty) => return events,
                Err(e) => panic!("unexpected: {e}"),
            }
        }
    }

    #[tokio::test]
    async fn test_sweep_archives_stale_and_keeps_fresh() {
        let dir = TempDir::new().unwrap();
        let (c, mut rx) = controller(&dir);

        let waiting = Detection {
            state: Some(SessionState::Waiting),
            ..Detection::for_drone("OLD")
        };
        c.save_flight_at(waiting, t(0)).await.unwrap();
        c.save_flight_at(Detection::for_drone("NEW"), t(15)).await.unwrap();
        drain(&mut rx);

        let report = c.sweep_at(t(20)).await;

        assert_eq!(report.sessions_archived, 1);
        assert_eq!(report.buckets_written, 1);
        assert_eq!(drain(&mut rx), vec![HistoryEvent::bucket_updated(WEEK)]);

        let on_disk = c.cache.store().load(WEEK).await.unwrap();
        let old = on_disk.iter().find(|s| s.id.as_str() == "OLD").unwrap();
        let new = on_disk.iter().find(|s| s.id.as_str() == "NEW").unwrap();
        assert_eq!(old.state, SessionState::Local);
        assert_eq!(new.state, SessionState::Live);

        let tracked: Vec<String> = c
            .active_flights()
            .await
            .into_iter()
            .map(|f| f.drone_id.to_string())
            .collect();
        assert_eq!(tracked, vec!["NEW".to_string()]);
    }

    #[tokio::test]
    async fn test_sweep_nothing_stale_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (c, mut rx) = controller(&dir);
        c.save_flight_at(Detection::for_drone("D1"), t(0)).await.unwrap();
        drain(&mut rx);
        let before = std::fs::metadata(dir.path().join(WEEK)).unwrap().modified().unwrap();

        let report = c.sweep_at(t(10)).await;

        assert_eq!(report, SweepReport { buckets_checked: 1, ..SweepReport::default() });
        assert!(drain(&mut rx).is_empty());
        let after = std::fs::metadata(dir.path().join(WEEK)).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_sweep_one_event_per_changed_bucket() {
        let dir = TempDir::new().unwrap();
        let (c, mut rx) = controller(&dir);
        c.save_flight_at(Detection::for_drone("A"), t(0)).await.unwrap();
        c.save_flight_at(Detection::for_drone("B"), t(1)).await.unwrap();
        drain(&mut rx);

        let report = c.sweep_at(t(60)).await;

        assert_eq!(report.sessions_archived, 2);
        assert_eq!(drain(&mut rx).len(), 1);
        assert!(c.active_flights().await.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_leaves_archived_sessions_alone() {
        let dir = TempDir::new().unwrap();
        let (c, _rx) = controller(&dir);
        c.save_flight_at(Detection::for_drone("D1"), t(0)).await.unwrap();
        let close = Detection {
            state: Some(SessionState::Local),
            ..Detection::for_drone("D1")
        };
        c.save_flight_at(close, t(1)).await.unwrap();
        assert_eq!(c.history(WEEK).await.unwrap()[0].state, SessionState::Local);

        assert_eq!(c.sweep_at(t(3600)).await.sessions_archived, 0);
    }

    #[tokio::test]
    async fn test_detection_after_sweep_starts_new_session() {
        let dir = TempDir::new().unwrap();
        let (c, _rx) = controller(&dir);
        c.save_flight_at(Detection::for_drone("D1"), t(0)).await.unwrap();
        c.sweep_at(t(11)).await;
        c.save_flight_at(Detection::for_drone("D1"), t(12)).await.unwrap();

        let sessions = c.history(WEEK).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].state, SessionState::Local);
        assert_eq!(sessions[1].state, SessionState::Live);
    }

    #[tokio::test]
    async fn test_shutdown_sweep_closes_every_tracked_flight() {
        let dir = TempDir::new().unwrap();
        let (c, _rx) = controller(&dir);
        let now = Utc::now();
        c.save_flight_at(Detection::for_drone("D1"), now).await.unwrap();
        let waiting = Detection {
            state: Some(SessionState::Waiting),
            ..Detection::for_drone("D2")
        };
        c.save_flight_at(waiting, now).await.unwrap();

        assert_eq!(c.shutdown_sweep().await, 2);

        assert!(c.active_flights().await.is_empty());
        let filename = skywatch_store::resolve_bucket(now).filename;
        let on_disk = c.cache.store().load(&filename).await.unwrap();
        assert_eq!(on_disk.len(), 2);
        assert!(on_disk.iter().all(|s| s.state == SessionState::Local));
    }

    #[tokio::test]
    async fn test_shutdown_sweep_with_nothing_tracked() {
        let dir = TempDir::new().unwrap();
        let (c, mut rx) = controller(&dir);
        assert_eq!(c.shutdown_sweep().await, 0);
        assert!(tokio::time::timeout(Duration::from_millis(10), rx.recv()).await.is_err());
    }
}
