//! The flight controller: turns one detection into one bucket write.
//!
//! Each save runs in two phases:
//!
//!   1. Registry phase: decide whether the detection continues a tracked
//!      session and build its trace. Only the registry lock is held.
//!   2. Bucket phase: lock the bucket, reconcile, update the registry,
//!      write the file. The registry lock may be taken *inside* a bucket
//!      lock, never the other way round.
//!
//! After the bucket lock is released a `bucket-updated` event goes out
//! through the notifier.
//!
//! A new session that supersedes one stored in another week closes the
//! old one first, under that week's lock alone. Bucket locks are never
//! nested.

use chrono::{DateTime, Utc};
use skywatch_notify::Notifier;
use skywatch_protocol::{
    Detection, DroneId, FlightSession, HistoryEvent, SessionState,
};
use skywatch_session::{
    Continuity, FlightRegistry, SessionConfig, TrackedFlight, merge_or_append,
};
use skywatch_store::{FileStore, HistoryCache, WeekBucket, resolve_bucket};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::SkywatchError;

/// Owns the cache, the registry, and the notifier for one history
/// directory.
pub struct FlightController<N: Notifier> {
    pub(crate) cache: HistoryCache,
    pub(crate) registry: Mutex<FlightRegistry>,
    pub(crate) notifier: N,
    pub(crate) config: SessionConfig,
}

impl<N: Notifier> FlightController<N> {
    pub fn new(store: FileStore, config: SessionConfig, notifier: N) -> Self {
        let config = config.validated();
        Self {
            cache: HistoryCache::new(store),
            registry: Mutex::new(FlightRegistry::new(config.clone())),
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Records a detection in its week bucket and returns the bucket's
    /// filename.
    ///
    /// # Errors
    /// - [`SkywatchError::Validation`] if the detection has no drone id.
    ///   Nothing is touched in that case.
    /// - [`SkywatchError::Store`] if the bucket can't be read or written.
    ///   In-memory changes made before the failure are kept.
    pub async fn save_flight_to_history(&self, detection: Detection) -> Result<String, SkywatchError> {
        self.save_flight_at(detection, Utc::now()).await
    }

    /// [`save_flight_to_history`](Self::save_flight_to_history) with an
    /// explicit "now".
    pub async fn save_flight_at(
        &self,
        detection: Detection,
        now: DateTime<Utc>,
    ) -> Result<String, SkywatchError> {
        let drone_id = match detection.drone_id() {
            Ok(id) => id.clone(),
            Err(e) => {
                warn!(error = %e, "detection rejected");
                return Err(SkywatchError::Validation(e.to_string()));
            }
        };
        let position = detection.position();
        let Detection {
            created_time,
            state,
            trace,
            extra,
            ..
        } = detection;
        let state = state.unwrap_or_default();

        let (continuity, superseded, trace) = {
            let mut registry = self.registry.lock().await;
            match registry.continuity(&drone_id, state, now) {
                // Closing a flight we don't track: nothing to accumulate.
                Continuity::New if state.is_terminal() => (Continuity::New, None, None),
                Continuity::New => {
                    let superseded = registry.start_new(&drone_id);
                    let trace = registry.accumulate_trace(&drone_id, trace, position);
                    (Continuity::New, superseded, Some(trace))
                }
                continuing => {
                    let trace = registry.accumulate_trace(&drone_id, trace, position);
                    (continuing, None, Some(trace))
                }
            }
        };

        let Some(trace) = trace else {
            let filename = resolve_bucket(created_time.unwrap_or(now)).filename;
            return match self.close_untracked(&drone_id, &filename).await {
                Ok(()) => Ok(filename),
                Err(e) => {
                    error!(%drone_id, %filename, error = %e, "failed to close untracked flight");
                    Err(e)
                }
            };
        };

        let (created_time, filename, is_new) = match continuity {
            Continuity::Continuing {
                created_time,
                bucket,
            } => (created_time, bucket, false),
            Continuity::New => {
                let created_time = created_time.unwrap_or(now);
                (created_time, resolve_bucket(created_time).filename, true)
            }
        };

        // A superseded session in the same week is demoted by the bucket
        // phase. One in another week has to be closed in its own file.
        if let Some(previous) = superseded.filter(|f| f.bucket != filename) {
            match self.archive_superseded(&previous).await {
                Ok(true) => self.publish(&previous.bucket).await,
                Ok(false) => {}
                Err(e) => error!(
                    %drone_id,
                    filename = %previous.bucket,
                    error = %e,
                    "failed to archive superseded session"
                ),
            }
        }

        let mut session = FlightSession::new(drone_id.clone(), created_time, state);
        session.trace = trace;
        session.last_seen = Some(now);
        let skipped = session.absorb_extra(extra);
        if !skipped.is_empty() {
            debug!(%drone_id, ?skipped, "provider fields shadowing session fields dropped");
        }

        if let Err(e) = self.write_session(&filename, session, is_new, now).await {
            error!(%drone_id, %filename, error = %e, "failed to save detection");
            return Err(e);
        }

        self.publish(&filename).await;
        Ok(filename)
    }

    /// Demotes the session `previous` describes, in its own bucket.
    /// Returns whether anything changed.
    async fn archive_superseded(&self, previous: &TrackedFlight) -> Result<bool, SkywatchError> {
        let shared = self.cache.get(&previous.bucket).await?;
        let mut sessions = shared.lock().await;

        let Some(session) = sessions.iter_mut().find(|s| {
            s.id == previous.drone_id
                && s.created_time == previous.created_time
                && s.state.is_active()
        }) else {
            return Ok(false);
        };
        session.set_state(SessionState::Local)?;

        self.cache.write_locked(&previous.bucket, &sessions).await?;
        info!(
            drone_id = %previous.drone_id,
            created = %previous.created_time,
            filename = %previous.bucket,
            "superseded session archived"
        );
        Ok(true)
    }

    /// A `local` detection for a drone the registry doesn't track. Any
    /// session of that drone still active in `filename` (left over from
    /// an earlier run, say) is closed; no new session is recorded.
    async fn close_untracked(&self, drone_id: &DroneId, filename: &str) -> Result<(), SkywatchError> {
        let closed = {
            let shared = self.cache.get(filename).await?;
            let mut sessions = shared.lock().await;
            let closed = demote_active(&mut sessions, drone_id)?;
            if closed > 0 {
                self.cache.write_locked(filename, &sessions).await?;
            }
            closed
        };

        if closed == 0 {
            debug!(%drone_id, %filename, "close for untracked flight ignored");
            return Ok(());
        }
        info!(%drone_id, %filename, closed, "untracked flight closed");
        self.publish(filename).await;
        Ok(())
    }

    /// Bucket phase of a save. Holds the bucket lock from reconcile to
    /// write, so concurrent saves into one week never lose each other's
    /// changes.
    async fn write_session(
        &self,
        filename: &str,
        session: FlightSession,
        is_new: bool,
        now: DateTime<Utc>,
    ) -> Result<(), SkywatchError> {
        let drone_id = session.id.clone();
        let shared = self.cache.get(filename).await?;
        let mut sessions = shared.lock().await;

        if is_new {
            let demoted = demote_active(&mut sessions, &drone_id)?;
            if demoted > 0 {
                info!(%drone_id, %filename, demoted, "stale session archived by new flight");
            }
        }

        let outcome = merge_or_append(session, &mut sessions, &self.config);
        let stored = &sessions[outcome.index()];
        let (created_time, state) = (stored.created_time, stored.state);

        {
            let mut registry = self.registry.lock().await;
            if state.is_active() {
                registry.touch(&drone_id, state, created_time, filename, now)?;
            } else {
                match registry.forget(&drone_id) {
                    Ok(_) => info!(%drone_id, created = %created_time, "flight archived"),
                    Err(e) => debug!(%drone_id, reason = %e, "closed a flight that was not tracked"),
                }
            }
        }

        self.cache.write_locked(filename, &sessions).await?;
        debug!(%drone_id, %filename, ?outcome, %state, "detection saved");
        Ok(())
    }

    /// Publishes `bucket-updated`. Failures are logged and dropped.
    pub(crate) async fn publish(&self, filename: &str) {
        if let Err(e) = self.notifier.publish(HistoryEvent::bucket_updated(filename)).await {
            warn!(%filename, error = %e, "failed to publish bucket update");
        }
    }

    /// Flushes every cached bucket to disk.
    pub async fn flush_all(&self) -> Result<usize, SkywatchError> {
        Ok(self.cache.flush_all().await?)
    }

    // -- Queries ------------------------------------------------------------

    /// A copy of every session in the bucket `filename`.
    pub async fn history(&self, filename: &str) -> Result<Vec<FlightSession>, SkywatchError> {
        let shared = self.cache.get(filename).await?;
        let sessions = shared.lock().await;
        Ok(sessions.clone())
    }

    /// A copy of the bucket covering `timestamp`.
    pub async fn history_for(&self, timestamp: DateTime<Utc>) -> Result<Vec<FlightSession>, SkywatchError> {
        self.history(&resolve_bucket(timestamp).filename).await
    }

    /// Bucket files on disk, oldest week first.
    pub async fn list_buckets(&self) -> Result<Vec<WeekBucket>, SkywatchError> {
        Ok(self.cache.store().list_buckets().await?)
    }

    /// Flights currently tracked as `live` or `waiting`, sorted by drone.
    pub async fn active_flights(&self) -> Vec<TrackedFlight> {
        self.registry.lock().await.flights()
    }
}

/// Archives every still-active session of `drone_id` in place.
fn demote_active(sessions: &mut [FlightSession], drone_id: &DroneId) -> Result<usize, SkywatchError> {
    let mut demoted = 0;
    for session in sessions
        .iter_mut()
        .filter(|s| &s.id == drone_id && s.state.is_active())
    {
        session.set_state(SessionState::Local)?;
        demoted += 1;
    }
    Ok(demoted)
}
