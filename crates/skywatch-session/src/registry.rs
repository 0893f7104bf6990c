//! The flight registry: which drones are flying right now.
//!
//! The registry answers one question for the controller: does this
//! detection continue a session we are already tracking, or does it
//! start a new one? It also holds each drone's transient trace, so feeds
//! that only report the current position still build up a full trace.
//!
//! # Concurrency note
//!
//! `FlightRegistry` is NOT thread-safe by itself: it is a pair of plain
//! `HashMap`s. The controller owns it behind a mutex and never holds that
//! mutex while waiting for a bucket lock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use skywatch_protocol::{DroneId, SessionState, TracePoint};

use crate::reconciler::truncate_trace;
use crate::{SessionConfig, SessionError};

/// What the registry knows about one drone's open session.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedFlight {
    pub drone_id: DroneId,
    /// Start of the session, i.e. its key inside the bucket.
    pub created_time: DateTime<Utc>,
    /// `live` or `waiting`; archived flights are not tracked.
    pub state: SessionState,
    /// Wall-clock time of the latest detection.
    pub last_seen: DateTime<Utc>,
    /// Bucket file holding the session.
    pub bucket: String,
}

/// Outcome of [`FlightRegistry::continuity`].
#[derive(Debug, Clone, PartialEq)]
pub enum Continuity {
    /// The detection extends the tracked session that started at
    /// `created_time` and lives in `bucket`.
    Continuing {
        created_time: DateTime<Utc>,
        bucket: String,
    },
    /// Nothing usable is tracked: start a new session.
    New,
}

/// Tracks the open session of every drone seen recently.
///
/// ## Lifecycle
///
/// ```text
/// detection ──→ continuity() ──→ [New] ──→ start_new() ──┐
///                    │                                    ▼
///                    └──→ [Continuing] ──→ accumulate_trace() ──→ touch()
///                                                                   │
///          expire_stale() / forget() / clear()  ←── (timeout | local | shutdown)
/// ```
#[derive(Debug)]
pub struct FlightRegistry {
    /// Open sessions keyed by drone. This is the "last seen" map.
    flights: HashMap<DroneId, TrackedFlight>,

    /// Trace accumulated for each drone's open session. Kept in sync
    /// with `flights`: cleared whenever a session ends or restarts.
    traces: HashMap<DroneId, Vec<TracePoint>>,

    config: SessionConfig,
}

impl FlightRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            flights: HashMap::new(),
            traces: HashMap::new(),
            config,
        }
    }

    /// Decides whether a detection for `drone_id` arriving at `now`
    /// continues the tracked session.
    ///
    /// It does if the drone was last seen no more than one inactivity
    /// timeout ago. An explicit close (`incoming` is `local`) always
    /// continues a tracked session, however old: closing is not a new
    /// observation.
    pub fn continuity(
        &self,
        drone_id: &DroneId,
        incoming: SessionState,
        now: DateTime<Utc>,
    ) -> Continuity {
        match self.flights.get(drone_id) {
            Some(flight)
                if incoming.is_terminal() || !self.config.is_expired(flight.last_seen, now) =>
            {
                Continuity::Continuing {
                    created_time: flight.created_time,
                    bucket: flight.bucket.clone(),
                }
            }
            _ => Continuity::New,
        }
    }

    /// Drops whatever was tracked for `drone_id` so a new session starts
    /// with an empty trace. Returns the flight that was being tracked.
    pub fn start_new(&mut self, drone_id: &DroneId) -> Option<TrackedFlight> {
        self.traces.remove(drone_id);
        let previous = self.flights.remove(drone_id);
        if let Some(prev) = &previous {
            tracing::debug!(
                %drone_id,
                created = %prev.created_time,
                "previous session superseded"
            );
        }
        previous
    }

    /// Builds the trace to store for this detection.
    ///
    /// A trace supplied by the caller is authoritative: it is used as-is
    /// and replaces the accumulator. Otherwise the reported position (if
    /// any) is appended to the accumulated trace. The result is bounded
    /// by `max_trace_length`.
    pub fn accumulate_trace(
        &mut self,
        drone_id: &DroneId,
        supplied: Option<Vec<TracePoint>>,
        position: Option<TracePoint>,
    ) -> Vec<TracePoint> {
        let max = self.config.max_trace_length;
        let acc = self.traces.entry(drone_id.clone()).or_default();

        match supplied {
            Some(trace) if !trace.is_empty() => *acc = trace,
            _ => acc.extend(position),
        }
        truncate_trace(acc, max);
        acc.clone()
    }

    /// Records an active detection: the drone was seen at `now` in the
    /// session (`created_time`, `bucket`).
    ///
    /// # Errors
    /// [`SessionError::Validation`] if `state` is `local`; use
    /// [`forget`](Self::forget) to close a session.
    pub fn touch(
        &mut self,
        drone_id: &DroneId,
        state: SessionState,
        created_time: DateTime<Utc>,
        bucket: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if state.is_terminal() {
            return Err(SessionError::Validation(format!(
                "cannot track archived session for drone {drone_id}"
            )));
        }

        let flight = TrackedFlight {
            drone_id: drone_id.clone(),
            created_time,
            state,
            last_seen: now,
            bucket: bucket.to_string(),
        };
        if self.flights.insert(drone_id.clone(), flight).is_none() {
            tracing::info!(%drone_id, created = %created_time, %bucket, "tracking flight");
        }
        Ok(())
    }

    /// Stops tracking `drone_id` (its session was archived).
    ///
    /// # Errors
    /// [`SessionError::NotTracked`] if the drone isn't tracked.
    pub fn forget(&mut self, drone_id: &DroneId) -> Result<TrackedFlight, SessionError> {
        self.traces.remove(drone_id);
        self.flights
            .remove(drone_id)
            .ok_or_else(|| SessionError::NotTracked(drone_id.clone()))
    }

    /// Stops tracking `drone_id` only if the tracked session is the one
    /// that started at `created_time`. Used by the sweep, which archives
    /// by session rather than by drone.
    pub fn forget_session(&mut self, drone_id: &DroneId, created_time: DateTime<Utc>) -> bool {
        let matches = self
            .flights
            .get(drone_id)
            .is_some_and(|f| f.created_time == created_time);
        if matches {
            self.flights.remove(drone_id);
            self.traces.remove(drone_id);
        }
        matches
    }

    /// Removes every flight idle for longer than the inactivity timeout.
    ///
    /// Returns the drones that were dropped.
    pub fn expire_stale(&mut self, now: DateTime<Utc>) -> Vec<DroneId> {
        let config = &self.config;
        let mut expired: Vec<DroneId> = self
            .flights
            .values()
            .filter(|f| config.is_expired(f.last_seen, now))
            .map(|f| f.drone_id.clone())
            .collect();
        expired.sort();

        for drone_id in &expired {
            self.flights.remove(drone_id);
            self.traces.remove(drone_id);
            tracing::info!(%drone_id, "flight no longer tracked (inactive)");
        }
        expired
    }

    /// Snapshot of every tracked flight, sorted by drone id.
    pub fn flights(&self) -> Vec<TrackedFlight> {
        let mut flights: Vec<TrackedFlight> = self.flights.values().cloned().collect();
        flights.sort_by(|a, b| a.drone_id.cmp(&b.drone_id));
        flights
    }

    /// Drops everything. Used at the end of shutdown.
    pub fn clear(&mut self) {
        self.flights.clear();
        self.traces.clear();
    }
}

// =========================================================================
// Tests
// =========================================================================
