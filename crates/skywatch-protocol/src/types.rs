//! Core record types: drone ids, trace points, flight sessions, incoming
//! detections, and the change events published after a bucket is written.
//!
//! Everything here is what ends up inside a history file or travels to a
//! listener, so the serde attributes are part of the on-disk format.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ProtocolError, SessionState};

/// Provider-specific fields carried through untouched (model, serial,
/// operator position, ...). The engine never interprets them.
pub type ExtraFields = Map<String, Value>;

/// Keys a [`FlightSession`] writes (or reads) itself. A provider field
/// with one of these names would appear twice in the file and make it
/// unreadable.
pub const RESERVED_FIELDS: &[&str] = &["id", "created_time", "type", "state", "trace", "lastSeen"];

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identifier of a physical drone, as reported by the detection feed.
///
/// Not unique across sessions: the same drone flies many times.
///
/// `#[serde(transparent)]` keeps it a plain JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DroneId(pub String);

impl DroneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DroneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DroneId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// TracePoint
// ---------------------------------------------------------------------------

/// One position sample in a session trace.
///
/// Stored as a compact JSON array: `[lat, lng]`, or `[lat, lng, t_ms]`
/// when the feed supplies a relative timestamp in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct TracePoint {
    pub lat: f64,
    pub lng: f64,
    pub t_ms: Option<f64>,
}

impl TracePoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            t_ms: None,
        }
    }

    pub fn timed(lat: f64, lng: f64, t_ms: f64) -> Self {
        Self {
            lat,
            lng,
            t_ms: Some(t_ms),
        }
    }
}

impl TryFrom<Vec<f64>> for TracePoint {
    type Error = String;

    fn try_from(raw: Vec<f64>) -> Result<Self, Self::Error> {
        match raw.as_slice() {
            [lat, lng] => Ok(Self::new(*lat, *lng)),
            [lat, lng, t] => Ok(Self::timed(*lat, *lng, *t)),
            other => Err(format!(
                "trace point must have 2 or 3 numbers, got {}",
                other.len()
            )),
        }
    }
}

impl From<TracePoint> for Vec<f64> {
    fn from(p: TracePoint) -> Self {
        match p.t_ms {
            Some(t) => vec![p.lat, p.lng, t],
            None => vec![p.lat, p.lng],
        }
    }
}

// ---------------------------------------------------------------------------
// FlightSession
// ---------------------------------------------------------------------------

/// One observation window for a drone. The element type of every
/// history bucket file.
///
/// ```json
/// {
///   "id": "D1",
///   "created_time": "2024-03-06T10:00:00Z",
///   "type": "live",
///   "trace": [[48.85, 2.35], [48.86, 2.36]],
///   "lastSeen": "2024-03-06T10:00:05Z",
///   "model": "Mavic 3"
/// }
/// ```
///
/// `state` is written as `"type"`; older files that used `"state"` are
/// accepted through the alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSession {
    pub id: DroneId,

    /// When the session started. Merges keep the earliest value.
    pub created_time: DateTime<Utc>,

    #[serde(rename = "type", alias = "state", default)]
    pub state: SessionState,

    /// Oldest first. Bounded by the configured maximum trace length.
    #[serde(default)]
    pub trace: Vec<TracePoint>,

    /// Most recent detection that contributed to this session. Files
    /// written before this field existed fall back to `created_time`.
    #[serde(
        rename = "lastSeen",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_seen: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl FlightSession {
    /// A fresh session with an empty trace.
    pub fn new(id: DroneId, created_time: DateTime<Utc>, state: SessionState) -> Self {
        Self {
            id,
            created_time,
            state,
            trace: Vec::new(),
            last_seen: Some(created_time),
            extra: ExtraFields::new(),
        }
    }

    /// The instant inactivity is measured from.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_seen.unwrap_or(self.created_time)
    }

    /// Copies provider fields into the session, skipping any whose key is
    /// in [`RESERVED_FIELDS`]. Returns the skipped keys.
    pub fn absorb_extra(&mut self, extra: ExtraFields) -> Vec<String> {
        let mut skipped = Vec::new();
        for (key, value) in extra {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                skipped.push(key);
            } else {
                self.extra.insert(key, value);
            }
        }
        skipped
    }

    /// Checked state change. Fails when leaving `local`.
    pub fn set_state(&mut self, target: SessionState) -> Result<(), ProtocolError> {
        self.state = self.state.transition(target)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// A single record from the upstream detection feed.
///
/// Every field except the id is optional on the wire; the flight
/// controller fills in defaults before anything is stored. The id is an
/// `Option` too so that a record without one can still be parsed and
/// then rejected with a proper validation error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DroneId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,

    #[serde(
        rename = "type",
        alias = "state",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<SessionState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<TracePoint>>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Detection {
    /// A bare detection for `id` with everything else left to defaults.
    pub fn for_drone(id: impl Into<DroneId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Returns the drone id, or [`ProtocolError::InvalidRecord`] when it
    /// is missing or blank.
    pub fn drone_id(&self) -> Result<&DroneId, ProtocolError> {
        match &self.id {
            Some(id) if !id.as_str().trim().is_empty() => Ok(id),
            _ => Err(ProtocolError::InvalidRecord(
                "detection has no drone id".into(),
            )),
        }
    }

    /// The reported position as a trace point, if both coordinates are set.
    pub fn position(&self) -> Option<TracePoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(TracePoint::new(lat, lng)),
            _ => None,
        }
    }
}

impl From<String> for DroneId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// HistoryEvent
// ---------------------------------------------------------------------------

/// Change notification published after a bucket file is written.
///
/// Internally tagged on `kind`:
/// `{ "kind": "bucket-updated", "filename": "flights_2024-03-03_2024-03-09.json" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum HistoryEvent {
    BucketUpdated { filename: String },
}

impl HistoryEvent {
    pub fn bucket_updated(filename: impl Into<String>) -> Self {
        Self::BucketUpdated {
            filename: filename.into(),
        }
    }

    /// The bucket file the event refers to.
    pub fn filename(&self) -> &str {
        match self {
            Self::BucketUpdated { filename } => filename,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
