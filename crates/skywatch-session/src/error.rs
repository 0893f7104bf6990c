//! Error types for the session layer.

use skywatch_protocol::{DroneId, ProtocolError};

/// Errors that can occur while reconciling detections into sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The detection is missing a field the engine needs to identify it.
    /// Raised before any state is touched; never retried.
    #[error("invalid detection: {0}")]
    Validation(String),

    /// No flight is being tracked for this drone.
    #[error("no tracked flight for drone {0}")]
    NotTracked(DroneId),

    /// A record-level failure, e.g. an illegal state transition.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
