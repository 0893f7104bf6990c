//! Error types for the protocol layer.
//!
//! Each crate in Skywatch defines its own error enum. A `ProtocolError`
//! means the problem is in the data itself (serialization, a malformed
//! record, an illegal state change), not in storage or scheduling.

use crate::SessionState;

/// Errors that can occur while encoding, decoding, or validating
/// flight records.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust value).
    ///
    /// Common causes: truncated files, a hand-edited history file with
    /// a typo, or a trace point that isn't a `[lat, lng]` pair.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A record passed deserialization but is missing something the
    /// engine cannot work without (e.g. a detection with no drone id).
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A session was asked to move between two states the lifecycle
    /// does not connect (anything out of `local`).
    #[error("illegal session transition {from} -> {to}")]
    IllegalTransition {
        /// State the session was in.
        from: SessionState,
        /// State that was requested.
        to: SessionState,
    },
}
