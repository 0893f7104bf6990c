//! Unified error type for Skywatch.

use std::path::PathBuf;
use std::time::Duration;

use skywatch_notify::NotifyError;
use skywatch_protocol::ProtocolError;
use skywatch_session::SessionError;
use skywatch_store::StoreError;

/// Top-level error that wraps every crate-specific error.
///
/// Users of the `skywatch` crate deal with this one type instead of
/// importing each sub-crate's error. The `#[from]` variants give `?` its
/// conversions.
#[derive(Debug, thiserror::Error)]
pub enum SkywatchError {
    /// The detection was rejected before any state was touched.
    #[error("invalid detection: {0}")]
    Validation(String),

    /// Encoding, decoding, or an illegal state transition.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A bucket file could not be read, parsed, or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The flight registry refused an update.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The notification sink refused an event.
    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// The detection feed could not be opened.
    #[error("failed to open detection feed {}: {source}", path.display())]
    Input {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Shutdown archiving and flushing did not finish within the budget.
    #[error("shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_protocol_error() {
        let err: SkywatchError = ProtocolError::InvalidRecord("bad".into()).into();
        assert!(matches!(err, SkywatchError::Protocol(_)));
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_from_store_error() {
        let err: SkywatchError = StoreError::InvalidFilename("../x".into()).into();
        assert!(matches!(err, SkywatchError::Store(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err: SkywatchError = SessionError::Validation("nope".into()).into();
        assert!(matches!(err, SkywatchError::Session(_)));
    }

    #[test]
    fn test_from_notify_error() {
        let err: SkywatchError = NotifyError::Closed.into();
        assert!(matches!(err, SkywatchError::Notify(_)));
    }

    #[test]
    fn test_shutdown_timeout_display() {
        let err = SkywatchError::ShutdownTimeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "shutdown did not finish within 5s");
    }
}
