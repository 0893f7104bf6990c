//! Codec trait and the JSON implementation used for history files.
//!
//! A codec converts between Rust values and raw bytes. The store doesn't
//! care how sessions are serialized, only that something implements
//! [`Codec`].

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes them back.
///
/// `Send + Sync + 'static` because the codec lives inside the file store,
/// which is shared across tasks for the lifetime of the service.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed,
    /// truncated, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// History files are read by the dashboard and by people, so output is
/// indented.
///
/// ```rust
/// use skywatch_protocol::{Codec, DroneId, FlightSession, JsonCodec, SessionState};
///
/// let codec = JsonCodec;
/// let created = "2024-03-06T10:00:00Z".parse().unwrap();
/// let sessions = vec![FlightSession::new(DroneId::new("D1"), created, SessionState::Live)];
///
/// let bytes = codec.encode(&sessions).unwrap();
/// let decoded: Vec<FlightSession> = codec.decode(&bytes).unwrap();
/// assert_eq!(sessions, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec_pretty(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
