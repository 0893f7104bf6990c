//! Data model for Skywatch.
//!
//! This crate defines what a flight history is made of:
//!
//! - **Types** ([`FlightSession`], [`Detection`], [`TracePoint`],
//!   [`HistoryEvent`]): the records stored in bucket files and handed
//!   to listeners.
//! - **State machine** ([`SessionState`]): `live` / `waiting` / `local`
//!   with checked transitions.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how records become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! It knows nothing about files, caches, or timers.

mod codec;
mod error;
mod state;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use state::SessionState;
pub use types::{
    Detection, DroneId, ExtraFields, FlightSession, HistoryEvent, RESERVED_FIELDS, TracePoint,
};
