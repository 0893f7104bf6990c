//! Flight session reconciliation for Skywatch.
//!
//! This crate decides what a detection means for the history:
//!
//! 1. **Continuation**: is the drone still on the same flight?
//!    ([`FlightRegistry`], [`Continuity`])
//! 2. **Reconciliation**: fold the detection into its session or open a
//!    new one ([`merge_or_append`])
//! 3. **Limits**: inactivity timeout, trace bound, sweep interval
//!    ([`SessionConfig`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Flight controller (above)  ← owns a FlightRegistry, calls merge_or_append
//!     ↕
//! Session layer (this crate) ← pure, synchronous, clock passed in
//!     ↕
//! Protocol layer (below)     ← FlightSession, SessionState, TracePoint
//! ```

mod config;
mod error;
mod reconciler;
mod registry;

pub use config::SessionConfig;
pub use error::SessionError;
pub use reconciler::{Reconciled, merge_or_append, truncate_trace};
pub use registry::{Continuity, FlightRegistry, TrackedFlight};
