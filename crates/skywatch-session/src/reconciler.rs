//! Merging one incoming session into a bucket.
//!
//! The reconciler is a pure in-memory step: it never removes a session
//! and never archives one. Expiry belongs to the sweep.

use skywatch_protocol::{FlightSession, TracePoint};
use tracing::trace;

use crate::SessionConfig;

/// What [`merge_or_append`] did with the incoming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Folded into the existing session at `index`.
    Merged { index: usize },
    /// Pushed as a new session at `index` (always the last slot).
    Appended { index: usize },
}

impl Reconciled {
    /// Position of the affected session in the bucket.
    pub fn index(self) -> usize {
        match self {
            Self::Merged { index } | Self::Appended { index } => index,
        }
    }
}

/// Merges `incoming` into a matching session in `bucket`, or appends it.
///
/// A match is the first session with the same drone id that is still
/// active (`live` or `waiting`) and whose `created_time` lies within one
/// inactivity timeout of `incoming.created_time`. Archived sessions never
/// match, so a drone seen again after archiving starts a new session.
///
/// On a match the incoming fields win, except:
/// - `created_time` keeps the earlier of the two;
/// - an empty incoming trace keeps the existing trace;
/// - `last_seen` keeps the later of the two;
/// - extra fields are merged key by key.
///
/// The stored trace is cut to the last `max_trace_length` points either way.
pub fn merge_or_append(
    incoming: FlightSession,
    bucket: &mut Vec<FlightSession>,
    config: &SessionConfig,
) -> Reconciled {
    let found = bucket.iter().position(|existing| {
        existing.id == incoming.id
            && existing.state.is_active()
            && config.within_window(existing.created_time, incoming.created_time)
    });

    match found {
        Some(index) => {
            merge_into(&mut bucket[index], incoming, config.max_trace_length);
            trace!(drone_id = %bucket[index].id, index, "detection merged into session");
            Reconciled::Merged { index }
        }
        None => {
            let mut session = incoming;
            truncate_trace(&mut session.trace, config.max_trace_length);
            trace!(drone_id = %session.id, created = %session.created_time, "session appended");
            bucket.push(session);
            Reconciled::Appended {
                index: bucket.len() - 1,
            }
        }
    }
}

fn merge_into(existing: &mut FlightSession, incoming: FlightSession, max_trace_length: usize) {
    let FlightSession {
        id: _,
        created_time,
        state,
        trace,
        last_seen,
        extra,
    } = incoming;

    existing.created_time = existing.created_time.min(created_time);
    // Matched sessions are active, and every target is legal from an
    // active state.
    existing.state = state;
    if !trace.is_empty() {
        existing.trace = trace;
    }
    truncate_trace(&mut existing.trace, max_trace_length);
    existing.last_seen = existing.last_seen.max(last_seen);
    existing.extra.extend(extra);
}

/// Drops the oldest points so at most `max` remain, preserving order.
pub fn truncate_trace(trace: &mut Vec<TracePoint>, max: usize) {
    if trace.len() > max {
        let excess = trace.len() - max;
        trace.drain(..excess);
    }
}
