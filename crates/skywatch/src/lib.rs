//! # Skywatch
//!
//! Weekly flight-history engine for drone detection feeds.
//!
//! A feed of per-drone detections goes in; one JSON file per week comes
//! out, holding every flight session that *started* that week. Skywatch
//! decides which detections belong to the same flight, keeps a bounded
//! trace for each, archives flights that go quiet, and announces every
//! file change so a live view can refresh.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skywatch::prelude::*;
//!
//! # async fn demo() -> Result<(), SkywatchError> {
//! let service = HistoryService::builder()
//!     .history_dir("history")
//!     .build(BroadcastNotifier::default());
//!
//! let filename = service
//!     .save_flight_to_history(Detection {
//!         latitude: Some(48.85),
//!         longitude: Some(2.35),
//!         ..Detection::for_drone("DJI-1581F5FJD228400A")
//!     })
//!     .await?;
//! println!("saved into {filename}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! | crate | role |
//! |---|---|
//! | `skywatch-protocol` | records, session state machine, codec |
//! | `skywatch-store` | week buckets, atomic files, cache |
//! | `skywatch-session` | reconciler, flight registry, timeouts |
//! | `skywatch-notify` | change notifications |
//! | `skywatch-tick` | sweep timer |

mod controller;
mod error;
mod service;
mod sweep;

pub use controller::FlightController;
pub use error::SkywatchError;
pub use service::{HistoryService, HistoryServiceBuilder, ServiceConfig};
pub use sweep::SweepReport;

/// Everything needed to embed a service, in one import.
pub mod prelude {
    pub use crate::{
        FlightController, HistoryService, HistoryServiceBuilder, ServiceConfig, SkywatchError,
        SweepReport,
    };
    pub use skywatch_notify::{BroadcastNotifier, Notifier, NotifyError, NullNotifier};
    pub use skywatch_protocol::{
        Detection, DroneId, FlightSession, HistoryEvent, SessionState, TracePoint,
    };
    pub use skywatch_session::{SessionConfig, TrackedFlight};
    pub use skywatch_store::{WeekBucket, resolve_bucket};
}
