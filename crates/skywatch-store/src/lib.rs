//! Week-bucketed flight history storage for Skywatch.
//!
//! Three layers, leaves first:
//!
//! 1. [`resolve_bucket`] / [`WeekBucket`]: which file a timestamp belongs to.
//! 2. [`FileStore`]: durable, atomic read/write of one bucket file.
//! 3. [`HistoryCache`]: decoded buckets kept in memory, one mutex each.
//!
//! ```text
//! Controller / Sweep (above)  ← lock a bucket, mutate in place, write back
//!     ↕
//! HistoryCache (this crate)   ← first access loads, flush writes
//!     ↕
//! FileStore (this crate)      ← temp file + rename
//! ```

mod bucket;
mod cache;
mod error;
mod file_store;

pub use bucket::{WeekBucket, resolve_bucket};
pub use cache::{HistoryCache, SharedBucket};
pub use error::StoreError;
pub use file_store::FileStore;
