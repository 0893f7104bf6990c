//! Week-bucket resolution.
//!
//! History is partitioned into one file per calendar week, Sunday
//! through Saturday, always computed in UTC so the answer never depends
//! on the host's timezone.

use std::fmt;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};

use crate::StoreError;

const FILE_PREFIX: &str = "flights_";
const FILE_SUFFIX: &str = ".json";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// One calendar week of history and the file that holds it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WeekBucket {
    /// The Sunday that opens the week.
    pub start: NaiveDate,
    /// The Saturday that closes it (inclusive).
    pub end: NaiveDate,
    /// `flights_<start>_<end>.json`.
    pub filename: String,
}

impl WeekBucket {
    /// Builds the bucket for the week starting on `start`.
    ///
    /// `start` is expected to be a Sunday; [`resolve_bucket`] and
    /// [`WeekBucket::from_filename`] guarantee that.
    fn starting(start: NaiveDate) -> Self {
        let end = start.checked_add_days(Days::new(6)).unwrap_or(NaiveDate::MAX);
        let filename = format!(
            "{FILE_PREFIX}{}_{}{FILE_SUFFIX}",
            start.format(DATE_FORMAT),
            end.format(DATE_FORMAT)
        );
        Self {
            start,
            end,
            filename,
        }
    }

    /// Parses a canonical bucket filename back into its week.
    ///
    /// # Errors
    /// [`StoreError::InvalidFilename`] when the name doesn't follow the
    /// scheme or the dates don't describe a Sunday–Saturday week.
    pub fn from_filename(name: &str) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidFilename(name.to_string());

        let dates = name
            .strip_prefix(FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
            .ok_or_else(invalid)?;
        let (start, end) = dates.split_once('_').ok_or_else(invalid)?;
        let start = NaiveDate::parse_from_str(start, DATE_FORMAT).map_err(|_| invalid())?;
        let end = NaiveDate::parse_from_str(end, DATE_FORMAT).map_err(|_| invalid())?;

        let bucket = Self::starting(start);
        if start.weekday().num_days_from_sunday() != 0 || bucket.end != end {
            return Err(invalid());
        }
        Ok(bucket)
    }

    /// `true` if `date` falls inside `[start, end]`.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for WeekBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename)
    }
}

/// Maps a timestamp to the week bucket it belongs to.
///
/// Pure and total: no I/O, no clock, UTC only.
pub fn resolve_bucket(timestamp: DateTime<Utc>) -> WeekBucket {
    let date = timestamp.date_naive();
    let back = u64::from(date.weekday().num_days_from_sunday());
    let start = date.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN);
    WeekBucket::starting(start)
}
