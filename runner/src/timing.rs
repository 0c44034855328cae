use chrono::{Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Minutes between the start times of two consecutive array indices
pub const INTERVAL_MINUTES: i64 = 15;

/// Start time of array index 1, implicitly UTC
pub static BASE_TIME: Lazy<NaiveDateTime> = Lazy::new(|| {
    NaiveDate::from_ymd_opt(2009, 4, 6)
        .and_then(|date| date.and_hms_opt(1, 0, 0))
        .expect("base time literal is a valid calendar time")
});

/// canonical path token, e.g. `2009-04-06T01:30:00`
const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
/// used for post-processed output and archive names
const COMPACT_FORMAT: &str = "%Y%m%d_%H%M%S";
/// used in status reports
const REPORT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Array index {0} is invalid, indices start at 1")]
    InvalidIndex(i64),
    #[error("Array index {0} maps outside the representable time range")]
    OutOfRange(i64),
    #[error("'{0}' is not a start time of the form YYYY-MM-DDTHH:MM:SS")]
    Malformed(String),
}

/// Simulation start time of one array element, second precision, UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StartTime(NaiveDateTime);

impl StartTime {
    pub fn as_datetime(&self) -> &NaiveDateTime {
        &self.0
    }

    /// `YYYYMMDD_HHMMSS`
    pub fn compact(&self) -> String {
        self.0.format(COMPACT_FORMAT).to_string()
    }

    /// `YYYY-MM-DD HH:MM:SS`
    pub fn report(&self) -> String {
        self.0.format(REPORT_FORMAT).to_string()
    }
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(CANONICAL_FORMAT))
    }
}

impl FromStr for StartTime {
    type Err = IndexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NaiveDateTime::parse_from_str(value, CANONICAL_FORMAT)
            .map(StartTime)
            .map_err(|_| IndexError::Malformed(value.to_string()))
    }
}

/// Map an array index onto its start time.
///
/// Index 1 is [`BASE_TIME`], every following index adds [`INTERVAL_MINUTES`].
/// All consumers (model runs, post-processing and cleanup) have to go through
/// this function so they agree on the time window of a given index.
pub fn compute_start_time(index: i64) -> Result<StartTime, IndexError> {
    if index < 1 {
        return Err(IndexError::InvalidIndex(index));
    }

    (index - 1)
        .checked_mul(INTERVAL_MINUTES)
        .and_then(|minutes| minutes.checked_mul(60))
        .and_then(Duration::try_seconds)
        .and_then(|offset| BASE_TIME.checked_add_signed(offset))
        .map(StartTime)
        .ok_or(IndexError::OutOfRange(index))
}
