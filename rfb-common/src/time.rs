//! Capture timestamps.

use chrono::{DateTime, Utc};

/// Moment a chunk of bytes was observed on the wire.
pub type Timestamp = DateTime<Utc>;

/// Observation span of a decoded value: the timestamps of the chunks holding
/// its first and last byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    pub first: Timestamp,
    pub last: Timestamp,
}

impl TimeSpan {
    pub const fn new(first: Timestamp, last: Timestamp) -> Self {
        Self { first, last }
    }

    pub const fn at(ts: Timestamp) -> Self {
        Self {
            first: ts,
            last: ts,
        }
    }
}

/// UTC timestamp rendered for use in artifact file names.
pub fn file_stamp(ts: Timestamp) -> String {
    ts.format("%Y-%m-%dT%H-%M-%S,%3f").to_string()
}
