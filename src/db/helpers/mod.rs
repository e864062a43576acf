use std::convert::TryFrom;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

pub fn to_i64(value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

/// Timestamps are stored as REAL unix seconds.
pub fn to_unix_seconds(value: &DateTime<Utc>) -> f64 {
    value.timestamp() as f64 + f64::from(value.timestamp_subsec_nanos()) / 1_000_000_000.0
}

pub fn from_unix_seconds(value: f64, field: &str) -> Result<DateTime<Utc>> {
    if !value.is_finite() {
        return Err(anyhow!("{field} is not a finite timestamp: {value}"));
    }

    let secs = value.floor();
    let nanos = ((value - secs) * 1_000_000_000.0).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
        .ok_or_else(|| anyhow!("{field} is out of range: {value}"))
}
