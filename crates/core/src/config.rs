//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into the feed. The poll loop, the aggregator streams and the renderers all read the
//! same `WatchConfig`, so the site's clock and the tick interval cannot drift between them.

use std::time::Duration;

use chrono::{FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, Utc};

use crate::constants::{DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SUBSCRIBER_CAPACITY};
use crate::{ErError, ErResult};

/// Feed configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    poll_interval: Duration,
    subscriber_capacity: usize,
    utc_offset: FixedOffset,
}

impl WatchConfig {
    /// Create a new `WatchConfig`.
    ///
    /// # Errors
    ///
    /// Returns `ErError::InvalidInput` if the interval or the subscriber capacity is zero.
    pub fn new(
        poll_interval: Duration,
        subscriber_capacity: usize,
        utc_offset: FixedOffset,
    ) -> ErResult<Self> {
        if poll_interval.is_zero() {
            return Err(ErError::InvalidInput(
                "poll interval must be greater than zero".into(),
            ));
        }
        if subscriber_capacity == 0 {
            return Err(ErError::InvalidInput(
                "subscriber capacity must be greater than zero".into(),
            ));
        }

        Ok(Self {
            poll_interval,
            subscriber_capacity,
            utc_offset,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn subscriber_capacity(&self) -> usize {
        self.subscriber_capacity
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    /// The site's current wall-clock time.
    pub fn now_local(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.utc_offset).naive_local()
    }

    /// The site's current date, which anchors the snapshot window.
    pub fn today(&self) -> NaiveDate {
        self.now_local().date()
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            utc_offset: Local::now().offset().fix(),
        }
    }
}

/// Parse the poll interval (whole seconds) from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default interval.
pub fn poll_interval_from_env_value(value: Option<String>) -> ErResult<Duration> {
    let secs = parse_positive(value, "ER_POLL_INTERVAL_SECS")?;
    Ok(Duration::from_secs(
        secs.map_or(DEFAULT_POLL_INTERVAL_SECS, |s| s as u64),
    ))
}

/// Parse the per-subscriber queue length from an optional string value.
pub fn subscriber_capacity_from_env_value(value: Option<String>) -> ErResult<usize> {
    let capacity = parse_positive(value, "ER_SUBSCRIBER_CAPACITY")?;
    Ok(capacity.unwrap_or(DEFAULT_SUBSCRIBER_CAPACITY))
}

/// Parse the site's UTC offset (`Z`, `+07:00`, `-0330`) from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the host's current local offset.
pub fn utc_offset_from_env_value(value: Option<String>) -> ErResult<FixedOffset> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        None => Ok(Local::now().offset().fix()),
        Some(v) => parse_utc_offset(&v),
    }
}

fn parse_positive(value: Option<String>, name: &str) -> ErResult<Option<usize>> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let Some(v) = value else {
        return Ok(None);
    };

    match v.parse::<usize>() {
        Ok(0) => Err(ErError::InvalidInput(format!("{name} must be greater than zero"))),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(ErError::InvalidInput(format!(
            "{name} must be a positive integer, got '{v}'"
        ))),
    }
}

fn parse_utc_offset(value: &str) -> ErResult<FixedOffset> {
    if value.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0)
            .ok_or_else(|| ErError::InvalidInput("invalid UTC offset".into()));
    }

    let invalid = || ErError::InvalidInput(format!("invalid UTC offset '{value}'"));

    let (sign, rest) = if let Some(rest) = value.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = value.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(invalid());
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours: i32 = digits[0..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..4].parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
