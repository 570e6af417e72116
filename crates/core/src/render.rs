//! Text rendering of time fields for the external API.

use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone};

use crate::constants::DEFAULT_TIME_OF_DAY;
use crate::{ErError, ErResult};

/// Render a time of day as `HH:MM:SS`; `None` renders as `00:00:00`.
pub fn format_time_of_day(time: Option<NaiveTime>) -> String {
    match time {
        Some(t) => t.format("%H:%M:%S").to_string(),
        None => DEFAULT_TIME_OF_DAY.to_string(),
    }
}

/// Render a site-local timestamp as RFC 3339 qualified with the site's offset.
///
/// A missing timestamp renders the current site time, matching what the ER board displays for
/// rows that never had a status change recorded.
pub fn format_timestamp(ts: Option<NaiveDateTime>, offset: FixedOffset) -> String {
    let naive = ts.unwrap_or_else(|| chrono::Utc::now().with_timezone(&offset).naive_local());
    to_site_time(naive, offset).to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Parse a timestamp produced by [`format_timestamp`] back into site-local wall-clock time.
pub fn parse_timestamp(text: &str, offset: FixedOffset) -> ErResult<NaiveDateTime> {
    let parsed = DateTime::parse_from_rfc3339(text)
        .map_err(|e| ErError::InvalidTimestamp(format!("'{text}': {e}")))?;
    Ok(parsed.with_timezone(&offset).naive_local())
}

fn to_site_time(naive: NaiveDateTime, offset: FixedOffset) -> DateTime<FixedOffset> {
    // A fixed offset has exactly one mapping for every local time.
    offset
        .from_local_datetime(&naive)
        .single()
        .unwrap_or_else(|| offset.from_utc_datetime(&naive))
}
