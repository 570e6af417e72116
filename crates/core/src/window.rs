//! The rolling time window every poll reads.
//!
//! The ER board shows the night shift that started at 21:00 on the previous day together with
//! everything recorded today. The window is half-open: `[yesterday 21:00, tomorrow 00:00)`.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};

use crate::constants::WINDOW_START_HOUR;

/// Half-open range of status-update timestamps, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimeWindow {
    /// The window for the given local date.
    pub fn for_day(today: NaiveDate) -> Self {
        let start_time = NaiveTime::from_hms_opt(WINDOW_START_HOUR, 0, 0).unwrap_or_default();
        let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);

        Self {
            start: yesterday.and_time(start_time),
            end: tomorrow.and_time(NaiveTime::default()),
        }
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Whether `ts` falls in the window. Rows without a timestamp never do.
    pub fn contains(&self, ts: Option<NaiveDateTime>) -> bool {
        match ts {
            Some(ts) => ts >= self.start && ts < self.end,
            None => false,
        }
    }
}
