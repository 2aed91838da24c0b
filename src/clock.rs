use serde::{Deserialize, Serialize};
use time::Date;

use crate::engine::EngineError;

/// Unix milliseconds — the instant type for timestamps (creation, payment).
pub type Ms = i64;

pub const MS_PER_HOUR: Ms = 3_600_000;

pub const MINUTES_PER_DAY: u16 = 1440;

/// Trailing gaps run up to 23:59, not midnight.
pub const END_OF_DAY_MIN: u16 = 1439;

/// Minimum idle time between two bookings on the same venue, unless the
/// venue overrides it.
pub const DEFAULT_BUFFER_MIN: u16 = 30;

/// Half-open time-of-day window `[start_min, end_min)`, minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_min: u16,
    pub end_min: u16,
}

impl TimeRange {
    pub fn new(start_min: u16, end_min: u16) -> Self {
        debug_assert!(start_min < end_min, "TimeRange start must be before end");
        Self { start_min, end_min }
    }

    pub fn duration_min(&self) -> u16 {
        self.end_min - self.start_min
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start_min < other.end_min && other.start_min < self.end_min
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            format_minutes(self.start_min),
            format_minutes(self.end_min)
        )
    }
}

/// Parse a 24-hour `HH:mm` string into minutes since midnight.
/// `"24:00"` is accepted as 1440 so it can terminate a range.
pub fn minutes_of_day(s: &str) -> Result<u16, EngineError> {
    let bad = || EngineError::InvalidTimeFormat(s.to_string());
    let (hh, mm) = s.split_once(':').ok_or_else(bad)?;
    let hh: u16 = hh.parse().map_err(|_| bad())?;
    let mm: u16 = mm.parse().map_err(|_| bad())?;
    if hh == 24 && mm == 0 {
        return Ok(MINUTES_PER_DAY);
    }
    if hh > 23 || mm > 59 {
        return Err(bad());
    }
    Ok(hh * 60 + mm)
}

/// Render minutes since midnight back to `HH:mm`.
pub fn format_minutes(min: u16) -> String {
    format!("{:02}:{:02}", min / 60, min % 60)
}

/// Parse an ISO calendar date (`YYYY-MM-DD`).
pub fn parse_date(s: &str) -> Result<Date, EngineError> {
    let fmt = time::macros::format_description!("[year]-[month]-[day]");
    Date::parse(s, fmt).map_err(|_| EngineError::InvalidTimeFormat(s.to_string()))
}

/// True iff window B starts too soon after window A ends:
/// `0 <= b_start - a_end < buffer_min`.
pub fn within_buffer(a_end: u16, b_start: u16, buffer_min: u16) -> bool {
    let gap = i32::from(b_start) - i32::from(a_end);
    gap >= 0 && gap < i32::from(buffer_min)
}

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as Ms
}
