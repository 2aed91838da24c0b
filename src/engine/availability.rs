use time::Date;
use ulid::Ulid;

use crate::clock::{TimeRange, END_OF_DAY_MIN};
use crate::limits::MAX_QUERY_DAYS;
use crate::model::{DayAvailability, DayFreedom};

use super::{Engine, EngineError};

/// Free windows on one day given the occupied windows, which must be sorted
/// by start. A forward sweep: the cursor only moves right, so overlapping or
/// nested occupied windows collapse naturally. The trailing gap ends at
/// 23:59.
pub fn day_gaps(occupied: &[TimeRange]) -> Vec<TimeRange> {
    let mut gaps = Vec::new();
    let mut cursor: u16 = 0;
    for w in occupied {
        if w.start_min > cursor {
            gaps.push(TimeRange::new(cursor, w.start_min));
        }
        cursor = cursor.max(w.end_min);
    }
    if cursor < END_OF_DAY_MIN {
        gaps.push(TimeRange::new(cursor, END_OF_DAY_MIN));
    }
    gaps
}

impl Engine {
    /// Per-day availability over `[start, end]` inclusive. A day with no
    /// live booking is reported whole; otherwise the gaps between that
    /// day's occupied windows. Live daily bookings (no time fields) occupy
    /// nothing here — the conflict detector, not this report, guards them.
    pub async fn available_slots(
        &self,
        venue_id: Ulid,
        start: Date,
        end: Date,
    ) -> Result<Vec<DayAvailability>, EngineError> {
        if start > end {
            return Err(EngineError::InvalidDateRange("start date after end date"));
        }
        let span = (end - start).whole_days() + 1;
        if span > MAX_QUERY_DAYS {
            return Err(EngineError::LimitExceeded("availability query spans too many days"));
        }
        let vs = self
            .get_venue(&venue_id)
            .ok_or(EngineError::VenueNotFound(venue_id))?;
        let guard = vs.read().await;

        let mut days = Vec::with_capacity(span as usize);
        let mut day = start;
        loop {
            let mut occupied: Vec<TimeRange> = Vec::new();
            let mut any_booking = false;
            for b in guard.bookings.iter().filter(|b| b.is_live()) {
                if !b.covers_date(day) {
                    continue;
                }
                any_booking = true;
                if let Some(ws) = b.windows_on(day) {
                    occupied.extend_from_slice(ws);
                }
            }
            let free = if !any_booking {
                DayFreedom::Whole
            } else {
                occupied.sort_by_key(|w| w.start_min);
                DayFreedom::Gaps(day_gaps(&occupied))
            };
            days.push(DayAvailability { date: day, free });
            if day == end {
                break;
            }
            day = day.next_day().ok_or(EngineError::InvalidDateRange("date out of range"))?;
        }
        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(start: u16, end: u16) -> TimeRange {
        TimeRange::new(start, end)
    }

    #[test]
    fn empty_day_is_one_gap() {
        assert_eq!(day_gaps(&[]), vec![w(0, END_OF_DAY_MIN)]);
    }

    #[test]
    fn gaps_around_middle_booking() {
        assert_eq!(
            day_gaps(&[w(540, 720)]),
            vec![w(0, 540), w(720, END_OF_DAY_MIN)]
        );
    }

    #[test]
    fn adjacent_windows_leave_no_gap_between() {
        assert_eq!(
            day_gaps(&[w(540, 600), w(600, 720)]),
            vec![w(0, 540), w(720, END_OF_DAY_MIN)]
        );
    }

    #[test]
    fn nested_window_does_not_reopen_gap() {
        assert_eq!(
            day_gaps(&[w(480, 720), w(540, 600)]),
            vec![w(0, 480), w(720, END_OF_DAY_MIN)]
        );
    }

    #[test]
    fn window_starting_at_midnight() {
        assert_eq!(day_gaps(&[w(0, 120)]), vec![w(120, END_OF_DAY_MIN)]);
    }

    #[test]
    fn window_reaching_end_of_day() {
        assert_eq!(day_gaps(&[w(1200, 1439)]), vec![w(0, 1200)]);
    }

    #[test]
    fn union_of_gaps_and_occupied_covers_the_day() {
        let occupied = vec![w(60, 180), w(300, 420), w(900, 1000)];
        let gaps = day_gaps(&occupied);
        let mut all: Vec<TimeRange> = occupied.clone();
        all.extend(&gaps);
        all.sort_by_key(|r| r.start_min);
        let mut cursor = 0u16;
        for r in &all {
            assert!(r.start_min <= cursor, "hole before {r}");
            cursor = cursor.max(r.end_min);
        }
        assert_eq!(cursor, END_OF_DAY_MIN);
    }
}
