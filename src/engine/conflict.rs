use time::Date;
use ulid::Ulid;

use crate::clock::{within_buffer, TimeRange, MINUTES_PER_DAY};
use crate::directory::EventStatus;
use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

/// Stand-in window when a daily booking (no time fields) collides: the
/// conflict covers the whole day.
fn whole_day() -> TimeRange {
    TimeRange::new(0, MINUTES_PER_DAY)
}

/// Structural validation of a booking's date entries. Runs before any
/// conflict check or mutation.
pub(super) fn validate_dates(dates: &[BookingDate]) -> Result<(), EngineError> {
    if dates.is_empty() {
        return Err(EngineError::InvalidDateRange("booking has no dates"));
    }
    if dates.len() > MAX_DATES_PER_BOOKING {
        return Err(EngineError::LimitExceeded("too many dates on booking"));
    }
    for pair in dates.windows(2) {
        if pair[0].date >= pair[1].date {
            return Err(EngineError::InvalidDateRange("dates must be strictly increasing"));
        }
    }
    for entry in dates {
        let Some(hours) = entry.hours.as_deref() else { continue };
        if hours.is_empty() {
            return Err(EngineError::InvalidDateRange("empty hour list on date entry"));
        }
        if hours.len() > MAX_WINDOWS_PER_DATE {
            return Err(EngineError::LimitExceeded("too many windows on date entry"));
        }
        for w in hours {
            if w.start_min >= w.end_min {
                return Err(EngineError::InvalidDateRange("window start must be before end"));
            }
            if w.end_min > MINUTES_PER_DAY {
                return Err(EngineError::InvalidDateRange("window runs past midnight"));
            }
        }
        for pair in hours.windows(2) {
            if pair[1].start_min < pair[0].end_min {
                return Err(EngineError::InvalidDateRange("windows on a date entry overlap"));
            }
        }
    }
    Ok(())
}

/// The conflict detector (booking-level). Checks run in order and
/// short-circuit, so the caller sees exactly one reason:
/// 1. exact duplicate, 2. approved overlap, 3. buffer violation.
pub(super) fn check_booking_conflict(
    vs: &VenueState,
    draft: &BookingDraft,
) -> Result<(), EngineError> {
    // 1. Exact duplicate: same event, same date, same overall window. Two
    //    event-less requests are independent competitors, not duplicates —
    //    approval-time sibling cancellation resolves them.
    if let Some(event_id) = draft.event_id {
        for b in vs.bookings.iter().filter(|b| b.is_live() && b.id != draft.id) {
            if b.event_id != Some(event_id) {
                continue;
            }
            for entry in &draft.dates {
                let existing = b.dates.iter().find(|d| d.date == entry.date);
                if let Some(existing) = existing
                    && existing.window() == entry.window() {
                        return Err(EngineError::DuplicateBooking(b.id));
                    }
            }
        }
    }

    // 2. Overlap with an approved booking on a shared date. Date ranges and
    //    time ranges are compared independently: when either side carries no
    //    windows (daily granularity), the shared date alone conflicts.
    for b in vs.bookings.iter().filter(|b| b.is_approved() && b.id != draft.id) {
        for entry in &draft.dates {
            if !b.covers_date(entry.date) {
                continue;
            }
            match (entry.hours.as_deref(), b.windows_on(entry.date)) {
                (Some(cand), Some(booked)) => {
                    for bw in booked {
                        if cand.iter().any(|cw| cw.overlaps(bw)) {
                            return Err(EngineError::TimeConflict {
                                booking_id: b.id,
                                date: entry.date,
                                window: *bw,
                            });
                        }
                    }
                }
                _ => {
                    return Err(EngineError::TimeConflict {
                        booking_id: b.id,
                        date: entry.date,
                        window: b
                            .windows_on(entry.date)
                            .and_then(|ws| ws.first().copied())
                            .unwrap_or_else(whole_day),
                    });
                }
            }
        }
    }

    // 3. Buffer: the candidate may not start within the idle window after an
    //    approved booking ends, nor end within it before one starts.
    let buffer = vs.effective_buffer_min();
    for b in vs.bookings.iter().filter(|b| b.is_approved() && b.id != draft.id) {
        for entry in &draft.dates {
            let (Some(cand), Some(booked)) = (entry.hours.as_deref(), b.windows_on(entry.date))
            else {
                continue;
            };
            for bw in booked {
                for cw in cand {
                    if within_buffer(bw.end_min, cw.start_min, buffer)
                        || within_buffer(cw.end_min, bw.start_min, buffer)
                    {
                        return Err(EngineError::BufferViolation {
                            booking_id: b.id,
                            date: entry.date,
                        });
                    }
                }
            }
        }
    }

    Ok(())
}

impl Engine {
    /// Read-only feasibility check consumed before booking creation. The
    /// answer may go stale before a subsequent create — an accepted race;
    /// `create_booking` re-checks under the write lock.
    pub async fn check_conflict(&self, draft: &BookingDraft) -> Result<(), EngineError> {
        validate_dates(&draft.dates)?;
        let vs = self
            .get_venue(&draft.venue_id)
            .ok_or(EngineError::VenueNotFound(draft.venue_id))?;
        let guard = vs.read().await;
        check_booking_conflict(&guard, draft).inspect_err(|_| {
            metrics::counter!(crate::observability::CONFLICTS_REJECTED_TOTAL).increment(1);
        })
    }

    /// Event-level check, consumed at event creation/approval time: a venue
    /// is unavailable if any approved booking linked to an approved event
    /// intersects `[start, end]`.
    pub async fn check_event_conflict(
        &self,
        venue_ids: &[Ulid],
        start: Date,
        end: Date,
    ) -> Result<(), EngineError> {
        if venue_ids.len() > MAX_EVENT_VENUES {
            return Err(EngineError::LimitExceeded("too many venues on event"));
        }
        if start > end {
            return Err(EngineError::InvalidDateRange("start date after end date"));
        }
        for venue_id in venue_ids {
            let vs = self
                .get_venue(venue_id)
                .ok_or(EngineError::VenueNotFound(*venue_id))?;
            let guard = vs.read().await;
            for b in guard.bookings.iter().filter(|b| b.is_approved()) {
                if !b.intersects_range(start, end) {
                    continue;
                }
                let Some(event_id) = b.event_id else { continue };
                if self.directory.status(event_id).await == Some(EventStatus::Approved) {
                    metrics::counter!(crate::observability::CONFLICTS_REJECTED_TOTAL)
                        .increment(1);
                    return Err(EngineError::VenueAlreadyBooked(*venue_id));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn w(start: u16, end: u16) -> TimeRange {
        TimeRange::new(start, end)
    }

    fn entry(date: Date, hours: Option<Vec<TimeRange>>) -> BookingDate {
        BookingDate { date, hours }
    }

    fn venue_with(bookings: Vec<Booking>) -> VenueState {
        let mut vs = VenueState::new(Ulid::new(), None, VenueMode::Hourly, 50, 100, None);
        vs.bookings = bookings;
        vs
    }

    fn booking(status: BookingStatus, dates: Vec<BookingDate>) -> Booking {
        Booking {
            id: Ulid::new(),
            venue_id: Ulid::new(),
            requester: Ulid::new(),
            event_id: None,
            dates,
            status,
            amount_to_be_paid: 0,
            is_paid: false,
            venue_status: VenueHold::Reserved,
            cancellation_reason: None,
            created_at: 0,
        }
    }

    fn draft(venue_id: Ulid, dates: Vec<BookingDate>) -> BookingDraft {
        BookingDraft {
            id: Ulid::new(),
            venue_id,
            requester: Ulid::new(),
            event_id: None,
            dates,
        }
    }

    #[test]
    fn validate_rejects_bad_shapes() {
        assert!(matches!(
            validate_dates(&[]),
            Err(EngineError::InvalidDateRange(_))
        ));
        // unordered dates
        let unordered = vec![
            entry(date!(2026 - 06 - 02), None),
            entry(date!(2026 - 06 - 01), None),
        ];
        assert!(matches!(
            validate_dates(&unordered),
            Err(EngineError::InvalidDateRange(_))
        ));
        // same-day start >= end
        let zero_width = TimeRange { start_min: 600, end_min: 600 };
        let inverted = vec![entry(date!(2026 - 06 - 01), Some(vec![zero_width]))];
        assert!(matches!(
            validate_dates(&inverted),
            Err(EngineError::InvalidDateRange(_))
        ));
        // overlapping windows within one entry
        let overlapping = vec![entry(
            date!(2026 - 06 - 01),
            Some(vec![w(540, 660), w(600, 720)]),
        )];
        assert!(matches!(
            validate_dates(&overlapping),
            Err(EngineError::InvalidDateRange(_))
        ));
    }

    #[test]
    fn validate_accepts_well_formed() {
        let ok = vec![
            entry(date!(2026 - 06 - 01), Some(vec![w(540, 660), w(780, 900)])),
            entry(date!(2026 - 06 - 02), None),
        ];
        assert!(validate_dates(&ok).is_ok());
    }

    #[test]
    fn pending_sibling_does_not_conflict() {
        let d = date!(2026 - 06 - 01);
        let other = booking(
            BookingStatus::Pending,
            vec![entry(d, Some(vec![w(540, 720)]))],
        );
        let vs = venue_with(vec![other]);
        let cand = draft(vs.id, vec![entry(d, Some(vec![w(600, 660)]))]);
        assert!(check_booking_conflict(&vs, &cand).is_ok());
    }

    #[test]
    fn approved_overlap_rejected() {
        let d = date!(2026 - 06 - 01);
        let other = booking(
            BookingStatus::ApprovedNotPaid,
            vec![entry(d, Some(vec![w(540, 720)]))],
        );
        let other_id = other.id;
        let vs = venue_with(vec![other]);
        let cand = draft(vs.id, vec![entry(d, Some(vec![w(700, 800)]))]);
        match check_booking_conflict(&vs, &cand) {
            Err(EngineError::TimeConflict { booking_id, date, window }) => {
                assert_eq!(booking_id, other_id);
                assert_eq!(date, d);
                assert_eq!(window, w(540, 720));
            }
            other => panic!("expected TimeConflict, got {other:?}"),
        }
    }

    #[test]
    fn daily_shared_date_conflicts_without_windows() {
        let d = date!(2026 - 06 - 01);
        let other = booking(BookingStatus::ApprovedPaid, vec![entry(d, None)]);
        let vs = venue_with(vec![other]);
        let cand = draft(vs.id, vec![entry(d, Some(vec![w(540, 600)]))]);
        assert!(matches!(
            check_booking_conflict(&vs, &cand),
            Err(EngineError::TimeConflict { .. })
        ));
    }

    #[test]
    fn duplicate_beats_time_conflict() {
        // Same event + identical entry must surface DuplicateBooking even
        // though it would also overlap — checks short-circuit in order.
        let d = date!(2026 - 06 - 01);
        let eid = Ulid::new();
        let mut other = booking(
            BookingStatus::ApprovedNotPaid,
            vec![entry(d, Some(vec![w(540, 720)]))],
        );
        other.event_id = Some(eid);
        let other_id = other.id;
        let vs = venue_with(vec![other]);
        let mut cand = draft(vs.id, vec![entry(d, Some(vec![w(540, 720)]))]);
        cand.event_id = Some(eid);
        assert_eq!(
            check_booking_conflict(&vs, &cand),
            Err(EngineError::DuplicateBooking(other_id))
        );
    }

    #[test]
    fn eventless_identical_request_is_not_duplicate() {
        // Two independent requests for the same window compete; approval
        // picks the winner and cancels the rest.
        let d = date!(2026 - 06 - 01);
        let other = booking(
            BookingStatus::Pending,
            vec![entry(d, Some(vec![w(540, 720)]))],
        );
        let vs = venue_with(vec![other]);
        let cand = draft(vs.id, vec![entry(d, Some(vec![w(540, 720)]))]);
        assert!(check_booking_conflict(&vs, &cand).is_ok());
    }

    #[test]
    fn buffer_violation_after_existing() {
        let d = date!(2026 - 06 - 01);
        let other = booking(
            BookingStatus::ApprovedNotPaid,
            vec![entry(d, Some(vec![w(540, 720)]))], // ends 12:00
        );
        let vs = venue_with(vec![other]);
        // Starts 12:15 — inside the default 30-minute buffer.
        let cand = draft(vs.id, vec![entry(d, Some(vec![w(735, 800)]))]);
        assert!(matches!(
            check_booking_conflict(&vs, &cand),
            Err(EngineError::BufferViolation { .. })
        ));
        // Starts 12:30 — exactly at the buffer edge, allowed.
        let cand = draft(vs.id, vec![entry(d, Some(vec![w(750, 800)]))]);
        assert!(check_booking_conflict(&vs, &cand).is_ok());
    }

    #[test]
    fn buffer_violation_before_existing() {
        let d = date!(2026 - 06 - 01);
        let other = booking(
            BookingStatus::ApprovedNotPaid,
            vec![entry(d, Some(vec![w(600, 720)]))], // starts 10:00
        );
        let vs = venue_with(vec![other]);
        // Ends 09:45 — existing starts 15 minutes later, inside the buffer.
        let cand = draft(vs.id, vec![entry(d, Some(vec![w(480, 585)]))]);
        assert!(matches!(
            check_booking_conflict(&vs, &cand),
            Err(EngineError::BufferViolation { .. })
        ));
    }

    #[test]
    fn different_dates_no_conflict() {
        let other = booking(
            BookingStatus::ApprovedPaid,
            vec![entry(date!(2026 - 06 - 01), Some(vec![w(540, 720)]))],
        );
        let vs = venue_with(vec![other]);
        let cand = draft(
            vs.id,
            vec![entry(date!(2026 - 06 - 02), Some(vec![w(540, 720)]))],
        );
        assert!(check_booking_conflict(&vs, &cand).is_ok());
    }

    #[test]
    fn cancelled_booking_never_conflicts() {
        let d = date!(2026 - 06 - 01);
        let other = booking(
            BookingStatus::Cancelled,
            vec![entry(d, Some(vec![w(540, 720)]))],
        );
        let vs = venue_with(vec![other]);
        let cand = draft(vs.id, vec![entry(d, Some(vec![w(540, 720)]))]);
        assert!(check_booking_conflict(&vs, &cand).is_ok());
    }
}
