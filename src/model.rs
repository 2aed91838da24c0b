use serde::{Deserialize, Serialize};
use time::Date;
use ulid::Ulid;

use crate::clock::{Ms, TimeRange};
use crate::directory::Payer;

/// Money in minor units (cents). Signed so balances can be diffed.
pub type Money = i64;

/// Booking granularity of a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VenueMode {
    /// Whole-day bookings; date entries carry no time windows.
    Daily,
    /// Hour-granular bookings; date entries carry time windows.
    Hourly,
}

/// Lifecycle of a booking. `Cancelled` is reachable from every live state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    ApprovedNotPaid,
    ApprovedPaid,
    Cancelled,
}

/// Whether the venue is still held for a booking. Released on cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VenueHold {
    Reserved,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    Booked,
}

/// Per-venue deposit and buffer policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingCondition {
    /// Percentage of the total amount required as deposit (0–100).
    pub deposit_percent: u8,
    /// Hours after booking creation within which the deposit must complete.
    pub deposit_hours: i64,
    /// Days before the event by which the balance is due.
    pub complement_days: u16,
    /// Trailing buffer day-slots appended after a daily booking's last date.
    pub transition_days: u16,
}

/// One calendar day of a booking, with time windows for hourly venues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDate {
    pub date: Date,
    pub hours: Option<Vec<TimeRange>>,
}

impl BookingDate {
    /// Overall window covered by this entry (min start to max end), if any.
    pub fn window(&self) -> Option<TimeRange> {
        let hours = self.hours.as_deref()?;
        let start = hours.iter().map(|w| w.start_min).min()?;
        let end = hours.iter().map(|w| w.end_min).max()?;
        Some(TimeRange { start_min: start, end_min: end })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub requester: Ulid,
    pub event_id: Option<Ulid>,
    /// Sorted by date, never empty.
    pub dates: Vec<BookingDate>,
    pub status: BookingStatus,
    /// Derived from venue pricing; recomputed whenever dates change.
    pub amount_to_be_paid: Money,
    pub is_paid: bool,
    pub venue_status: VenueHold,
    pub cancellation_reason: Option<String>,
    pub created_at: Ms,
}

impl Booking {
    pub fn first_date(&self) -> Date {
        self.dates[0].date
    }

    pub fn last_date(&self) -> Date {
        self.dates[self.dates.len() - 1].date
    }

    pub fn is_approved(&self) -> bool {
        matches!(
            self.status,
            BookingStatus::ApprovedNotPaid | BookingStatus::ApprovedPaid
        )
    }

    pub fn is_live(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }

    /// Time windows this booking occupies on `date`, if it covers that date.
    pub fn windows_on(&self, date: Date) -> Option<&[TimeRange]> {
        self.dates
            .iter()
            .find(|d| d.date == date)
            .and_then(|d| d.hours.as_deref())
    }

    pub fn covers_date(&self, date: Date) -> bool {
        self.dates.iter().any(|d| d.date == date)
    }

    /// True iff the booking's date span intersects `[start, end]` (inclusive).
    pub fn intersects_range(&self, start: Date, end: Date) -> bool {
        self.first_date() <= end && self.last_date() >= start
    }
}

/// Venue occupancy record, materialized only at approval time. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub booking_id: Ulid,
    pub event_id: Option<Ulid>,
    pub date: Date,
    /// Present for hourly venues only.
    pub window: Option<TimeRange>,
    pub status: SlotStatus,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub payer: Payer,
    pub amount: Money,
    pub paid_at: Ms,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub venue_id: Ulid,
    pub event_id: Option<Ulid>,
    pub payer: Payer,
    pub issued_at: Ms,
    /// `issued_at` plus the condition's deposit window, when one is set.
    pub due_at: Option<Ms>,
    pub total: Money,
    pub status: InvoiceStatus,
}

/// The per-venue aggregate. One `RwLock` guards everything a booking
/// mutation touches, so a commit is serialized per venue.
#[derive(Debug, Clone)]
pub struct VenueState {
    pub id: Ulid,
    pub name: Option<String>,
    pub mode: VenueMode,
    /// Attendee capacity — metadata, not a concurrency bound.
    pub capacity: u32,
    /// Price per day (daily mode) or per hour (hourly mode).
    pub base_amount: Money,
    /// Idle minutes required after each booking; `None` means the default 30.
    pub buffer_min: Option<u16>,
    pub condition: Option<BookingCondition>,
    pub bookings: Vec<Booking>,
    pub slots: Vec<AvailabilitySlot>,
    pub payments: Vec<Payment>,
    pub invoices: Vec<Invoice>,
}

impl VenueState {
    pub fn new(
        id: Ulid,
        name: Option<String>,
        mode: VenueMode,
        capacity: u32,
        base_amount: Money,
        buffer_min: Option<u16>,
    ) -> Self {
        Self {
            id,
            name,
            mode,
            capacity,
            base_amount,
            buffer_min,
            condition: None,
            bookings: Vec::new(),
            slots: Vec::new(),
            payments: Vec::new(),
            invoices: Vec::new(),
        }
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    pub fn payments_for(&self, booking_id: Ulid) -> Vec<Payment> {
        self.payments
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect()
    }

    pub fn effective_buffer_min(&self) -> u16 {
        self.buffer_min.unwrap_or(crate::clock::DEFAULT_BUFFER_MIN)
    }
}

/// Candidate booking fed to the conflict detector and `create_booking`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDraft {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub requester: Ulid,
    pub event_id: Option<Ulid>,
    pub dates: Vec<BookingDate>,
}

/// The journal record format — flat, no nesting. A journal frame carries a
/// whole commit (`Vec<Event>`), so multi-step mutations replay all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    VenueCreated {
        id: Ulid,
        name: Option<String>,
        mode: VenueMode,
        capacity: u32,
        base_amount: Money,
        buffer_min: Option<u16>,
    },
    ConditionSet {
        venue_id: Ulid,
        condition: BookingCondition,
    },
    BookingRequested {
        id: Ulid,
        venue_id: Ulid,
        requester: Ulid,
        event_id: Option<Ulid>,
        dates: Vec<BookingDate>,
        amount: Money,
        created_at: Ms,
    },
    BookingDatesChanged {
        id: Ulid,
        venue_id: Ulid,
        dates: Vec<BookingDate>,
        amount: Money,
    },
    BookingApproved {
        id: Ulid,
        venue_id: Ulid,
    },
    BookingMarkedPaid {
        id: Ulid,
        venue_id: Ulid,
    },
    BookingCancelled {
        id: Ulid,
        venue_id: Ulid,
        reason: String,
    },
    SlotAllocated {
        id: Ulid,
        venue_id: Ulid,
        booking_id: Ulid,
        event_id: Option<Ulid>,
        date: Date,
        window: Option<TimeRange>,
        note: String,
    },
    PaymentRecorded {
        id: Ulid,
        venue_id: Ulid,
        booking_id: Ulid,
        payer: Payer,
        amount: Money,
        paid_at: Ms,
        status: PaymentStatus,
        method: PaymentMethod,
        reference: Option<String>,
        note: Option<String>,
    },
    PaymentsSettled {
        booking_id: Ulid,
        venue_id: Ulid,
    },
    InvoiceIssued {
        id: Ulid,
        venue_id: Ulid,
        booking_id: Ulid,
        event_id: Option<Ulid>,
        payer: Payer,
        issued_at: Ms,
        due_at: Option<Ms>,
        total: Money,
    },
}

// ── Query / outcome result types ─────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VenueInfo {
    pub id: Ulid,
    pub name: Option<String>,
    pub mode: VenueMode,
    pub capacity: u32,
    pub base_amount: Money,
    pub buffer_min: Option<u16>,
    pub condition: Option<BookingCondition>,
}

/// One calendar day of an availability answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAvailability {
    pub date: Date,
    pub free: DayFreedom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DayFreedom {
    /// No bookings touch this day at all.
    Whole,
    /// Ordered free gaps between booked windows.
    Gaps(Vec<TimeRange>),
}

/// What the approval orchestrator committed, for the caller to shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub booking: Booking,
    pub payer: Payer,
    pub slots: Vec<Ulid>,
    pub cancelled: Vec<Ulid>,
    pub invoice: Invoice,
}

/// Enriched result of a payment submission (deposit evaluation included).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub booking: Booking,
    pub payer: Payer,
    pub total_paid: Money,
    pub required_deposit: Money,
    pub deposit_fulfilled: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::PayerKind;
    use time::macros::date;

    fn w(start: u16, end: u16) -> TimeRange {
        TimeRange::new(start, end)
    }

    fn booking_with_dates(dates: Vec<BookingDate>) -> Booking {
        Booking {
            id: Ulid::new(),
            venue_id: Ulid::new(),
            requester: Ulid::new(),
            event_id: None,
            dates,
            status: BookingStatus::Pending,
            amount_to_be_paid: 0,
            is_paid: false,
            venue_status: VenueHold::Reserved,
            cancellation_reason: None,
            created_at: 0,
        }
    }

    #[test]
    fn entry_window_spans_ranges() {
        let entry = BookingDate {
            date: date!(2026 - 05 - 01),
            hours: Some(vec![w(540, 600), w(780, 840)]),
        };
        assert_eq!(entry.window(), Some(w(540, 840)));

        let bare = BookingDate { date: date!(2026 - 05 - 01), hours: None };
        assert_eq!(bare.window(), None);
    }

    #[test]
    fn booking_date_span() {
        let b = booking_with_dates(vec![
            BookingDate { date: date!(2026 - 05 - 01), hours: None },
            BookingDate { date: date!(2026 - 05 - 03), hours: None },
        ]);
        assert_eq!(b.first_date(), date!(2026 - 05 - 01));
        assert_eq!(b.last_date(), date!(2026 - 05 - 03));
        assert!(b.intersects_range(date!(2026 - 05 - 03), date!(2026 - 05 - 10)));
        assert!(b.intersects_range(date!(2026 - 04 - 20), date!(2026 - 05 - 01)));
        assert!(!b.intersects_range(date!(2026 - 05 - 04), date!(2026 - 05 - 10)));
        assert!(b.covers_date(date!(2026 - 05 - 03)));
        assert!(!b.covers_date(date!(2026 - 05 - 02))); // entries, not the span
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::PaymentRecorded {
            id: Ulid::new(),
            venue_id: Ulid::new(),
            booking_id: Ulid::new(),
            payer: Payer { id: Ulid::new(), kind: PayerKind::Organization },
            amount: 18_000,
            paid_at: 1_700_000_000_000,
            status: PaymentStatus::Pending,
            method: PaymentMethod::Transfer,
            reference: Some("TRX-1".into()),
            note: None,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn commit_serialization_roundtrip() {
        let commit = vec![
            Event::BookingApproved { id: Ulid::new(), venue_id: Ulid::new() },
            Event::PaymentsSettled { booking_id: Ulid::new(), venue_id: Ulid::new() },
        ];
        let bytes = bincode::serialize(&commit).unwrap();
        let decoded: Vec<Event> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(commit, decoded);
    }
}
