use time::Date;
use ulid::Ulid;

use crate::clock::TimeRange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidTimeFormat(String),
    InvalidDateRange(&'static str),
    DuplicateBooking(Ulid),
    TimeConflict {
        booking_id: Ulid,
        date: Date,
        window: TimeRange,
    },
    BufferViolation {
        booking_id: Ulid,
        date: Date,
    },
    VenueAlreadyBooked(Ulid),
    PayerUndetermined(Ulid),
    BookingNotFound(Ulid),
    VenueNotFound(Ulid),
    ConditionNotFound(Ulid),
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
    TransactionFailed(String),
    JournalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidTimeFormat(s) => write!(f, "invalid time format: {s:?}"),
            EngineError::InvalidDateRange(msg) => write!(f, "invalid date range: {msg}"),
            EngineError::DuplicateBooking(id) => {
                write!(f, "duplicate of existing booking: {id}")
            }
            EngineError::TimeConflict { booking_id, date, window } => {
                write!(f, "time conflict with booking {booking_id} on {date} ({window})")
            }
            EngineError::BufferViolation { booking_id, date } => {
                write!(f, "too close to booking {booking_id} on {date}")
            }
            EngineError::VenueAlreadyBooked(id) => {
                write!(f, "venue {id} already booked for an approved event")
            }
            EngineError::PayerUndetermined(id) => {
                write!(f, "no payer could be resolved for booking {id}")
            }
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::VenueNotFound(id) => write!(f, "venue not found: {id}"),
            EngineError::ConditionNotFound(id) => {
                write!(f, "venue {id} has no booking condition configured")
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::TransactionFailed(msg) => write!(f, "transaction failed: {msg}"),
            EngineError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
