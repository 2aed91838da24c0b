//! Hard input limits. Requests exceeding these are rejected with
//! `EngineError::LimitExceeded` before any state is touched.

pub const MAX_VENUES: usize = 10_000;
pub const MAX_BOOKINGS_PER_VENUE: usize = 100_000;
pub const MAX_DATES_PER_BOOKING: usize = 366;
pub const MAX_WINDOWS_PER_DATE: usize = 48;
pub const MAX_EVENT_VENUES: usize = 64;

/// Widest date range an availability query may cover, in days.
pub const MAX_QUERY_DAYS: i64 = 366;

/// Largest money amount (minor units) accepted for venue pricing and
/// payments. Keeps derived products (hours × base, percent × amount)
/// comfortably inside `i64`.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Widest deposit window a booking condition may carry, in hours (one year).
pub const MAX_DEPOSIT_HOURS: i64 = 8_760;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_NOTE_LEN: usize = 512;
pub const MAX_REFERENCE_LEN: usize = 128;
