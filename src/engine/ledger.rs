use ulid::Ulid;

use crate::clock::{Ms, MS_PER_HOUR};
use crate::directory::Payer;
use crate::limits::{MAX_AMOUNT, MAX_NOTE_LEN, MAX_REFERENCE_LEN};
use crate::model::*;
use crate::observability;

use super::{Engine, EngineError};

/// A payment as submitted by the caller; the engine assigns the id and the
/// initial status.
#[derive(Debug, Clone)]
pub struct PaymentSubmission {
    pub payer: Payer,
    pub amount: Money,
    pub paid_at: Ms,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub note: Option<String>,
}

/// Result of re-running the deposit rule over a booking's payment set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositEvaluation {
    pub total_paid: Money,
    pub required: Money,
    /// Instant the running total first reached the required deposit.
    pub crossed_at: Option<Ms>,
    /// Deposit reached in full, within the condition's window.
    pub fulfilled: bool,
    /// Total paid covers the whole booking amount.
    pub settled: bool,
}

/// Price of a booking. Hourly venues charge per started hour per date entry
/// (a sub-hour entry still bills one hour); daily venues charge a flat rate.
/// Saturating — input caps live at the engine boundary.
pub fn booking_amount(mode: VenueMode, base_amount: Money, dates: &[BookingDate]) -> Money {
    match mode {
        VenueMode::Daily => base_amount,
        VenueMode::Hourly => {
            let hours: i64 = dates
                .iter()
                .map(|entry| {
                    let minutes: i64 = entry
                        .hours
                        .as_deref()
                        .map(|ws| ws.iter().map(|w| w.duration_min() as i64).sum())
                        .unwrap_or(0);
                    ((minutes + 59) / 60).max(1)
                })
                .sum();
            base_amount.saturating_mul(hours)
        }
    }
}

pub fn required_deposit(amount: Money, percent: u8) -> Money {
    amount.saturating_mul(percent as Money) / 100
}

/// The deposit rule, pure over the payment set. Payments are walked in
/// `paid_at` order; the crossing instant is the first prefix sum reaching
/// the required deposit. Running it again over the same set gives the same
/// answer, so the ledger may re-evaluate after every payment.
pub fn evaluate_deposit(
    booking: &Booking,
    condition: &BookingCondition,
    payments: &[Payment],
) -> DepositEvaluation {
    let required = required_deposit(booking.amount_to_be_paid, condition.deposit_percent);

    let mut ordered: Vec<&Payment> = payments.iter().collect();
    ordered.sort_by_key(|p| p.paid_at);

    let mut total_paid: Money = 0;
    let mut crossed_at: Option<Ms> = None;
    for p in &ordered {
        total_paid = total_paid.saturating_add(p.amount);
        if crossed_at.is_none() && total_paid >= required {
            crossed_at = Some(p.paid_at);
        }
    }

    let deadline = booking
        .created_at
        .saturating_add(condition.deposit_hours.saturating_mul(MS_PER_HOUR));
    let fulfilled = matches!(crossed_at, Some(at) if at <= deadline);
    let settled = total_paid >= booking.amount_to_be_paid;

    DepositEvaluation { total_paid, required, crossed_at, fulfilled, settled }
}

impl Engine {
    /// Record a payment against a booking and re-evaluate the deposit rule
    /// over the full payment set. One commit carries the payment row plus
    /// whatever status transitions the evaluation triggers.
    pub async fn record_payment(
        &self,
        booking_id: Ulid,
        submission: PaymentSubmission,
    ) -> Result<PaymentOutcome, EngineError> {
        if !(0..=MAX_AMOUNT).contains(&submission.amount) {
            return Err(EngineError::LimitExceeded("payment amount out of range"));
        }
        if submission.reference.as_deref().is_some_and(|r| r.len() > MAX_REFERENCE_LEN) {
            return Err(EngineError::LimitExceeded("payment reference too long"));
        }
        if submission.note.as_deref().is_some_and(|n| n.len() > MAX_NOTE_LEN) {
            return Err(EngineError::LimitExceeded("payment note too long"));
        }
        let (venue_id, mut guard) = self.resolve_booking_write(&booking_id).await?;

        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?
            .clone();
        if !booking.is_live() {
            return Err(EngineError::TransactionFailed("booking is cancelled".into()));
        }
        let condition = guard
            .condition
            .ok_or(EngineError::ConditionNotFound(venue_id))?;

        let payment = Payment {
            id: Ulid::new(),
            booking_id,
            payer: submission.payer,
            amount: submission.amount,
            paid_at: submission.paid_at,
            status: PaymentStatus::Pending,
            method: submission.method,
            reference: submission.reference,
            note: submission.note,
        };

        let mut payments = guard.payments_for(booking_id);
        payments.push(payment.clone());
        let eval = evaluate_deposit(&booking, &condition, &payments);

        let mut events = vec![Event::PaymentRecorded {
            id: payment.id,
            venue_id,
            booking_id,
            payer: payment.payer,
            amount: payment.amount,
            paid_at: payment.paid_at,
            status: payment.status,
            method: payment.method,
            reference: payment.reference.clone(),
            note: payment.note.clone(),
        }];
        let marks_paid = eval.fulfilled && booking.status == BookingStatus::ApprovedNotPaid;
        if marks_paid {
            events.push(Event::BookingMarkedPaid { id: booking_id, venue_id });
        }
        if eval.settled {
            events.push(Event::PaymentsSettled { booking_id, venue_id });
        }

        self.commit(&mut guard, events).await?;

        metrics::counter!(observability::PAYMENTS_RECORDED_TOTAL).increment(1);
        if marks_paid {
            metrics::counter!(observability::DEPOSITS_FULFILLED_TOTAL).increment(1);
        }

        let message = if eval.settled {
            "payment recorded; booking fully paid".to_string()
        } else if eval.fulfilled {
            "payment recorded; deposit fulfilled".to_string()
        } else {
            format!(
                "payment recorded; deposit outstanding ({} of {})",
                eval.total_paid, eval.required
            )
        };

        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?
            .clone();
        Ok(PaymentOutcome {
            payer: payment.payer,
            payment,
            booking,
            total_paid: eval.total_paid,
            required_deposit: eval.required,
            deposit_fulfilled: eval.fulfilled,
            message,
        })
    }
}
