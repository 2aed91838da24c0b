use std::sync::Arc;

use time::Date;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::clock::{now_ms, MS_PER_HOUR};
use crate::directory::{Payer, PayerKind};
use crate::limits::*;
use crate::model::*;
use crate::notify::{Notice, NoticeKind};
use crate::observability;

use super::conflict::{check_booking_conflict, validate_dates};
use super::ledger::booking_amount;
use super::{Engine, EngineError};

/// Reason stamped on siblings cancelled by an approval.
pub const CANCEL_REASON: &str = "venue assigned to another booking for this date";

const SLOT_NOTE_BOOKED: &str = "booked";
const SLOT_NOTE_TRANSITION: &str = "transition day";

/// Parameters for venue registration.
#[derive(Debug, Clone)]
pub struct VenueSpec {
    pub id: Ulid,
    pub name: Option<String>,
    pub mode: VenueMode,
    pub capacity: u32,
    pub base_amount: Money,
    pub buffer_min: Option<u16>,
}

impl Engine {
    pub async fn create_venue(&self, spec: VenueSpec) -> Result<(), EngineError> {
        if self.state.len() >= MAX_VENUES {
            return Err(EngineError::LimitExceeded("venue count"));
        }
        if let Some(name) = &spec.name
            && name.len() > MAX_NAME_LEN {
                return Err(EngineError::LimitExceeded("venue name too long"));
            }
        if !(0..=MAX_AMOUNT).contains(&spec.base_amount) {
            return Err(EngineError::LimitExceeded("venue base amount out of range"));
        }
        if self.state.contains_key(&spec.id) {
            return Err(EngineError::AlreadyExists(spec.id));
        }

        let event = Event::VenueCreated {
            id: spec.id,
            name: spec.name.clone(),
            mode: spec.mode,
            capacity: spec.capacity,
            base_amount: spec.base_amount,
            buffer_min: spec.buffer_min,
        };
        self.journal_commit(std::slice::from_ref(&event)).await?;

        let vs = VenueState::new(
            spec.id,
            spec.name,
            spec.mode,
            spec.capacity,
            spec.base_amount,
            spec.buffer_min,
        );
        self.state.insert(spec.id, Arc::new(RwLock::new(vs)));
        metrics::gauge!(observability::VENUES_ACTIVE).set(self.state.len() as f64);
        Ok(())
    }

    pub async fn set_condition(
        &self,
        venue_id: Ulid,
        condition: BookingCondition,
    ) -> Result<(), EngineError> {
        if condition.deposit_percent > 100 {
            return Err(EngineError::LimitExceeded("deposit percent above 100"));
        }
        if !(0..=MAX_DEPOSIT_HOURS).contains(&condition.deposit_hours) {
            return Err(EngineError::LimitExceeded("deposit hours out of range"));
        }
        let vs = self
            .get_venue(&venue_id)
            .ok_or(EngineError::VenueNotFound(venue_id))?;
        let mut guard = vs.write().await;
        self.commit(&mut guard, vec![Event::ConditionSet { venue_id, condition }])
            .await
    }

    /// Register a booking request. Dates are validated and the conflict
    /// detector runs under the venue write lock, so a feasibility answer
    /// that went stale cannot slip a conflicting booking in.
    pub async fn create_booking(&self, draft: BookingDraft) -> Result<Ulid, EngineError> {
        validate_dates(&draft.dates)?;
        let vs = self
            .get_venue(&draft.venue_id)
            .ok_or(EngineError::VenueNotFound(draft.venue_id))?;
        let mut guard = vs.write().await;

        if guard.bookings.len() >= MAX_BOOKINGS_PER_VENUE {
            return Err(EngineError::LimitExceeded("bookings per venue"));
        }
        if guard.booking(draft.id).is_some() {
            return Err(EngineError::AlreadyExists(draft.id));
        }
        check_booking_conflict(&guard, &draft).inspect_err(|_| {
            metrics::counter!(observability::CONFLICTS_REJECTED_TOTAL).increment(1);
        })?;

        let amount = booking_amount(guard.mode, guard.base_amount, &draft.dates);
        self.commit(
            &mut guard,
            vec![Event::BookingRequested {
                id: draft.id,
                venue_id: draft.venue_id,
                requester: draft.requester,
                event_id: draft.event_id,
                dates: draft.dates,
                amount,
                created_at: now_ms(),
            }],
        )
        .await?;

        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
        Ok(draft.id)
    }

    /// Re-date a Pending booking. Dates revalidate through the same conflict
    /// detector as creation and the amount is recomputed.
    pub async fn update_booking_dates(
        &self,
        booking_id: Ulid,
        dates: Vec<BookingDate>,
    ) -> Result<(), EngineError> {
        validate_dates(&dates)?;
        let (venue_id, mut guard) = self.resolve_booking_write(&booking_id).await?;

        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::TransactionFailed("booking is not pending".into()));
        }
        let draft = BookingDraft {
            id: booking_id,
            venue_id,
            requester: booking.requester,
            event_id: booking.event_id,
            dates: dates.clone(),
        };
        check_booking_conflict(&guard, &draft).inspect_err(|_| {
            metrics::counter!(observability::CONFLICTS_REJECTED_TOTAL).increment(1);
        })?;

        let amount = booking_amount(guard.mode, guard.base_amount, &dates);
        self.commit(
            &mut guard,
            vec![Event::BookingDatesChanged { id: booking_id, venue_id, dates, amount }],
        )
        .await
    }

    /// The approval orchestrator. Every step — status transition, slot
    /// materialization, payer resolution, anchor payment, sibling
    /// cancellation, invoice issuance — is staged into one commit; in-memory
    /// state changes only after the journal frame is durably flushed, so a
    /// failure anywhere leaves the booking untouched.
    pub async fn approve_booking(
        &self,
        booking_id: Ulid,
    ) -> Result<ApprovalOutcome, EngineError> {
        let (venue_id, mut guard) = self.resolve_booking_write(&booking_id).await?;

        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?
            .clone();
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::TransactionFailed("booking is not pending".into()));
        }

        // Payer: the event's organizer when the booking is event-linked,
        // otherwise the requester pays directly.
        let payer = match booking.event_id {
            Some(event_id) => self
                .directory
                .organizer(event_id)
                .await
                .ok_or(EngineError::PayerUndetermined(event_id))?,
            None => Payer { id: booking.requester, kind: PayerKind::User },
        };

        let now = now_ms();
        let mut events = vec![Event::BookingApproved { id: booking_id, venue_id }];

        let mut slot_ids = Vec::new();
        let mut stage_slot = |events: &mut Vec<Event>,
                              date: Date,
                              window: Option<crate::clock::TimeRange>,
                              note: &str| {
            let id = Ulid::new();
            slot_ids.push(id);
            events.push(Event::SlotAllocated {
                id,
                venue_id,
                booking_id,
                event_id: booking.event_id,
                date,
                window,
                note: note.to_string(),
            });
        };
        match guard.mode {
            VenueMode::Daily => {
                let last = booking.last_date();
                let mut day = booking.first_date();
                loop {
                    stage_slot(&mut events, day, None, SLOT_NOTE_BOOKED);
                    if day == last {
                        break;
                    }
                    day = day
                        .next_day()
                        .ok_or(EngineError::InvalidDateRange("date out of range"))?;
                }
                let transition_days =
                    guard.condition.map(|c| c.transition_days).unwrap_or(0);
                for _ in 0..transition_days {
                    day = day
                        .next_day()
                        .ok_or(EngineError::InvalidDateRange("date out of range"))?;
                    stage_slot(&mut events, day, None, SLOT_NOTE_TRANSITION);
                }
            }
            VenueMode::Hourly => {
                for entry in &booking.dates {
                    stage_slot(&mut events, entry.date, entry.window(), SLOT_NOTE_BOOKED);
                }
            }
        }

        // Anchor payment row: ties the ledger to the booking from the moment
        // of approval, before any money moves.
        events.push(Event::PaymentRecorded {
            id: Ulid::new(),
            venue_id,
            booking_id,
            payer,
            amount: 0,
            paid_at: now,
            status: PaymentStatus::Pending,
            method: PaymentMethod::Other,
            reference: None,
            note: None,
        });

        // Losing siblings: live, unpaid bookings competing for the same
        // start date.
        let cancelled: Vec<Ulid> = guard
            .bookings
            .iter()
            .filter(|b| {
                b.id != booking_id
                    && b.first_date() == booking.first_date()
                    && matches!(
                        b.status,
                        BookingStatus::Pending | BookingStatus::ApprovedNotPaid
                    )
            })
            .map(|b| b.id)
            .collect();
        for id in &cancelled {
            events.push(Event::BookingCancelled {
                id: *id,
                venue_id,
                reason: CANCEL_REASON.to_string(),
            });
        }

        let invoice = Invoice {
            id: Ulid::new(),
            booking_id,
            venue_id,
            event_id: booking.event_id,
            payer,
            issued_at: now,
            due_at: guard
                .condition
                .map(|c| now.saturating_add(c.deposit_hours.saturating_mul(MS_PER_HOUR))),
            total: booking.amount_to_be_paid,
            status: InvoiceStatus::Pending,
        };
        events.push(Event::InvoiceIssued {
            id: invoice.id,
            venue_id,
            booking_id,
            event_id: invoice.event_id,
            payer,
            issued_at: invoice.issued_at,
            due_at: invoice.due_at,
            total: invoice.total,
        });

        self.commit(&mut guard, events).await.map_err(|e| match e {
            EngineError::JournalError(msg) => EngineError::TransactionFailed(msg),
            other => other,
        })?;

        // Post-commit, best-effort: notices and counters never unwind an
        // already-durable approval.
        self.notify.send(Notice {
            venue_id,
            booking_id,
            kind: NoticeKind::Approved,
            message: "booking approved".into(),
        });
        for id in &cancelled {
            self.notify.send(Notice {
                venue_id,
                booking_id: *id,
                kind: NoticeKind::Cancelled,
                message: CANCEL_REASON.into(),
            });
        }
        metrics::counter!(observability::BOOKINGS_APPROVED_TOTAL).increment(1);
        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL)
            .increment(cancelled.len() as u64);

        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?
            .clone();
        Ok(ApprovalOutcome { booking, payer, slots: slot_ids, cancelled, invoice })
    }

    /// Manager cancellation, allowed from any live state.
    pub async fn cancel_booking(
        &self,
        booking_id: Ulid,
        reason: String,
    ) -> Result<(), EngineError> {
        let (venue_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        if !booking.is_live() {
            return Err(EngineError::TransactionFailed("booking is cancelled".into()));
        }

        self.commit(
            &mut guard,
            vec![Event::BookingCancelled {
                id: booking_id,
                venue_id,
                reason: reason.clone(),
            }],
        )
        .await?;

        self.notify.send(Notice {
            venue_id,
            booking_id,
            kind: NoticeKind::Cancelled,
            message: reason,
        });
        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        Ok(())
    }
}
