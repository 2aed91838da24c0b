mod approval;
mod availability;
mod conflict;
mod error;
mod ledger;
mod queries;

pub use approval::{VenueSpec, CANCEL_REASON};
pub use availability::day_gaps;
pub use error::EngineError;
pub use ledger::{
    booking_amount, evaluate_deposit, required_deposit, DepositEvaluation, PaymentSubmission,
};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::directory::EventDirectory;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::journal::Journal;

pub type SharedVenueState = Arc<RwLock<VenueState>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    Commit {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        commits: Vec<Vec<Event>>,
        response: oneshot::Sender<io::Result<()>>,
    },
    CommitsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches commits for group
/// commit:
/// 1. Block until the first Commit arrives.
/// 2. Buffer its frame (no fsync).
/// 3. Drain all immediately available Commits (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Commit { events, response } => {
                let mut batch = vec![(events, response)];

                // Drain all immediately available commits
                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Commit { events, response }) => {
                            batch.push((events, response));
                        }
                        Ok(other) => {
                            // Flush the current batch first, then handle the
                            // non-commit command
                            flush_and_respond(&mut journal, &mut batch);
                            handle_non_commit(&mut journal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut journal, &mut batch);
                }
            }
            other => handle_non_commit(&mut journal, other),
        }
    }
}

type PendingCommit = (Vec<Event>, oneshot::Sender<io::Result<()>>);

fn flush_and_respond(journal: &mut Journal, batch: &mut Vec<PendingCommit>) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
        .record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(journal, batch);
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(journal: &mut Journal, batch: &[PendingCommit]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (events, _) in batch {
        if let Err(e) = journal.append_buffered(events) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = journal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_commit(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { commits, response } => {
            let result = Journal::write_compact_file(journal.path(), &commits)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::CommitsSinceCompact { response } => {
            let _ = response.send(journal.commits_since_compact());
        }
        JournalCommand::Commit { .. } => unreachable!(),
    }
}

/// The booking engine: per-venue state, the journal writer handle, and the
/// external boundaries (organizer directory, notification hub).
pub struct Engine {
    pub state: DashMap<Ulid, SharedVenueState>,
    journal_tx: mpsc::Sender<JournalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) directory: Arc<dyn EventDirectory>,
    /// Reverse lookup: booking id → venue id.
    pub(super) booking_to_venue: DashMap<Ulid, Ulid>,
    /// Test hook: when set, `commit` fails before anything is journaled or
    /// applied, exercising the all-or-nothing rollback path.
    #[cfg(test)]
    pub(super) fail_commits: std::sync::atomic::AtomicBool,
}

/// Apply an event directly to a VenueState (no locking — caller holds the
/// write guard).
fn apply_to_venue(vs: &mut VenueState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::ConditionSet { condition, .. } => {
            vs.condition = Some(*condition);
        }
        Event::BookingRequested {
            id,
            venue_id,
            requester,
            event_id,
            dates,
            amount,
            created_at,
        } => {
            vs.bookings.push(Booking {
                id: *id,
                venue_id: *venue_id,
                requester: *requester,
                event_id: *event_id,
                dates: dates.clone(),
                status: BookingStatus::Pending,
                amount_to_be_paid: *amount,
                is_paid: false,
                venue_status: VenueHold::Reserved,
                cancellation_reason: None,
                created_at: *created_at,
            });
            index.insert(*id, *venue_id);
        }
        Event::BookingDatesChanged { id, dates, amount, .. } => {
            if let Some(b) = vs.booking_mut(*id) {
                b.dates = dates.clone();
                b.amount_to_be_paid = *amount;
            }
        }
        Event::BookingApproved { id, .. } => {
            if let Some(b) = vs.booking_mut(*id) {
                b.status = BookingStatus::ApprovedNotPaid;
            }
        }
        Event::BookingMarkedPaid { id, .. } => {
            if let Some(b) = vs.booking_mut(*id) {
                b.status = BookingStatus::ApprovedPaid;
            }
        }
        Event::BookingCancelled { id, reason, .. } => {
            if let Some(b) = vs.booking_mut(*id) {
                b.status = BookingStatus::Cancelled;
                b.venue_status = VenueHold::Released;
                b.cancellation_reason = Some(reason.clone());
            }
        }
        Event::SlotAllocated {
            id,
            venue_id,
            booking_id,
            event_id,
            date,
            window,
            note,
        } => {
            vs.slots.push(AvailabilitySlot {
                id: *id,
                venue_id: *venue_id,
                booking_id: *booking_id,
                event_id: *event_id,
                date: *date,
                window: *window,
                status: SlotStatus::Booked,
                note: note.clone(),
            });
        }
        Event::PaymentRecorded {
            id,
            booking_id,
            payer,
            amount,
            paid_at,
            status,
            method,
            reference,
            note,
            ..
        } => {
            vs.payments.push(Payment {
                id: *id,
                booking_id: *booking_id,
                payer: *payer,
                amount: *amount,
                paid_at: *paid_at,
                status: *status,
                method: *method,
                reference: reference.clone(),
                note: note.clone(),
            });
        }
        Event::PaymentsSettled { booking_id, .. } => {
            for p in vs.payments.iter_mut().filter(|p| p.booking_id == *booking_id) {
                p.status = PaymentStatus::Completed;
            }
            if let Some(b) = vs.booking_mut(*booking_id) {
                b.is_paid = true;
            }
        }
        Event::InvoiceIssued {
            id,
            venue_id,
            booking_id,
            event_id,
            payer,
            issued_at,
            due_at,
            total,
        } => {
            vs.invoices.push(Invoice {
                id: *id,
                booking_id: *booking_id,
                venue_id: *venue_id,
                event_id: *event_id,
                payer: *payer,
                issued_at: *issued_at,
                due_at: *due_at,
                total: *total,
                status: InvoiceStatus::Pending,
            });
        }
        // VenueCreated is handled at the DashMap level, not here
        Event::VenueCreated { .. } => {}
    }
}

impl Engine {
    pub fn new(
        journal_path: PathBuf,
        notify: Arc<NotifyHub>,
        directory: Arc<dyn EventDirectory>,
    ) -> io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            state: DashMap::new(),
            journal_tx,
            notify,
            directory,
            booking_to_venue: DashMap::new(),
            #[cfg(test)]
            fail_commits: std::sync::atomic::AtomicBool::new(false),
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never use blocking_write here because this may
        // run inside an async context.
        for event in &events {
            match event {
                Event::VenueCreated { id, name, mode, capacity, base_amount, buffer_min } => {
                    let vs = VenueState::new(
                        *id,
                        name.clone(),
                        *mode,
                        *capacity,
                        *base_amount,
                        *buffer_min,
                    );
                    engine.state.insert(*id, Arc::new(RwLock::new(vs)));
                }
                other => {
                    if let Some(venue_id) = event_venue_id(other)
                        && let Some(entry) = engine.state.get(&venue_id) {
                            let vs_arc = entry.clone();
                            let mut guard =
                                vs_arc.try_write().expect("replay: uncontended write");
                            apply_to_venue(&mut guard, other, &engine.booking_to_venue);
                        }
                }
            }
        }
        metrics::gauge!(crate::observability::VENUES_ACTIVE).set(engine.state.len() as f64);

        Ok(engine)
    }

    /// Hand one commit to the background group-commit writer and wait for
    /// the fsync acknowledgement.
    async fn journal_commit(&self, events: &[Event]) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Commit { events: events.to_vec(), response: tx })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    pub fn get_venue(&self, id: &Ulid) -> Option<SharedVenueState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn venue_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_venue.get(booking_id).map(|e| *e.value())
    }

    /// Durably journal one commit, then apply it to the venue state the
    /// caller holds the write guard for. Nothing mutates unless the whole
    /// frame was flushed — this is the commit-or-rollback boundary every
    /// multi-step mutation runs through.
    pub(super) async fn commit(
        &self,
        vs: &mut VenueState,
        events: Vec<Event>,
    ) -> Result<(), EngineError> {
        #[cfg(test)]
        if self.fail_commits.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(EngineError::TransactionFailed("injected commit failure".into()));
        }
        self.journal_commit(&events).await?;
        for event in &events {
            apply_to_venue(vs, event, &self.booking_to_venue);
        }
        Ok(())
    }

    /// Lookup booking → venue, get the venue, acquire its write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<VenueState>), EngineError> {
        let venue_id = self
            .venue_for_booking(booking_id)
            .ok_or(EngineError::BookingNotFound(*booking_id))?;
        let vs = self
            .get_venue(&venue_id)
            .ok_or(EngineError::VenueNotFound(venue_id))?;
        let guard = vs.write_owned().await;
        Ok((venue_id, guard))
    }

    /// Rewrite the journal as one snapshot commit per venue.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let mut commits = Vec::new();
        let venue_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for id in venue_ids {
            if let Some(entry) = self.state.get(&id) {
                let vs = entry.value().clone();
                let guard = vs.read().await;
                commits.push(snapshot_commit(&guard));
            }
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { commits, response: tx })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    pub async fn journal_commits_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::CommitsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Extract the owning venue id from an event (None for VenueCreated, which
/// is applied at the map level).
fn event_venue_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ConditionSet { venue_id, .. }
        | Event::BookingRequested { venue_id, .. }
        | Event::BookingDatesChanged { venue_id, .. }
        | Event::BookingApproved { venue_id, .. }
        | Event::BookingMarkedPaid { venue_id, .. }
        | Event::BookingCancelled { venue_id, .. }
        | Event::SlotAllocated { venue_id, .. }
        | Event::PaymentRecorded { venue_id, .. }
        | Event::PaymentsSettled { venue_id, .. }
        | Event::InvoiceIssued { venue_id, .. } => Some(*venue_id),
        Event::VenueCreated { .. } => None,
    }
}

/// Re-stage a venue's live state as one replayable commit (for compaction).
fn snapshot_commit(vs: &VenueState) -> Vec<Event> {
    let mut events = vec![Event::VenueCreated {
        id: vs.id,
        name: vs.name.clone(),
        mode: vs.mode,
        capacity: vs.capacity,
        base_amount: vs.base_amount,
        buffer_min: vs.buffer_min,
    }];
    if let Some(condition) = vs.condition {
        events.push(Event::ConditionSet { venue_id: vs.id, condition });
    }
    for b in &vs.bookings {
        events.push(Event::BookingRequested {
            id: b.id,
            venue_id: b.venue_id,
            requester: b.requester,
            event_id: b.event_id,
            dates: b.dates.clone(),
            amount: b.amount_to_be_paid,
            created_at: b.created_at,
        });
        match b.status {
            BookingStatus::Pending => {}
            BookingStatus::ApprovedNotPaid => {
                events.push(Event::BookingApproved { id: b.id, venue_id: b.venue_id });
            }
            BookingStatus::ApprovedPaid => {
                events.push(Event::BookingApproved { id: b.id, venue_id: b.venue_id });
                events.push(Event::BookingMarkedPaid { id: b.id, venue_id: b.venue_id });
            }
            BookingStatus::Cancelled => {
                events.push(Event::BookingCancelled {
                    id: b.id,
                    venue_id: b.venue_id,
                    reason: b.cancellation_reason.clone().unwrap_or_default(),
                });
            }
        }
    }
    for s in &vs.slots {
        events.push(Event::SlotAllocated {
            id: s.id,
            venue_id: s.venue_id,
            booking_id: s.booking_id,
            event_id: s.event_id,
            date: s.date,
            window: s.window,
            note: s.note.clone(),
        });
    }
    for p in &vs.payments {
        events.push(Event::PaymentRecorded {
            id: p.id,
            venue_id: vs.id,
            booking_id: p.booking_id,
            payer: p.payer,
            amount: p.amount,
            paid_at: p.paid_at,
            status: p.status,
            method: p.method,
            reference: p.reference.clone(),
            note: p.note.clone(),
        });
    }
    for i in &vs.invoices {
        events.push(Event::InvoiceIssued {
            id: i.id,
            venue_id: i.venue_id,
            booking_id: i.booking_id,
            event_id: i.event_id,
            payer: i.payer,
            issued_at: i.issued_at,
            due_at: i.due_at,
            total: i.total,
        });
    }
    // Restores `is_paid` — the payments above were re-staged with their
    // current status, so this is idempotent over them.
    for b in &vs.bookings {
        if b.is_paid {
            events.push(Event::PaymentsSettled { booking_id: b.id, venue_id: b.venue_id });
        }
    }
    events
}
