//! External event/organizer resolver boundary. The surrounding application
//! owns events and organizers; the engine only asks two narrow questions:
//! who pays for an event, and whether the event itself is approved.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayerKind {
    User,
    Organization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payer {
    pub id: Ulid,
    pub kind: PayerKind,
}

/// Approval state of an event — a different state space from booking status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Pending,
    Approved,
    Rejected,
}

#[async_trait]
pub trait EventDirectory: Send + Sync {
    /// Organizer identity for an event, or `None` if the event is unknown
    /// or has no resolvable payer.
    async fn organizer(&self, event_id: Ulid) -> Option<Payer>;

    /// Approval status of an event, or `None` if unknown.
    async fn status(&self, event_id: Ulid) -> Option<EventStatus>;
}

/// In-process directory for tests and single-binary embeddings.
#[derive(Default)]
pub struct InMemoryDirectory {
    events: DashMap<Ulid, (Payer, EventStatus)>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, event_id: Ulid, organizer: Payer, status: EventStatus) {
        self.events.insert(event_id, (organizer, status));
    }

    pub fn set_status(&self, event_id: Ulid, status: EventStatus) {
        if let Some(mut entry) = self.events.get_mut(&event_id) {
            entry.value_mut().1 = status;
        }
    }
}

#[async_trait]
impl EventDirectory for InMemoryDirectory {
    async fn organizer(&self, event_id: Ulid) -> Option<Payer> {
        self.events.get(&event_id).map(|e| e.value().0)
    }

    async fn status(&self, event_id: Ulid) -> Option<EventStatus> {
        self.events.get(&event_id).map(|e| e.value().1)
    }
}
