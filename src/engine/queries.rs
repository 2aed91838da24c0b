use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

/// Read-only lookups. Each takes a read guard on the venue and clones out a
/// snapshot; answers can go stale the moment the guard drops.
impl Engine {
    pub async fn get_booking(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let venue_id = self
            .venue_for_booking(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let vs = self
            .get_venue(&venue_id)
            .ok_or(EngineError::VenueNotFound(venue_id))?;
        let guard = vs.read().await;
        guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))
    }

    pub async fn bookings_for_venue(&self, venue_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let vs = self
            .get_venue(&venue_id)
            .ok_or(EngineError::VenueNotFound(venue_id))?;
        let guard = vs.read().await;
        Ok(guard.bookings.clone())
    }

    pub async fn payments_for_booking(
        &self,
        booking_id: Ulid,
    ) -> Result<Vec<Payment>, EngineError> {
        let venue_id = self
            .venue_for_booking(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let vs = self
            .get_venue(&venue_id)
            .ok_or(EngineError::VenueNotFound(venue_id))?;
        let guard = vs.read().await;
        Ok(guard.payments_for(booking_id))
    }

    pub async fn invoices_for_venue(&self, venue_id: Ulid) -> Result<Vec<Invoice>, EngineError> {
        let vs = self
            .get_venue(&venue_id)
            .ok_or(EngineError::VenueNotFound(venue_id))?;
        let guard = vs.read().await;
        Ok(guard.invoices.clone())
    }

    pub async fn slots_for_venue(
        &self,
        venue_id: Ulid,
    ) -> Result<Vec<AvailabilitySlot>, EngineError> {
        let vs = self
            .get_venue(&venue_id)
            .ok_or(EngineError::VenueNotFound(venue_id))?;
        let guard = vs.read().await;
        Ok(guard.slots.clone())
    }

    pub async fn list_venues(&self) -> Vec<VenueInfo> {
        let mut out = Vec::with_capacity(self.state.len());
        let arcs: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        for vs in arcs {
            let guard = vs.read().await;
            out.push(VenueInfo {
                id: guard.id,
                name: guard.name.clone(),
                mode: guard.mode,
                capacity: guard.capacity,
                base_amount: guard.base_amount,
                buffer_min: guard.buffer_min,
                condition: guard.condition,
            });
        }
        out.sort_by_key(|v| v.id);
        out
    }
}
