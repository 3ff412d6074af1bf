//! Slot ledger: per-day occupancy against the capacity ceiling.

use ulid::Ulid;

use crate::model::Day;

use super::{Engine, EngineError};

impl Engine {
    /// Current confirmed-reservation count for a day. Side-effect free and
    /// uncached, so capacity edits show up in the very next read.
    pub async fn occupancy(&self, day_id: Ulid) -> Result<u64, EngineError> {
        Ok(self.store.count_reservations_for_day(day_id, None).await?)
    }

    /// Strict ceiling check: one more guest fits only while the count stays
    /// below capacity. `excluding` drops one user's own slot from the count
    /// — the move path must not be blocked by the mover's prior occupancy.
    pub(super) async fn has_room(
        &self,
        day: &Day,
        excluding: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        let occupied = self
            .store
            .count_reservations_for_day(day.id, excluding)
            .await?;
        Ok(occupied < u64::from(day.capacity))
    }
}
