use std::collections::HashMap;

use ulid::Ulid;

use crate::auth::Principal;
use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn festival(&self) -> Result<Festival, EngineError> {
        self.store
            .find_festival()
            .await?
            .ok_or(EngineError::FestivalNotFound)
    }

    /// Every day with its live occupancy, sorted by date. Counts are read
    /// fresh per call so capacity edits and cancellations show immediately.
    pub async fn day_overview(&self) -> Result<Vec<DayAvailability>, EngineError> {
        let mut days = self.store.list_days().await?;
        days.sort_by_key(|d| d.date);

        let mut overview = Vec::with_capacity(days.len());
        for day in days {
            let sold = self.store.count_reservations_for_day(day.id, None).await?;
            // Occupancy can exceed capacity after an admin lowers it;
            // available floors at zero rather than going negative.
            let available = day.capacity.saturating_sub(sold.min(u64::from(u32::MAX)) as u32);
            overview.push(DayAvailability {
                day,
                tickets_sold: sold,
                available,
            });
        }
        Ok(overview)
    }

    pub async fn admin_list_reservations(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Reservation>, EngineError> {
        Self::require_admin(principal)?;
        let mut reservations = self.store.list_reservations().await?;
        reservations.sort_by_key(|r| r.booked_at);
        Ok(reservations)
    }

    /// Reservations grouped per day with user names and emails attached.
    /// Days sort by date, entries case-insensitively by guest name;
    /// reservations referencing unknown days are skipped.
    pub async fn admin_reservations_by_day(
        &self,
        principal: &Principal,
    ) -> Result<Vec<DayReservations>, EngineError> {
        Self::require_admin(principal)?;

        let mut days = self.store.list_days().await?;
        days.sort_by_key(|d| d.date);

        let users: HashMap<Ulid, User> = self
            .store
            .list_users()
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        let mut grouped: Vec<DayReservations> = days
            .into_iter()
            .map(|d| DayReservations {
                day_id: d.id,
                date: d.date,
                theme: d.theme,
                capacity: d.capacity,
                entries: Vec::new(),
            })
            .collect();
        let slot_of: HashMap<Ulid, usize> = grouped
            .iter()
            .enumerate()
            .map(|(i, g)| (g.day_id, i))
            .collect();

        for r in self.store.list_reservations().await? {
            let Some(&slot) = slot_of.get(&r.day_id) else {
                continue;
            };
            let (user_name, user_email) = users
                .get(&r.user_id)
                .map(|u| (u.name.clone(), u.email.clone()))
                .unwrap_or_default();
            grouped[slot].entries.push(ReservationEntry {
                reservation_id: r.id,
                user_id: r.user_id,
                user_name,
                user_email,
                booked_at: r.booked_at,
                status: r.status,
            });
        }

        for g in &mut grouped {
            g.entries
                .sort_by_key(|e| e.user_name.to_lowercase());
        }
        Ok(grouped)
    }

    /// Look one guest's reservation up by email.
    pub async fn admin_find_reservation(
        &self,
        principal: &Principal,
        user_email: &str,
    ) -> Result<Option<Reservation>, EngineError> {
        Self::require_admin(principal)?;
        let Some(user) = self.store.find_user_by_email(user_email).await? else {
            return Ok(None);
        };
        self.active_reservation(user.id).await
    }

    /// JSON export of the full reservation list, oldest first.
    pub async fn admin_export_json(&self, principal: &Principal) -> Result<String, EngineError> {
        let reservations = self.admin_list_reservations(principal).await?;
        serde_json::to_string_pretty(&reservations)
            .map_err(|e| EngineError::Unavailable(e.to_string()))
    }
}
