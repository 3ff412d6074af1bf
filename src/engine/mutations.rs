use std::time::Instant;

use tracing::{info, warn};
use ulid::Ulid;

use crate::auth::Principal;
use crate::limits::MAX_DAYS_PER_FESTIVAL;
use crate::model::*;
use crate::notify::NoticeKind;
use crate::observability;

use super::validate::*;
use super::{Engine, EngineError, LockKey};

fn finish<T>(
    op: &'static str,
    started: Instant,
    result: Result<T, EngineError>,
) -> Result<T, EngineError> {
    let status = match &result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    };
    observability::record_operation(op, status, started);
    result
}

impl Engine {
    // ── Booking core ─────────────────────────────────────────

    /// Book the given day for the user. One booking per user festival-wide;
    /// admission is strict `occupancy < capacity`.
    pub async fn create(&self, user_id: Ulid, day_id: Ulid) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let user = match self.store.find_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return finish(
                    "create",
                    started,
                    Err(EngineError::UserNotFound(user_id.to_string())),
                );
            }
            Err(e) => return finish("create", started, Err(e.into())),
        };
        finish("create", started, self.create_for(&user, day_id).await)
    }

    /// Administrative booking on a user's behalf, looked up by email. Same
    /// invariants as `create` — the override bypasses only the requirement
    /// that the acting principal owns the reservation.
    pub async fn admin_create(
        &self,
        principal: &Principal,
        day_id: Ulid,
        user_email: &str,
    ) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let result = async {
            Self::require_admin(principal)?;
            validate_email(user_email)?;
            let user = self
                .store
                .find_user_by_email(user_email)
                .await?
                .ok_or_else(|| EngineError::UserNotFound(user_email.to_string()))?;
            self.create_for(&user, day_id).await
        }
        .await;
        finish("admin_create", started, result)
    }

    /// Shared insert path. Holds the user scope (uniqueness) and the day
    /// scope (capacity) across check and write.
    async fn create_for(&self, user: &User, day_id: Ulid) -> Result<Reservation, EngineError> {
        let _scopes = self
            .lock_scopes(vec![LockKey::User(user.id), LockKey::Day(day_id)])
            .await;

        let day = self
            .store
            .find_day(day_id)
            .await?
            .ok_or(EngineError::DayNotFound(day_id))?;
        if self.store.find_reservation_for_user(user.id).await?.is_some() {
            return Err(EngineError::AlreadyBooked(user.id));
        }
        if !self.has_room(&day, None).await? {
            return Err(EngineError::DayFull {
                day: day_id,
                capacity: day.capacity,
            });
        }

        let now = now_ms();
        let reservation = Reservation {
            id: Ulid::new(),
            user_id: user.id,
            day_id,
            festival_id: day.festival_id,
            booked_at: now,
            status: ReservationStatus::Confirmed,
            updated_at: now,
        };
        self.store.insert_reservation(reservation.clone()).await?;

        metrics::gauge!(observability::RESERVATIONS_ACTIVE).increment(1.0);
        info!(user = %user.id, day = %day_id, reservation = %reservation.id, "booking created");
        self.emit_notice(NoticeKind::BookingConfirmed, user, &day);
        Ok(reservation)
    }

    /// Move the user's reservation to another day. Identity and creation
    /// instant survive; the destination capacity check excludes the mover's
    /// own current slot so a move within a full day still succeeds.
    pub async fn move_booking(
        &self,
        user_id: Ulid,
        new_day_id: Ulid,
    ) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let result = self.move_inner(user_id, new_day_id).await;
        finish("move", started, result)
    }

    async fn move_inner(
        &self,
        user_id: Ulid,
        new_day_id: Ulid,
    ) -> Result<Reservation, EngineError> {
        let _scopes = self
            .lock_scopes(vec![LockKey::User(user_id), LockKey::Day(new_day_id)])
            .await;

        let existing = self
            .store
            .find_reservation_for_user(user_id)
            .await?
            .ok_or(EngineError::NoReservation(user_id))?;
        let day = self
            .store
            .find_day(new_day_id)
            .await?
            .ok_or(EngineError::DayNotFound(new_day_id))?;
        if !self.has_room(&day, Some(user_id)).await? {
            return Err(EngineError::DayFull {
                day: new_day_id,
                capacity: day.capacity,
            });
        }

        let updated = self
            .store
            .update_reservation_day(user_id, new_day_id, day.festival_id, now_ms())
            .await?
            .ok_or(EngineError::NoReservation(user_id))?;

        info!(
            user = %user_id,
            from = %existing.day_id,
            to = %new_day_id,
            reservation = %updated.id,
            "booking moved"
        );
        // The move is already committed; notice trouble stays advisory.
        match self.store.find_user(user_id).await {
            Ok(Some(user)) => self.emit_notice(NoticeKind::BookingUpdated, &user, &day),
            Ok(None) => warn!(user = %user_id, "update notice skipped: user missing"),
            Err(e) => warn!("update notice skipped: {e}"),
        }
        Ok(updated)
    }

    /// Cancel the user's reservation. Hard delete — the slot frees
    /// immediately and a second cancel reports `NoReservation`.
    pub async fn cancel(&self, user_id: Ulid) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self.cancel_inner(user_id).await;
        finish("cancel", started, result)
    }

    async fn cancel_inner(&self, user_id: Ulid) -> Result<(), EngineError> {
        let _scopes = self.lock_scopes(vec![LockKey::User(user_id)]).await;

        let removed = self
            .store
            .delete_reservation_for_user(user_id)
            .await?
            .ok_or(EngineError::NoReservation(user_id))?;

        metrics::gauge!(observability::RESERVATIONS_ACTIVE).decrement(1.0);
        info!(user = %user_id, reservation = %removed.id, "booking cancelled");
        self.notify_cancellation(&removed).await;
        Ok(())
    }

    /// Administrative cancellation by reservation id.
    pub async fn admin_cancel(
        &self,
        principal: &Principal,
        reservation_id: Ulid,
    ) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = async {
            Self::require_admin(principal)?;
            let existing = self
                .store
                .find_reservation(reservation_id)
                .await?
                .ok_or(EngineError::ReservationNotFound(reservation_id))?;

            let _scopes = self
                .lock_scopes(vec![LockKey::User(existing.user_id)])
                .await;
            let removed = self
                .store
                .delete_reservation(reservation_id)
                .await?
                .ok_or(EngineError::ReservationNotFound(reservation_id))?;

            metrics::gauge!(observability::RESERVATIONS_ACTIVE).decrement(1.0);
            info!(reservation = %reservation_id, user = %removed.user_id, "booking cancelled by admin");
            self.notify_cancellation(&removed).await;
            Ok(())
        }
        .await;
        finish("admin_cancel", started, result)
    }

    /// Best-effort cancellation notice. The delete already committed, so
    /// nothing here may fail the operation. Referential integrity keeps the
    /// day alive while reservations point at it; a missing day is worth a
    /// warning.
    async fn notify_cancellation(&self, removed: &Reservation) {
        let user = self.store.find_user(removed.user_id).await;
        let day = self.store.find_day(removed.day_id).await;
        match (user, day) {
            (Ok(Some(user)), Ok(Some(day))) => {
                self.emit_notice(NoticeKind::BookingCancelled, &user, &day)
            }
            (Ok(None), _) => {
                warn!(user = %removed.user_id, "cancellation notice skipped: user missing")
            }
            (_, Ok(None)) => {
                warn!(day = %removed.day_id, "cancellation notice skipped: day missing")
            }
            (Err(e), _) | (_, Err(e)) => warn!("cancellation notice skipped: {e}"),
        }
    }

    /// Delete a day. Refused while any reservation still references it.
    pub async fn admin_delete_day(
        &self,
        principal: &Principal,
        day_id: Ulid,
    ) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = async {
            Self::require_admin(principal)?;
            let _scopes = self.lock_scopes(vec![LockKey::Day(day_id)]).await;

            if self.store.find_day(day_id).await?.is_none() {
                return Err(EngineError::DayNotFound(day_id));
            }
            let count = self.store.count_reservations_for_day(day_id, None).await?;
            if count > 0 {
                return Err(EngineError::HasBookings { day: day_id, count });
            }
            self.store.delete_day(day_id).await?;
            info!(day = %day_id, "day deleted");
            Ok(())
        }
        .await;
        finish("admin_delete_day", started, result)
    }

    // ── Catalog content operations ───────────────────────────

    /// One-time provisioning. Idempotent: a festival that already exists is
    /// returned unchanged.
    #[allow(clippy::too_many_arguments)]
    pub async fn provision_festival(
        &self,
        principal: &Principal,
        name: &str,
        start_date: Ms,
        end_date: Ms,
        location: &str,
        price: f64,
        capacity_per_day: u32,
    ) -> Result<Festival, EngineError> {
        Self::require_admin(principal)?;
        validate_name(name)?;
        validate_location(location)?;
        validate_date(start_date)?;
        validate_date(end_date)?;
        validate_capacity(capacity_per_day)?;
        if end_date < start_date {
            return Err(EngineError::InvalidInput("festival dates reversed"));
        }

        if let Some(existing) = self.store.find_festival().await? {
            return Ok(existing);
        }

        let now = now_ms();
        let festival = Festival {
            id: Ulid::new(),
            name: name.to_string(),
            start_date,
            end_date,
            location: location.to_string(),
            price,
            capacity_per_day,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_festival(festival.clone()).await?;
        info!(festival = %festival.id, name, "festival provisioned");
        Ok(festival)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_festival(
        &self,
        principal: &Principal,
        name: &str,
        start_date: Ms,
        end_date: Ms,
        location: &str,
        price: f64,
        capacity_per_day: u32,
    ) -> Result<Festival, EngineError> {
        Self::require_admin(principal)?;
        validate_name(name)?;
        validate_location(location)?;
        validate_date(start_date)?;
        validate_date(end_date)?;
        validate_capacity(capacity_per_day)?;
        if end_date < start_date {
            return Err(EngineError::InvalidInput("festival dates reversed"));
        }

        let mut festival = self
            .store
            .find_festival()
            .await?
            .ok_or(EngineError::FestivalNotFound)?;
        festival.name = name.to_string();
        festival.start_date = start_date;
        festival.end_date = end_date;
        festival.location = location.to_string();
        festival.price = price;
        festival.capacity_per_day = capacity_per_day;
        festival.updated_at = now_ms();
        self.store.upsert_festival(festival.clone()).await?;
        Ok(festival)
    }

    /// Add a day to the festival. Capacity defaults to the festival's
    /// per-day value; the booking path always reads it back from the day
    /// record, never from a constant.
    pub async fn create_day(
        &self,
        principal: &Principal,
        date: Ms,
        theme: &str,
        menu: &str,
        capacity: Option<u32>,
    ) -> Result<Day, EngineError> {
        Self::require_admin(principal)?;
        validate_date(date)?;
        validate_theme(theme)?;
        validate_menu(menu)?;

        let festival = self
            .store
            .find_festival()
            .await?
            .ok_or(EngineError::FestivalNotFound)?;
        let capacity = capacity.unwrap_or(festival.capacity_per_day);
        validate_capacity(capacity)?;
        if self.store.list_days().await?.len() >= MAX_DAYS_PER_FESTIVAL {
            return Err(EngineError::InvalidInput("too many days"));
        }

        let now = now_ms();
        let day = Day {
            id: Ulid::new(),
            festival_id: festival.id,
            date,
            theme: theme.to_string(),
            menu: menu.to_string(),
            capacity,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_day(day.clone()).await?;
        info!(day = %day.id, theme, capacity, "day created");
        Ok(day)
    }

    /// Edit a day's content or capacity. Taken under the day's scope so a
    /// capacity change and an admission check never interleave. Lowering
    /// capacity below current occupancy evicts nobody; it only closes the
    /// day to new bookings.
    pub async fn update_day(
        &self,
        principal: &Principal,
        day_id: Ulid,
        date: Ms,
        theme: &str,
        menu: &str,
        capacity: u32,
    ) -> Result<Day, EngineError> {
        Self::require_admin(principal)?;
        validate_date(date)?;
        validate_theme(theme)?;
        validate_menu(menu)?;
        validate_capacity(capacity)?;

        let _scopes = self.lock_scopes(vec![LockKey::Day(day_id)]).await;

        let mut day = self
            .store
            .find_day(day_id)
            .await?
            .ok_or(EngineError::DayNotFound(day_id))?;
        let occupied = self.store.count_reservations_for_day(day_id, None).await?;
        if u64::from(capacity) < occupied {
            warn!(
                day = %day_id,
                capacity,
                occupied,
                "capacity lowered below occupancy; existing reservations stay"
            );
        }
        day.date = date;
        day.theme = theme.to_string();
        day.menu = menu.to_string();
        day.capacity = capacity;
        day.updated_at = now_ms();
        self.store.upsert_day(day.clone()).await?;
        Ok(day)
    }

    // ── Account sync ─────────────────────────────────────────

    /// Record a verified login: first sight creates the account, repeats
    /// bump only the timestamp.
    pub async fn sync_user(&self, profile: &LoginProfile) -> Result<User, EngineError> {
        validate_email(&profile.email)?;
        validate_name(&profile.name)?;
        Ok(self.store.upsert_login(profile, now_ms()).await?)
    }
}
