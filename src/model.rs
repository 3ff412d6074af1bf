use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix-epoch milliseconds, the only time type.
pub type Ms = i64;

/// The festival record. One per provisioning; edited in place by admins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Festival {
    pub id: Ulid,
    pub name: String,
    pub start_date: Ms,
    pub end_date: Ms,
    pub location: String,
    pub price: f64,
    /// Default capacity for newly created days.
    pub capacity_per_day: u32,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// One festival day. `capacity` overrides the festival default and may be
/// edited at any time; lowering it below current occupancy evicts nobody,
/// it only closes the day to new bookings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Day {
    pub id: Ulid,
    pub festival_id: Ulid,
    pub date: Ms,
    pub theme: String,
    pub menu: String,
    pub capacity: u32,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// A registered user, bound 1:1 to an external identity-provider subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    /// Opaque identity-provider subject this account is bound to.
    pub subject: String,
    pub email: String,
    pub name: String,
    pub notify_opt_in: bool,
    pub is_admin: bool,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// Profile fields delivered by the identity collaborator on login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginProfile {
    pub subject: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
}

/// The central record. At most one active reservation exists per user;
/// cancellation is a hard delete, so persisted reservations are Confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub user_id: Ulid,
    pub day_id: Ulid,
    pub festival_id: Ulid,
    /// Creation instant; preserved when the reservation moves to another day.
    pub booked_at: Ms,
    pub status: ReservationStatus,
    pub updated_at: Ms,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        matches!(self.status, ReservationStatus::Confirmed)
    }
}

/// Store change-log records, flat, no nesting. This is the journal format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    FestivalUpserted {
        festival: Festival,
    },
    DayUpserted {
        day: Day,
    },
    DayDeleted {
        id: Ulid,
    },
    UserUpserted {
        user: User,
    },
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationMoved {
        id: Ulid,
        user_id: Ulid,
        day_id: Ulid,
        festival_id: Ulid,
        updated_at: Ms,
    },
    ReservationDeleted {
        id: Ulid,
        user_id: Ulid,
    },
}

// ── Read models ──────────────────────────────────────────────────

/// A day plus its live occupancy, as shown on the booking page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAvailability {
    pub day: Day,
    pub tickets_sold: u64,
    pub available: u32,
}

/// Admin view: one day's reservations with user details attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayReservations {
    pub day_id: Ulid,
    pub date: Ms,
    pub theme: String,
    pub capacity: u32,
    pub entries: Vec<ReservationEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationEntry {
    pub reservation_id: Ulid,
    pub user_id: Ulid,
    pub user_name: String,
    pub user_email: String,
    pub booked_at: Ms,
    pub status: ReservationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_reservation() -> Reservation {
        Reservation {
            id: Ulid::new(),
            user_id: Ulid::new(),
            day_id: Ulid::new(),
            festival_id: Ulid::new(),
            booked_at: 1_730_592_000_000,
            status: ReservationStatus::Confirmed,
            updated_at: 1_730_592_000_000,
        }
    }

    #[test]
    fn confirmed_is_active() {
        let mut r = sample_reservation();
        assert!(r.is_active());
        r.status = ReservationStatus::Cancelled;
        assert!(!r.is_active());
    }

    #[test]
    fn change_serialization_roundtrip() {
        let change = Change::ReservationCreated {
            reservation: sample_reservation(),
        };
        let bytes = bincode::serialize(&change).unwrap();
        let decoded: Change = bincode::deserialize(&bytes).unwrap();
        assert_eq!(change, decoded);
    }

    #[test]
    fn day_deleted_roundtrip() {
        let change = Change::DayDeleted { id: Ulid::new() };
        let bytes = bincode::serialize(&change).unwrap();
        assert_eq!(change, bincode::deserialize::<Change>(&bytes).unwrap());
    }
}
