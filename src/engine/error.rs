use ulid::Ulid;

use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    FestivalNotFound,
    DayNotFound(Ulid),
    /// The key is whatever the caller looked the user up by — id or email.
    UserNotFound(String),
    /// The user holds no active reservation to move or cancel.
    NoReservation(Ulid),
    ReservationNotFound(Ulid),
    /// One booking per user, festival-wide.
    AlreadyBooked(Ulid),
    /// Strict ceiling: occupancy must stay below capacity.
    DayFull { day: Ulid, capacity: u32 },
    /// A day cannot be deleted out from under its reservations.
    HasBookings { day: Ulid, count: u64 },
    Forbidden,
    InvalidInput(&'static str),
    Unavailable(String),
}

impl EngineError {
    /// Stable label for metrics and transport mapping.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::FestivalNotFound => "festival_not_found",
            EngineError::DayNotFound(_) => "day_not_found",
            EngineError::UserNotFound(_) => "user_not_found",
            EngineError::NoReservation(_) => "no_reservation",
            EngineError::ReservationNotFound(_) => "reservation_not_found",
            EngineError::AlreadyBooked(_) => "already_booked",
            EngineError::DayFull { .. } => "day_full",
            EngineError::HasBookings { .. } => "has_bookings",
            EngineError::Forbidden => "forbidden",
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::Unavailable(_) => "unavailable",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::FestivalNotFound => write!(f, "no festival provisioned"),
            EngineError::DayNotFound(id) => write!(f, "day not found: {id}"),
            EngineError::UserNotFound(key) => write!(f, "user not found: {key}"),
            EngineError::NoReservation(user_id) => {
                write!(f, "no active reservation for user {user_id}")
            }
            EngineError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::AlreadyBooked(user_id) => {
                write!(f, "user {user_id} already holds a reservation")
            }
            EngineError::DayFull { day, capacity } => {
                write!(f, "day {day} is fully booked (capacity {capacity})")
            }
            EngineError::HasBookings { day, count } => {
                write!(f, "day {day} still has {count} active reservations")
            }
            EngineError::Forbidden => write!(f, "administrative capability required"),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateReservation(user_id) => EngineError::AlreadyBooked(user_id),
            StoreError::Unavailable(msg) => EngineError::Unavailable(msg),
        }
    }
}
