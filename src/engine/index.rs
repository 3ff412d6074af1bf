//! User reservation index: at most one active reservation per user.

use ulid::Ulid;

use crate::model::Reservation;

use super::{Engine, EngineError};

impl Engine {
    /// Does this user already hold an active reservation, and on which day?
    pub async fn active_reservation(
        &self,
        user_id: Ulid,
    ) -> Result<Option<Reservation>, EngineError> {
        Ok(self.store.find_reservation_for_user(user_id).await?)
    }
}
