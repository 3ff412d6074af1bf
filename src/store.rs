use std::io;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc, oneshot};
use ulid::Ulid;

use crate::journal::Journal;
use crate::model::*;
use crate::observability;

#[derive(Debug)]
pub enum StoreError {
    /// Conditional insert rejected: the user already holds a reservation.
    DuplicateReservation(Ulid),
    /// The backing medium failed or is unreachable.
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DuplicateReservation(user_id) => {
                write!(f, "reservation already exists for user {user_id}")
            }
            StoreError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Document-store contract the engine is written against.
///
/// Per collection: find-one, find-many, count-matching, insert-one,
/// update-one (match-and-set), delete-one. The reservation insert is
/// conditional (match-if-absent on user id) so the one-booking-per-user
/// invariant holds even against callers that bypass the engine's locks.
/// Failures surface as `Unavailable`; the engine never retries.
#[async_trait]
pub trait Store: Send + Sync {
    // ── festivals ────────────────────────────────────────────
    async fn find_festival(&self) -> Result<Option<Festival>, StoreError>;
    async fn upsert_festival(&self, festival: Festival) -> Result<(), StoreError>;

    // ── days ─────────────────────────────────────────────────
    async fn find_day(&self, id: Ulid) -> Result<Option<Day>, StoreError>;
    async fn list_days(&self) -> Result<Vec<Day>, StoreError>;
    async fn upsert_day(&self, day: Day) -> Result<(), StoreError>;
    /// Returns whether a matching day existed.
    async fn delete_day(&self, id: Ulid) -> Result<bool, StoreError>;

    // ── users ────────────────────────────────────────────────
    async fn find_user(&self, id: Ulid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn upsert_user(&self, user: User) -> Result<(), StoreError>;
    /// Match-and-set keyed by identity-provider subject: bumps the existing
    /// account's `updated_at`, or inserts a fresh account for a new subject.
    async fn upsert_login(&self, profile: &LoginProfile, now: Ms) -> Result<User, StoreError>;

    // ── reservations ─────────────────────────────────────────
    async fn find_reservation_for_user(
        &self,
        user_id: Ulid,
    ) -> Result<Option<Reservation>, StoreError>;
    async fn find_reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError>;
    async fn list_reservations(&self) -> Result<Vec<Reservation>, StoreError>;
    /// Count-matching on day id, optionally excluding one user's own record
    /// (the move path counts this way).
    async fn count_reservations_for_day(
        &self,
        day_id: Ulid,
        excluding_user: Option<Ulid>,
    ) -> Result<u64, StoreError>;
    /// Conditional insert: fails with `DuplicateReservation` when the user
    /// already holds one.
    async fn insert_reservation(&self, reservation: Reservation) -> Result<(), StoreError>;
    /// Match-and-set: re-point the user's reservation at a new day (and
    /// festival). Returns the updated record, or `None` when nothing matched.
    async fn update_reservation_day(
        &self,
        user_id: Ulid,
        day_id: Ulid,
        festival_id: Ulid,
        updated_at: Ms,
    ) -> Result<Option<Reservation>, StoreError>;
    /// Hard delete by owner. Returns the removed record.
    async fn delete_reservation_for_user(
        &self,
        user_id: Ulid,
    ) -> Result<Option<Reservation>, StoreError>;
    /// Hard delete by reservation id. Returns the removed record.
    async fn delete_reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError>;
}

// ── Group-commit journal channel ─────────────────────────────────

enum JournalCommand {
    Append {
        change: Change,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        changes: Vec<Change>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends: block for the
/// first append, drain whatever else is immediately queued, fsync once for
/// the whole batch, then answer every waiting caller.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { change, response } => {
                let mut batch = vec![(change, response)];
                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { change, response }) => {
                            batch.push((change, response));
                        }
                        Ok(other) => {
                            flush_and_respond(&mut journal, &mut batch);
                            handle_non_append(&mut journal, other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                if !batch.is_empty() {
                    flush_and_respond(&mut journal, &mut batch);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

fn flush_and_respond(
    journal: &mut Journal,
    batch: &mut Vec<(Change, oneshot::Sender<io::Result<()>>)>,
) {
    metrics::histogram!(observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut append_err: Option<io::Error> = None;
    for (change, _) in batch.iter() {
        if let Err(e) = journal.append_buffered(change) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partially buffered bytes don't
    // leak into the next batch (these callers are all told the batch failed).
    let flush_err = journal.flush_sync().err();
    let result = match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    };

    metrics::histogram!(observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { changes, response } => {
            let result = Journal::write_compact_file(journal.path(), &changes)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

// ── WAL-backed in-memory document store ──────────────────────────

/// Document store holding every collection in memory, durably journaled to
/// an append-only change log. Opening replays the journal to rebuild state.
pub struct MemoryStore {
    festivals: DashMap<Ulid, Festival>,
    days: DashMap<Ulid, Day>,
    users: DashMap<Ulid, User>,
    /// Identity-provider subject → user id.
    subject_index: DashMap<String, Ulid>,
    /// Keyed by owning user id; the map key itself carries the
    /// one-reservation-per-user shape.
    reservations: DashMap<Ulid, Reservation>,
    /// Reverse lookup: reservation id → owning user id.
    reservation_index: DashMap<Ulid, Ulid>,
    /// Serializes account creation for new subjects.
    login_gate: Mutex<()>,
    journal_tx: mpsc::Sender<JournalCommand>,
}

impl MemoryStore {
    /// Open the store at `path`, replaying any existing journal.
    pub fn open(path: &Path) -> io::Result<Self> {
        let changes = Journal::replay(path)?;
        let journal = Journal::open(path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let store = Self {
            festivals: DashMap::new(),
            days: DashMap::new(),
            users: DashMap::new(),
            subject_index: DashMap::new(),
            reservations: DashMap::new(),
            reservation_index: DashMap::new(),
            login_gate: Mutex::new(()),
            journal_tx,
        };
        for change in &changes {
            store.apply(change);
        }
        Ok(store)
    }

    /// Apply one change to the in-memory collections. Used for replay and
    /// for committed live mutations; must stay idempotent for replay.
    fn apply(&self, change: &Change) {
        match change {
            Change::FestivalUpserted { festival } => {
                self.festivals.insert(festival.id, festival.clone());
            }
            Change::DayUpserted { day } => {
                self.days.insert(day.id, day.clone());
            }
            Change::DayDeleted { id } => {
                self.days.remove(id);
            }
            Change::UserUpserted { user } => {
                self.subject_index.insert(user.subject.clone(), user.id);
                self.users.insert(user.id, user.clone());
            }
            Change::ReservationCreated { reservation } => {
                self.reservation_index
                    .insert(reservation.id, reservation.user_id);
                self.reservations
                    .insert(reservation.user_id, reservation.clone());
            }
            Change::ReservationMoved {
                user_id,
                day_id,
                festival_id,
                updated_at,
                ..
            } => {
                if let Some(mut r) = self.reservations.get_mut(user_id) {
                    r.day_id = *day_id;
                    r.festival_id = *festival_id;
                    r.updated_at = *updated_at;
                }
            }
            Change::ReservationDeleted { id, user_id } => {
                self.reservations.remove(user_id);
                self.reservation_index.remove(id);
            }
        }
    }

    /// Durably journal one change through the group-commit writer.
    async fn commit(&self, change: Change) -> Result<Change, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                change: change.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Unavailable("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("journal writer dropped response".into()))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(change)
    }

    /// Rewrite the journal down to the minimal change set that recreates
    /// current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let mut changes = Vec::new();
        for e in self.festivals.iter() {
            changes.push(Change::FestivalUpserted {
                festival: e.value().clone(),
            });
        }
        for e in self.days.iter() {
            changes.push(Change::DayUpserted {
                day: e.value().clone(),
            });
        }
        for e in self.users.iter() {
            changes.push(Change::UserUpserted {
                user: e.value().clone(),
            });
        }
        for e in self.reservations.iter() {
            changes.push(Change::ReservationCreated {
                reservation: e.value().clone(),
            });
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact {
                changes,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Unavailable("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("journal writer dropped response".into()))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_festival(&self) -> Result<Option<Festival>, StoreError> {
        Ok(self.festivals.iter().next().map(|e| e.value().clone()))
    }

    async fn upsert_festival(&self, festival: Festival) -> Result<(), StoreError> {
        let change = self.commit(Change::FestivalUpserted { festival }).await?;
        self.apply(&change);
        Ok(())
    }

    async fn find_day(&self, id: Ulid) -> Result<Option<Day>, StoreError> {
        Ok(self.days.get(&id).map(|e| e.value().clone()))
    }

    async fn list_days(&self) -> Result<Vec<Day>, StoreError> {
        Ok(self.days.iter().map(|e| e.value().clone()).collect())
    }

    async fn upsert_day(&self, day: Day) -> Result<(), StoreError> {
        let change = self.commit(Change::DayUpserted { day }).await?;
        self.apply(&change);
        Ok(())
    }

    async fn delete_day(&self, id: Ulid) -> Result<bool, StoreError> {
        if !self.days.contains_key(&id) {
            return Ok(false);
        }
        let change = self.commit(Change::DayDeleted { id }).await?;
        self.apply(&change);
        Ok(true)
    }

    async fn find_user(&self, id: Ulid) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).map(|e| e.value().clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|e| e.value().email.eq_ignore_ascii_case(email))
            .map(|e| e.value().clone()))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.users.iter().map(|e| e.value().clone()).collect())
    }

    async fn upsert_user(&self, user: User) -> Result<(), StoreError> {
        let change = self.commit(Change::UserUpserted { user }).await?;
        self.apply(&change);
        Ok(())
    }

    async fn upsert_login(&self, profile: &LoginProfile, now: Ms) -> Result<User, StoreError> {
        let _gate = self.login_gate.lock().await;

        let existing = self
            .subject_index
            .get(&profile.subject)
            .map(|e| *e.value())
            .and_then(|uid| self.users.get(&uid).map(|e| e.value().clone()));

        let user = match existing {
            Some(mut user) => {
                // Repeat login: only the timestamp moves.
                user.updated_at = now;
                user
            }
            None => User {
                id: Ulid::new(),
                subject: profile.subject.clone(),
                email: profile.email.clone(),
                name: profile.name.clone(),
                notify_opt_in: true,
                is_admin: false,
                created_at: now,
                updated_at: now,
            },
        };

        let change = self.commit(Change::UserUpserted { user: user.clone() }).await?;
        self.apply(&change);
        Ok(user)
    }

    async fn find_reservation_for_user(
        &self,
        user_id: Ulid,
    ) -> Result<Option<Reservation>, StoreError> {
        Ok(self.reservations.get(&user_id).map(|e| e.value().clone()))
    }

    async fn find_reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError> {
        let Some(user_id) = self.reservation_index.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self.reservations.get(&user_id).map(|e| e.value().clone()))
    }

    async fn list_reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.reservations.iter().map(|e| e.value().clone()).collect())
    }

    async fn count_reservations_for_day(
        &self,
        day_id: Ulid,
        excluding_user: Option<Ulid>,
    ) -> Result<u64, StoreError> {
        // Collection scan, like the original's count-matching query. The
        // reservation set is festival-sized, not internet-sized.
        Ok(self
            .reservations
            .iter()
            .filter(|e| e.value().day_id == day_id)
            .filter(|e| excluding_user.is_none_or(|uid| e.value().user_id != uid))
            .count() as u64)
    }

    async fn insert_reservation(&self, reservation: Reservation) -> Result<(), StoreError> {
        if self.reservations.contains_key(&reservation.user_id) {
            return Err(StoreError::DuplicateReservation(reservation.user_id));
        }
        let change = self.commit(Change::ReservationCreated { reservation }).await?;
        self.apply(&change);
        Ok(())
    }

    async fn update_reservation_day(
        &self,
        user_id: Ulid,
        day_id: Ulid,
        festival_id: Ulid,
        updated_at: Ms,
    ) -> Result<Option<Reservation>, StoreError> {
        let Some(existing) = self.reservations.get(&user_id).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        let change = self
            .commit(Change::ReservationMoved {
                id: existing.id,
                user_id,
                day_id,
                festival_id,
                updated_at,
            })
            .await?;
        self.apply(&change);
        Ok(self.reservations.get(&user_id).map(|e| e.value().clone()))
    }

    async fn delete_reservation_for_user(
        &self,
        user_id: Ulid,
    ) -> Result<Option<Reservation>, StoreError> {
        let Some(existing) = self.reservations.get(&user_id).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        let change = self
            .commit(Change::ReservationDeleted {
                id: existing.id,
                user_id,
            })
            .await?;
        self.apply(&change);
        Ok(Some(existing))
    }

    async fn delete_reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError> {
        let Some(user_id) = self.reservation_index.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        self.delete_reservation_for_user(user_id).await
    }
}
