mod error;
mod index;
mod ledger;
mod mutations;
mod queries;
mod validate;

pub use error::EngineError;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;
use ulid::Ulid;

use crate::auth::Principal;
use crate::model::{Day, User};
use crate::notify::{DayContext, Notice, NoticeKind, NotifyHub};
use crate::store::Store;

/// Mutual-exclusion scope key. Capacity checks serialize per day,
/// uniqueness checks per user; an operation takes every scope it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(super) enum LockKey {
    Day(Ulid),
    User(Ulid),
}

/// The reservation engine. Holds no domain state of its own — every read
/// and write goes to the store — only the lock table that makes each
/// check-then-write sequence atomic against concurrent requests.
pub struct Engine {
    pub(super) store: Arc<dyn Store>,
    notify: Arc<NotifyHub>,
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl Engine {
    /// The store client is constructed and owned by the surrounding service
    /// bootstrap; the engine only borrows its lifetime through the Arc.
    pub fn new(store: Arc<dyn Store>, notify: Arc<NotifyHub>) -> Self {
        Self {
            store,
            notify,
            locks: DashMap::new(),
        }
    }

    /// Acquire the given scopes, sorted and deduplicated so every caller
    /// takes locks in the same global order (no deadlocks). Guards are held
    /// for the whole check-and-write of the calling operation.
    pub(super) async fn lock_scopes(
        &self,
        mut keys: Vec<LockKey>,
    ) -> Vec<tokio::sync::OwnedMutexGuard<()>> {
        keys.sort_unstable();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let lock = self
                .locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    pub(super) fn require_admin(principal: &Principal) -> Result<(), EngineError> {
        if principal.is_admin {
            Ok(())
        } else {
            Err(EngineError::Forbidden)
        }
    }

    /// Publish a notice for a committed mutation. Opt-outs are honored
    /// here so no caller has to remember the flag.
    pub(super) fn emit_notice(&self, kind: NoticeKind, user: &User, day: &Day) {
        if !user.notify_opt_in {
            debug!(user = %user.id, "notice suppressed: user opted out");
            return;
        }
        self.notify.send(Notice {
            kind,
            recipient: user.email.clone(),
            day: DayContext {
                date: day.date,
                theme: day.theme.clone(),
            },
        });
    }
}
