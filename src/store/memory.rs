//! In-process user store, for local runs without a user service

use dashmap::DashMap;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::game::UserId;

use super::users::{StatKind, StoreError, UserRecord, UserStore};

#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<UserId, UserRecord>,
    /// Create a record for any identity on first lookup
    open: bool,
    /// When set, every counter update fails
    failing: AtomicBool,
}

impl MemoryUserStore {
    /// Only seeded users exist
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every identity exists; records are created on first lookup
    pub fn open() -> Self {
        Self {
            open: true,
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn insert(&self, record: UserRecord) {
        self.users.insert(record.id, record);
    }

    /// Seed a bare record with zeroed counters
    #[cfg(test)]
    pub fn insert_user(&self, user_id: UserId, name: &str) {
        self.insert(fresh_record(user_id, name));
    }

    pub fn get(&self, user_id: UserId) -> Option<UserRecord> {
        self.users.get(&user_id).map(|r| r.value().clone())
    }

    fn lookup(&self, user_id: UserId) -> Option<UserRecord> {
        if self.open {
            self.users
                .entry(user_id)
                .or_insert_with(|| fresh_record(user_id, &format!("Player_{}", user_id)));
        }
        self.get(user_id)
    }

    /// Simulate an outage of the update path
    #[cfg(test)]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    fn bump(&self, user_id: UserId, stat: StatKind) -> Result<(), StoreError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store set to fail".to_string()));
        }

        // The entry guard holds the shard lock for the whole update
        let mut record = self
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound(user_id))?;
        match stat {
            StatKind::Wins => record.wins += 1,
            StatKind::Loses => record.loses += 1,
        }
        record.updated_at = Some(chrono::Utc::now());
        Ok(())
    }
}

fn fresh_record(user_id: UserId, name: &str) -> UserRecord {
    UserRecord {
        id: user_id,
        name: name.to_string(),
        email: format!("{}@local", name.to_lowercase()),
        wins: 0,
        loses: 0,
        created_at: Some(chrono::Utc::now()),
        updated_at: None,
    }
}

impl UserStore for MemoryUserStore {
    fn find_by_id(&self, user_id: UserId) -> BoxFuture<'_, Result<Option<UserRecord>, StoreError>> {
        future::ready(Ok(self.lookup(user_id))).boxed()
    }

    fn increment(&self, user_id: UserId, stat: StatKind) -> BoxFuture<'_, Result<(), StoreError>> {
        future::ready(self.bump(user_id, stat)).boxed()
    }
}
