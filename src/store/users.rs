//! User record types and the store contract

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::game::UserId;

/// Persisted user record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub loses: u32,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Which counter to bump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Wins,
    Loses,
}

/// Lookup and atomic counter updates, as offered by the user service.
///
/// Increments must be atomic per identity and safe to run concurrently for
/// different identities.
pub trait UserStore: Send + Sync {
    fn find_by_id(&self, user_id: UserId) -> BoxFuture<'_, Result<Option<UserRecord>, StoreError>>;

    fn increment(&self, user_id: UserId, stat: StatKind) -> BoxFuture<'_, Result<(), StoreError>>;

    fn increment_win(&self, user_id: UserId) -> BoxFuture<'_, Result<(), StoreError>> {
        self.increment(user_id, StatKind::Wins)
    }

    fn increment_loss(&self, user_id: UserId) -> BoxFuture<'_, Result<(), StoreError>> {
        self.increment(user_id, StatKind::Loses)
    }
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("User {0} not found")]
    NotFound(UserId),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
