//! Refresh-token persistence.
//!
//! Records are keyed by the SHA-256 digest of the token value. The one
//! concurrency requirement on a store is [`SessionStore::revoke_if_active`]:
//! of two concurrent calls for the same active record exactly one may report
//! success.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemorySessionStore;
pub use postgres::PgSessionStore;

use super::AuthError;
use crate::models::auth::RefreshTokenRecord;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new record. Fails if the token hash already exists.
    async fn create(&self, record: &RefreshTokenRecord) -> Result<(), AuthError>;

    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AuthError>;

    /// Set `revoked_at` if still unset. Returns whether the record exists.
    async fn revoke(&self, token_hash: &str, at: DateTime<Utc>) -> Result<bool, AuthError>;

    /// Revoke only if the record is active at `now`. Returns whether this call
    /// performed the transition.
    async fn revoke_if_active(&self, token_hash: &str, now: DateTime<Utc>)
    -> Result<bool, AuthError>;

    /// Revoke `old_hash` and persist `replacement` as one step. Returns false,
    /// creating nothing, when `old_hash` was no longer active.
    async fn rotate(
        &self,
        old_hash: &str,
        replacement: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        if !self.revoke_if_active(old_hash, now).await? {
            return Ok(false);
        }
        self.create(replacement).await?;
        Ok(true)
    }

    /// Revoke every unrevoked record of `user_id`. Returns how many changed.
    async fn revoke_all_for_user(&self, user_id: &str, at: DateTime<Utc>)
    -> Result<u64, AuthError>;

    /// Active records of `user_id`, oldest first.
    async fn list_active_for_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, AuthError>;

    async fn count_active_for_user(&self, user_id: &str, now: DateTime<Utc>)
    -> Result<u64, AuthError>;

    /// Remove records expired at `now`. Returns how many were removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError>;
}
