//! In-memory session store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Mutex;

use super::SessionStore;
use crate::auth::AuthError;
use crate::models::auth::RefreshTokenRecord;

/// Session store over a concurrent hash map.
///
/// Conditional revocation happens under the entry's shard lock, so it is
/// atomic with respect to other writers of the same record. Rotation and
/// revoke-all additionally hold a per-user lock, so a revoke-all never runs
/// between the two halves of a rotation.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: DashMap<String, RefreshTokenRecord>,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records, revoked and expired included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    fn insert_new(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        match self.records.entry(record.token_hash.clone()) {
            Entry::Occupied(_) => Err(AuthError::Internal(
                "refresh token hash already stored".into(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    fn revoke_active(&self, token_hash: &str, now: DateTime<Utc>) -> bool {
        match self.records.get_mut(token_hash) {
            Some(mut record) if record.is_active(now) => {
                record.revoked_at = Some(now);
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        self.insert_new(record)
    }

    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AuthError> {
        Ok(self.records.get(token_hash).map(|r| r.clone()))
    }

    async fn revoke(&self, token_hash: &str, at: DateTime<Utc>) -> Result<bool, AuthError> {
        match self.records.get_mut(token_hash) {
            Some(mut record) => {
                record.revoked_at.get_or_insert(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_if_active(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        Ok(self.revoke_active(token_hash, now))
    }

    async fn rotate(
        &self,
        old_hash: &str,
        replacement: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let lock = self.user_lock(&replacement.user_id);
        let _guard = lock.lock().await;
        if !self.revoke_active(old_hash, now) {
            return Ok(false);
        }
        self.insert_new(replacement)?;
        Ok(true)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        let mut revoked = 0;
        for mut record in self.records.iter_mut() {
            if record.user_id == user_id && record.revoked_at.is_none() {
                record.revoked_at = Some(at);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn list_active_for_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let mut records: Vec<RefreshTokenRecord> = self
            .records
            .iter()
            .filter(|r| r.user_id == user_id && r.is_active(now))
            .map(|r| r.clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn count_active_for_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.user_id == user_id && r.is_active(now))
            .count() as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let before = self.records.len();
        self.records.retain(|_, r| !r.is_expired(now));
        Ok((before - self.records.len()) as u64)
    }
}
