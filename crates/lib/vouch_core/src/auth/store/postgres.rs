//! Postgres session store over the `refresh_tokens` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::SessionStore;
use crate::auth::AuthError;
use crate::models::auth::RefreshTokenRecord;

/// (id, token_hash, user_id, created_at, expires_at, revoked_at, ip, user_agent)
type RecordRow = (
    Uuid,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<String>,
    Option<String>,
);

const SELECT_RECORD: &str = "SELECT id, token_hash, user_id::text, created_at, expires_at, \
                             revoked_at, ip, user_agent FROM refresh_tokens";

fn from_row(row: RecordRow) -> RefreshTokenRecord {
    let (id, token_hash, user_id, created_at, expires_at, revoked_at, ip, user_agent) = row;
    RefreshTokenRecord {
        id,
        token_hash,
        user_id,
        created_at,
        expires_at,
        revoked_at,
        ip,
        user_agent,
    }
}

/// Session store backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        record: &RefreshTokenRecord,
    ) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO refresh_tokens \
             (id, token_hash, user_id, created_at, expires_at, revoked_at, ip, user_agent) \
             VALUES ($1, $2, $3::uuid, $4, $5, $6, $7, $8)",
        )
        .bind(record.id)
        .bind(&record.token_hash)
        .bind(&record.user_id)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.revoked_at)
        .bind(&record.ip)
        .bind(&record.user_agent)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Serialise rotation and revoke-all for one user until the transaction ends.
    async fn lock_user(tx: &mut Transaction<'_, Postgres>, user_id: &str) -> Result<(), AuthError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn conditional_revoke(
        tx: &mut Transaction<'_, Postgres>,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 \
             WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > $2",
        )
        .bind(token_hash)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        let mut tx = self.pool.begin().await?;
        Self::insert(&mut tx, record).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let row = sqlx::query_as::<_, RecordRow>(&format!("{SELECT_RECORD} WHERE token_hash = $1"))
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(from_row))
    }

    async fn revoke(&self, token_hash: &str, at: DateTime<Utc>) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = COALESCE(revoked_at, $2) \
             WHERE token_hash = $1",
        )
        .bind(token_hash)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_if_active(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let mut tx = self.pool.begin().await?;
        let won = Self::conditional_revoke(&mut tx, token_hash, now).await?;
        tx.commit().await?;
        Ok(won)
    }

    /// Revoke and insert in one transaction under the user's advisory lock.
    /// The row lock taken by the conditional `UPDATE` serialises concurrent
    /// redemptions of one token.
    async fn rotate(
        &self,
        old_hash: &str,
        replacement: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_user(&mut tx, &replacement.user_id).await?;
        if !Self::conditional_revoke(&mut tx, old_hash, now).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        Self::insert(&mut tx, replacement).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let Ok(id) = Uuid::parse_str(user_id) else {
            return Ok(0);
        };
        let mut tx = self.pool.begin().await?;
        Self::lock_user(&mut tx, user_id).await?;
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 \
             WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn list_active_for_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let Ok(id) = Uuid::parse_str(user_id) else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            "{SELECT_RECORD} WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > $2 \
             ORDER BY created_at"
        ))
        .bind(id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn count_active_for_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let Ok(id) = Uuid::parse_str(user_id) else {
            return Ok(0);
        };
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM refresh_tokens \
             WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > $2",
        )
        .bind(id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
