//! User lookups needed by login and refresh.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::{UserCredentials, UserIdentity};

/// Role claimed by users without an explicit role grant.
pub const DEFAULT_ROLE: &str = "user";

/// Read-only view of user accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Identity and password hash for the account registered under `email`.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, AuthError>;

    /// Identity for `user_id`.
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserIdentity>, AuthError>;
}

/// In-memory directory keyed by email.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: DashMap<String, UserCredentials>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user.
    pub fn insert(&self, user: UserIdentity, password_hash: Option<String>) {
        self.users.insert(
            user.email.clone(),
            UserCredentials {
                user,
                password_hash,
            },
        );
    }

    /// Replace a user's password hash. Returns false for unknown emails.
    pub fn set_password_hash(&self, email: &str, password_hash: String) -> bool {
        match self.users.get_mut(email) {
            Some(mut entry) => {
                entry.password_hash = Some(password_hash);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, email: &str) {
        self.users.remove(email);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, AuthError> {
        Ok(self.users.get(email).map(|entry| entry.clone()))
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserIdentity>, AuthError> {
        Ok(self
            .users
            .iter()
            .find(|entry| entry.user.id == user_id)
            .map(|entry| entry.user.clone()))
    }
}

/// Postgres-backed directory over the `users` and `user_roles` tables.
#[derive(Debug, Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// (id, email, password_hash, role)
type UserRow = (String, String, Option<String>, Option<String>);

fn identity(id: String, email: String, role: Option<String>) -> UserIdentity {
    UserIdentity {
        id,
        email,
        role: role.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT u.id::text, u.email, u.password_hash, \
                    (SELECT r.role FROM user_roles r WHERE r.user_id = u.id ORDER BY r.role LIMIT 1) \
             FROM users u WHERE u.email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, email, password_hash, role)| UserCredentials {
            user: identity(id, email, role),
            password_hash,
        }))
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserIdentity>, AuthError> {
        let Ok(id) = Uuid::parse_str(user_id) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT u.id::text, u.email, NULL::text, \
                    (SELECT r.role FROM user_roles r WHERE r.user_id = u.id ORDER BY r.role LIMIT 1) \
             FROM users u WHERE u.id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, email, _, role)| identity(id, email, role)))
    }
}
