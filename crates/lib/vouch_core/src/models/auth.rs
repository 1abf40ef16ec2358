//! Authentication domain models.
//!
//! These are internal domain models; transports map them onto their own
//! request/response types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain user identity carried into issued tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    pub role: String,
}

/// User identity with password hash (for login).
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: UserIdentity,
    pub password_hash: Option<String>,
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user id (standard JWT `sub` claim).
    pub sub: String,
    /// User email.
    pub email: String,
    /// User role.
    pub role: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Id of the signing key; travels in the token header, not the payload.
    #[serde(skip)]
    pub kid: String,
}

/// Refresh token record stored through a [`SessionStore`](crate::auth::store::SessionStore).
///
/// The opaque token value itself is never stored; `token_hash` is its SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub token_hash: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RefreshTokenRecord {
    /// Active iff not revoked and not yet expired at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }

    /// Whether the record has passed its expiry at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Access + refresh token pair handed back to the caller.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("access_expires_at", &self.access_expires_at)
            .finish()
    }
}

/// Lifecycle state of a signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// Used for new signatures and verification.
    Active,
    /// Verification only.
    Retiring,
    /// Fails all verification.
    Revoked,
}

/// A symmetric signing key and its metadata.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    pub id: String,
    pub material: Vec<u8>,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
    pub status: KeyStatus,
    pub version: u32,
}

impl SigningKey {
    /// Whether tokens signed by this key may still be verified.
    pub fn is_verifiable(&self) -> bool {
        self.status != KeyStatus::Revoked
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("material", &format_args!("<{} bytes>", self.material.len()))
            .field("algorithm", &self.algorithm)
            .field("created_at", &self.created_at)
            .field("status", &self.status)
            .field("version", &self.version)
            .finish()
    }
}
