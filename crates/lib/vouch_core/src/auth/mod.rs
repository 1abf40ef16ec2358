//! Authentication and session lifecycle.
//!
//! Provides password hashing, signing-key management, access/refresh token
//! issuance and the login/refresh/logout orchestration shared by every
//! transport that sits on top of the core.

pub mod events;
pub mod jwt;
pub mod keys;
pub mod password;
pub mod secrets;
pub mod session;
pub mod store;
pub mod users;

use thiserror::Error;

/// Coarse error category used by callers to decide between rejecting a
/// request outright and retrying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input: empty password, unparsable hash, bad key material.
    Validation,
    /// Wrong password, or an invalid/expired/revoked token.
    Authentication,
    /// The operation is not supported by the configured key manager.
    Authorization,
    /// Unknown key id or refresh token.
    NotFound,
    /// Store or remote secret source failure.
    Internal,
}

/// Authentication errors.
///
/// Messages never carry passwords, key bytes or raw token values.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Password must not be empty")]
    EmptyPassword,

    #[error("Invalid password hash encoding")]
    InvalidHash,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Signing key must not be empty")]
    SigningKeyEmpty,

    #[error("Signing key too short: {len} bytes, minimum is {min}")]
    SigningKeyTooShort { len: usize, min: usize },

    #[error("Key rotation is not supported by this key manager")]
    RotationNotSupported,

    #[error("Key revocation is not supported by this key manager")]
    RevocationNotSupported,

    #[error("Signing key not found: {0}")]
    KeyNotFound(String),

    #[error("Signing key revoked: {0}")]
    KeyRevoked(String),

    #[error("Invalid access token")]
    InvalidAccessToken,

    #[error("Access token expired")]
    AccessTokenExpired,

    #[error("Refresh token not found")]
    RefreshTokenNotFound,

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Refresh token revoked")]
    RefreshTokenRevoked,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Secret source error: {0}")]
    SecretSource(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Classify this error into the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::EmptyPassword
            | AuthError::InvalidHash
            | AuthError::SigningKeyEmpty
            | AuthError::SigningKeyTooShort { .. }
            | AuthError::ValidationError(_) => ErrorKind::Validation,

            AuthError::InvalidPassword
            | AuthError::InvalidCredentials
            | AuthError::KeyRevoked(_)
            | AuthError::InvalidAccessToken
            | AuthError::AccessTokenExpired
            | AuthError::RefreshTokenExpired
            | AuthError::RefreshTokenRevoked => ErrorKind::Authentication,

            AuthError::RotationNotSupported | AuthError::RevocationNotSupported => {
                ErrorKind::Authorization
            }

            AuthError::KeyNotFound(_) | AuthError::RefreshTokenNotFound => ErrorKind::NotFound,

            AuthError::DbError(_) | AuthError::SecretSource(_) | AuthError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the failure is infrastructural and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}
