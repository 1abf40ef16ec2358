//! Session lifecycle: login, refresh-token rotation, logout.
//!
//! Each refresh token maps to one [`RefreshTokenRecord`]. A record is active
//! until it is redeemed (revoked and superseded by a new record), explicitly
//! logged out, or passes its expiry. Callers cannot tell those terminal
//! states apart beyond the error returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AuthError;
use super::events::{EventSink, SessionEvent};
use super::jwt::{TokenIssuer, hash_refresh_token};
use super::keys::build_key_manager;
use super::password::PasswordHasher;
use super::store::SessionStore;
use super::users::UserDirectory;
use crate::config::AuthConfig;
use crate::models::auth::{RefreshTokenRecord, TokenPair, UserCredentials, UserIdentity};

/// Password hashed once at startup so unknown-user logins cost the same as
/// wrong-password logins.
const DUMMY_PASSWORD: &str = "vouch-timing-equaliser";

/// Where a request came from; stored alongside the refresh token.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientInfo<'a> {
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

impl<'a> ClientInfo<'a> {
    pub fn new(ip: Option<&'a str>, user_agent: Option<&'a str>) -> Self {
        Self { ip, user_agent }
    }
}

/// Orchestrates credential checks, token issuance and refresh-token storage.
pub struct SessionLifecycleManager {
    hasher: PasswordHasher,
    issuer: TokenIssuer,
    store: Arc<dyn SessionStore>,
    users: Arc<dyn UserDirectory>,
    events: Arc<dyn EventSink>,
    reuse_detection: bool,
    dummy_hash: String,
}

impl SessionLifecycleManager {
    pub fn new(
        hasher: PasswordHasher,
        issuer: TokenIssuer,
        store: Arc<dyn SessionStore>,
        users: Arc<dyn UserDirectory>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, AuthError> {
        let dummy_hash = hasher.hash(DUMMY_PASSWORD)?;
        Ok(Self {
            hasher,
            issuer,
            store,
            users,
            events,
            reuse_detection: false,
            dummy_hash,
        })
    }

    /// Build every component from `config`, selecting the key manager once.
    pub async fn from_config(
        config: &AuthConfig,
        store: Arc<dyn SessionStore>,
        users: Arc<dyn UserDirectory>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, AuthError> {
        let keys = build_key_manager(&config.keys).await?;
        let issuer = TokenIssuer::new(keys, config.tokens);
        Ok(Self::new(PasswordHasher::new(config.hash), issuer, store, users, events)?
            .with_reuse_detection(config.reuse_detection))
    }

    /// When enabled, replaying a revoked refresh token revokes every session
    /// of its owner.
    pub fn with_reuse_detection(mut self, enabled: bool) -> Self {
        self.reuse_detection = enabled;
        self
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Authenticate with email + password and open a new session.
    ///
    /// Unknown users and wrong passwords both yield
    /// [`AuthError::InvalidCredentials`].
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: ClientInfo<'_>,
    ) -> Result<TokenPair, AuthError> {
        if password.is_empty() {
            return Err(AuthError::EmptyPassword);
        }

        let (user, password_hash) = match self.users.find_by_email(email).await? {
            Some(UserCredentials {
                user,
                password_hash: Some(hash),
            }) => (user, hash),
            _ => {
                // Same work as a real verification; the outcome is irrelevant.
                let _ = self.hasher.verify(&self.dummy_hash, password);
                debug!("login for unknown user or user without password");
                return Err(AuthError::InvalidCredentials);
            }
        };

        match self.hasher.verify(&password_hash, password) {
            Ok(()) => {}
            Err(AuthError::InvalidPassword) => {
                debug!(user_id = %user.id, "login with wrong password");
                return Err(AuthError::InvalidCredentials);
            }
            Err(AuthError::InvalidHash) => {
                warn!(user_id = %user.id, "stored password hash is malformed");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        }

        if self.hasher.needs_rehash(&password_hash) {
            info!(user_id = %user.id, "password hash uses outdated parameters");
        }

        let (pair, record) = self.open_session(&user, client).await?;
        self.store.create(&record).await?;
        info!(user_id = %user.id, session_id = %record.id, "user logged in");

        self.notify(SessionEvent::LoggedIn {
            user_id: user.id,
            ip: record.ip,
            user_agent: record.user_agent,
            at: record.created_at,
        })
        .await;
        Ok(pair)
    }

    /// Redeem a refresh token for a new token pair (single-use rotation).
    ///
    /// Of two concurrent redemptions of the same token exactly one succeeds;
    /// the other gets [`AuthError::RefreshTokenRevoked`] and creates nothing.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: ClientInfo<'_>,
    ) -> Result<TokenPair, AuthError> {
        let token_hash = hash_refresh_token(refresh_token);
        let record = self
            .store
            .get_by_hash(&token_hash)
            .await?
            .ok_or(AuthError::RefreshTokenNotFound)?;

        let now = Utc::now();
        if record.is_expired(now) {
            debug!(user_id = %record.user_id, "expired refresh token presented");
            return Err(AuthError::RefreshTokenExpired);
        }
        if record.revoked_at.is_some() {
            self.on_revoked_token_replay(&record, now).await;
            return Err(AuthError::RefreshTokenRevoked);
        }

        let user = match self.users.find_by_id(&record.user_id).await? {
            Some(user) => user,
            None => {
                debug!(user_id = %record.user_id, "refresh for missing user");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let (pair, replacement) = self.open_session(&user, client).await?;
        if !self.store.rotate(&token_hash, &replacement, now).await? {
            debug!(user_id = %user.id, "refresh token lost rotation race");
            return Err(AuthError::RefreshTokenRevoked);
        }
        info!(
            user_id = %user.id,
            session_id = %replacement.id,
            superseded = %record.id,
            "refresh token rotated"
        );

        self.notify(SessionEvent::Refreshed {
            user_id: user.id,
            ip: replacement.ip,
            user_agent: replacement.user_agent,
            at: replacement.created_at,
        })
        .await;
        Ok(pair)
    }

    /// Revoke a single refresh token. Revoking twice is not an error.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let token_hash = hash_refresh_token(refresh_token);
        let record = self
            .store
            .get_by_hash(&token_hash)
            .await?
            .ok_or(AuthError::RefreshTokenNotFound)?;

        let now = Utc::now();
        if !self.store.revoke(&token_hash, now).await? {
            return Err(AuthError::RefreshTokenNotFound);
        }
        info!(user_id = %record.user_id, session_id = %record.id, "user logged out");

        self.notify(SessionEvent::LoggedOut {
            user_id: record.user_id,
            at: now,
        })
        .await;
        Ok(())
    }

    /// Revoke every active refresh token of `user_id`. Returns how many were revoked.
    pub async fn logout_all(&self, user_id: &str) -> Result<u64, AuthError> {
        let now = Utc::now();
        let revoked = self.store.revoke_all_for_user(user_id, now).await?;
        info!(user_id, revoked, "all sessions revoked");

        self.notify(SessionEvent::LoggedOutAll {
            user_id: user_id.to_string(),
            revoked,
            at: now,
        })
        .await;
        Ok(revoked)
    }

    /// Active sessions of `user_id`, oldest first.
    pub async fn active_sessions(&self, user_id: &str) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        self.store.list_active_for_user(user_id, Utc::now()).await
    }

    pub async fn active_session_count(&self, user_id: &str) -> Result<u64, AuthError> {
        self.store.count_active_for_user(user_id, Utc::now()).await
    }

    /// Drop expired records from the store.
    pub async fn sweep_expired(&self) -> Result<u64, AuthError> {
        let removed = self.store.delete_expired(Utc::now()).await?;
        if removed > 0 {
            info!(removed, "expired refresh tokens removed");
        }
        Ok(removed)
    }

    /// Mint a token pair and the (not yet persisted) record for its refresh token.
    async fn open_session(
        &self,
        user: &UserIdentity,
        client: ClientInfo<'_>,
    ) -> Result<(TokenPair, RefreshTokenRecord), AuthError> {
        let (access_token, claims) = self
            .issuer
            .issue_access_token(&user.id, &user.email, &user.role)
            .await?;
        let refresh_token = self.issuer.issue_refresh_token();

        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.issuer.config().refresh_ttl)
            .ok_or_else(|| {
                AuthError::ValidationError("refresh token lifetime is out of range".into())
            })?;
        let access_expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::Internal("access token expiry is out of range".into()))?;
        let record = RefreshTokenRecord {
            id: Uuid::now_v7(),
            token_hash: hash_refresh_token(&refresh_token),
            user_id: user.id.clone(),
            created_at: now,
            expires_at,
            revoked_at: None,
            ip: client.ip.map(str::to_string),
            user_agent: client.user_agent.map(str::to_string),
        };
        let pair = TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
        };
        Ok((pair, record))
    }

    async fn on_revoked_token_replay(&self, record: &RefreshTokenRecord, now: DateTime<Utc>) {
        if !self.reuse_detection {
            debug!(user_id = %record.user_id, "revoked refresh token presented");
            return;
        }
        match self.store.revoke_all_for_user(&record.user_id, now).await {
            Ok(revoked) => {
                warn!(
                    user_id = %record.user_id,
                    session_id = %record.id,
                    revoked,
                    "revoked refresh token replayed; all sessions revoked"
                );
                self.notify(SessionEvent::ReuseDetected {
                    user_id: record.user_id.clone(),
                    revoked,
                    at: now,
                })
                .await;
            }
            Err(e) => {
                warn!(user_id = %record.user_id, "failed to revoke sessions after replay: {e}");
            }
        }
    }

    async fn notify(&self, event: SessionEvent) {
        if let Err(e) = self.events.publish(&event).await {
            warn!(user_id = event.user_id(), "session event not delivered: {e}");
        }
    }
}
