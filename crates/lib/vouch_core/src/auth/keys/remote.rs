//! Key manager backed by a remote secret store.
//!
//! The secret at `path` holds:
//!
//! | Field          | Value                                              |
//! |----------------|----------------------------------------------------|
//! | `current_kid`  | id of the key new tokens are signed with           |
//! | `active_kids`  | comma-separated ids still valid for verification   |
//! | `<kid>`        | base64 key material for each listed id             |
//!
//! Rotation happens in the remote store; lookups are cached for `cache_ttl`
//! so a remote rotation is picked up within one TTL. Revocation is applied
//! locally and takes effect immediately.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{KeyManager, KeyManagerKind, SIGNING_ALGORITHM, validate_key_material};
use crate::auth::AuthError;
use crate::auth::secrets::SecretSource;
use crate::models::auth::{KeyStatus, SigningKey};

/// Field naming the current key id.
pub const CURRENT_KID_FIELD: &str = "current_kid";

/// Field listing verifiable key ids.
pub const ACTIVE_KIDS_FIELD: &str = "active_kids";

#[derive(Debug, Clone)]
struct KeyDirectory {
    current: String,
    active: Vec<String>,
    fetched_at: DateTime<Utc>,
}

#[derive(Clone)]
struct CachedKey {
    material: Vec<u8>,
    fetched_at: DateTime<Utc>,
}

fn is_fresh(fetched_at: DateTime<Utc>, ttl: Duration) -> bool {
    Utc::now() - fetched_at < ttl
}

/// Key manager delegating key material to a [`SecretSource`].
pub struct RemoteSecretKeyManager {
    source: Arc<dyn SecretSource>,
    path: String,
    cache_ttl: Duration,
    directory: RwLock<Option<KeyDirectory>>,
    keys: DashMap<String, CachedKey>,
    revoked: DashSet<String>,
}

impl RemoteSecretKeyManager {
    /// Create the manager without touching the remote store.
    pub fn new(
        source: Arc<dyn SecretSource>,
        path: &str,
        cache_ttl: Duration,
    ) -> Result<Self, AuthError> {
        if !source.is_enabled() {
            return Err(AuthError::ValidationError(
                "remote key manager requires an enabled secret source".into(),
            ));
        }
        Ok(Self {
            source,
            path: path.to_string(),
            cache_ttl,
            directory: RwLock::new(None),
            keys: DashMap::new(),
            revoked: DashSet::new(),
        })
    }

    /// Create the manager and load the current key, so bad remote state fails at startup.
    pub async fn connect(
        source: Arc<dyn SecretSource>,
        path: &str,
        cache_ttl: Duration,
    ) -> Result<Self, AuthError> {
        let manager = Self::new(source, path, cache_ttl)?;
        let (kid, _) = manager.current_signing_key().await?;
        info!(path, kid = %kid, "remote signing key loaded");
        Ok(manager)
    }

    async fn fetch_text(&self, field: &str) -> Result<Option<String>, AuthError> {
        let Some(raw) = self.source.fetch_secret(&self.path, field).await? else {
            return Ok(None);
        };
        String::from_utf8(raw)
            .map(|s| Some(s.trim().to_string()))
            .map_err(|_| AuthError::SecretSource(format!("field '{field}' is not UTF-8")))
    }

    async fn require_text(&self, field: &str) -> Result<String, AuthError> {
        self.fetch_text(field).await?.ok_or_else(|| {
            AuthError::SecretSource(format!("field '{field}' missing at '{}'", self.path))
        })
    }

    async fn key_directory(&self) -> Result<KeyDirectory, AuthError> {
        {
            let cached = self.directory.read().await;
            if let Some(dir) = cached.as_ref()
                && is_fresh(dir.fetched_at, self.cache_ttl)
            {
                return Ok(dir.clone());
            }
        }

        let current = self.require_text(CURRENT_KID_FIELD).await?;
        if current.is_empty() {
            return Err(AuthError::SecretSource(format!(
                "field '{CURRENT_KID_FIELD}' is empty"
            )));
        }
        // The active list is optional; without it only the current key verifies.
        // A failed read is returned as is and nothing is cached.
        let mut active: Vec<String> = self
            .fetch_text(ACTIVE_KIDS_FIELD)
            .await?
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|kid| !kid.is_empty() && *kid != current)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        active.insert(0, current.clone());

        let dir = KeyDirectory {
            current,
            active,
            fetched_at: Utc::now(),
        };
        debug!(path = %self.path, keys = dir.active.len(), "remote key directory refreshed");
        *self.directory.write().await = Some(dir.clone());
        Ok(dir)
    }

    async fn load_material(&self, kid: &str) -> Result<CachedKey, AuthError> {
        if let Some(cached) = self.keys.get(kid)
            && is_fresh(cached.fetched_at, self.cache_ttl)
        {
            return Ok(cached.clone());
        }

        let encoded = self.require_text(kid).await?;
        let material = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|_| AuthError::SecretSource(format!("key '{kid}' is not valid base64")))?;
        validate_key_material(&material)?;

        let entry = CachedKey {
            material,
            fetched_at: Utc::now(),
        };
        self.keys.insert(kid.to_string(), entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl KeyManager for RemoteSecretKeyManager {
    async fn signing_key(&self, kid: &str) -> Result<Vec<u8>, AuthError> {
        if self.revoked.contains(kid) {
            return Err(AuthError::KeyRevoked(kid.to_string()));
        }
        let dir = self.key_directory().await?;
        if !dir.active.iter().any(|k| k == kid) {
            return Err(AuthError::KeyNotFound(kid.to_string()));
        }
        Ok(self.load_material(kid).await?.material)
    }

    async fn current_key_id(&self) -> Result<String, AuthError> {
        Ok(self.key_directory().await?.current)
    }

    async fn active_key_ids(&self) -> Result<Vec<String>, AuthError> {
        let dir = self.key_directory().await?;
        Ok(dir
            .active
            .into_iter()
            .filter(|kid| !self.revoked.contains(kid))
            .collect())
    }

    async fn rotate_key(&self) -> Result<(String, Vec<u8>), AuthError> {
        Err(AuthError::RotationNotSupported)
    }

    async fn key_metadata(&self, kid: &str) -> Result<SigningKey, AuthError> {
        let dir = self.key_directory().await?;
        let position = dir
            .active
            .iter()
            .position(|k| k == kid)
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))?;
        let cached = self.load_material(kid).await?;
        let status = if self.revoked.contains(kid) {
            KeyStatus::Revoked
        } else if kid == dir.current {
            KeyStatus::Active
        } else {
            KeyStatus::Retiring
        };
        Ok(SigningKey {
            id: kid.to_string(),
            material: cached.material,
            algorithm: SIGNING_ALGORITHM.to_string(),
            created_at: cached.fetched_at,
            status,
            // Newest first in the remote list.
            version: (dir.active.len() - position) as u32,
        })
    }

    async fn revoke_key(&self, kid: &str) -> Result<(), AuthError> {
        let dir = self.key_directory().await?;
        if !dir.active.iter().any(|k| k == kid) && !self.revoked.contains(kid) {
            return Err(AuthError::KeyNotFound(kid.to_string()));
        }
        self.revoked.insert(kid.to_string());
        self.keys.remove(kid);
        info!(kid, "remote signing key revoked locally");
        Ok(())
    }

    fn kind(&self) -> KeyManagerKind {
        KeyManagerKind::RemoteSecret
    }
}
