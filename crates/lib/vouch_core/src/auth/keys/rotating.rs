//! In-memory rotating key manager.
//!
//! Keeps a bounded lineage of keys. Rotation retires the current key (still
//! verifiable) and installs a freshly generated one; revocation makes a key
//! fail all verification. The table sits behind a reader-writer lock so
//! verifications run concurrently and never observe a half-applied rotation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    KeyManager, KeyManagerKind, SIGNING_ALGORITHM, generate_key_material, validate_key_material,
};
use crate::auth::AuthError;
use crate::models::auth::{KeyStatus, SigningKey};

/// Default number of keys kept in the lineage.
pub const DEFAULT_MAX_HISTORY: usize = 5;

#[derive(Debug)]
struct KeyTable {
    keys: HashMap<String, SigningKey>,
    current: String,
    next_version: u32,
}

impl KeyTable {
    fn install(&mut self, material: Vec<u8>) -> SigningKey {
        let key = SigningKey {
            id: Uuid::now_v7().to_string(),
            material,
            algorithm: SIGNING_ALGORITHM.to_string(),
            created_at: Utc::now(),
            status: KeyStatus::Active,
            version: self.next_version,
        };
        self.next_version += 1;
        if let Some(previous) = self.keys.get_mut(&self.current)
            && previous.status == KeyStatus::Active
        {
            previous.status = KeyStatus::Retiring;
        }
        self.current = key.id.clone();
        self.keys.insert(key.id.clone(), key.clone());
        key
    }

    /// Drop the oldest non-current keys beyond `max`, revoked ones first.
    fn prune(&mut self, max: usize) -> Vec<String> {
        let mut dropped = Vec::new();
        while self.keys.len() > max {
            let victim = self
                .keys
                .values()
                .filter(|k| k.id != self.current)
                .min_by_key(|k| (k.status != KeyStatus::Revoked, k.version))
                .map(|k| k.id.clone());
            match victim {
                Some(id) => {
                    self.keys.remove(&id);
                    dropped.push(id);
                }
                None => break,
            }
        }
        dropped
    }

    fn get(&self, kid: &str) -> Result<&SigningKey, AuthError> {
        self.keys
            .get(kid)
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))
    }

    fn verifiable(&self, kid: &str) -> Result<&SigningKey, AuthError> {
        let key = self.get(kid)?;
        if key.is_verifiable() {
            Ok(key)
        } else {
            Err(AuthError::KeyRevoked(kid.to_string()))
        }
    }
}

/// Key manager with an in-memory key lineage.
pub struct RotatingKeyManager {
    table: RwLock<KeyTable>,
    max_history: usize,
}

impl RotatingKeyManager {
    /// Create a manager whose first key is `initial`, or a random key when `None`.
    ///
    /// `max_history` is clamped to at least 2 so a rotation always leaves the
    /// previous key verifiable.
    pub fn new(initial: Option<Vec<u8>>, max_history: usize) -> Result<Self, AuthError> {
        let material = match initial {
            Some(material) => {
                validate_key_material(&material)?;
                material
            }
            None => generate_key_material(),
        };
        let mut table = KeyTable {
            keys: HashMap::new(),
            current: String::new(),
            next_version: 1,
        };
        table.install(material);
        Ok(Self {
            table: RwLock::new(table),
            max_history: max_history.max(2),
        })
    }
}

#[async_trait]
impl KeyManager for RotatingKeyManager {
    async fn signing_key(&self, kid: &str) -> Result<Vec<u8>, AuthError> {
        let table = self.table.read().await;
        Ok(table.verifiable(kid)?.material.clone())
    }

    async fn current_key_id(&self) -> Result<String, AuthError> {
        Ok(self.table.read().await.current.clone())
    }

    async fn active_key_ids(&self) -> Result<Vec<String>, AuthError> {
        let table = self.table.read().await;
        let mut keys: Vec<&SigningKey> = table.keys.values().filter(|k| k.is_verifiable()).collect();
        keys.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(keys.into_iter().map(|k| k.id.clone()).collect())
    }

    async fn rotate_key(&self) -> Result<(String, Vec<u8>), AuthError> {
        let mut table = self.table.write().await;
        let retired = table.current.clone();
        let key = table.install(generate_key_material());
        let dropped = table.prune(self.max_history);
        info!(
            kid = %key.id,
            version = key.version,
            retired = %retired,
            dropped = dropped.len(),
            "signing key rotated"
        );
        Ok((key.id, key.material))
    }

    async fn key_metadata(&self, kid: &str) -> Result<SigningKey, AuthError> {
        self.table.read().await.get(kid).cloned()
    }

    /// Revoking the current key installs a fresh one so issuance never stalls.
    async fn revoke_key(&self, kid: &str) -> Result<(), AuthError> {
        let mut table = self.table.write().await;
        let key = table
            .keys
            .get_mut(kid)
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))?;
        if key.status == KeyStatus::Revoked {
            return Ok(());
        }
        key.status = KeyStatus::Revoked;

        if table.current == kid {
            let replacement = table.install(generate_key_material());
            table.prune(self.max_history);
            warn!(kid, replacement = %replacement.id, "current signing key revoked");
        } else {
            info!(kid, "signing key revoked");
        }
        Ok(())
    }

    fn kind(&self) -> KeyManagerKind {
        KeyManagerKind::Rotating
    }

    async fn current_signing_key(&self) -> Result<(String, Vec<u8>), AuthError> {
        let table = self.table.read().await;
        let key = table.verifiable(&table.current)?;
        Ok((key.id.clone(), key.material.clone()))
    }
}
