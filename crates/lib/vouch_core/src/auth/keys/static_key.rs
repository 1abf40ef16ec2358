//! Single permanent signing key.
//!
//! For deployments that have not adopted rotation yet.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};

use super::{KeyManager, KeyManagerKind, SIGNING_ALGORITHM, validate_key_material};
use crate::auth::AuthError;
use crate::models::auth::{KeyStatus, SigningKey};

/// Key manager holding exactly one key, fixed at construction.
pub struct StaticKeyManager {
    key: SigningKey,
}

impl StaticKeyManager {
    pub fn new(material: Vec<u8>) -> Result<Self, AuthError> {
        validate_key_material(&material)?;
        let key = SigningKey {
            id: static_key_id(&material),
            material,
            algorithm: SIGNING_ALGORITHM.to_string(),
            created_at: Utc::now(),
            status: KeyStatus::Active,
            version: 1,
        };
        Ok(Self { key })
    }

    fn lookup(&self, kid: &str) -> Result<&SigningKey, AuthError> {
        if kid == self.key.id {
            Ok(&self.key)
        } else {
            Err(AuthError::KeyNotFound(kid.to_string()))
        }
    }
}

/// Stable id derived from the key, so restarts keep issued tokens valid.
fn static_key_id(material: &[u8]) -> String {
    let digest = Sha256::digest(material);
    let prefix: String = digest[..6].iter().map(|b| format!("{b:02x}")).collect();
    format!("static-{prefix}")
}

#[async_trait]
impl KeyManager for StaticKeyManager {
    async fn signing_key(&self, kid: &str) -> Result<Vec<u8>, AuthError> {
        Ok(self.lookup(kid)?.material.clone())
    }

    async fn current_key_id(&self) -> Result<String, AuthError> {
        Ok(self.key.id.clone())
    }

    async fn active_key_ids(&self) -> Result<Vec<String>, AuthError> {
        Ok(vec![self.key.id.clone()])
    }

    async fn rotate_key(&self) -> Result<(String, Vec<u8>), AuthError> {
        Err(AuthError::RotationNotSupported)
    }

    async fn key_metadata(&self, kid: &str) -> Result<SigningKey, AuthError> {
        self.lookup(kid).cloned()
    }

    async fn revoke_key(&self, _kid: &str) -> Result<(), AuthError> {
        Err(AuthError::RevocationNotSupported)
    }

    fn kind(&self) -> KeyManagerKind {
        KeyManagerKind::Static
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"static-secret-static-secret-0123";

    #[test]
    fn rejects_empty_and_short_keys() {
        assert!(matches!(
            StaticKeyManager::new(Vec::new()),
            Err(AuthError::SigningKeyEmpty)
        ));
        assert!(matches!(
            StaticKeyManager::new(b"short".to_vec()),
            Err(AuthError::SigningKeyTooShort { len: 5, .. })
        ));
    }

    #[tokio::test]
    async fn serves_its_single_key() {
        let manager = StaticKeyManager::new(SECRET.to_vec()).unwrap();
        let kid = manager.current_key_id().await.unwrap();
        assert!(kid.starts_with("static-"));
        assert_eq!(manager.signing_key(&kid).await.unwrap(), SECRET);
        assert_eq!(manager.active_key_ids().await.unwrap(), vec![kid.clone()]);

        let meta = manager.key_metadata(&kid).await.unwrap();
        assert_eq!(meta.status, KeyStatus::Active);
        assert_eq!(meta.algorithm, "HS256");
        assert_eq!(meta.version, 1);
    }

    #[tokio::test]
    async fn key_id_is_stable_across_instances() {
        let a = StaticKeyManager::new(SECRET.to_vec()).unwrap();
        let b = StaticKeyManager::new(SECRET.to_vec()).unwrap();
        assert_eq!(
            a.current_key_id().await.unwrap(),
            b.current_key_id().await.unwrap()
        );
    }

    #[tokio::test]
    async fn unknown_kid_is_not_found() {
        let manager = StaticKeyManager::new(SECRET.to_vec()).unwrap();
        assert!(matches!(
            manager.signing_key("other").await,
            Err(AuthError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn rotation_and_revocation_unsupported() {
        let manager = StaticKeyManager::new(SECRET.to_vec()).unwrap();
        assert!(matches!(
            manager.rotate_key().await,
            Err(AuthError::RotationNotSupported)
        ));
        let kid = manager.current_key_id().await.unwrap();
        assert!(matches!(
            manager.revoke_key(&kid).await,
            Err(AuthError::RevocationNotSupported)
        ));
    }
}
