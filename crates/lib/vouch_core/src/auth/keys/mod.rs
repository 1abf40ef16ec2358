//! Signing-key lifecycle.
//!
//! Every issued token names the key that signed it (`kid`), so verification can
//! fetch the exact historical key after a rotation. Three interchangeable
//! managers implement the same [`KeyManager`] contract; operations a variant
//! cannot support fail with a dedicated error instead of being absent.

pub mod remote;
pub mod rotating;
pub mod static_key;

use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;
use secrecy::ExposeSecret;

pub use remote::RemoteSecretKeyManager;
pub use rotating::RotatingKeyManager;
pub use static_key::StaticKeyManager;

use super::AuthError;
use super::secrets::VaultKvSource;
use crate::config::KeyManagerConfig;
use crate::models::auth::SigningKey;

/// Minimum length of HMAC key material, in bytes.
pub const MIN_KEY_LEN: usize = 32;

/// Length of freshly generated key material, in bytes.
pub const GENERATED_KEY_LEN: usize = 32;

/// JWS algorithm name for every key the managers hand out.
pub const SIGNING_ALGORITHM: &str = "HS256";

/// Which key manager variant is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyManagerKind {
    Static,
    Rotating,
    RemoteSecret,
}

/// Capability interface over a signing-key store.
#[async_trait]
pub trait KeyManager: Send + Sync {
    /// Key material for `kid`. Fails for unknown and revoked keys.
    async fn signing_key(&self, kid: &str) -> Result<Vec<u8>, AuthError>;

    /// Id of the key new tokens are signed with.
    async fn current_key_id(&self) -> Result<String, AuthError>;

    /// Ids of every key tokens may still be verified against, current first.
    async fn active_key_ids(&self) -> Result<Vec<String>, AuthError>;

    /// Generate a new current key, retiring the previous one.
    async fn rotate_key(&self) -> Result<(String, Vec<u8>), AuthError>;

    /// Full record for `kid`, including its status.
    async fn key_metadata(&self, kid: &str) -> Result<SigningKey, AuthError>;

    /// Mark `kid` revoked; tokens signed with it stop validating.
    async fn revoke_key(&self, kid: &str) -> Result<(), AuthError>;

    fn kind(&self) -> KeyManagerKind;

    /// Current key id together with its material.
    async fn current_signing_key(&self) -> Result<(String, Vec<u8>), AuthError> {
        let kid = self.current_key_id().await?;
        let material = self.signing_key(&kid).await?;
        Ok((kid, material))
    }
}

/// Reject empty or short key material.
pub fn validate_key_material(material: &[u8]) -> Result<(), AuthError> {
    if material.is_empty() {
        return Err(AuthError::SigningKeyEmpty);
    }
    if material.len() < MIN_KEY_LEN {
        return Err(AuthError::SigningKeyTooShort {
            len: material.len(),
            min: MIN_KEY_LEN,
        });
    }
    Ok(())
}

/// Fresh random key material.
pub fn generate_key_material() -> Vec<u8> {
    let mut material = vec![0u8; GENERATED_KEY_LEN];
    rand::rng().fill_bytes(&mut material);
    material
}

/// Build the configured key manager, failing fast on bad key material or an
/// unreachable remote source.
pub async fn build_key_manager(config: &KeyManagerConfig) -> Result<Arc<dyn KeyManager>, AuthError> {
    let manager: Arc<dyn KeyManager> = match config {
        KeyManagerConfig::Static { secret } => {
            Arc::new(StaticKeyManager::new(secret.expose_secret().as_bytes().to_vec())?)
        }
        KeyManagerConfig::Rotating {
            initial_secret,
            max_history,
        } => {
            let initial = initial_secret
                .as_ref()
                .map(|s| s.expose_secret().as_bytes().to_vec());
            Arc::new(RotatingKeyManager::new(initial, *max_history)?)
        }
        KeyManagerConfig::RemoteSecret {
            vault_url,
            vault_token,
            mount,
            path,
            cache_ttl,
        } => {
            let source = VaultKvSource::new(vault_url, mount, vault_token.clone())?;
            Arc::new(RemoteSecretKeyManager::connect(Arc::new(source), path, *cache_ttl).await?)
        }
    };
    tracing::info!(kind = ?manager.kind(), "key manager ready");
    Ok(manager)
}
