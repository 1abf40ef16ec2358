//! Remote secret sources for signing-key material.
//!
//! A [`SecretSource`] is resolved once at construction of the remote-backed
//! key manager; callers never check for optional capabilities at runtime.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, instrument};

use super::AuthError;

/// Narrow capability for reading a single secret value.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Fetch the value stored under `key` in the secret at `path`.
    ///
    /// `Ok(None)` means the source answered and the field does not exist;
    /// `Err` means the source could not be read.
    async fn fetch_secret(&self, path: &str, key: &str) -> Result<Option<Vec<u8>>, AuthError>;

    /// Whether this source is configured at all.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// HashiCorp Vault KV v2 reader.
pub struct VaultKvSource {
    client: Client,
    base_url: String,
    mount: String,
    token: SecretString,
}

impl VaultKvSource {
    pub fn new(base_url: &str, mount: &str, token: SecretString) -> Result<Self, AuthError> {
        let client = Client::builder()
            .user_agent(concat!("vouch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::SecretSource(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            mount: mount.trim_matches('/').to_string(),
            token,
        })
    }

    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}/data/{}",
            self.base_url,
            self.mount,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl SecretSource for VaultKvSource {
    #[instrument(skip(self))]
    async fn fetch_secret(&self, path: &str, key: &str) -> Result<Option<Vec<u8>>, AuthError> {
        let url = self.data_url(path);
        let response = self
            .client
            .get(&url)
            .header("X-Vault-Token", self.token.expose_secret())
            .send()
            .await
            .map_err(|e| AuthError::SecretSource(format!("vault request: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(path, "vault kv secret absent");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AuthError::SecretSource(format!(
                "vault kv read failed: {}",
                response.status()
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| AuthError::SecretSource(format!("vault response: {e}")))?;
        debug!(path, "vault kv read");

        match json
            .get("data")
            .and_then(|data| data.get("data"))
            .and_then(|data| data.get(key))
        {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.as_bytes().to_vec())),
            Some(_) => Err(AuthError::SecretSource(format!(
                "field '{key}' at '{path}' is not a string"
            ))),
        }
    }
}

/// In-memory source keyed by `(path, key)`. Values can be replaced while
/// the source is shared.
#[derive(Debug, Default)]
pub struct StaticSecretSource {
    values: DashMap<(String, String), Vec<u8>>,
}

impl StaticSecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(self, path: &str, key: &str, value: impl Into<Vec<u8>>) -> Self {
        self.set(path, key, value);
        self
    }

    pub fn set(&self, path: &str, key: &str, value: impl Into<Vec<u8>>) {
        self.values
            .insert((path.to_string(), key.to_string()), value.into());
    }

    pub fn remove(&self, path: &str, key: &str) {
        self.values.remove(&(path.to_string(), key.to_string()));
    }
}

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn fetch_secret(&self, path: &str, key: &str) -> Result<Option<Vec<u8>>, AuthError> {
        Ok(self
            .values
            .get(&(path.to_string(), key.to_string()))
            .map(|value| value.clone()))
    }
}

/// Placeholder for deployments without a remote secret store.
#[derive(Debug, Default)]
pub struct DisabledSecretSource;

#[async_trait]
impl SecretSource for DisabledSecretSource {
    async fn fetch_secret(&self, _path: &str, _key: &str) -> Result<Option<Vec<u8>>, AuthError> {
        Err(AuthError::SecretSource("no secret source configured".into()))
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
