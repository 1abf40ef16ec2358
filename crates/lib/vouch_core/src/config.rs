//! Core configuration.
//!
//! Everything the core needs is passed in explicitly through these values;
//! nothing is read from global state after startup.

use chrono::Duration;
use secrecy::SecretString;

use crate::auth::AuthError;
pub use crate::auth::password::HashParams;

/// Access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Refresh token lifetime: 30 days.
pub const DEFAULT_REFRESH_TTL_DAYS: i64 = 30;

/// Remote key cache lifetime: 5 minutes.
pub const DEFAULT_KEY_CACHE_TTL_SECS: i64 = 300;

/// Token lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenConfig {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Clock skew tolerated when checking `exp`, in seconds.
    pub leeway_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_TTL_DAYS),
            leeway_secs: 0,
        }
    }
}

/// Which key manager to build at startup, and with what.
#[derive(Debug, Clone)]
pub enum KeyManagerConfig {
    /// One permanent HMAC secret.
    Static { secret: SecretString },
    /// In-memory lineage; random first key when `initial_secret` is `None`.
    Rotating {
        initial_secret: Option<SecretString>,
        max_history: usize,
    },
    /// Keys read from a Vault KV v2 secret.
    RemoteSecret {
        vault_url: String,
        vault_token: SecretString,
        mount: String,
        path: String,
        cache_ttl: Duration,
    },
}

/// Complete configuration for the authentication core.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub hash: HashParams,
    pub tokens: TokenConfig,
    pub keys: KeyManagerConfig,
    /// Revoke all of a user's sessions when a revoked refresh token is replayed.
    pub reuse_detection: bool,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AuthError> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| AuthError::ValidationError(format!("{name} is not valid"))),
        _ => Ok(default),
    }
}

fn env_required(name: &str) -> Result<String, AuthError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AuthError::ValidationError(format!("{name} must be set"))),
    }
}

/// Reads a count of `unit`s and converts it, rejecting values below
/// `min` and values too large to represent.
fn env_ttl(
    name: &str,
    default: i64,
    min: i64,
    unit: fn(i64) -> Option<Duration>,
) -> Result<Duration, AuthError> {
    let value = env_or(name, default)?;
    if value < min {
        return Err(AuthError::ValidationError(format!(
            "{name} must be at least {min}"
        )));
    }
    unit(value).ok_or_else(|| AuthError::ValidationError(format!("{name} is out of range")))
}

impl AuthConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                       | Default                      |
    /// |--------------------------------|------------------------------|
    /// | `VOUCH_HASH_MEMORY_KIB`        | `65536`                      |
    /// | `VOUCH_HASH_TIME_COST`         | `1`                          |
    /// | `VOUCH_HASH_PARALLELISM`       | `4`                          |
    /// | `VOUCH_ACCESS_TTL_SECS`        | `900`                        |
    /// | `VOUCH_REFRESH_TTL_DAYS`       | `30`                         |
    /// | `VOUCH_TOKEN_LEEWAY_SECS`      | `0`                          |
    /// | `VOUCH_REUSE_DETECTION`        | `false`                      |
    /// | `VOUCH_KEY_MANAGER`            | `static`                     |
    /// | `VOUCH_JWT_SECRET`             | required for `static`        |
    /// | `VOUCH_KEY_HISTORY`            | `5` (`rotating`)             |
    /// | `VAULT_ADDR` / `VAULT_TOKEN`   | required for `remote`        |
    /// | `VOUCH_VAULT_MOUNT`            | `secret` (`remote`)          |
    /// | `VOUCH_VAULT_PATH`             | `vouch/jwt` (`remote`)       |
    /// | `VOUCH_KEY_CACHE_TTL_SECS`     | `300` (`remote`)             |
    pub fn from_env() -> Result<Self, AuthError> {
        let defaults = HashParams::default();
        let hash = HashParams {
            memory_kib: env_or("VOUCH_HASH_MEMORY_KIB", defaults.memory_kib)?,
            time_cost: env_or("VOUCH_HASH_TIME_COST", defaults.time_cost)?,
            parallelism: env_or("VOUCH_HASH_PARALLELISM", defaults.parallelism)?,
            ..defaults
        };

        let tokens = TokenConfig {
            access_ttl: env_ttl(
                "VOUCH_ACCESS_TTL_SECS",
                DEFAULT_ACCESS_TTL_SECS,
                1,
                Duration::try_seconds,
            )?,
            refresh_ttl: env_ttl(
                "VOUCH_REFRESH_TTL_DAYS",
                DEFAULT_REFRESH_TTL_DAYS,
                1,
                Duration::try_days,
            )?,
            leeway_secs: env_or("VOUCH_TOKEN_LEEWAY_SECS", 0u64)?,
        };

        let mode: String = env_or("VOUCH_KEY_MANAGER", "static".to_string())?;
        let keys = match mode.to_ascii_lowercase().as_str() {
            "static" => KeyManagerConfig::Static {
                secret: SecretString::from(env_required("VOUCH_JWT_SECRET")?),
            },
            "rotating" => KeyManagerConfig::Rotating {
                initial_secret: std::env::var("VOUCH_JWT_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty())
                    .map(SecretString::from),
                max_history: env_or(
                    "VOUCH_KEY_HISTORY",
                    crate::auth::keys::rotating::DEFAULT_MAX_HISTORY,
                )?,
            },
            "remote" => KeyManagerConfig::RemoteSecret {
                vault_url: env_required("VAULT_ADDR")?,
                vault_token: SecretString::from(env_required("VAULT_TOKEN")?),
                mount: env_or("VOUCH_VAULT_MOUNT", "secret".to_string())?,
                path: env_or("VOUCH_VAULT_PATH", "vouch/jwt".to_string())?,
                cache_ttl: env_ttl(
                    "VOUCH_KEY_CACHE_TTL_SECS",
                    DEFAULT_KEY_CACHE_TTL_SECS,
                    0,
                    Duration::try_seconds,
                )?,
            },
            other => {
                return Err(AuthError::ValidationError(format!(
                    "unknown VOUCH_KEY_MANAGER '{other}'"
                )));
            }
        };

        Ok(Self {
            hash,
            tokens,
            keys,
            reuse_detection: env_or("VOUCH_REUSE_DETECTION", false)?,
        })
    }
}
