//! Password hashing via Argon2id.
//!
//! Hashes are stored as self-describing PHC strings:
//!
//! ```text
//! $argon2id$v=19$m=65536,t=1,p=4$<base64 salt>$<base64 hash>
//! ```
//!
//! Salt and hash use the standard base64 alphabet without padding. Because the
//! cost parameters travel with the hash, credentials created under older
//! parameters keep verifying after the configured costs change.

use argon2::password_hash::{self, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier, Version};
use rand::RngCore;

use super::AuthError;

/// Argon2 version 0x13.
const ARGON2_VERSION: u32 = 19;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub time_cost: u32,
    /// Degree of parallelism (lanes).
    pub parallelism: u32,
    /// Derived key length in bytes.
    pub output_len: usize,
    /// Random salt length in bytes.
    pub salt_len: usize,
}

impl Default for HashParams {
    /// 64 MiB, one pass, four lanes, 32-byte key, 16-byte salt.
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            time_cost: 1,
            parallelism: 4,
            output_len: 32,
            salt_len: 16,
        }
    }
}

/// Parse an encoded hash and the cost parameters it carries.
///
/// Only complete Argon2id v19 strings with exactly `m`, `t` and `p` are accepted.
fn parse_encoded(encoded: &str) -> Result<(PasswordHash<'_>, Params), AuthError> {
    let parsed = PasswordHash::new(encoded).map_err(|_| AuthError::InvalidHash)?;
    if parsed.algorithm != Algorithm::Argon2id.ident()
        || parsed.version != Some(ARGON2_VERSION)
        || parsed.salt.is_none()
        || parsed.hash.is_none()
    {
        return Err(AuthError::InvalidHash);
    }
    let has_costs = ["m", "t", "p"]
        .iter()
        .all(|name| parsed.params.get(*name).is_some());
    if !has_costs || parsed.params.iter().count() != 3 {
        return Err(AuthError::InvalidHash);
    }
    let params = Params::try_from(&parsed).map_err(|_| AuthError::InvalidHash)?;
    Ok((parsed, params))
}

fn argon2id(params: Params) -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// One-way credential hasher with explicit cost parameters.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: HashParams,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(HashParams::default())
    }
}

impl PasswordHasher {
    pub fn new(params: HashParams) -> Self {
        Self { params }
    }

    /// The parameters new hashes are produced with.
    pub fn params(&self) -> &HashParams {
        &self.params
    }

    /// Hash a password into an encoded PHC string with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        if password.is_empty() {
            return Err(AuthError::EmptyPassword);
        }

        let params = Params::new(
            self.params.memory_kib,
            self.params.time_cost,
            self.params.parallelism,
            Some(self.params.output_len),
        )
        .map_err(|e| AuthError::ValidationError(format!("argon2 params: {e}")))?;

        let mut salt = vec![0u8; self.params.salt_len];
        rand::rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt)
            .map_err(|e| AuthError::ValidationError(format!("argon2 salt: {e}")))?;

        argon2id(params)
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::ValidationError(format!("argon2 hash: {e}")))
    }

    /// Verify a password against an encoded hash.
    ///
    /// Uses the parameters embedded in `encoded`, not the configured ones.
    pub fn verify(&self, encoded: &str, password: &str) -> Result<(), AuthError> {
        if password.is_empty() {
            return Err(AuthError::EmptyPassword);
        }
        let (parsed, params) = parse_encoded(encoded)?;

        match argon2id(params).verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(()),
            Err(password_hash::Error::Password) => Err(AuthError::InvalidPassword),
            Err(_) => Err(AuthError::InvalidHash),
        }
    }

    /// Whether `encoded` was produced with parameters other than the configured ones.
    ///
    /// Malformed hashes always need rehashing.
    pub fn needs_rehash(&self, encoded: &str) -> bool {
        match parse_encoded(encoded) {
            Ok((_, params)) => {
                params.m_cost() != self.params.memory_kib
                    || params.t_cost() != self.params.time_cost
                    || params.p_cost() != self.params.parallelism
                    || params.output_len() != Some(self.params.output_len)
            }
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD_NO_PAD;

    use super::*;

    fn cheap() -> PasswordHasher {
        PasswordHasher::new(HashParams {
            memory_kib: 1024,
            time_cost: 1,
            parallelism: 1,
            ..HashParams::default()
        })
    }

    #[test]
    fn hash_then_verify() {
        let hasher = cheap();
        let hash = hasher.hash("Secret123!").unwrap();
        assert!(hasher.verify(&hash, "Secret123!").is_ok());
        assert!(matches!(
            hasher.verify(&hash, "wrong"),
            Err(AuthError::InvalidPassword)
        ));
    }

    #[test]
    fn encoded_hash_is_self_describing() {
        let hash = cheap().hash("Secret123!").unwrap();
        let segments: Vec<&str> = hash.split('$').collect();
        assert_eq!(segments.len(), 6);
        assert_eq!(segments[1], "argon2id");
        assert_eq!(segments[2], "v=19");
        assert_eq!(segments[3], "m=1024,t=1,p=1");
        assert_eq!(STANDARD_NO_PAD.decode(segments[4]).unwrap().len(), 16);
        assert_eq!(STANDARD_NO_PAD.decode(segments[5]).unwrap().len(), 32);
        assert!(!hash.contains('='));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let hasher = cheap();
        let a = hasher.hash("hunter22").unwrap();
        let b = hasher.hash("hunter22").unwrap();
        assert_ne!(a, b);
        assert!(hasher.verify(&a, "hunter22").is_ok());
        assert!(hasher.verify(&b, "hunter22").is_ok());
    }

    #[test]
    fn empty_password_rejected() {
        let hasher = cheap();
        assert!(matches!(hasher.hash(""), Err(AuthError::EmptyPassword)));
        let hash = hasher.hash("x").unwrap();
        assert!(matches!(
            hasher.verify(&hash, ""),
            Err(AuthError::EmptyPassword)
        ));
    }

    #[test]
    fn malformed_hashes_are_validation_errors() {
        let hasher = cheap();
        let good = hasher.hash("pw").unwrap();
        let salt_and_hash = good.splitn(5, '$').nth(4).unwrap().to_string();

        let cases = [
            String::new(),
            "not-a-hash".to_string(),
            "$argon2id$v=19$m=1024,t=1,p=1$onlysalt".to_string(),
            format!("$bcrypt$v=19$m=1024,t=1,p=1${salt_and_hash}"),
            format!("$argon2id$v=16$m=1024,t=1,p=1${salt_and_hash}"),
            format!("$argon2id$v=x$m=1024,t=1,p=1${salt_and_hash}"),
            format!("$argon2id$v=19$m=1024,t=1${salt_and_hash}"),
            format!("$argon2id$v=19$m=1024,t=1,p=1,x=2${salt_and_hash}"),
            "$argon2id$v=19$m=1024,t=1,p=1$!!!$AAAA".to_string(),
            "$argon2id$v=19$m=1024,t=1,p=1$AAAAAAAAAAAAAAAAAAAAAA$***".to_string(),
            format!("{good}$extra"),
        ];
        for case in cases {
            let err = hasher.verify(&case, "pw").unwrap_err();
            assert!(
                matches!(err, AuthError::InvalidHash),
                "expected InvalidHash for {case:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn verifies_hashes_made_with_other_parameters() {
        let old = PasswordHasher::new(HashParams {
            memory_kib: 512,
            time_cost: 2,
            parallelism: 1,
            ..HashParams::default()
        });
        let hash = old.hash("legacy-pass").unwrap();

        let current = cheap();
        assert!(current.verify(&hash, "legacy-pass").is_ok());
        assert!(current.needs_rehash(&hash));
        assert!(!old.needs_rehash(&hash));
        assert!(current.needs_rehash("garbage"));
    }

    #[test]
    fn default_params_match_production_costs() {
        let params = HashParams::default();
        assert_eq!(params.memory_kib, 65536);
        assert_eq!(params.time_cost, 1);
        assert_eq!(params.parallelism, 4);
        assert_eq!(params.output_len, 32);
        assert_eq!(params.salt_len, 16);
    }

    #[test]
    fn out_of_range_params_are_rejected() {
        let hasher = PasswordHasher::new(HashParams {
            memory_kib: 1024,
            time_cost: 0,
            parallelism: 1,
            ..HashParams::default()
        });
        assert!(matches!(
            hasher.hash("pw"),
            Err(AuthError::ValidationError(_))
        ));

        let hasher = PasswordHasher::new(HashParams {
            memory_kib: 1024,
            time_cost: 1,
            parallelism: 1,
            salt_len: 2,
            ..HashParams::default()
        });
        assert!(matches!(
            hasher.hash("pw"),
            Err(AuthError::ValidationError(_))
        ));
    }
}
