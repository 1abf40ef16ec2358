//! Access-token issuance and verification, plus opaque refresh tokens.
//!
//! Access tokens are compact HS256 JWS strings whose header carries the id of
//! the signing key. Refresh tokens are random strings with no structure.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::AuthError;
use super::keys::KeyManager;
use crate::config::TokenConfig;
use crate::models::auth::TokenClaims;

/// Refresh token length: 64 alphanumeric chars (~381 bits).
const REFRESH_TOKEN_LEN: usize = 64;

/// Generate a cryptographically random refresh token.
pub fn generate_refresh_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// SHA-256 hash a refresh token for storage.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Issues and validates tokens against a [`KeyManager`].
#[derive(Clone)]
pub struct TokenIssuer {
    keys: Arc<dyn KeyManager>,
    config: TokenConfig,
}

impl TokenIssuer {
    pub fn new(keys: Arc<dyn KeyManager>, config: TokenConfig) -> Self {
        Self { keys, config }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn key_manager(&self) -> &Arc<dyn KeyManager> {
        &self.keys
    }

    /// Sign an access token with the current key.
    pub async fn issue_access_token(
        &self,
        user_id: &str,
        email: &str,
        role: &str,
    ) -> Result<(String, TokenClaims), AuthError> {
        let (kid, material) = self.keys.current_signing_key().await?;
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.config.access_ttl)
            .ok_or_else(|| AuthError::ValidationError("access token lifetime is out of range".into()))?;
        let claims = TokenClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            kid: kid.clone(),
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(kid);
        let token = encode(&header, &claims, &EncodingKey::from_secret(&material))
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))?;
        Ok((token, claims))
    }

    /// A fresh opaque refresh token; persisting it is the caller's job.
    pub fn issue_refresh_token(&self) -> String {
        generate_refresh_token()
    }

    /// Verify an access token, returning its claims.
    ///
    /// Unparsable tokens, unknown or revoked key ids and bad signatures all
    /// yield [`AuthError::InvalidAccessToken`]. Only a failure to reach the key
    /// store surfaces as an internal error.
    pub async fn validate_access_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::InvalidAccessToken)?;
        if header.alg != Algorithm::HS256 {
            debug!(alg = ?header.alg, "access token with unexpected algorithm");
            return Err(AuthError::InvalidAccessToken);
        }
        let kid = header.kid.ok_or(AuthError::InvalidAccessToken)?;

        let material = match self.keys.signing_key(&kid).await {
            Ok(material) => material,
            Err(e) if e.is_retryable() => {
                warn!(kid = %kid, "signing key lookup failed: {e}");
                return Err(e);
            }
            Err(e) => {
                debug!(kid = %kid, "access token key rejected: {e}");
                return Err(AuthError::InvalidAccessToken);
            }
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.config.leeway_secs;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        match decode::<TokenClaims>(token, &DecodingKey::from_secret(&material), &validation) {
            Ok(data) => {
                let mut claims = data.claims;
                claims.kid = kid;
                Ok(claims)
            }
            Err(e) if matches!(e.kind(), JwtErrorKind::ExpiredSignature) => {
                Err(AuthError::AccessTokenExpired)
            }
            Err(_) => Err(AuthError::InvalidAccessToken),
        }
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use chrono::Duration;

    use super::*;
    use crate::auth::keys::{RotatingKeyManager, StaticKeyManager};

    const SECRET: &[u8] = b"jwt-test-secret-jwt-test-secret-";

    fn static_issuer(secret: &[u8]) -> TokenIssuer {
        let keys = Arc::new(StaticKeyManager::new(secret.to_vec()).unwrap());
        TokenIssuer::new(keys, TokenConfig::default())
    }

    #[tokio::test]
    async fn issue_then_validate() {
        let issuer = static_issuer(SECRET);
        let (token, issued) = issuer
            .issue_access_token("user-1", "a@example.com", "admin")
            .await
            .unwrap();
        let claims = issuer.validate_access_token(&token).await.unwrap();
        assert_eq!(claims, issued);
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[tokio::test]
    async fn token_is_compact_jws_with_kid_header() {
        let issuer = static_issuer(SECRET);
        let (token, claims) = issuer
            .issue_access_token("user-1", "a@example.com", "user")
            .await
            .unwrap();

        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);
        assert!(!token.contains('='));

        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segments[0]).unwrap()).unwrap();
        assert_eq!(header["alg"], "HS256");
        assert_eq!(header["kid"], claims.kid.as_str());

        let payload: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segments[1]).unwrap()).unwrap();
        for field in ["sub", "email", "role", "iat", "exp"] {
            assert!(payload.get(field).is_some(), "missing {field}");
        }
    }

    #[tokio::test]
    async fn tampered_signature_is_invalid() {
        let issuer = static_issuer(SECRET);
        let (token, _) = issuer.issue_access_token("u", "e", "r").await.unwrap();
        let (signed, signature) = token.rsplit_once('.').unwrap();
        let first = signature.chars().next().unwrap();
        let flipped = if first == 'A' { 'B' } else { 'A' };
        let tampered = format!("{signed}.{flipped}{}", &signature[1..]);
        assert!(matches!(
            issuer.validate_access_token(&tampered).await,
            Err(AuthError::InvalidAccessToken)
        ));
    }

    #[tokio::test]
    async fn tampered_payload_is_invalid() {
        let issuer = static_issuer(SECRET);
        let (token, _) = issuer.issue_access_token("u", "e", "user").await.unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged_payload = URL_SAFE_NO_PAD.encode(
            serde_json::json!({"sub": "u", "email": "e", "role": "admin", "iat": 0, "exp": i64::MAX / 2})
                .to_string(),
        );
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert!(matches!(
            issuer.validate_access_token(&forged).await,
            Err(AuthError::InvalidAccessToken)
        ));
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        let issuer = static_issuer(SECRET);
        for token in ["", "abc", "a.b.c", "....."] {
            assert!(matches!(
                issuer.validate_access_token(token).await,
                Err(AuthError::InvalidAccessToken)
            ));
        }
    }

    #[tokio::test]
    async fn token_from_other_key_is_invalid() {
        let issuer = static_issuer(SECRET);
        let other = static_issuer(b"another-secret-another-secret-00");
        let (token, _) = other.issue_access_token("u", "e", "r").await.unwrap();
        assert!(matches!(
            issuer.validate_access_token(&token).await,
            Err(AuthError::InvalidAccessToken)
        ));
    }

    #[tokio::test]
    async fn unrepresentable_lifetime_fails_issuance() {
        let keys = Arc::new(StaticKeyManager::new(SECRET.to_vec()).unwrap());
        let issuer = TokenIssuer::new(
            keys,
            TokenConfig {
                access_ttl: Duration::MAX,
                ..TokenConfig::default()
            },
        );
        assert!(matches!(
            issuer.issue_access_token("u", "e", "r").await,
            Err(AuthError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn expired_token_is_reported_as_expired() {
        let keys = Arc::new(StaticKeyManager::new(SECRET.to_vec()).unwrap());
        let issuer = TokenIssuer::new(
            keys,
            TokenConfig {
                access_ttl: Duration::seconds(-10),
                ..TokenConfig::default()
            },
        );
        let (token, _) = issuer.issue_access_token("u", "e", "r").await.unwrap();
        assert!(matches!(
            issuer.validate_access_token(&token).await,
            Err(AuthError::AccessTokenExpired)
        ));
    }

    #[tokio::test]
    async fn old_tokens_survive_rotation_until_revoked() {
        let keys = Arc::new(RotatingKeyManager::new(None, 5).unwrap());
        let issuer = TokenIssuer::new(keys.clone(), TokenConfig::default());

        let (old_token, old_claims) = issuer.issue_access_token("u", "e", "r").await.unwrap();
        let (new_kid, _) = keys.rotate_key().await.unwrap();
        let (new_token, new_claims) = issuer.issue_access_token("u", "e", "r").await.unwrap();
        assert_eq!(new_claims.kid, new_kid);
        assert_ne!(old_claims.kid, new_kid);

        assert!(issuer.validate_access_token(&old_token).await.is_ok());
        assert!(issuer.validate_access_token(&new_token).await.is_ok());

        keys.revoke_key(&old_claims.kid).await.unwrap();
        assert!(matches!(
            issuer.validate_access_token(&old_token).await,
            Err(AuthError::InvalidAccessToken)
        ));
        assert!(issuer.validate_access_token(&new_token).await.is_ok());
    }

    #[test]
    fn refresh_tokens_are_long_and_unique() {
        let a = generate_refresh_token();
        let b = generate_refresh_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn refresh_token_hash_is_stable_hex() {
        let hash = hash_refresh_token("token");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_refresh_token("token"));
        assert_ne!(hash, hash_refresh_token("token2"));
    }
}
