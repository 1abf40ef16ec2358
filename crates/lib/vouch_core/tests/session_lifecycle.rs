//! End-to-end session flows over the in-memory collaborators.

use std::sync::Arc;

use secrecy::SecretString;

use vouch_core::auth::AuthError;
use vouch_core::auth::events::NoopEventSink;
use vouch_core::auth::jwt::TokenIssuer;
use vouch_core::auth::keys::{KeyManager, RotatingKeyManager};
use vouch_core::auth::password::PasswordHasher;
use vouch_core::auth::session::{ClientInfo, SessionLifecycleManager};
use vouch_core::auth::store::MemorySessionStore;
use vouch_core::auth::users::MemoryUserDirectory;
use vouch_core::config::{AuthConfig, HashParams, KeyManagerConfig, TokenConfig};
use vouch_core::models::auth::UserIdentity;

const PASSWORD: &str = "hunter2-but-longer";

fn cheap_params() -> HashParams {
    HashParams {
        memory_kib: 1024,
        time_cost: 1,
        parallelism: 1,
        ..HashParams::default()
    }
}

fn directory(hasher: &PasswordHasher) -> Arc<MemoryUserDirectory> {
    let users = Arc::new(MemoryUserDirectory::new());
    for (id, email, role) in [
        ("u-1", "one@example.com", "admin"),
        ("u-2", "two@example.com", "user"),
    ] {
        users.insert(
            UserIdentity {
                id: id.into(),
                email: email.into(),
                role: role.into(),
            },
            Some(hasher.hash(PASSWORD).unwrap()),
        );
    }
    users
}

async fn rotating_manager() -> (SessionLifecycleManager, Arc<RotatingKeyManager>) {
    let hasher = PasswordHasher::new(cheap_params());
    let users = directory(&hasher);
    let keys = Arc::new(RotatingKeyManager::new(None, 3).unwrap());
    let manager = SessionLifecycleManager::new(
        hasher,
        TokenIssuer::new(keys.clone(), TokenConfig::default()),
        Arc::new(MemorySessionStore::new()),
        users,
        Arc::new(NoopEventSink),
    )
    .unwrap();
    (manager, keys)
}

#[tokio::test]
async fn login_refresh_logout_flow() {
    let (manager, _) = rotating_manager().await;
    let client = ClientInfo::new(Some("192.0.2.1"), Some("integration"));

    let first = manager.login("one@example.com", PASSWORD, client).await.unwrap();
    let second = manager.refresh(&first.refresh_token, client).await.unwrap();
    let third = manager.refresh(&second.refresh_token, client).await.unwrap();

    let claims = manager
        .issuer()
        .validate_access_token(&third.access_token)
        .await
        .unwrap();
    assert_eq!(claims.sub, "u-1");
    assert_eq!(claims.email, "one@example.com");
    assert_eq!(claims.role, "admin");

    let tokens = [&first.refresh_token, &second.refresh_token, &third.refresh_token];
    assert_ne!(tokens[0], tokens[1]);
    assert_ne!(tokens[1], tokens[2]);
    assert_ne!(tokens[0], tokens[2]);

    let sessions = manager.active_sessions("u-1").await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].ip.as_deref(), Some("192.0.2.1"));

    manager.logout(&third.refresh_token).await.unwrap();
    assert_eq!(manager.active_session_count("u-1").await.unwrap(), 0);
    assert!(matches!(
        manager.refresh(&third.refresh_token, client).await,
        Err(AuthError::RefreshTokenRevoked)
    ));
}

#[tokio::test]
async fn logout_all_only_touches_one_user() {
    let (manager, _) = rotating_manager().await;
    let one = manager
        .login("one@example.com", PASSWORD, ClientInfo::default())
        .await
        .unwrap();
    manager
        .login("one@example.com", PASSWORD, ClientInfo::default())
        .await
        .unwrap();
    let two = manager
        .login("two@example.com", PASSWORD, ClientInfo::default())
        .await
        .unwrap();

    assert_eq!(manager.logout_all("u-1").await.unwrap(), 2);
    assert!(matches!(
        manager.refresh(&one.refresh_token, ClientInfo::default()).await,
        Err(AuthError::RefreshTokenRevoked)
    ));
    assert!(
        manager
            .refresh(&two.refresh_token, ClientInfo::default())
            .await
            .is_ok()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redemptions_of_one_token() {
    let (manager, _) = rotating_manager().await;
    let manager = Arc::new(manager);
    let pair = manager
        .login("two@example.com", PASSWORD, ClientInfo::default())
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        {
            let manager = manager.clone();
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { manager.refresh(&token, ClientInfo::default()).await })
        },
        {
            let manager = manager.clone();
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { manager.refresh(&token, ClientInfo::default()).await })
        }
    );
    let results = [a.unwrap(), b.unwrap()];
    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert_ne!(winners[0].refresh_token, pair.refresh_token);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, AuthError::RefreshTokenRevoked))
    );
    assert_eq!(manager.active_session_count("u-2").await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn logout_all_racing_refresh_leaves_nothing_active() {
    let (manager, _) = rotating_manager().await;
    let manager = Arc::new(manager);

    for _ in 0..25 {
        let pair = manager
            .login("one@example.com", PASSWORD, ClientInfo::default())
            .await
            .unwrap();
        let refresh = {
            let manager = manager.clone();
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { manager.refresh(&token, ClientInfo::default()).await })
        };
        let logout_all = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.logout_all("u-1").await })
        };
        let (refreshed, revoked) = tokio::join!(refresh, logout_all);
        revoked.unwrap().unwrap();

        if let Ok(Ok(next)) = refreshed {
            // A rotation that committed first is swept up by logout-all.
            assert!(matches!(
                manager.refresh(&next.refresh_token, ClientInfo::default()).await,
                Err(AuthError::RefreshTokenRevoked)
            ));
        }
        assert_eq!(manager.active_session_count("u-1").await.unwrap(), 0);
    }
}

#[tokio::test]
async fn key_rotation_keeps_old_tokens_until_revoked() {
    let (manager, keys) = rotating_manager().await;
    let before = manager
        .login("one@example.com", PASSWORD, ClientInfo::default())
        .await
        .unwrap();
    let old_kid = keys.current_key_id().await.unwrap();

    let (new_kid, _) = keys.rotate_key().await.unwrap();
    assert_ne!(old_kid, new_kid);

    let after = manager
        .refresh(&before.refresh_token, ClientInfo::default())
        .await
        .unwrap();
    let claims = manager
        .issuer()
        .validate_access_token(&after.access_token)
        .await
        .unwrap();
    assert_eq!(claims.kid, new_kid);
    assert!(
        manager
            .issuer()
            .validate_access_token(&before.access_token)
            .await
            .is_ok()
    );

    keys.revoke_key(&old_kid).await.unwrap();
    assert!(matches!(
        manager.issuer().validate_access_token(&before.access_token).await,
        Err(AuthError::InvalidAccessToken)
    ));
    assert!(
        manager
            .issuer()
            .validate_access_token(&after.access_token)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn built_from_config() {
    let config = AuthConfig {
        hash: cheap_params(),
        tokens: TokenConfig::default(),
        keys: KeyManagerConfig::Static {
            secret: SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
        },
        reuse_detection: true,
    };
    let hasher = PasswordHasher::new(config.hash);
    let manager = SessionLifecycleManager::from_config(
        &config,
        Arc::new(MemorySessionStore::new()),
        directory(&hasher),
        Arc::new(NoopEventSink),
    )
    .await
    .unwrap();

    let a = manager
        .login("one@example.com", PASSWORD, ClientInfo::default())
        .await
        .unwrap();
    let b = manager
        .refresh(&a.refresh_token, ClientInfo::default())
        .await
        .unwrap();
    // Replaying the superseded token burns the whole lineage.
    assert!(
        manager
            .refresh(&a.refresh_token, ClientInfo::default())
            .await
            .is_err()
    );
    assert!(matches!(
        manager.refresh(&b.refresh_token, ClientInfo::default()).await,
        Err(AuthError::RefreshTokenRevoked)
    ));
    assert!(manager.issuer().key_manager().rotate_key().await.is_err());
}

#[tokio::test]
async fn short_static_secret_is_rejected() {
    let config = AuthConfig {
        hash: cheap_params(),
        tokens: TokenConfig::default(),
        keys: KeyManagerConfig::Static {
            secret: SecretString::from("short".to_string()),
        },
        reuse_detection: false,
    };
    let result = SessionLifecycleManager::from_config(
        &config,
        Arc::new(MemorySessionStore::new()),
        Arc::new(MemoryUserDirectory::new()),
        Arc::new(NoopEventSink),
    )
    .await;
    assert!(matches!(
        result.err(),
        Some(AuthError::SigningKeyTooShort { len: 5, min: 32 })
    ));
}
