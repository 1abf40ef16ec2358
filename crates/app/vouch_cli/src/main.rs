// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Duration;
use clap::Parser;
use cli::{Cli, Commands};
use rand::RngCore;
use vouch_core::auth::AuthError;
use vouch_core::auth::jwt::TokenIssuer;
use vouch_core::auth::keys::{StaticKeyManager, validate_key_material};
use vouch_core::auth::password::PasswordHasher;
use vouch_core::config::{DEFAULT_ACCESS_TTL_SECS, HashParams, TokenConfig};

mod cli;
mod logging;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    logging::init()?;

    let args = Cli::parse();

    match args.command {
        Commands::HashPassword {
            password,
            memory_kib,
            time_cost,
            parallelism,
        } => {
            let hasher = PasswordHasher::new(HashParams {
                memory_kib,
                time_cost,
                parallelism,
                ..HashParams::default()
            });
            println!("{}", hasher.hash(&password)?);
        }
        Commands::VerifyPassword { hash, password } => {
            PasswordHasher::default().verify(&hash, &password)?;
            println!("ok");
        }
        Commands::GenerateKey { bytes } => {
            let mut material = vec![0u8; bytes];
            rand::rng().fill_bytes(&mut material);
            validate_key_material(&material)?;
            println!("{}", STANDARD.encode(&material));
        }
        Commands::IssueToken {
            secret,
            sub,
            email,
            role,
            ttl_secs,
        } => {
            let issuer = static_issuer(secret, ttl_secs)?;
            let (token, _) = issuer.issue_access_token(&sub, &email, &role).await?;
            println!("{token}");
        }
        Commands::ValidateToken { secret, token } => {
            let issuer = static_issuer(secret, DEFAULT_ACCESS_TTL_SECS)?;
            let claims = issuer.validate_access_token(&token).await?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// Issuer over a single static secret, as configured with `VOUCH_KEY_MANAGER=static`.
fn static_issuer(secret: String, access_ttl_secs: i64) -> Result<TokenIssuer> {
    let keys = StaticKeyManager::new(secret.into_bytes())?;
    let access_ttl = Duration::try_seconds(access_ttl_secs).ok_or_else(|| {
        AuthError::ValidationError(format!("--ttl-secs {access_ttl_secs} is out of range"))
    })?;
    let config = TokenConfig {
        access_ttl,
        ..TokenConfig::default()
    };
    Ok(TokenIssuer::new(Arc::new(keys), config))
}
