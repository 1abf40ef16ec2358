use clap::{Parser, Subcommand};
use vouch_core::config::{DEFAULT_ACCESS_TTL_SECS, HashParams};

/// Offline helpers for Vouch credentials and access tokens.
#[derive(Parser)]
#[command(name = "vouch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Hash a password with Argon2id and print the encoded hash.
    HashPassword {
        password: String,

        #[arg(long, default_value_t = HashParams::default().memory_kib)]
        memory_kib: u32,

        #[arg(long, default_value_t = HashParams::default().time_cost)]
        time_cost: u32,

        #[arg(long, default_value_t = HashParams::default().parallelism)]
        parallelism: u32,
    },

    /// Check a password against an encoded hash. Exits non-zero on mismatch.
    VerifyPassword {
        #[arg(long)]
        hash: String,

        password: String,
    },

    /// Print fresh random signing-key material, base64 encoded.
    GenerateKey {
        #[arg(long, default_value_t = 32)]
        bytes: usize,
    },

    /// Sign an access token with a static secret.
    IssueToken {
        #[arg(long, env = "VOUCH_JWT_SECRET", hide_env_values = true)]
        secret: String,

        #[arg(long)]
        sub: String,

        #[arg(long)]
        email: String,

        #[arg(long, default_value = "user")]
        role: String,

        #[arg(long, default_value_t = DEFAULT_ACCESS_TTL_SECS)]
        ttl_secs: i64,
    },

    /// Validate an access token against a static secret and print its claims.
    ValidateToken {
        #[arg(long, env = "VOUCH_JWT_SECRET", hide_env_values = true)]
        secret: String,

        token: String,
    },

    /// Print the version.
    Version,
}
