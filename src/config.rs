use std::env;
use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The secret used to sign and verify JWT bearer tokens.
    pub jwt_secret: Zeroizing<String>,
    /// The secret the field-encryption key is derived from.
    pub field_key_secret: Zeroizing<String>,
    /// Whether PII fields are encrypted at rest.
    pub field_encryption_enabled: bool,
    /// Whether an undecryptable field reads as absent instead of raw ciphertext.
    pub field_decrypt_strict: bool,
    /// Whether login responses echo the OTP when mail delivery is unavailable.
    /// Never enable in production.
    pub otp_dev_return: bool,
    /// The address OTP mails are sent from.
    pub mail_from: String,
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .context("JWT_SECRET must be set (generate with: openssl rand -hex 32)")?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters");
        }

        let field_key_secret = env::var("FIELD_ENCRYPTION_KEY")
            .context("FIELD_ENCRYPTION_KEY must be set (generate with: openssl rand -hex 32)")?;

        if field_key_secret.len() < 32 {
            anyhow::bail!("FIELD_ENCRYPTION_KEY must be at least 32 characters");
        }

        let otp_dev_return = env_flag("OTP_DEV_RETURN", false);
        if otp_dev_return {
            tracing::warn!("⚠️  OTP_DEV_RETURN is enabled - OTP codes will be echoed in API responses");
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            jwt_secret: Zeroizing::new(jwt_secret),
            field_key_secret: Zeroizing::new(field_key_secret),
            field_encryption_enabled: env_flag("FIELD_ENCRYPTION_ENABLED", true),
            field_decrypt_strict: env_flag("FIELD_DECRYPT_STRICT", false),
            otp_dev_return,
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@tiffin.local".to_string()),
        })
    }
}
