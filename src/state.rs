use deadpool_postgres::Pool;
use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::config::Config;
use crate::crypto::cipher::CipherService;
use crate::error::Result;
use crate::mailer::Mailer;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: Pool,
    /// The Redis connection manager.
    pub redis: ConnectionManager,
    /// The application's configuration.
    pub config: Config,
    /// The field cipher, key derived once at startup.
    pub cipher: Arc<CipherService>,
    /// The outbound OTP mailer.
    pub mailer: Arc<Mailer>,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL pool initialized with deadpool-postgres");

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis connection manager initialized (pooled)");

        let cipher = Arc::new(CipherService::new(config)?);
        tracing::info!(
            "✅ Field cipher initialized (encryption {})",
            if config.field_encryption_enabled { "enabled" } else { "disabled" }
        );

        let mailer = Arc::new(Mailer::new(config.mail_from.clone()));

        Ok(AppState {
            db,
            redis,
            config: config.clone(),
            cipher,
            mailer,
        })
    }
}
