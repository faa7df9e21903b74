use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use tracing::info;

use super::store::StoreError;
use crate::config::CONFIG;

/// Builds the connection pool for the CRM database
pub struct DatabaseManager;

impl DatabaseManager {
    pub async fn connect() -> Result<PgPool, StoreError> {
        let base = std::env::var("DATABASE_URL").map_err(|_| StoreError::ConfigMissing("DATABASE_URL"))?;
        let url = Self::validate_url(&base)?;

        let db = &CONFIG.database;
        let mut options: PgConnectOptions = url.parse()?;
        if !db.enable_query_logging {
            options = options.disable_statement_logging();
        }
        let pool = PgPoolOptions::new()
            .max_connections(db.max_connections)
            .acquire_timeout(Duration::from_secs(db.connection_timeout))
            .connect_with(options)
            .await?;

        info!(
            "Connected to database {} (max {} connections)",
            Self::database_name(&url).unwrap_or_default(),
            db.max_connections
        );
        Ok(pool)
    }

    pub async fn health_check(pool: &PgPool) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    fn validate_url(raw: &str) -> Result<String, StoreError> {
        let url = url::Url::parse(raw).map_err(|_| StoreError::InvalidDatabaseUrl)?;
        match url.scheme() {
            "postgres" | "postgresql" => Ok(url.into()),
            _ => Err(StoreError::InvalidDatabaseUrl),
        }
    }

    /// Path segment of the URL, for logs. Credentials never leave this function.
    fn database_name(raw: &str) -> Option<String> {
        let url = url::Url::parse(raw).ok()?;
        let name = url.path().trim_start_matches('/');
        (!name.is_empty()).then(|| name.to_string())
    }
}
