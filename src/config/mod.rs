//! Per-environment defaults, overridden by environment variables at startup.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub listing: ListingConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    fn from_env() -> Self {
        match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Page size used when a request does not send `perPage`
    pub results_on_page: u64,
    pub max_per_page: u64,
    /// Row cap for the kanban board query
    pub kanban_limit: u64,
    /// Warn when a requested page size gets capped
    pub debug_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    pub connection_timeout: u64,
    pub enable_query_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// HS256 key for bearer tokens. Only development ships with one.
    pub jwt_secret: String,
    pub cors_origins: Vec<String>,
    /// Write activity entries to `log_activities` instead of the trace log
    pub enable_audit_logging: bool,
}

/// Replaces `slot` when `key` is set and parses; bad values keep the default
fn override_from<T: FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = env::var(key) {
        match raw.trim().parse() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!("ignoring unparseable {}={:?}", key, raw),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::defaults(Environment::from_env());

        let listing = &mut config.listing;
        override_from("RESULTS_ON_PAGE", &mut listing.results_on_page);
        override_from("LISTING_MAX_PER_PAGE", &mut listing.max_per_page);
        override_from("LISTING_KANBAN_LIMIT", &mut listing.kanban_limit);
        override_from("LISTING_DEBUG_LOGGING", &mut listing.debug_logging);

        let database = &mut config.database;
        override_from("DATABASE_MAX_CONNECTIONS", &mut database.max_connections);
        override_from("DATABASE_CONNECTION_TIMEOUT", &mut database.connection_timeout);
        override_from("DATABASE_ENABLE_QUERY_LOGGING", &mut database.enable_query_logging);

        let security = &mut config.security;
        override_from("JWT_SECRET", &mut security.jwt_secret);
        override_from("SECURITY_ENABLE_AUDIT_LOGGING", &mut security.enable_audit_logging);
        if let Ok(origins) = env::var("SECURITY_CORS_ORIGINS") {
            security.cors_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
        }

        config
    }

    pub fn defaults(environment: Environment) -> Self {
        let (max_per_page, debug_logging) = match environment {
            Environment::Development => (1000, true),
            Environment::Staging => (500, false),
            Environment::Production => (200, false),
        };
        let (max_connections, connection_timeout, enable_query_logging) = match environment {
            Environment::Development => (10, 30, true),
            Environment::Staging => (20, 10, true),
            Environment::Production => (50, 5, false),
        };
        let security = match environment {
            Environment::Development => SecurityConfig {
                jwt_secret: "development-secret".to_string(),
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                enable_audit_logging: false,
            },
            Environment::Staging => SecurityConfig {
                jwt_secret: String::new(),
                cors_origins: vec!["https://staging.example.com".to_string()],
                enable_audit_logging: true,
            },
            Environment::Production => SecurityConfig {
                jwt_secret: String::new(),
                cors_origins: vec!["https://app.example.com".to_string()],
                enable_audit_logging: true,
            },
        };

        Self {
            environment,
            listing: ListingConfig {
                results_on_page: 50,
                max_per_page,
                kanban_limit: 1000,
                debug_logging,
            },
            database: DatabaseConfig {
                max_connections,
                connection_timeout,
                enable_query_logging,
            },
            security,
        }
    }
}

pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_ships_a_secret() {
        let config = AppConfig::defaults(Environment::Development);
        assert_eq!(config.listing.results_on_page, 50);
        assert_eq!(config.listing.kanban_limit, 1000);
        assert!(!config.security.jwt_secret.is_empty());
    }

    #[test]
    fn production_requires_a_secret_and_audits() {
        let config = AppConfig::defaults(Environment::Production);
        assert_eq!(config.listing.max_per_page, 200);
        assert!(config.security.jwt_secret.is_empty());
        assert!(config.security.enable_audit_logging);
        assert!(!config.database.enable_query_logging);
    }

    #[test]
    fn unparseable_override_keeps_default() {
        let mut limit = 7u64;
        std::env::set_var("CRM_TEST_LIMIT", "lots");
        override_from("CRM_TEST_LIMIT", &mut limit);
        assert_eq!(limit, 7);
        std::env::set_var("CRM_TEST_LIMIT", " 12 ");
        override_from("CRM_TEST_LIMIT", &mut limit);
        assert_eq!(limit, 12);
    }
}
