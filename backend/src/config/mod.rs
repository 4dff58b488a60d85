//! Configuration module for the ticket backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::errors::AppError;
use crate::identity::RoleVariant;
use crate::policy::TicketScopeMode;

const DEV_JWT_SECRET: &str = "tracker-development-secret";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// HS256 secret for bearer-token verification
    pub jwt_secret: String,
    /// Management role used by this deployment
    pub role_variant: RoleVariant,
    /// How narrowly developers see ticket lists
    pub ticket_scope: TicketScopeMode,
    /// Platform account ensured at startup
    pub superadmin_email: Option<String>,
    pub superadmin_name: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let db_path = var("TRACKER_DB_PATH", "./data/tracker.sqlite").into();
        let index_path = var("TRACKER_INDEX_PATH", "./data/index").into();

        let bind_addr = var("TRACKER_BIND_ADDR", "127.0.0.1:8080")
            .parse()
            .map_err(|_| AppError::Validation("Invalid TRACKER_BIND_ADDR format".to_string()))?;

        let log_level = var("TRACKER_LOG_LEVEL", "info");

        let jwt_secret = match lookup("TRACKER_JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("TRACKER_JWT_SECRET not set - using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let role_variant = RoleVariant::parse(&var("TRACKER_ROLE_VARIANT", "admin")).ok_or_else(
            || AppError::Validation("TRACKER_ROLE_VARIANT must be admin or project-manager".to_string()),
        )?;

        let ticket_scope = TicketScopeMode::parse(&var("TRACKER_TICKET_SCOPE", "organization"))
            .ok_or_else(|| {
                AppError::Validation(
                    "TRACKER_TICKET_SCOPE must be organization or involvement".to_string(),
                )
            })?;

        let superadmin_email = lookup("TRACKER_SUPERADMIN_EMAIL").filter(|e| !e.trim().is_empty());
        let superadmin_name = var("TRACKER_SUPERADMIN_NAME", "Platform Admin");

        Ok(Self {
            db_path,
            index_path,
            bind_addr,
            log_level,
            jwt_secret,
            role_variant,
            ticket_scope,
            superadmin_email,
            superadmin_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Result<Config, AppError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = from_map(&[]).unwrap();

        assert_eq!(config.db_path, PathBuf::from("./data/tracker.sqlite"));
        assert_eq!(config.index_path, PathBuf::from("./data/index"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(config.role_variant, RoleVariant::Admin);
        assert_eq!(config.ticket_scope, TicketScopeMode::Organization);
        assert!(config.superadmin_email.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("TRACKER_ROLE_VARIANT", "project-manager"),
            ("TRACKER_TICKET_SCOPE", "involvement"),
            ("TRACKER_SUPERADMIN_EMAIL", "root@example.com"),
            ("TRACKER_JWT_SECRET", "s3cret"),
        ])
        .unwrap();

        assert_eq!(config.role_variant, RoleVariant::ProjectManager);
        assert_eq!(config.ticket_scope, TicketScopeMode::Involvement);
        assert_eq!(config.superadmin_email.as_deref(), Some("root@example.com"));
        assert_eq!(config.jwt_secret, "s3cret");
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(matches!(
            from_map(&[("TRACKER_BIND_ADDR", "not-an-address")]),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            from_map(&[("TRACKER_ROLE_VARIANT", "owner")]),
            Err(AppError::Validation(_))
        ));
    }
}
